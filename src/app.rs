use std::sync::Arc;

use chrono::Local;
use dioxus::prelude::*;
use rfd::{FileDialog, MessageButtons, MessageDialog, MessageDialogResult, MessageLevel};
use tokio::sync::mpsc;

use crate::domain::entities::config::ColumnLayout;
use crate::domain::entities::notice::NOTICE_TTL;
use crate::domain::entities::query::{
    page_bounds, page_count, FilterGroup, FilterOperator, FilterRule, PAGE_SIZE_OPTIONS,
};
use crate::domain::entities::row::{cell_text, PrimaryKey};
use crate::infra::export::csv::{default_export_file_name, export_rows_csv};
use crate::platform::desktop::blocking::run_blocking;
use crate::ui::state::app_state::AppState;
use crate::usecase::services::edit_service::{EditOutcome, EditSession};
use crate::usecase::services::query_service::QueryService;
use crate::usecase::services::submit_service::{reconcile, Reconciliation, SubmissionCoordinator};
use crate::AppServices;

const ROW_LIMIT: usize = 5000;
const NONE_OPTION_VALUE: &str = "__none__";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DropdownId {
    Table,
    FilterColumn,
    FilterOperator,
    PageSize,
}

#[derive(Clone, Debug, PartialEq)]
struct DropdownOption {
    value: String,
    label: String,
}

impl DropdownOption {
    fn same(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            label: value.clone(),
            value,
        }
    }
}

fn dropdown_label(options: &[DropdownOption], selected: Option<&str>) -> String {
    selected
        .and_then(|value| options.iter().find(|opt| opt.value == value))
        .map(|opt| opt.label.clone())
        .unwrap_or_else(|| "(none)".to_string())
}

/// One rendered cell of the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct GridCell {
    pub column: String,
    pub text: String,
    pub editable: bool,
    pub staged: bool,
    pub error: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GridRow {
    pub row_index: usize,
    pub cells: Vec<GridCell>,
}

/// One line of the edit panel.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingChange {
    pub column: String,
    pub row_key: String,
    pub old_text: String,
    pub new_text: String,
    pub error: bool,
}

fn display_text(value: Option<&serde_json::Value>) -> String {
    match value {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(value) => cell_text(value),
    }
}

/// Rows `start..end` of the buffer, marked with their staged/error state.
pub fn grid_rows(
    session: &EditSession,
    layouts: &[ColumnLayout],
    start: usize,
    end: usize,
) -> Vec<GridRow> {
    let table = session.active_table().unwrap_or_default();
    let primary_keys = session.primary_keys();
    let buffer = session.buffer();
    let end = end.min(buffer.len());
    let start = start.min(end);

    buffer.rows[start..end]
        .iter()
        .enumerate()
        .map(|(offset, row)| {
            let row_key = PrimaryKey::from_row(row, primary_keys).row_key();
            let cells = layouts
                .iter()
                .filter(|layout| layout.show)
                .map(|layout| {
                    let edit = session.ledger().get(table, &layout.id, &row_key);
                    GridCell {
                        column: layout.id.clone(),
                        text: display_text(row.get(&layout.id)),
                        editable: layout.editable && session.can_edit_column(&layout.id),
                        staged: edit.is_some(),
                        error: edit.is_some_and(|edit| edit.error),
                    }
                })
                .collect();
            GridRow {
                row_index: start + offset,
                cells,
            }
        })
        .collect()
}

pub fn pending_changes(session: &EditSession) -> Vec<PendingChange> {
    let Some(table) = session.active_table() else {
        return Vec::new();
    };
    session
        .ledger()
        .edits_for_table(table)
        .into_iter()
        .flat_map(|(column, rows)| {
            rows.into_iter().map(move |(row_key, edit)| PendingChange {
                column: column.clone(),
                row_key,
                old_text: cell_text(&edit.old_value),
                new_text: cell_text(&edit.new_value),
                error: edit.error,
            })
        })
        .collect()
}

fn current_filter(column: &str, operator: FilterOperator, value: &str) -> FilterGroup {
    if column.is_empty() {
        return FilterGroup::default();
    }
    FilterGroup {
        rules: vec![FilterRule::new(column, operator, value)],
        ..FilterGroup::default()
    }
}

#[component]
fn DropdownSelect(
    id: DropdownId,
    label: &'static str,
    options: Vec<DropdownOption>,
    selected: Option<String>,
    mut open_dropdown: Signal<Option<DropdownId>>,
    mut dropdown_pos: Signal<Option<(f64, f64)>>,
    on_select: EventHandler<String>,
) -> Element {
    let is_open = open_dropdown() == Some(id);
    let selected_label = dropdown_label(&options, selected.as_deref());
    let (left, top) = dropdown_pos().unwrap_or((0.0, 0.0));

    rsx! {
        div {
            style: "position: relative; display: inline-flex; align-items: center; gap: 6px;",
            span { "{label}" }
            button {
                style: "border: 1px solid #bbb; background: #fff; padding: 4px 10px; border-radius: 6px; cursor: pointer;",
                onclick: move |event| {
                    event.stop_propagation();
                    if open_dropdown() == Some(id) {
                        open_dropdown.set(None);
                        return;
                    }
                    let point = event.client_coordinates();
                    dropdown_pos.set(Some((point.x, point.y + 24.0)));
                    open_dropdown.set(Some(id));
                },
                "{selected_label}"
            }
        }

        if is_open {
            div {
                style: "position: fixed; left: {left}px; top: {top}px; min-width: 200px; max-height: 320px; overflow-y: auto; background: #fff; border: 1px solid #bbb; border-radius: 8px; box-shadow: 0 10px 24px rgba(0,0,0,0.15); z-index: 1200;",
                onclick: move |event| event.stop_propagation(),
                {options.iter().map(|opt| {
                    let value = opt.value.clone();
                    let label = opt.label.clone();
                    let is_selected = selected.as_deref() == Some(value.as_str());
                    let background = if is_selected { "#eef4ff" } else { "transparent" };
                    rsx!(
                        div {
                            style: "padding: 8px 10px; cursor: pointer; background: {background};",
                            onclick: move |_| {
                                on_select.call(value.clone());
                                open_dropdown.set(None);
                            },
                            "{label}"
                        }
                    )
                })}
            }
        }
    }
}

#[component]
pub fn App() -> Element {
    let services = use_context::<AppServices>();
    let config_path = services.config_path.display().to_string();
    let base_url = services
        .config
        .db_url(services.db_index)
        .map(str::to_string);

    let AppState {
        mut tables,
        mut selected_table,
        mut session,
        mut page,
        mut page_size,
        mut total_rows,
        mut busy,
        mut status,
        mut filter_column,
        mut filter_operator,
        mut filter_value,
        mut submitting,
    } = AppState::new();
    let mut open_dropdown = use_signal(|| None::<DropdownId>);
    let dropdown_pos = use_signal(|| None::<(f64, f64)>);

    let config = services.config.clone();
    let db_index = services.db_index;
    let query_service = use_hook({
        let services = services.clone();
        move || {
            Arc::new(QueryService::new(
                services.gateway.clone(),
                services.config.clone(),
                services.db_index,
            ))
        }
    });
    let coordinator = use_hook({
        let services = services.clone();
        let base_url = base_url.clone().unwrap_or_default();
        move || Arc::new(SubmissionCoordinator::new(services.gateway.clone(), base_url))
    });

    let query_service_for_tables = query_service.clone();
    use_effect(move || {
        let names = query_service_for_tables.table_names();
        if names.is_empty() {
            status.set("No tables configured".to_string());
        }
        tables.set(names);
    });

    let query_service_for_load = query_service.clone();
    let load_table = use_callback(move |table: String| {
        let query_service = query_service_for_load.clone();
        let filter = current_filter(&filter_column(), filter_operator(), &filter_value());
        busy.set(true);
        status.set(format!("Loading {table}..."));
        spawn(async move {
            let fetch_service = query_service.clone();
            let fetch_table = table.clone();
            let result = run_blocking(move || {
                fetch_service.load_page(&fetch_table, filter, Some(ROW_LIMIT))
            })
            .await;
            match result {
                Ok(Ok(loaded)) => {
                    let count = loaded.rows.len();
                    let total = query_service.install_page(&mut session.write(), &table, loaded);
                    total_rows.set(total);
                    page.set(0);
                    selected_table.set(Some(table.clone()));
                    status.set(format!("Loaded {count} rows from {table}"));
                }
                Ok(Err(err)) => status.set(format!("Failed to load {table}: {err}")),
                Err(err) => status.set(format!("Failed to load {table}: {err:#}")),
            }
            busy.set(false);
        });
    });

    let session_snapshot = session.read();
    let active_table = session_snapshot.active_table().map(str::to_string);
    let edit_enabled = session_snapshot.edit_enabled();
    let columns = session_snapshot.buffer().columns.clone();
    let layouts: Vec<ColumnLayout> = match active_table.as_deref() {
        Some(table) => columns
            .iter()
            .map(|column| config.column_layout(db_index, table, column))
            .collect(),
        None => Vec::new(),
    };
    let visible_layouts: Vec<ColumnLayout> =
        layouts.iter().filter(|layout| layout.show).cloned().collect();
    let row_count = session_snapshot.buffer().len();
    let buffer_empty = session_snapshot.buffer().is_empty();
    let current_page_size = page_size();
    let pages = page_count(row_count, current_page_size).max(1);
    let current_page = page().min(pages - 1);
    let (start, end) = page_bounds(current_page, current_page_size, row_count);
    let rows = grid_rows(&session_snapshot, &layouts, start, end);
    let changes = pending_changes(&session_snapshot);
    let has_errors = active_table
        .as_deref()
        .is_some_and(|table| session_snapshot.ledger().has_errors_for_table(table));
    let notice = session_snapshot.notice().message().map(str::to_string);
    drop(session_snapshot);

    let total_label = match total_rows() {
        Some(total) => format!("{row_count} of {total} rows"),
        None => format!("{row_count} rows"),
    };
    let page_label = format!("Page {} of {pages} ({total_label})", current_page + 1);
    let table_options: Vec<DropdownOption> =
        tables().into_iter().map(DropdownOption::same).collect();
    let mut column_options = vec![DropdownOption {
        value: NONE_OPTION_VALUE.to_string(),
        label: "(no filter)".to_string(),
    }];
    column_options.extend(columns.iter().cloned().map(DropdownOption::same));
    let operator_options: Vec<DropdownOption> = FilterOperator::ALL
        .iter()
        .map(|op| DropdownOption::same(op.name()))
        .collect();
    let page_size_options: Vec<DropdownOption> = PAGE_SIZE_OPTIONS
        .iter()
        .map(|size| DropdownOption::same(size.to_string()))
        .collect();
    let selected_filter_column = if filter_column().is_empty() {
        NONE_OPTION_VALUE.to_string()
    } else {
        filter_column()
    };

    let coordinator_for_submit = coordinator.clone();
    let title = match config.db_title(db_index) {
        Some(db_title) => format!("{} / {db_title}", config.title()),
        None => config.title().to_string(),
    };
    let no_table_msg = config.no_table_msg().to_string();

    if base_url.is_none() {
        return rsx! {
            div {
                p { "No database configured. Add one to {config_path}." }
            }
        };
    }

    rsx! {
        div {
            style: "font-family: sans-serif; padding: 12px;",
            onclick: move |_| open_dropdown.set(None),
            h2 { "{title}" }

            div {
                style: "display: flex; flex-wrap: wrap; gap: 12px; align-items: center; margin-bottom: 10px;",
                DropdownSelect {
                    id: DropdownId::Table,
                    label: "Table",
                    options: table_options,
                    selected: active_table.clone(),
                    open_dropdown: open_dropdown,
                    dropdown_pos: dropdown_pos,
                    on_select: move |table: String| load_table.call(table),
                }
                DropdownSelect {
                    id: DropdownId::FilterColumn,
                    label: "Filter",
                    options: column_options,
                    selected: Some(selected_filter_column),
                    open_dropdown: open_dropdown,
                    dropdown_pos: dropdown_pos,
                    on_select: move |column: String| {
                        if column == NONE_OPTION_VALUE {
                            filter_column.set(String::new());
                        } else {
                            filter_column.set(column);
                        }
                    },
                }
                DropdownSelect {
                    id: DropdownId::FilterOperator,
                    label: "",
                    options: operator_options,
                    selected: Some(filter_operator().name().to_string()),
                    open_dropdown: open_dropdown,
                    dropdown_pos: dropdown_pos,
                    on_select: move |name: String| {
                        if let Ok(op) = name.parse::<FilterOperator>() {
                            filter_operator.set(op);
                        }
                    },
                }
                input {
                    style: "border: 1px solid #bbb; border-radius: 6px; padding: 4px 8px;",
                    value: "{filter_value}",
                    oninput: move |event| filter_value.set(event.value()),
                }
                button {
                    disabled: busy() || active_table.is_none(),
                    onclick: move |_| {
                        if let Some(table) = selected_table() {
                            load_table.call(table);
                        }
                    },
                    "Apply"
                }
                button {
                    disabled: active_table.is_none() || buffer_empty,
                    onclick: move |_| {
                        let Some(table) = selected_table() else {
                            return;
                        };
                        let file_name = default_export_file_name(&table, Local::now());
                        let Some(path) = FileDialog::new()
                            .set_file_name(&file_name)
                            .add_filter("CSV", &["csv"])
                            .save_file()
                        else {
                            return;
                        };
                        let (columns, rows) = {
                            let snapshot = session.read();
                            (snapshot.buffer().columns.clone(), snapshot.buffer().rows.clone())
                        };
                        match export_rows_csv(&path, &columns, &rows) {
                            Ok(count) => status.set(format!("Exported {count} rows to {}", path.display())),
                            Err(err) => status.set(format!("Export failed: {err:#}")),
                        }
                    },
                    "Download CSV"
                }
            }

            div {
                style: "display: flex; gap: 16px; align-items: flex-start;",
                div {
                    style: "flex: 1; overflow-x: auto;",
                    if active_table.is_none() {
                        p { "{no_table_msg}" }
                    } else {
                        table {
                            style: "border-collapse: collapse; width: 100%;",
                            thead {
                                tr {
                                    {visible_layouts.iter().map(|layout| {
                                        let width = layout
                                            .width_px
                                            .map(|px| format!("width: {px}px;"))
                                            .unwrap_or_default();
                                        let max_width = layout
                                            .max_width_px
                                            .map(|px| format!("max-width: {px}px;"))
                                            .unwrap_or_default();
                                        let min_width = layout.min_width_px;
                                        let header = layout.header.clone();
                                        rsx!(
                                            th {
                                                style: "border: 1px solid #bbb; padding: 4px; font-weight: bold; min-width: {min_width}px; {width} {max_width}",
                                                "{header}"
                                            }
                                        )
                                    })}
                                }
                            }
                            tbody {
                                {rows.into_iter().map(|grid_row| {
                                    let row_index = grid_row.row_index;
                                    let stripe = if row_index % 2 == 0 { "#fff" } else { "#f6f6f6" };
                                    rsx!(
                                        tr {
                                            style: "background: {stripe};",
                                            {grid_row.cells.into_iter().map(|cell| {
                                                let background = if cell.error {
                                                    "#fde2e2"
                                                } else if cell.staged {
                                                    "#fff5cc"
                                                } else {
                                                    "transparent"
                                                };
                                                let column = cell.column.clone();
                                                let text = cell.text.clone();
                                                if cell.editable {
                                                    rsx!(
                                                        td {
                                                            style: "border: 1px solid #bbb; padding: 1px; background: {background};",
                                                            input {
                                                                style: "width: 100%; border: none; border-bottom: 1px solid lightpink; background: #fafafa;",
                                                                value: "{text}",
                                                                onchange: move |event| {
                                                                    let input = event.value();
                                                                    let result = session.write().commit_cell_input(row_index, &column, &input);
                                                                    match result {
                                                                        Ok(EditOutcome::Staged) => status.set(format!("Staged change to {column}")),
                                                                        Ok(EditOutcome::Unchanged) => {}
                                                                        Err(err) => status.set(format!("Edit rejected: {err}")),
                                                                    }
                                                                },
                                                            }
                                                        }
                                                    )
                                                } else {
                                                    rsx!(
                                                        td {
                                                            style: "border: 1px solid #bbb; padding: 4px; background: {background};",
                                                            "{text}"
                                                        }
                                                    )
                                                }
                                            })}
                                        }
                                    )
                                })}
                            }
                        }
                        div {
                            style: "display: flex; gap: 8px; align-items: center; margin-top: 8px;",
                            button {
                                disabled: current_page == 0,
                                onclick: move |_| page.set(current_page.saturating_sub(1)),
                                "Previous Page"
                            }
                            span { "{page_label}" }
                            button {
                                disabled: current_page + 1 >= pages,
                                onclick: move |_| page.set(current_page + 1),
                                "Next Page"
                            }
                            DropdownSelect {
                                id: DropdownId::PageSize,
                                label: "Rows per page",
                                options: page_size_options,
                                selected: Some(current_page_size.to_string()),
                                open_dropdown: open_dropdown,
                                dropdown_pos: dropdown_pos,
                                on_select: move |value: String| {
                                    if let Ok(size) = value.parse::<usize>() {
                                        page_size.set(size);
                                        page.set(0);
                                    }
                                },
                            }
                        }
                    }
                }

                div {
                    style: "width: 320px; border: 1px solid #bbb; border-radius: 8px; padding: 10px;",
                    h3 { "Edit" }
                    label {
                        style: "display: flex; align-items: center; gap: 8px;",
                        input {
                            r#type: "checkbox",
                            checked: edit_enabled,
                            disabled: active_table.is_none(),
                            onclick: move |_| {
                                if let Err(err) = session.write().set_edit_enabled(!edit_enabled) {
                                    status.set(format!("Cannot edit: {err}"));
                                }
                            },
                        }
                        span { "Enable editing" }
                    }
                    if changes.is_empty() {
                        p { style: "color: #666;", "No staged changes" }
                    } else {
                        ul {
                            style: "list-style: none; padding: 0;",
                            {changes.into_iter().map(|change| {
                                let color = if change.error { "#b00" } else { "#222" };
                                let summary = format!(
                                    "{} [{}]: {} → {}",
                                    change.column, change.row_key, change.old_text, change.new_text
                                );
                                let column = change.column;
                                let row_key = change.row_key;
                                rsx!(
                                    li {
                                        style: "display: flex; justify-content: space-between; gap: 6px; padding: 4px 0; color: {color};",
                                        span { "{summary}" }
                                        button {
                                            onclick: move |_| {
                                                session.write().discard_change(&column, &row_key);
                                            },
                                            "Delete"
                                        }
                                    }
                                )
                            })}
                        }
                    }
                    if has_errors {
                        p { style: "color: #b00;", "Some changes failed to save." }
                    }
                    div {
                        style: "display: flex; gap: 8px;",
                        button {
                            disabled: submitting() > 0,
                            onclick: move |_| {
                                let batch = coordinator_for_submit.collect(&session.read());
                                if batch.is_empty() {
                                    status.set("No changes to submit".to_string());
                                    return;
                                }
                                let (tx, mut rx) = mpsc::unbounded_channel();
                                let sent = coordinator_for_submit.dispatch(batch, tx);
                                submitting.set(submitting() + sent);
                                status.set(format!("Submitting {sent} changes"));
                                spawn(async move {
                                    while let Some(outcome) = rx.recv().await {
                                        let reconciliation = reconcile(&mut session.write(), outcome);
                                        submitting.with_mut(|count| *count = count.saturating_sub(1));
                                        if let Reconciliation::Flagged { notice_generation } = reconciliation {
                                            spawn(async move {
                                                tokio::time::sleep(NOTICE_TTL).await;
                                                session.write().notice_mut().expire(notice_generation);
                                            });
                                        }
                                    }
                                    status.set("Submission finished".to_string());
                                });
                            },
                            "Submit changes"
                        }
                        button {
                            onclick: move |_| {
                                let count = session.read().pending_count();
                                if count == 0 {
                                    return;
                                }
                                let confirm = MessageDialog::new()
                                    .set_level(MessageLevel::Warning)
                                    .set_title("Discard changes")
                                    .set_description(format!("Discard {count} staged changes?"))
                                    .set_buttons(MessageButtons::YesNo)
                                    .show();
                                if confirm != MessageDialogResult::Yes {
                                    return;
                                }
                                let discarded = session.write().discard_table_changes();
                                status.set(format!("Discarded {discarded} changes"));
                            },
                            "Discard all"
                        }
                    }
                }
            }

            p { style: "color: #555; margin-top: 10px;", "{status}" }

            if let Some(message) = notice {
                div {
                    style: "position: fixed; top: 16px; right: 16px; background: #323232; color: #fff; padding: 10px 16px; border-radius: 6px; box-shadow: 0 4px 12px rgba(0,0,0,0.3);",
                    "{message}"
                }
            }
        }
    }
}

use std::collections::BTreeSet;

use serde_json::Value;
use thiserror::Error;

use crate::domain::entities::edit::{EditLedger, Restoration};
use crate::domain::entities::notice::Notice;
use crate::domain::entities::row::{is_change, PrimaryKey, RowBuffer};
use crate::usecase::ports::gateway::RowPage;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("no table is selected")]
    NoActiveTable,
    #[error("edit mode is off")]
    EditModeOff,
    #[error("table {table} has no primary key")]
    NoPrimaryKey { table: String },
    #[error("column {column} is not editable")]
    NotEditable { column: String },
    #[error("row {row_index} is not loaded")]
    RowOutOfRange { row_index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Staged,
    Unchanged,
}

/// Sole owner of the staged edits and the displayed rows.
///
/// Every mutation goes through `&mut self`, so user input and submission
/// results are serialized by whoever holds the session.
#[derive(Debug, Clone, Default)]
pub struct EditSession {
    table: Option<String>,
    primary_keys: Vec<String>,
    read_only: BTreeSet<String>,
    edit_enabled: bool,
    ledger: EditLedger,
    buffer: RowBuffer,
    notice: Notice,
}

impl EditSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs freshly fetched rows for `table`.
    ///
    /// Switching to a different table turns edit mode off. Edits already staged
    /// for this table are written back onto the matching reloaded rows.
    pub fn load_table(
        &mut self,
        table: &str,
        page: RowPage,
        primary_keys: Vec<String>,
        read_only: BTreeSet<String>,
    ) {
        if self.table.as_deref() != Some(table) {
            self.edit_enabled = false;
        }
        self.table = Some(table.to_string());
        self.buffer = RowBuffer::new(page.columns, page.rows);
        self.primary_keys = primary_keys;
        self.read_only = read_only;
        self.resync_staged(table);
    }

    fn resync_staged(&mut self, table: &str) {
        let buffer = &self.buffer;
        let primary_keys = &self.primary_keys;
        self.ledger.relocate_table(table, |row_key| {
            if primary_keys.is_empty() {
                None
            } else {
                buffer.position_of(primary_keys, row_key)
            }
        });

        let writes: Vec<(usize, String, Value)> = self
            .ledger
            .iter()
            .filter(|(key, _)| key.table == table)
            .filter_map(|(key, edit)| {
                edit.row_index
                    .map(|idx| (idx, key.column.clone(), edit.new_value.clone()))
            })
            .collect();
        for (row_index, column, value) in writes {
            self.buffer.apply_edit(row_index, &column, value);
        }
    }

    pub fn set_edit_enabled(&mut self, enabled: bool) -> Result<(), EditError> {
        if enabled {
            let table = self.table.as_deref().ok_or(EditError::NoActiveTable)?;
            if self.primary_keys.is_empty() {
                return Err(EditError::NoPrimaryKey {
                    table: table.to_string(),
                });
            }
        }
        self.edit_enabled = enabled;
        Ok(())
    }

    pub fn can_edit_column(&self, column: &str) -> bool {
        self.edit_enabled
            && !self.read_only.contains(column)
            && !self.primary_keys.iter().any(|pk| pk == column)
    }

    /// Handles text the user left in a cell: applies it to the row buffer and
    /// stages it, unless it is not actually a change.
    pub fn commit_cell_input(
        &mut self,
        row_index: usize,
        column: &str,
        input: &str,
    ) -> Result<EditOutcome, EditError> {
        let table = self.table.clone().ok_or(EditError::NoActiveTable)?;
        if !self.edit_enabled {
            return Err(EditError::EditModeOff);
        }
        if self.primary_keys.is_empty() {
            return Err(EditError::NoPrimaryKey { table });
        }
        if !self.can_edit_column(column) {
            return Err(EditError::NotEditable {
                column: column.to_string(),
            });
        }
        let row = self
            .buffer
            .row(row_index)
            .ok_or(EditError::RowOutOfRange { row_index })?;

        let old_value = row.get(column).cloned().unwrap_or(Value::Null);
        if !is_change(&old_value, input) {
            return Ok(EditOutcome::Unchanged);
        }

        let primary_key = PrimaryKey::from_row(row, &self.primary_keys);
        let row_key = primary_key.row_key();
        let new_value = Value::String(input.to_string());

        self.buffer.apply_edit(row_index, column, new_value.clone());
        let recorded = self.ledger.record_edit(
            &table,
            column,
            &row_key,
            old_value,
            new_value,
            primary_key,
            Some(row_index),
        );
        tracing::debug!(table = %table, column, row_key = %row_key, ?recorded, "cell edit");

        Ok(EditOutcome::Staged)
    }

    /// Drops one staged change of the active table and puts the original value back.
    pub fn discard_change(&mut self, column: &str, row_key: &str) -> bool {
        let Some(table) = self.table.clone() else {
            return false;
        };
        match self.ledger.discard_edit(&table, column, row_key, true) {
            Some(restoration) => {
                self.restore(restoration);
                true
            }
            None => false,
        }
    }

    pub fn discard_table_changes(&mut self) -> usize {
        let Some(table) = self.table.clone() else {
            return 0;
        };
        let restorations = self.ledger.discard_all_for_table(&table);
        let count = restorations.len();
        for restoration in restorations {
            self.restore(restoration);
        }
        tracing::info!(table = %table, count, "discarded staged changes");
        count
    }

    fn restore(&mut self, restoration: Restoration) {
        if let Some(row_index) = restoration.row_index {
            self.buffer
                .restore_edit(row_index, &restoration.column, restoration.old_value);
        }
    }

    pub fn active_table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    pub fn edit_enabled(&self) -> bool {
        self.edit_enabled
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn ledger(&self) -> &EditLedger {
        &self.ledger
    }

    pub fn ledger_mut(&mut self) -> &mut EditLedger {
        &mut self.ledger
    }

    pub fn buffer(&self) -> &RowBuffer {
        &self.buffer
    }

    pub fn notice(&self) -> &Notice {
        &self.notice
    }

    pub fn notice_mut(&mut self) -> &mut Notice {
        &mut self.notice
    }

    pub fn pending_count(&self) -> usize {
        self.table
            .as_deref()
            .map(|table| self.ledger.count_for_table(table))
            .unwrap_or(0)
    }
}

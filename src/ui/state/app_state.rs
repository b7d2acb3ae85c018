use dioxus::prelude::{use_signal, Signal};

use crate::domain::entities::query::{FilterOperator, DEFAULT_PAGE_SIZE};
use crate::usecase::services::edit_service::EditSession;

pub struct AppState {
    pub tables: Signal<Vec<String>>,
    pub selected_table: Signal<Option<String>>,
    pub session: Signal<EditSession>,
    pub page: Signal<usize>,
    pub page_size: Signal<usize>,
    pub total_rows: Signal<Option<u64>>,
    pub busy: Signal<bool>,
    pub status: Signal<String>,
    pub filter_column: Signal<String>,
    pub filter_operator: Signal<FilterOperator>,
    pub filter_value: Signal<String>,
    pub submitting: Signal<usize>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            tables: use_signal(Vec::<String>::new),
            selected_table: use_signal(|| None::<String>),
            session: use_signal(EditSession::new),
            page: use_signal(|| 0_usize),
            page_size: use_signal(|| DEFAULT_PAGE_SIZE),
            total_rows: use_signal(|| None::<u64>),
            busy: use_signal(|| false),
            status: use_signal(|| "Ready".to_string()),
            filter_column: use_signal(String::new),
            filter_operator: use_signal(|| FilterOperator::Equal),
            filter_value: use_signal(String::new),
            submitting: use_signal(|| 0_usize),
        }
    }
}

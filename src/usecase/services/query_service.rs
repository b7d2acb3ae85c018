use std::collections::BTreeSet;
use std::sync::Arc;

use crate::domain::entities::config::AppConfig;
use crate::domain::entities::query::{FilterGroup, RowQuery};
use crate::usecase::ports::gateway::{GatewayError, RowPage, TableGateway};
use crate::usecase::services::edit_service::EditSession;

pub struct QueryService {
    gateway: Arc<dyn TableGateway>,
    config: Arc<AppConfig>,
    db_index: usize,
}

impl QueryService {
    pub fn new(gateway: Arc<dyn TableGateway>, config: Arc<AppConfig>, db_index: usize) -> Self {
        Self {
            gateway,
            config,
            db_index,
        }
    }

    pub fn table_names(&self) -> Vec<String> {
        self.config.table_names(self.db_index)
    }

    pub fn load_page(
        &self,
        table: &str,
        filter: FilterGroup,
        limit: Option<usize>,
    ) -> Result<RowPage, GatewayError> {
        let base_url = self.config.db_url(self.db_index).ok_or_else(|| {
            GatewayError::Config(format!("no database configured at index {}", self.db_index))
        })?;
        let query = RowQuery {
            base_url: base_url.to_string(),
            table: table.to_string(),
            filter,
            limit,
        };
        self.gateway.fetch_rows(&query)
    }

    /// Fetches `table` and hands the rows to the session.
    pub fn open_table(
        &self,
        session: &mut EditSession,
        table: &str,
        filter: FilterGroup,
        limit: Option<usize>,
    ) -> Result<Option<u64>, GatewayError> {
        let page = self.load_page(table, filter, limit)?;
        Ok(self.install_page(session, table, page))
    }

    /// Loads fetched rows into the session with the table's key and
    /// editability rules. Returns the backend's total row count if known.
    pub fn install_page(&self, session: &mut EditSession, table: &str, page: RowPage) -> Option<u64> {
        let total_rows = page.total_rows;
        let read_only: BTreeSet<String> = page
            .columns
            .iter()
            .filter(|column| !self.config.is_editable(self.db_index, table, column))
            .cloned()
            .collect();
        let primary_keys = self.config.primary_keys(self.db_index, table);
        tracing::info!(table, rows = page.rows.len(), "table loaded");
        session.load_table(table, page, primary_keys, read_only);
        total_rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::query::{FilterOperator, FilterRule};
    use crate::domain::entities::row::{columns_of, Row};
    use crate::usecase::ports::gateway::PatchRequest;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedGateway {
        rows: Vec<Row>,
        urls: Mutex<Vec<String>>,
    }

    impl TableGateway for FixedGateway {
        fn fetch_rows(&self, query: &RowQuery) -> Result<RowPage, GatewayError> {
            self.urls
                .lock()
                .expect("urls lock should not be poisoned")
                .push(query.url());
            Ok(RowPage {
                columns: columns_of(&self.rows),
                rows: self.rows.clone(),
                total_rows: Some(self.rows.len() as u64),
            })
        }

        fn patch_cell(&self, _request: &PatchRequest) -> Result<Vec<Row>, GatewayError> {
            Ok(Vec::new())
        }
    }

    fn config() -> Arc<AppConfig> {
        Arc::new(
            serde_json::from_value(json!({
                "databases": [{
                    "url": "http://db.local",
                    "tables": {
                        "accounts": {
                            "primaryKeys": ["id"],
                            "columns": {"balance": {"editable": false}}
                        }
                    }
                }]
            }))
            .expect("config should parse"),
        )
    }

    #[test]
    fn open_table_applies_config_rules() {
        let rows = vec![json!({"id": 1, "name": "x", "balance": 10})
            .as_object()
            .cloned()
            .expect("fixture should be an object")];
        let gateway = Arc::new(FixedGateway {
            rows,
            urls: Mutex::new(Vec::new()),
        });
        let service = QueryService::new(gateway.clone(), config(), 0);
        let mut session = EditSession::new();

        let filter = FilterGroup {
            rules: vec![FilterRule::new("id", FilterOperator::Equal, "1")],
            ..FilterGroup::default()
        };
        let total = service
            .open_table(&mut session, "accounts", filter, Some(10))
            .expect("table should load");

        assert_eq!(total, Some(1));
        assert_eq!(session.active_table(), Some("accounts"));
        assert_eq!(session.primary_keys().to_vec(), vec!["id".to_string()]);
        session.set_edit_enabled(true).expect("edit mode should enable");
        assert!(session.can_edit_column("name"));
        assert!(!session.can_edit_column("balance"));
        assert_eq!(
            gateway.urls.lock().expect("urls lock should not be poisoned")[0],
            "http://db.local/accounts?and=(id.eq.1)&limit=10"
        );
    }

    #[test]
    fn missing_database_is_a_config_error() {
        let gateway = Arc::new(FixedGateway {
            rows: Vec::new(),
            urls: Mutex::new(Vec::new()),
        });
        let service = QueryService::new(gateway, config(), 4);

        let result = service.load_page("accounts", FilterGroup::default(), None);

        assert!(matches!(result, Err(GatewayError::Config(_))));
    }
}

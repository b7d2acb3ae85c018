use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::entities::query::{patch_url, RowQuery};
use crate::domain::entities::row::{PrimaryKey, Row};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("server responded {status}: {message}")]
    Status { status: u16, message: String },
    #[error("unexpected response body: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// One page of rows as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowPage {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub total_rows: Option<u64>,
}

/// A single-cell update addressed by primary key.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchRequest {
    pub base_url: String,
    pub table: String,
    pub primary_key: PrimaryKey,
    pub column: String,
    pub value: Value,
}

impl PatchRequest {
    pub fn url(&self) -> String {
        patch_url(&self.base_url, &self.table, &self.primary_key)
    }

    pub fn body(&self) -> Value {
        let mut body = Map::new();
        body.insert(self.column.clone(), self.value.clone());
        Value::Object(body)
    }
}

pub trait TableGateway: Send + Sync {
    fn fetch_rows(&self, query: &RowQuery) -> Result<RowPage, GatewayError>;

    /// Applies the update and returns the updated representation.
    fn patch_cell(&self, request: &PatchRequest) -> Result<Vec<Row>, GatewayError>;
}

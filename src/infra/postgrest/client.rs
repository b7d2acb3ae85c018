use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_RANGE, HeaderValue};

use crate::domain::entities::query::RowQuery;
use crate::domain::entities::row::{columns_of, Row};
use crate::usecase::ports::gateway::{PatchRequest, GatewayError, RowPage, TableGateway};

const PREFER: &str = "Prefer";
const RETURN_REPRESENTATION: &str = "return=representation";
const COUNT_EXACT: &str = "count=exact";

/// `TableGateway` over a PostgREST endpoint.
pub struct PostgrestGateway {
    client: Client,
}

impl PostgrestGateway {
    pub fn new() -> Result<Self, GatewayError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

impl TableGateway for PostgrestGateway {
    fn fetch_rows(&self, query: &RowQuery) -> Result<RowPage, GatewayError> {
        let url = query.url();
        tracing::debug!(url = %url, "fetching rows");
        let response = self
            .client
            .get(&url)
            .header(PREFER, COUNT_EXACT)
            .send()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let response = check_status(response)?;
        let total_rows = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(parse_content_range_total);
        let rows: Vec<Row> = response
            .json()
            .map_err(|err| GatewayError::Decode(err.to_string()))?;

        Ok(RowPage {
            columns: columns_of(&rows),
            rows,
            total_rows,
        })
    }

    fn patch_cell(&self, request: &PatchRequest) -> Result<Vec<Row>, GatewayError> {
        let url = request.url();
        tracing::debug!(url = %url, column = %request.column, "patching cell");
        let response = self
            .client
            .patch(&url)
            .header(PREFER, RETURN_REPRESENTATION)
            .json(&request.body())
            .send()
            .map_err(|err| GatewayError::Transport(err.to_string()))?;
        let response = check_status(response)?;
        response
            .json()
            .map_err(|err| GatewayError::Decode(err.to_string()))
    }
}

fn check_status(response: Response) -> Result<Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().unwrap_or_default();
    Err(GatewayError::Status {
        status: status.as_u16(),
        message,
    })
}

/// Total from `Content-Range: 0-9/120`; `None` when the server sends `*`.
fn parse_content_range_total(value: &HeaderValue) -> Option<u64> {
    parse_range_total(value.to_str().ok()?)
}

fn parse_range_total(range: &str) -> Option<u64> {
    range.rsplit_once('/')?.1.trim().parse().ok()
}

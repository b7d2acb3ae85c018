use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde_json::Value;

use crate::domain::entities::row::{cell_text, Row};

pub fn default_export_file_name(table: &str, now: DateTime<Local>) -> String {
    format!("{table}-{}.csv", now.format("%Y%m%d-%H%M%S"))
}

fn field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(value) => cell_text(value),
    }
}

/// Writes the rows as CSV in `columns` order; nulls become empty fields.
pub fn export_rows_csv(path: &Path, columns: &[String], rows: &[Row]) -> Result<usize> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create csv: {}", path.display()))?;
    writer
        .write_record(columns)
        .context("failed to write csv header")?;

    for row in rows {
        let record: Vec<String> = columns.iter().map(|column| field(row.get(column))).collect();
        writer
            .write_record(&record)
            .context("failed to write csv record")?;
    }
    writer.flush().context("failed to flush csv")?;

    Ok(rows.len())
}

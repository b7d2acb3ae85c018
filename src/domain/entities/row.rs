use serde_json::Value;

pub type Row = serde_json::Map<String, Value>;

const MARKUP_TOKENS: [&str; 2] = ["<br>", "<div>"];

/// Text form of a cell value, matching how the backend's JSON scalars print:
/// `null` for null, strings verbatim, numbers and booleans via `to_string`.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

pub fn same_text(left: &Value, right: &Value) -> bool {
    cell_text(left) == cell_text(right)
}

/// Decides whether `input` typed into a cell holding `old` is a real change.
pub fn is_change(old: &Value, input: &str) -> bool {
    if cell_text(old) == input {
        return false;
    }
    if old.is_null() && input.is_empty() {
        return false;
    }
    !MARKUP_TOKENS.iter().any(|token| input.contains(token))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrimaryKey(pub Vec<(String, Value)>);

impl PrimaryKey {
    pub fn from_row(row: &Row, columns: &[String]) -> Self {
        PrimaryKey(
            columns
                .iter()
                .map(|column| {
                    let value = row.get(column).cloned().unwrap_or(Value::Null);
                    (column.clone(), value)
                })
                .collect(),
        )
    }

    /// Ledger row identifier: the PK values' text, concatenated in key order.
    pub fn row_key(&self) -> String {
        self.0.iter().map(|(_, value)| cell_text(value)).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBuffer {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowBuffer {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row(&self, row_index: usize) -> Option<&Row> {
        self.rows.get(row_index)
    }

    pub fn value(&self, row_index: usize, column: &str) -> Option<&Value> {
        self.rows.get(row_index).and_then(|row| row.get(column))
    }

    pub fn apply_edit(&mut self, row_index: usize, column: &str, new_value: Value) -> bool {
        self.write(row_index, column, new_value)
    }

    pub fn restore_edit(&mut self, row_index: usize, column: &str, old_value: Value) -> bool {
        self.write(row_index, column, old_value)
    }

    pub fn position_of(&self, primary_keys: &[String], row_key: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| PrimaryKey::from_row(row, primary_keys).row_key() == row_key)
    }

    fn write(&mut self, row_index: usize, column: &str, value: Value) -> bool {
        match self.rows.get_mut(row_index) {
            Some(row) => {
                row.insert(column.to_string(), value);
                true
            }
            None => {
                tracing::debug!(row_index, column, "row buffer write out of range");
                false
            }
        }
    }
}

/// Column order as returned by the backend: the first row's keys.
pub fn columns_of(rows: &[Row]) -> Vec<String> {
    rows.first()
        .map(|row| row.keys().cloned().collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().expect("fixture should be an object")
    }

    #[test]
    fn cell_text_matches_backend_scalars() {
        assert_eq!(cell_text(&Value::Null), "null");
        assert_eq!(cell_text(&json!("x")), "x");
        assert_eq!(cell_text(&json!(12)), "12");
        assert_eq!(cell_text(&json!(1.5)), "1.5");
        assert_eq!(cell_text(&json!(true)), "true");
    }

    #[test]
    fn change_detection_ignores_no_op_inputs() {
        assert!(!is_change(&json!("x"), "x"));
        assert!(!is_change(&json!(1), "1"));
        assert!(!is_change(&Value::Null, ""));
        assert!(!is_change(&Value::Null, "null"));
        assert!(!is_change(&json!("x"), "x<br>"));
        assert!(!is_change(&json!("x"), "<div>y</div>"));
        assert!(is_change(&json!("x"), "y"));
        assert!(is_change(&Value::Null, "y"));
        assert!(is_change(&json!("x"), ""));
    }

    #[test]
    fn row_key_concatenates_values_in_key_order() {
        let source = row(json!({"a": 1, "b": "x", "c": null}));
        let pk = PrimaryKey::from_row(&source, &["b".to_string(), "a".to_string()]);

        assert_eq!(pk.row_key(), "x1");
        assert_eq!(pk.0[0], ("b".to_string(), json!("x")));
    }

    #[test]
    fn apply_and_restore_write_in_place() {
        let mut buffer = RowBuffer::new(
            vec!["id".to_string(), "name".to_string()],
            vec![row(json!({"id": 1, "name": "x"}))],
        );

        assert!(buffer.apply_edit(0, "name", json!("y")));
        assert_eq!(buffer.value(0, "name"), Some(&json!("y")));
        assert!(buffer.restore_edit(0, "name", json!("x")));
        assert_eq!(buffer.value(0, "name"), Some(&json!("x")));
        assert!(!buffer.apply_edit(3, "name", json!("z")), "out of range is a no-op");
    }

    #[test]
    fn columns_follow_first_row_order() {
        let rows = vec![row(json!({"id": 1, "zeta": 2, "alpha": 3}))];
        assert_eq!(columns_of(&rows), vec!["id", "zeta", "alpha"]);
        assert!(columns_of(&[]).is_empty());
    }
}

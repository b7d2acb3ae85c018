use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use crate::domain::entities::row::{cell_text, PrimaryKey};

pub const PAGE_SIZE_OPTIONS: [usize; 6] = [10, 50, 100, 200, 500, 1000];
pub const DEFAULT_PAGE_SIZE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterOrEqual,
    LessOrEqual,
    IsNotNull,
    IsNull,
    In,
    Contains,
}

impl FilterOperator {
    pub const ALL: [FilterOperator; 10] = [
        FilterOperator::Equal,
        FilterOperator::NotEqual,
        FilterOperator::Greater,
        FilterOperator::Less,
        FilterOperator::GreaterOrEqual,
        FilterOperator::LessOrEqual,
        FilterOperator::IsNotNull,
        FilterOperator::IsNull,
        FilterOperator::In,
        FilterOperator::Contains,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FilterOperator::Equal => "equal",
            FilterOperator::NotEqual => "not_equal",
            FilterOperator::Greater => "greater",
            FilterOperator::Less => "less",
            FilterOperator::GreaterOrEqual => "greater_or_equal",
            FilterOperator::LessOrEqual => "less_or_equal",
            FilterOperator::IsNotNull => "is_not_null",
            FilterOperator::IsNull => "is_null",
            FilterOperator::In => "in",
            FilterOperator::Contains => "contains",
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            FilterOperator::Equal => "eq",
            FilterOperator::NotEqual => "neq",
            FilterOperator::Greater => "gt",
            FilterOperator::Less => "lt",
            FilterOperator::GreaterOrEqual => "gte",
            FilterOperator::LessOrEqual => "lte",
            FilterOperator::IsNotNull => "not.is.null",
            FilterOperator::IsNull => "is.null",
            FilterOperator::In => "in",
            FilterOperator::Contains => "ilike",
        }
    }

    fn takes_value(self) -> bool {
        !matches!(self, FilterOperator::IsNull | FilterOperator::IsNotNull)
    }
}

impl FromStr for FilterOperator {
    type Err = Infallible;

    /// Unknown names fall back to `Equal`.
    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Ok(FilterOperator::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .unwrap_or(FilterOperator::Equal))
    }
}

pub fn translate_operator(name: &str) -> &'static str {
    name.parse::<FilterOperator>()
        .unwrap_or(FilterOperator::Equal)
        .token()
}

/// `pk1.eq.v1,pk2.eq.v2` in key order.
pub fn primary_key_params(primary_key: &PrimaryKey) -> String {
    primary_key
        .iter()
        .map(|(column, value)| format!("{column}.eq.{}", filter_literal(&cell_text(value))))
        .collect::<Vec<_>>()
        .join(",")
}

/// Double-quotes values holding filter delimiters, then escapes characters
/// that would end or split the query string.
fn filter_literal(text: &str) -> String {
    let needs_quotes = text
        .chars()
        .any(|c| matches!(c, ',' | '(' | ')' | '"' | '\\') || c.is_whitespace());
    let literal = if needs_quotes {
        format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        text.to_string()
    };

    let mut escaped = String::with_capacity(literal.len());
    for c in literal.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '&' => escaped.push_str("%26"),
            '#' => escaped.push_str("%23"),
            '+' => escaped.push_str("%2B"),
            ' ' => escaped.push_str("%20"),
            _ => escaped.push(c),
        }
    }
    escaped
}

pub fn patch_url(base_url: &str, table: &str, primary_key: &PrimaryKey) -> String {
    format!(
        "{}/{table}?and=({})",
        base_url.trim_end_matches('/'),
        primary_key_params(primary_key)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Condition {
    #[default]
    And,
    Or,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::And => write!(f, "and"),
            Condition::Or => write!(f, "or"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub column: String,
    pub operator: FilterOperator,
    pub value: String,
}

impl FilterRule {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            operator,
            value: value.into(),
        }
    }

    fn expression(&self) -> String {
        let column = &self.column;
        let token = self.operator.token();
        match self.operator {
            _ if !self.operator.takes_value() => format!("{column}.{token}"),
            FilterOperator::In => format!("{column}.in.({})", self.value),
            FilterOperator::Contains => format!("{column}.ilike.*{}*", self.value),
            _ => format!("{column}.{token}.{}", self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterGroup {
    pub condition: Condition,
    pub rules: Vec<FilterRule>,
}

impl FilterGroup {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Renders `and=(...)` / `or=(...)`, or an empty string without rules.
    pub fn to_query(&self) -> String {
        if self.rules.is_empty() {
            return String::new();
        }
        let expressions = self
            .rules
            .iter()
            .map(FilterRule::expression)
            .collect::<Vec<_>>()
            .join(",");
        format!("{}=({expressions})", self.condition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowQuery {
    pub base_url: String,
    pub table: String,
    pub filter: FilterGroup,
    pub limit: Option<usize>,
}

impl RowQuery {
    pub fn url(&self) -> String {
        let mut params = Vec::new();
        if !self.filter.is_empty() {
            params.push(self.filter.to_query());
        }
        if let Some(limit) = self.limit {
            params.push(format!("limit={limit}"));
        }
        let base = format!("{}/{}", self.base_url.trim_end_matches('/'), self.table);
        if params.is_empty() {
            base
        } else {
            format!("{base}?{}", params.join("&"))
        }
    }
}

pub fn page_count(total_rows: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total_rows.div_ceil(page_size)
}

/// Half-open row range shown on `page`, clamped to `total_rows`.
pub fn page_bounds(page: usize, page_size: usize, total_rows: usize) -> (usize, usize) {
    let start = page.saturating_mul(page_size).min(total_rows);
    let end = start.saturating_add(page_size).min(total_rows);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn translates_known_operators() {
        let expected = [
            ("equal", "eq"),
            ("not_equal", "neq"),
            ("greater", "gt"),
            ("less", "lt"),
            ("greater_or_equal", "gte"),
            ("less_or_equal", "lte"),
            ("is_not_null", "not.is.null"),
            ("is_null", "is.null"),
            ("in", "in"),
            ("contains", "ilike"),
        ];
        for (name, token) in expected {
            assert_eq!(translate_operator(name), token, "operator {name}");
        }
    }

    #[test]
    fn unknown_operator_defaults_to_eq() {
        assert_eq!(translate_operator("unknown"), "eq");
        assert_eq!(translate_operator(""), "eq");
    }

    #[test]
    fn patch_url_joins_primary_key_columns() {
        let pk = PrimaryKey(vec![
            ("id".to_string(), json!(1)),
            ("code".to_string(), json!("ab")),
        ]);

        assert_eq!(primary_key_params(&pk), "id.eq.1,code.eq.ab");
        assert_eq!(
            patch_url("http://db.local/", "accounts", &pk),
            "http://db.local/accounts?and=(id.eq.1,code.eq.ab)"
        );
    }

    #[test]
    fn primary_key_values_with_delimiters_are_quoted() {
        let pk = PrimaryKey(vec![
            ("code".to_string(), json!("a,b)")),
            ("name".to_string(), json!("R&D #1")),
            ("ratio".to_string(), json!("5%+x")),
        ]);

        assert_eq!(
            primary_key_params(&pk),
            r#"code.eq."a,b)",name.eq."R%26D%20%231",ratio.eq.5%25%2Bx"#
        );
        assert_eq!(
            primary_key_params(&PrimaryKey(vec![("id".to_string(), json!(r#"say "hi""#))])),
            r#"id.eq."say%20\"hi\"""#
        );
    }

    #[test]
    fn filter_group_renders_special_operators() {
        let group = FilterGroup {
            condition: Condition::Or,
            rules: vec![
                FilterRule::new("name", FilterOperator::Contains, "bob"),
                FilterRule::new("id", FilterOperator::In, "1,2"),
                FilterRule::new("city", FilterOperator::IsNull, "ignored"),
                FilterRule::new("age", FilterOperator::GreaterOrEqual, "18"),
            ],
        };

        assert_eq!(
            group.to_query(),
            "or=(name.ilike.*bob*,id.in.(1,2),city.is.null,age.gte.18)"
        );
        assert_eq!(FilterGroup::default().to_query(), "");
    }

    #[test]
    fn row_query_url_appends_filter_and_limit() {
        let query = RowQuery {
            base_url: "http://db.local".to_string(),
            table: "accounts".to_string(),
            filter: FilterGroup {
                condition: Condition::And,
                rules: vec![FilterRule::new("id", FilterOperator::Greater, "3")],
            },
            limit: Some(10),
        };
        assert_eq!(query.url(), "http://db.local/accounts?and=(id.gt.3)&limit=10");

        let bare = RowQuery {
            filter: FilterGroup::default(),
            limit: None,
            ..query
        };
        assert_eq!(bare.url(), "http://db.local/accounts");
    }

    #[test]
    fn paging_clamps_to_total() {
        assert_eq!(page_count(0, 10), 0);
        assert_eq!(page_count(21, 10), 3);
        assert_eq!(page_bounds(2, 10, 21), (20, 21));
        assert_eq!(page_bounds(5, 10, 21), (21, 21));
        assert!(PAGE_SIZE_OPTIONS.contains(&DEFAULT_PAGE_SIZE));
    }
}

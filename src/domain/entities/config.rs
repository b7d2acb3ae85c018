use std::collections::BTreeMap;

use serde::Deserialize;

pub const DEFAULT_MIN_WIDTH_PX: u32 = 100;
const DEFAULT_TITLE: &str = "gridpatch";
const DEFAULT_NO_TABLE_MSG: &str = "Select a table";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub no_table_msg: Option<String>,
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    #[serde(default)]
    pub title: Option<String>,
    pub url: String,
    #[serde(default)]
    pub tables: BTreeMap<String, TableRules>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRules {
    #[serde(default)]
    pub default_width_px: Option<u32>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnRules>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnRules {
    pub rename: Option<String>,
    pub visible: Option<bool>,
    pub editable: Option<bool>,
    pub width_px: Option<u32>,
    pub min_width_px: Option<u32>,
    pub max_width_px: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnOption {
    Rename,
    Visible,
    Editable,
    WidthPx,
    MinWidthPx,
    MaxWidthPx,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOption {
    DefaultWidthPx,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValue {
    Text(String),
    Flag(bool),
    Pixels(u32),
}

impl ConfigValue {
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            ConfigValue::Flag(flag) => Some(*flag),
            _ => None,
        }
    }

    pub fn as_pixels(&self) -> Option<u32> {
        match self {
            ConfigValue::Pixels(px) => Some(*px),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ConfigValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Resolved presentation settings for one grid column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub id: String,
    pub header: String,
    pub show: bool,
    pub editable: bool,
    pub width_px: Option<u32>,
    pub min_width_px: u32,
    pub max_width_px: Option<u32>,
}

impl AppConfig {
    pub fn title(&self) -> &str {
        self.title.as_deref().unwrap_or(DEFAULT_TITLE)
    }

    pub fn no_table_msg(&self) -> &str {
        self.no_table_msg.as_deref().unwrap_or(DEFAULT_NO_TABLE_MSG)
    }

    pub fn database(&self, db_index: usize) -> Option<&DatabaseConfig> {
        self.databases.get(db_index)
    }

    pub fn db_url(&self, db_index: usize) -> Option<&str> {
        self.database(db_index).map(|db| db.url.as_str())
    }

    pub fn db_title(&self, db_index: usize) -> Option<&str> {
        self.database(db_index)
            .map(|db| db.title.as_deref().unwrap_or(db.url.as_str()))
    }

    pub fn table_names(&self, db_index: usize) -> Vec<String> {
        self.database(db_index)
            .map(|db| db.tables.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn primary_keys(&self, db_index: usize, table: &str) -> Vec<String> {
        self.table_rules(db_index, table)
            .map(|rules| rules.primary_keys.clone())
            .unwrap_or_default()
    }

    fn table_rules(&self, db_index: usize, table: &str) -> Option<&TableRules> {
        self.database(db_index).and_then(|db| db.tables.get(table))
    }

    fn column_rules(&self, db_index: usize, table: &str, column: &str) -> Option<&ColumnRules> {
        self.table_rules(db_index, table)
            .and_then(|rules| rules.columns.get(column))
    }

    /// Configured column setting; `Visible` falls back to `true` and
    /// `MinWidthPx` to 100, everything else is `None` when unset.
    pub fn column_config(
        &self,
        db_index: usize,
        table: &str,
        column: &str,
        option: ColumnOption,
    ) -> Option<ConfigValue> {
        let rules = self.column_rules(db_index, table, column);
        match option {
            ColumnOption::Rename => rules
                .and_then(|r| r.rename.clone())
                .map(ConfigValue::Text),
            ColumnOption::Visible => Some(ConfigValue::Flag(
                rules.and_then(|r| r.visible).unwrap_or(true),
            )),
            ColumnOption::Editable => rules.and_then(|r| r.editable).map(ConfigValue::Flag),
            ColumnOption::WidthPx => rules.and_then(|r| r.width_px).map(ConfigValue::Pixels),
            ColumnOption::MinWidthPx => Some(ConfigValue::Pixels(
                rules
                    .and_then(|r| r.min_width_px)
                    .unwrap_or(DEFAULT_MIN_WIDTH_PX),
            )),
            ColumnOption::MaxWidthPx => rules.and_then(|r| r.max_width_px).map(ConfigValue::Pixels),
        }
    }

    pub fn table_config(&self, db_index: usize, table: &str, option: TableOption) -> Option<ConfigValue> {
        let rules = self.table_rules(db_index, table)?;
        match option {
            TableOption::DefaultWidthPx => rules.default_width_px.map(ConfigValue::Pixels),
        }
    }

    pub fn column_layout(&self, db_index: usize, table: &str, column: &str) -> ColumnLayout {
        let lookup = |option| self.column_config(db_index, table, column, option);
        let default_width = self
            .table_config(db_index, table, TableOption::DefaultWidthPx)
            .and_then(|v| v.as_pixels());

        ColumnLayout {
            id: column.to_string(),
            header: lookup(ColumnOption::Rename)
                .and_then(|v| v.as_text().map(str::to_string))
                .unwrap_or_else(|| column.to_string()),
            show: lookup(ColumnOption::Visible)
                .and_then(|v| v.as_flag())
                .unwrap_or(true),
            editable: lookup(ColumnOption::Editable).and_then(|v| v.as_flag()) != Some(false),
            width_px: lookup(ColumnOption::WidthPx)
                .and_then(|v| v.as_pixels())
                .or(default_width),
            min_width_px: lookup(ColumnOption::MinWidthPx)
                .and_then(|v| v.as_pixels())
                .unwrap_or(DEFAULT_MIN_WIDTH_PX),
            max_width_px: lookup(ColumnOption::MaxWidthPx).and_then(|v| v.as_pixels()),
        }
    }

    pub fn is_editable(&self, db_index: usize, table: &str, column: &str) -> bool {
        self.column_config(db_index, table, column, ColumnOption::Editable)
            .and_then(|v| v.as_flag())
            != Some(false)
    }
}

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::domain::entities::row::PrimaryKey;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditKey {
    pub table: String,
    pub column: String,
    pub row_key: String,
}

impl EditKey {
    pub fn new(table: &str, column: &str, row_key: &str) -> Self {
        Self {
            table: table.to_string(),
            column: column.to_string(),
            row_key: row_key.to_string(),
        }
    }
}

/// One staged change to a single cell.
#[derive(Debug, Clone, PartialEq)]
pub struct Edit {
    /// Value as last known from the backend. Set once, when the edit is created.
    pub old_value: Value,
    pub new_value: Value,
    pub primary_key: PrimaryKey,
    /// Position in the loaded row buffer, `None` while the row is not loaded.
    pub row_index: Option<usize>,
    pub error: bool,
}

/// A buffer write needed to undo a discarded edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Restoration {
    pub column: String,
    pub row_index: Option<usize>,
    pub old_value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    Created,
    Updated,
}

pub type ColumnEdits = BTreeMap<String, BTreeMap<String, Edit>>;

/// Pending cell edits across tables, keyed by `(table, column, row_key)`.
///
/// A table or column is present only while at least one edit under it exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EditLedger {
    entries: BTreeMap<EditKey, Edit>,
}

impl EditLedger {
    pub fn new() -> Self {
        Self::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_edit(
        &mut self,
        table: &str,
        column: &str,
        row_key: &str,
        old_value: Value,
        new_value: Value,
        primary_key: PrimaryKey,
        row_index: Option<usize>,
    ) -> RecordResult {
        let key = EditKey::new(table, column, row_key);
        match self.entries.get_mut(&key) {
            Some(edit) => {
                edit.new_value = new_value;
                edit.primary_key = primary_key;
                edit.row_index = row_index;
                edit.error = false;
                RecordResult::Updated
            }
            None => {
                self.entries.insert(
                    key,
                    Edit {
                        old_value,
                        new_value,
                        primary_key,
                        row_index,
                        error: false,
                    },
                );
                RecordResult::Created
            }
        }
    }

    /// Removes an edit. With `restore`, hands back the original value and where it goes.
    pub fn discard_edit(
        &mut self,
        table: &str,
        column: &str,
        row_key: &str,
        restore: bool,
    ) -> Option<Restoration> {
        let Some(edit) = self.entries.remove(&EditKey::new(table, column, row_key)) else {
            tracing::debug!(table, column, row_key, "discard on missing edit ignored");
            return None;
        };
        restore.then(|| Restoration {
            column: column.to_string(),
            row_index: edit.row_index,
            old_value: edit.old_value,
        })
    }

    pub fn discard_all_for_table(&mut self, table: &str) -> Vec<Restoration> {
        let keys: Vec<EditKey> = self
            .entries
            .keys()
            .filter(|key| key.table == table)
            .cloned()
            .collect();
        keys.iter()
            .filter_map(|key| self.discard_edit(&key.table, &key.column, &key.row_key, true))
            .collect()
    }

    /// The backend saved `saved` for this cell while a newer value was staged.
    /// The staged value stays and is now measured against `saved`.
    pub fn rebase_edit(&mut self, table: &str, column: &str, row_key: &str, saved: Value) -> bool {
        match self.entries.get_mut(&EditKey::new(table, column, row_key)) {
            Some(edit) => {
                edit.old_value = saved;
                edit.error = false;
                true
            }
            None => {
                tracing::debug!(table, column, row_key, "rebase on missing edit ignored");
                false
            }
        }
    }

    pub fn flag_error(&mut self, table: &str, column: &str, row_key: &str) -> bool {
        match self.entries.get_mut(&EditKey::new(table, column, row_key)) {
            Some(edit) => {
                edit.error = true;
                true
            }
            None => {
                tracing::debug!(table, column, row_key, "flag on missing edit ignored");
                false
            }
        }
    }

    pub fn edits_for_table(&self, table: &str) -> ColumnEdits {
        let mut grouped = ColumnEdits::new();
        for (key, edit) in self.entries.iter().filter(|(key, _)| key.table == table) {
            grouped
                .entry(key.column.clone())
                .or_default()
                .insert(key.row_key.clone(), edit.clone());
        }
        grouped
    }

    pub fn get(&self, table: &str, column: &str, row_key: &str) -> Option<&Edit> {
        self.entries.get(&EditKey::new(table, column, row_key))
    }

    pub fn tables(&self) -> BTreeSet<String> {
        self.entries.keys().map(|key| key.table.clone()).collect()
    }

    pub fn count_for_table(&self, table: &str) -> usize {
        self.entries.keys().filter(|key| key.table == table).count()
    }

    pub fn has_errors_for_table(&self, table: &str) -> bool {
        self.entries
            .iter()
            .any(|(key, edit)| key.table == table && edit.error)
    }

    /// Re-resolves row positions for one table after its rows were reloaded.
    pub fn relocate_table<F>(&mut self, table: &str, mut locate: F)
    where
        F: FnMut(&str) -> Option<usize>,
    {
        for (key, edit) in self.entries.iter_mut().filter(|(key, _)| key.table == table) {
            edit.row_index = locate(&key.row_key);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EditKey, &Edit)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

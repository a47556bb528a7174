use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// Rows returned by one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordSet {
    pub columns: Vec<String>,
    /// Declared type of each column as reported by the driver, if known.
    pub types: Vec<Option<String>>,
    pub rows: Vec<Vec<Value>>,
}

impl RecordSet {
    pub fn with_columns(columns: Vec<String>) -> Self {
        RecordSet {
            types: vec![None; columns.len()],
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Distinct non-null values of `column`, in first-seen order.
    pub fn distinct_values(&self, column: &str) -> Option<Vec<Value>> {
        let index = self.column_index(column)?;
        let mut seen = HashSet::new();
        Some(
            self.rows
                .iter()
                .filter_map(|row| row.get(index))
                .filter(|v| !v.is_null() && seen.insert((*v).clone()))
                .cloned()
                .collect(),
        )
    }
}

/// A record set tagged with the include path it was loaded for (`""` for
/// the root query).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedRecordSet {
    pub name: String,
    pub records: RecordSet,
}

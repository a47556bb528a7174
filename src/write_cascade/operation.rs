use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Insert,
    Update,
    /// Update of an explicit subset of members.
    Patch,
    Delete,
    /// Null out a child's foreign key.
    Detach,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Patch => "PATCH",
            OperationKind::Delete => "DELETE",
            OperationKind::Detach => "DETACH",
        };
        f.write_str(name)
    }
}

/// One storage column and the value written to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub column: String,
    pub value: Value,
}

impl Assignment {
    pub fn new(column: impl Into<String>, value: Value) -> Self {
        Assignment {
            column: column.into(),
            value,
        }
    }
}

/// Resolved column/parameter plan for one write statement. Values are
/// already in storage form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationContext {
    pub kind: OperationKind,
    pub entity: String,
    pub table: String,
    /// `VALUES` of an insert, `SET` list otherwise.
    pub assignments: Vec<Assignment>,
    /// Key condition of update, patch, delete and detach.
    pub key: Option<Assignment>,
    /// Generated key column an insert returns.
    pub returning: Option<String>,
}

impl OperationContext {
    pub fn new(kind: OperationKind, entity: impl Into<String>, table: impl Into<String>) -> Self {
        OperationContext {
            kind,
            entity: entity.into(),
            table: table.into(),
            assignments: Vec::new(),
            key: None,
            returning: None,
        }
    }

    pub fn assign(mut self, column: impl Into<String>, value: Value) -> Self {
        self.assignments.push(Assignment::new(column, value));
        self
    }

    pub fn keyed(mut self, column: impl Into<String>, value: Value) -> Self {
        self.key = Some(Assignment::new(column, value));
        self
    }

    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }
}

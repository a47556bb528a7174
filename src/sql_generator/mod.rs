//! Statement writers.
//!
//! A writer renders a planned [`QueryContext`] or a resolved
//! [`OperationContext`] into dialect-specific SQL text plus an ordered
//! parameter list. Quoting, placeholders and pagination syntax belong here;
//! the planner knows nothing about them.

mod ansi;
pub mod errors;

use std::fmt;

pub use ansi::{AnsiSqlWriter, LimitStyle};
pub use errors::WriterError;

use crate::query_planner::QueryContext;
use crate::types::Value;
use crate::write_cascade::OperationContext;

/// Rendered SQL with positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub parameters: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            parameters: Vec::new(),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self.parameters.iter().map(ToString::to_string).collect();
            write!(f, " -- [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

pub trait StatementWriter: fmt::Debug + Send + Sync {
    fn write_query(&self, query: &QueryContext) -> Result<Statement, WriterError>;

    fn write_operation(&self, operation: &OperationContext) -> Result<Statement, WriterError>;
}

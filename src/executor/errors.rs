use std::time::Duration;

use thiserror::Error;

use crate::sql_generator::WriterError;

/// Failure reported by an [`super::Executor`].
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ExecutionError {
    #[error("Driver error: {0}")]
    Driver(String),
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
    #[error("Statement returned no value")]
    NoValue,
}

impl ExecutionError {
    pub fn driver(error: impl std::fmt::Display) -> Self {
        ExecutionError::Driver(error.to_string())
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum UnitOfWorkError {
    /// A statement failed; carries the SQL being attempted.
    #[error("Statement failed: {sql}: {source}")]
    Statement {
        sql: String,
        #[source]
        source: ExecutionError,
    },
    #[error("Could not begin transaction: {0}")]
    Begin(#[source] ExecutionError),
    #[error("Commit failed: {0}")]
    Commit(#[source] ExecutionError),
    #[error("Rollback failed: {0}")]
    Rollback(#[source] ExecutionError),
    #[error("Unit of work was already rolled back")]
    RolledBack,
    #[error("Unit of work was already committed")]
    Committed,
    #[error("Execution channel closed")]
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueryError {
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    UnitOfWork(#[from] UnitOfWorkError),
    #[error("Record set `{record_set}` has no column `{column}`")]
    MissingColumn { record_set: String, column: String },
}

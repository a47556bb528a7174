//! Statement execution.
//!
//! The planner and the cascade engine never touch a connection. They hand
//! rendered [`Statement`]s to an [`ExecutionHandle`], which forwards them to
//! the single task owning the [`Executor`] for the current [`UnitOfWork`].

pub mod errors;
pub mod record_set;
pub mod runner;
pub mod unit_of_work;

use std::time::Duration;

use async_trait::async_trait;

pub use errors::{ExecutionError, QueryError, UnitOfWorkError};
pub use record_set::{NamedRecordSet, RecordSet};
pub use runner::QueryRunner;
pub use unit_of_work::{ExecutionHandle, TransactionState, UnitOfWork};

use crate::sql_generator::Statement;
use crate::types::Value;

/// One connection with at most one open transaction.
///
/// Implementations wrap a concrete driver. Retry and backoff, if any,
/// belong here; callers treat every error as final.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + 'static {
    async fn begin(&mut self) -> Result<(), ExecutionError>;

    async fn query(&mut self, statement: &Statement) -> Result<RecordSet, ExecutionError>;

    /// First column of the first row.
    async fn scalar(&mut self, statement: &Statement) -> Result<Value, ExecutionError>;

    /// Affected row count.
    async fn execute(&mut self, statement: &Statement) -> Result<u64, ExecutionError>;

    async fn commit(&mut self) -> Result<(), ExecutionError>;

    async fn rollback(&mut self) -> Result<(), ExecutionError>;

    fn set_command_timeout(&mut self, _timeout: Duration) {}
}

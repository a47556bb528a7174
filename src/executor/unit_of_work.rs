//! Unit of work over a single-writer execution channel.
//!
//! The executor (one connection, one transaction) is owned by a dedicated
//! task. Every statement is sent to it as a command with a oneshot reply, so
//! any number of concurrent callers holding an [`ExecutionHandle`] share the
//! transaction while statements still run strictly one at a time.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::errors::{ExecutionError, UnitOfWorkError};
use super::record_set::RecordSet;
use super::Executor;
use crate::config::PlannerConfig;
use crate::sql_generator::Statement;
use crate::types::Value;

type Reply<T> = oneshot::Sender<Result<T, ExecutionError>>;

enum Command {
    Query(Statement, Reply<RecordSet>),
    Scalar(Statement, Reply<Value>),
    Execute(Statement, Reply<u64>),
    Commit(Reply<()>),
    Rollback(Reply<()>),
    /// Stop the writer even while other handles are alive.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// Cloneable sender side of the execution channel.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    sender: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Query(s, _) => write!(f, "Query({})", s.sql),
            Command::Scalar(s, _) => write!(f, "Scalar({})", s.sql),
            Command::Execute(s, _) => write!(f, "Execute({})", s.sql),
            Command::Commit(_) => f.write_str("Commit"),
            Command::Rollback(_) => f.write_str("Rollback"),
            Command::Close => f.write_str("Close"),
        }
    }
}

impl ExecutionHandle {
    pub async fn query(&self, statement: Statement) -> Result<RecordSet, UnitOfWorkError> {
        let sql = statement.sql.clone();
        log::debug!("uow: query {}", statement);
        self.request(|reply| Command::Query(statement, reply))
            .await?
            .map_err(|source| UnitOfWorkError::Statement { sql, source })
    }

    pub async fn scalar(&self, statement: Statement) -> Result<Value, UnitOfWorkError> {
        let sql = statement.sql.clone();
        log::debug!("uow: scalar {}", statement);
        self.request(|reply| Command::Scalar(statement, reply))
            .await?
            .map_err(|source| UnitOfWorkError::Statement { sql, source })
    }

    pub async fn execute(&self, statement: Statement) -> Result<u64, UnitOfWorkError> {
        let sql = statement.sql.clone();
        log::debug!("uow: execute {}", statement);
        self.request(|reply| Command::Execute(statement, reply))
            .await?
            .map_err(|source| UnitOfWorkError::Statement { sql, source })
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<Result<T, ExecutionError>, UnitOfWorkError> {
        let (reply, response) = oneshot::channel();
        self.sender
            .send(command(reply))
            .await
            .map_err(|_| UnitOfWorkError::Closed)?;
        response.await.map_err(|_| UnitOfWorkError::Closed)
    }
}

/// One transaction. Commit is idempotent; rollback is explicit. Dropping an
/// uncommitted unit of work rolls the transaction back once every handle is
/// gone.
#[derive(Debug)]
pub struct UnitOfWork {
    handle: ExecutionHandle,
    state: TransactionState,
    task: Option<JoinHandle<()>>,
}

impl UnitOfWork {
    /// Open the transaction and hand the executor to the writer task.
    pub async fn begin<E: Executor>(
        mut executor: E,
        config: &PlannerConfig,
    ) -> Result<Self, UnitOfWorkError> {
        executor.set_command_timeout(config.command_timeout());
        executor.begin().await.map_err(UnitOfWorkError::Begin)?;
        let (sender, receiver) = mpsc::channel(config.channel_capacity);
        let task = tokio::spawn(run_writer(executor, receiver));
        log::info!("uow: transaction started");
        Ok(UnitOfWork {
            handle: ExecutionHandle { sender },
            state: TransactionState::Active,
            task: Some(task),
        })
    }

    pub fn handle(&self) -> &ExecutionHandle {
        &self.handle
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Commit once; later calls are no-ops.
    pub async fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        match self.state {
            TransactionState::Committed => return Ok(()),
            TransactionState::RolledBack => return Err(UnitOfWorkError::RolledBack),
            TransactionState::Active => {}
        }
        self.handle
            .request(Command::Commit)
            .await?
            .map_err(UnitOfWorkError::Commit)?;
        self.state = TransactionState::Committed;
        log::info!("uow: committed");
        Ok(())
    }

    pub async fn rollback(&mut self) -> Result<(), UnitOfWorkError> {
        match self.state {
            TransactionState::RolledBack => return Ok(()),
            TransactionState::Committed => return Err(UnitOfWorkError::Committed),
            TransactionState::Active => {}
        }
        // The transaction is finished either way.
        self.state = TransactionState::RolledBack;
        self.handle
            .request(Command::Rollback)
            .await?
            .map_err(UnitOfWorkError::Rollback)?;
        log::info!("uow: rolled back");
        Ok(())
    }

    /// Stop the writer task and wait for it to release the connection.
    /// Handles still held elsewhere get [`UnitOfWorkError::Closed`] from
    /// then on.
    pub async fn close(mut self) {
        let task = self.task.take();
        // Fails only when the writer is already gone.
        let _ = self.handle.sender.send(Command::Close).await;
        drop(self);
        if let Some(task) = task {
            if let Err(e) = task.await {
                log::warn!("uow: writer task ended abnormally: {}", e);
            }
        }
    }
}

async fn run_writer<E: Executor>(mut executor: E, mut commands: mpsc::Receiver<Command>) {
    let mut finished = false;
    while let Some(command) = commands.recv().await {
        match command {
            Command::Query(statement, reply) => {
                let _ = reply.send(executor.query(&statement).await);
            }
            Command::Scalar(statement, reply) => {
                let _ = reply.send(executor.scalar(&statement).await);
            }
            Command::Execute(statement, reply) => {
                let _ = reply.send(executor.execute(&statement).await);
            }
            Command::Commit(reply) => {
                let result = executor.commit().await;
                finished = result.is_ok();
                let _ = reply.send(result);
            }
            Command::Rollback(reply) => {
                finished = true;
                let _ = reply.send(executor.rollback().await);
            }
            Command::Close => break,
        }
    }
    if !finished {
        log::warn!("uow: released without commit, rolling back");
        if let Err(e) = executor.rollback().await {
            log::warn!("uow: rollback on release failed: {}", e);
        }
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use super::engine::WriteCascade;
use super::entity::EntityRecord;
use super::errors::WriteError;
use crate::config::PlannerConfig;
use crate::executor::{Executor, UnitOfWork};
use crate::mapping_catalog::MappingProvider;
use crate::sql_generator::StatementWriter;
use crate::types::Value;

/// Runs each save, delete or patch in its own unit of work: committed when
/// the whole cascade succeeds, rolled back otherwise.
#[derive(Debug, Clone)]
pub struct Repository<'a> {
    mapping: Arc<dyn MappingProvider>,
    writer: &'a dyn StatementWriter,
    config: PlannerConfig,
}

impl<'a> Repository<'a> {
    pub fn new(
        mapping: Arc<dyn MappingProvider>,
        writer: &'a dyn StatementWriter,
        config: PlannerConfig,
    ) -> Self {
        Repository {
            mapping,
            writer,
            config,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Save `record` with its include set. The cascade works on a copy; the
    /// caller's record only receives generated keys after a successful
    /// commit.
    pub async fn save<E: Executor>(
        &self,
        executor: E,
        record: &mut EntityRecord,
    ) -> Result<Value, WriteError> {
        let uow = UnitOfWork::begin(executor, &self.config).await?;
        let mut working = record.clone();
        let result = self.cascade(&uow).save(&mut working).await;
        let key = finish(uow, result).await?;
        *record = working;
        Ok(key)
    }

    pub async fn delete<E: Executor>(
        &self,
        executor: E,
        record: &EntityRecord,
    ) -> Result<(), WriteError> {
        let uow = UnitOfWork::begin(executor, &self.config).await?;
        let result = self.cascade(&uow).delete(record).await;
        finish(uow, result).await
    }

    pub async fn patch<E: Executor>(
        &self,
        executor: E,
        entity: &str,
        key: Value,
        changes: &BTreeMap<String, Value>,
    ) -> Result<(), WriteError> {
        let uow = UnitOfWork::begin(executor, &self.config).await?;
        let result = self.cascade(&uow).patch(entity, key, changes).await;
        finish(uow, result).await
    }

    fn cascade(&self, uow: &UnitOfWork) -> WriteCascade<'_> {
        WriteCascade::new(
            self.mapping.clone(),
            uow.handle().clone(),
            self.writer,
            &self.config,
        )
    }
}

/// Commit on success, roll back on failure, then release the connection.
/// The original error wins over a failed rollback.
async fn finish<T>(mut uow: UnitOfWork, result: Result<T, WriteError>) -> Result<T, WriteError> {
    let outcome = match result {
        Ok(value) => uow.commit().await.map(|_| value).map_err(WriteError::from),
        Err(error) => {
            log::warn!("repository: write failed, rolling back: {}", error);
            if let Err(e) = uow.rollback().await {
                log::warn!("repository: rollback failed: {}", e);
            }
            Err(error)
        }
    };
    uow.close().await;
    outcome
}

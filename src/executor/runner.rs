use super::errors::QueryError;
use super::record_set::{NamedRecordSet, RecordSet};
use super::unit_of_work::ExecutionHandle;
use crate::query_planner::{ExecutionStrategy, IncludePlan, QueryContext, KEY_ALIAS};
use crate::sql_generator::StatementWriter;

/// Executes planned queries through a unit of work.
#[derive(Debug, Clone)]
pub struct QueryRunner<'a> {
    handle: ExecutionHandle,
    writer: &'a dyn StatementWriter,
}

impl<'a> QueryRunner<'a> {
    pub fn new(handle: ExecutionHandle, writer: &'a dyn StatementWriter) -> Self {
        QueryRunner { handle, writer }
    }

    /// Run one planned query. A two-phase plan materializes the key page
    /// first and binds it into the row statement; an empty page skips the
    /// row statement entirely.
    pub async fn run(&self, strategy: &ExecutionStrategy) -> Result<RecordSet, QueryError> {
        match strategy {
            ExecutionStrategy::Direct(plan) => self.fetch(plan).await,
            ExecutionStrategy::TwoPhase { keys, rows } => {
                let page = self.fetch(keys).await?;
                // Ordering by a collection member can repeat a key.
                let keys = page
                    .distinct_values(KEY_ALIAS)
                    .ok_or_else(|| QueryError::MissingColumn {
                        record_set: "keys".to_string(),
                        column: KEY_ALIAS.to_string(),
                    })?;
                log::debug!("runner: key phase returned {} key(s)", keys.len());
                if keys.is_empty() {
                    return Ok(empty_result(rows));
                }
                self.fetch(&rows.clone().with_keys(keys)).await
            }
        }
    }

    /// Run the root query, then every include plan in order, each one
    /// restricted to the keys of its parent record set.
    pub async fn run_with_includes(
        &self,
        strategy: &ExecutionStrategy,
        includes: &[IncludePlan],
    ) -> Result<Vec<NamedRecordSet>, QueryError> {
        let root = self.run(strategy).await?;
        let mut results = vec![NamedRecordSet {
            name: String::new(),
            records: root,
        }];

        for include in includes {
            let parent = results
                .iter()
                .find(|set| set.name == include.parent)
                .ok_or_else(|| QueryError::MissingColumn {
                    record_set: include.parent.clone(),
                    column: include.parent_key_alias.clone(),
                })?;
            let keys = parent
                .records
                .distinct_values(&include.parent_key_alias)
                .ok_or_else(|| QueryError::MissingColumn {
                    record_set: include.parent.clone(),
                    column: include.parent_key_alias.clone(),
                })?;

            let records = if keys.is_empty() {
                empty_result(&include.plan)
            } else {
                self.fetch(&include.plan.clone().with_keys(keys)).await?
            };
            log::debug!("runner: include `{}` loaded {} row(s)", include.path, records.len());
            results.push(NamedRecordSet {
                name: include.path.clone(),
                records,
            });
        }
        Ok(results)
    }

    async fn fetch(&self, plan: &QueryContext) -> Result<RecordSet, QueryError> {
        let statement = self.writer.write_query(plan)?;
        Ok(self.handle.query(statement).await?)
    }
}

fn empty_result(plan: &QueryContext) -> RecordSet {
    RecordSet::with_columns(
        plan.select
            .iter()
            .map(|c| c.alias.clone().unwrap_or_else(|| c.column.clone()))
            .collect(),
    )
}

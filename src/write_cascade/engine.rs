//! Write-Cascade Engine.
//!
//! Persists an [`EntityRecord`] and its include set, depth first:
//!
//! 1. referenced entities (many-to-one) are saved and their keys copied into
//!    this record's foreign keys;
//! 2. the record itself is inserted or updated;
//! 3. owned collections (one-to-many) are saved with the parent key as
//!    their foreign key, sibling collections concurrently, items of one
//!    collection in order. On update, stored children missing from the
//!    collection are detached (nullable FK) or deleted (required FK).
//!
//! All statements go through one [`ExecutionHandle`], so concurrent
//! collections still execute one statement at a time.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::stream::{self, StreamExt, TryStreamExt};
use futures_util::FutureExt;
use tokio::sync::Mutex;

use super::entity::EntityRecord;
use super::errors::WriteError;
use super::operation::{OperationContext, OperationKind};
use crate::config::PlannerConfig;
use crate::context_graph::{Context, ROOT};
use crate::executor::ExecutionHandle;
use crate::mapping_catalog::{
    ColumnMap, DefaultPolicy, LookupRef, MappingError, MappingProvider, Relationship, TableMap,
};
use crate::query_planner::{FilterExpr, PlanScope, QueryPlanner, QueryRequest, KEY_ALIAS};
use crate::sql_generator::StatementWriter;
use crate::types::{DataType, Value};

/// Unmapped values handed to a child's save, keyed by member.
type SideChannel = BTreeMap<String, Value>;

#[derive(Debug)]
pub struct WriteCascade<'a> {
    mapping: Arc<dyn MappingProvider>,
    handle: ExecutionHandle,
    writer: &'a dyn StatementWriter,
    config: &'a PlannerConfig,
    /// (entity, key) pairs inserted by this unit of work.
    inserted: Mutex<HashSet<(String, Value)>>,
}

impl<'a> WriteCascade<'a> {
    pub fn new(
        mapping: Arc<dyn MappingProvider>,
        handle: ExecutionHandle,
        writer: &'a dyn StatementWriter,
        config: &'a PlannerConfig,
    ) -> Self {
        WriteCascade {
            mapping,
            handle,
            writer,
            config,
            inserted: Mutex::new(HashSet::new()),
        }
    }

    /// Save `record` and everything in its include set. Generated keys and
    /// propagated foreign keys are written back into the records. Returns
    /// the record's key.
    pub async fn save(&self, record: &mut EntityRecord) -> Result<Value, WriteError> {
        self.save_entity(record, SideChannel::new()).await
    }

    /// Delete the row of `record`, releasing its children first.
    pub async fn delete(&self, record: &EntityRecord) -> Result<(), WriteError> {
        let table = self.table(&record.entity)?;
        let key_column = table.single_primary_key()?;
        let key = record.get(&key_column.member).cloned().unwrap_or(Value::Null);
        self.delete_by_key(&record.entity, key).await
    }

    /// Update only the members named in `changes`.
    pub async fn patch(
        &self,
        entity: &str,
        key: Value,
        changes: &BTreeMap<String, Value>,
    ) -> Result<(), WriteError> {
        let table = self.table(entity)?;
        let key_column = table.single_primary_key()?;
        permit(table, OperationKind::Patch)?;
        if key.is_default_for(&key_column.data_type) {
            return Err(WriteError::MissingKeyValue {
                entity: table.entity.clone(),
                operation: OperationKind::Patch,
            });
        }
        if changes.is_empty() {
            log::debug!("cascade: empty patch of {} {}", table.entity, key);
            return Ok(());
        }

        let mut operation = OperationContext::new(OperationKind::Patch, &table.entity, &table.table)
            .keyed(key_column.column.clone(), key.clone());
        for (member, value) in changes {
            let column = table
                .column(member)
                .filter(|c| !c.primary_key && !c.shadow)
                .ok_or_else(|| WriteError::UnknownMember {
                    entity: table.entity.clone(),
                    member: member.clone(),
                })?;
            let value = self.storage_value(table, column, value).await?;
            require_value(table, column, &value)?;
            operation = operation.assign(column.column.clone(), value);
        }
        self.execute_keyed(table, &operation, key).await
    }

    fn save_entity<'s>(
        &'s self,
        record: &'s mut EntityRecord,
        side_channel: SideChannel,
    ) -> BoxFuture<'s, Result<Value, WriteError>> {
        async move {
            let table = self.table(&record.entity)?;
            let key_column = table.single_primary_key()?;

            self.save_references(table, record).await?;

            let current = record.get(&key_column.member).cloned().unwrap_or(Value::Null);
            let insert = self.routes_to_insert(table, key_column, &current).await;
            let key = if insert {
                self.insert(table, key_column, record, &side_channel).await?
            } else {
                self.update(table, key_column, current, record, &side_channel)
                    .await?
            };
            record.set(key_column.member.clone(), key.clone());

            self.save_collections(table, record, !insert).await?;
            Ok(key)
        }
        .boxed()
    }

    async fn save_references(
        &self,
        table: &TableMap,
        record: &mut EntityRecord,
    ) -> Result<(), WriteError> {
        for (name, reference) in record.references.iter_mut() {
            let relationship = navigation(table, name, false)?;
            let foreign_key = table.require_column(&relationship.foreign_key.member)?;
            if foreign_key.shadow || foreign_key.primary_key {
                return Err(WriteError::ForeignKeyNotSettable {
                    entity: table.entity.clone(),
                    member: foreign_key.member.clone(),
                });
            }
            let key = match reference {
                Some(referenced) => {
                    if referenced.entity.is_empty() {
                        referenced.entity = relationship.primary_key.entity.clone();
                    } else if referenced.entity != relationship.primary_key.entity {
                        return Err(WriteError::InvalidNavigation {
                            entity: table.entity.clone(),
                            name: name.clone(),
                            expected: "reference target",
                        });
                    }
                    self.save_entity(referenced, SideChannel::new()).await?
                }
                None => Value::Null,
            };
            log::debug!(
                "cascade: {}.{} <- {}",
                table.entity,
                foreign_key.member,
                key
            );
            record.values.insert(foreign_key.member.clone(), key);
        }
        Ok(())
    }

    async fn routes_to_insert(&self, table: &TableMap, key_column: &ColumnMap, key: &Value) -> bool {
        if key.is_default_for(&key_column.data_type) {
            return true;
        }
        if !self.config.identity_insert {
            return false;
        }
        !self
            .inserted
            .lock()
            .await
            .contains(&(table.entity.clone(), key.clone()))
    }

    async fn insert(
        &self,
        table: &TableMap,
        key_column: &ColumnMap,
        record: &EntityRecord,
        side_channel: &SideChannel,
    ) -> Result<Value, WriteError> {
        permit(table, OperationKind::Insert)?;
        let key = record.get(&key_column.member).cloned().unwrap_or(Value::Null);
        let generate = key.is_default_for(&key_column.data_type);
        let mut operation = OperationContext::new(OperationKind::Insert, &table.entity, &table.table);
        if generate {
            if !key_column.is_generated() {
                return Err(WriteError::MissingKeyValue {
                    entity: table.entity.clone(),
                    operation: OperationKind::Insert,
                });
            }
            operation = operation.returning(key_column.column.clone());
        }

        for column in &table.columns {
            if generate && column.member == key_column.member {
                continue;
            }
            let value = match member_value(record, side_channel, column).filter(|v| !v.is_null()) {
                Some(value) => self.storage_value(table, column, value).await?,
                None => match &column.default {
                    DefaultPolicy::Generated | DefaultPolicy::Database => continue,
                    DefaultPolicy::Literal(value) => value.clone(),
                    DefaultPolicy::None if column.nullable => Value::Null,
                    DefaultPolicy::None => {
                        return Err(WriteError::MissingRequiredValue {
                            entity: table.entity.clone(),
                            member: column.member.clone(),
                        })
                    }
                },
            };
            operation = operation.assign(column.column.clone(), value);
        }

        let statement = self.writer.write_operation(&operation)?;
        let key = if generate {
            let generated = self.handle.scalar(statement).await?;
            if generated.is_null() {
                return Err(WriteError::MissingGeneratedKey {
                    entity: table.entity.clone(),
                });
            }
            generated.coerce_to(&key_column.data_type).unwrap_or(generated)
        } else {
            self.handle.execute(statement).await?;
            key
        };
        self.inserted
            .lock()
            .await
            .insert((table.entity.clone(), key.clone()));
        log::debug!("cascade: inserted {} {}", table.entity, key);
        Ok(key)
    }

    async fn update(
        &self,
        table: &TableMap,
        key_column: &ColumnMap,
        key: Value,
        record: &EntityRecord,
        side_channel: &SideChannel,
    ) -> Result<Value, WriteError> {
        permit(table, OperationKind::Update)?;
        let mut operation = OperationContext::new(OperationKind::Update, &table.entity, &table.table)
            .keyed(key_column.column.clone(), key.clone());
        for column in table.columns.iter().filter(|c| !c.primary_key) {
            let Some(value) = member_value(record, side_channel, column) else {
                continue;
            };
            let value = self.storage_value(table, column, value).await?;
            require_value(table, column, &value)?;
            operation = operation.assign(column.column.clone(), value);
        }

        if operation.assignments.is_empty() {
            // Children are still reconciled against this key, so it must exist.
            let found = self
                .select_keys(
                    &table.entity,
                    FilterExpr::equals(&key_column.member, key.clone()),
                )
                .await?;
            if found.is_empty() {
                return Err(WriteError::RowNotFound {
                    entity: table.entity.clone(),
                    key,
                });
            }
            log::debug!("cascade: nothing to update on {} {}", table.entity, key);
            return Ok(key);
        }
        self.execute_keyed(table, &operation, key.clone()).await?;
        log::debug!("cascade: updated {} {}", table.entity, key);
        Ok(key)
    }

    async fn save_collections(
        &self,
        table: &TableMap,
        record: &mut EntityRecord,
        reconcile: bool,
    ) -> Result<(), WriteError> {
        let parent = &record.values;
        let saves: Vec<BoxFuture<'_, Result<(), WriteError>>> = record
            .collections
            .iter_mut()
            .map(|(name, items)| {
                self.save_collection(table, parent, name.as_str(), items.as_mut_slice(), reconcile)
                    .boxed()
            })
            .collect();
        stream::iter(saves)
            .buffer_unordered(self.config.max_parallel_collections)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn save_collection(
        &self,
        table: &TableMap,
        parent: &BTreeMap<String, Value>,
        name: &str,
        items: &mut [EntityRecord],
        reconcile: bool,
    ) -> Result<(), WriteError> {
        let relationship = navigation(table, name, true)?;
        let parent_key = parent
            .get(&relationship.primary_key.member)
            .cloned()
            .unwrap_or(Value::Null);
        let child_table = self.table(&relationship.foreign_key.entity)?;
        let child_key = child_table.single_primary_key()?;
        let foreign_key = child_table.require_column(&relationship.foreign_key.member)?;

        let mut kept = HashSet::new();
        for item in items.iter_mut() {
            if item.entity.is_empty() {
                item.entity = child_table.entity.clone();
            } else if item.entity != child_table.entity {
                return Err(WriteError::InvalidNavigation {
                    entity: table.entity.clone(),
                    name: name.to_string(),
                    expected: "collection item",
                });
            }
            let mut side_channel = SideChannel::new();
            if foreign_key.shadow {
                side_channel.insert(foreign_key.member.clone(), parent_key.clone());
            } else {
                item.set(foreign_key.member.clone(), parent_key.clone());
            }
            kept.insert(self.save_entity(item, side_channel).await?);
        }

        if reconcile {
            let stored = self
                .select_keys(
                    &child_table.entity,
                    FilterExpr::equals(&foreign_key.member, parent_key.clone()),
                )
                .await?;
            for orphan in stored.into_iter().filter(|key| !kept.contains(key)) {
                log::debug!(
                    "cascade: {} {} is no longer in {}.{}",
                    child_table.entity,
                    orphan,
                    table.entity,
                    name
                );
                self.release_child(child_table, child_key, foreign_key, orphan)
                    .await?;
            }
        }
        Ok(())
    }

    /// Detach a child (nullable FK) or delete it (required FK).
    async fn release_child(
        &self,
        child_table: &TableMap,
        child_key: &ColumnMap,
        foreign_key: &ColumnMap,
        key: Value,
    ) -> Result<(), WriteError> {
        if !foreign_key.nullable {
            return self.delete_by_key(&child_table.entity, key).await;
        }
        permit(child_table, OperationKind::Detach)?;
        let operation =
            OperationContext::new(OperationKind::Detach, &child_table.entity, &child_table.table)
                .assign(foreign_key.column.clone(), Value::Null)
                .keyed(child_key.column.clone(), key.clone());
        self.execute_keyed(child_table, &operation, key).await
    }

    fn delete_by_key<'s>(
        &'s self,
        entity: &'s str,
        key: Value,
    ) -> BoxFuture<'s, Result<(), WriteError>> {
        async move {
            let table = self.table(entity)?;
            let key_column = table.single_primary_key()?;
            permit(table, OperationKind::Delete)?;
            if key.is_default_for(&key_column.data_type) {
                return Err(WriteError::MissingKeyValue {
                    entity: table.entity.clone(),
                    operation: OperationKind::Delete,
                });
            }

            for relationship in table
                .relationships
                .iter()
                .filter(|r| r.is_inverse_from(&table.entity))
            {
                let child_table = self.table(&relationship.foreign_key.entity)?;
                let child_key = child_table.single_primary_key()?;
                let foreign_key = child_table.require_column(&relationship.foreign_key.member)?;
                let children = self
                    .select_keys(
                        &child_table.entity,
                        FilterExpr::equals(&foreign_key.member, key.clone()),
                    )
                    .await?;
                for child in children {
                    // A self-referencing row is removed with itself.
                    if child_table.entity == table.entity && child == key {
                        continue;
                    }
                    self.release_child(child_table, child_key, foreign_key, child)
                        .await?;
                }
            }

            let operation = OperationContext::new(OperationKind::Delete, &table.entity, &table.table)
                .keyed(key_column.column.clone(), key.clone());
            self.execute_keyed(table, &operation, key.clone()).await?;
            log::debug!("cascade: deleted {} {}", table.entity, key);
            Ok(())
        }
        .boxed()
    }

    /// Run a keyed statement; zero affected rows means the key is stale.
    async fn execute_keyed(
        &self,
        table: &TableMap,
        operation: &OperationContext,
        key: Value,
    ) -> Result<(), WriteError> {
        let statement = self.writer.write_operation(operation)?;
        let affected = self.handle.execute(statement).await?;
        if affected == 0 {
            return Err(WriteError::RowNotFound {
                entity: table.entity.clone(),
                key,
            });
        }
        Ok(())
    }

    /// Keys of `entity` rows matching `filter`.
    async fn select_keys(&self, entity: &str, filter: FilterExpr) -> Result<Vec<Value>, WriteError> {
        let statement = {
            let key = &self.table(entity)?.single_primary_key()?.member;
            let request = QueryRequest::new()
                .project(key.clone(), KEY_ALIAS)
                .filter(filter);
            let mut context = Context::new(self.mapping.clone(), entity)?;
            let plan = QueryPlanner::new(&mut context).plan(ROOT, &request, PlanScope::Outer)?;
            self.writer.write_query(&plan)?
        };
        let records = self.handle.query(statement).await?;
        Ok(records.distinct_values(KEY_ALIAS).unwrap_or_default())
    }

    /// Convert an in-memory value into the form stored in `column`.
    async fn storage_value(
        &self,
        table: &TableMap,
        column: &ColumnMap,
        value: &Value,
    ) -> Result<Value, WriteError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match &column.lookup {
            Some(lookup) => self.resolve_lookup(table, column, lookup, value).await,
            None => self.convert(table, column, value),
        }
    }

    /// Map a lookup label to the lookup row's key.
    async fn resolve_lookup(
        &self,
        table: &TableMap,
        column: &ColumnMap,
        lookup: &LookupRef,
        label: &Value,
    ) -> Result<Value, WriteError> {
        let keys = self
            .select_keys(
                &lookup.entity,
                FilterExpr::equals(&lookup.value_member, label.clone()),
            )
            .await?;
        keys.into_iter()
            .next()
            .ok_or_else(|| WriteError::UnknownLookupValue {
                entity: table.entity.clone(),
                member: column.member.clone(),
                lookup: lookup.entity.clone(),
                value: label.clone(),
            })
    }

    fn convert(&self, table: &TableMap, column: &ColumnMap, value: &Value) -> Result<Value, WriteError> {
        let invalid = |source| WriteError::InvalidValue {
            entity: table.entity.clone(),
            member: column.member.clone(),
            source,
        };
        if let DataType::Enum(name) = &column.data_type {
            let definition = self
                .mapping
                .enum_definition(name)
                .ok_or_else(|| MappingError::UnknownEnum { name: name.clone() })?;
            return definition.to_storage(value).map_err(invalid);
        }
        if column.adapter.is_some() {
            return column.to_storage(value).map_err(invalid);
        }
        value
            .coerce_to(&column.data_type)
            .ok_or_else(|| WriteError::ValueType {
                entity: table.entity.clone(),
                member: column.member.clone(),
                value: value.clone(),
                data_type: column.data_type.clone(),
            })
    }

    fn table(&self, entity: &str) -> Result<&TableMap, WriteError> {
        Ok(self.mapping.require_table_map(entity)?)
    }
}

/// Shadow members only arrive through the side channel.
fn member_value<'r>(
    record: &'r EntityRecord,
    side_channel: &'r SideChannel,
    column: &ColumnMap,
) -> Option<&'r Value> {
    if column.shadow {
        return side_channel.get(&column.member);
    }
    record
        .get(&column.member)
        .or_else(|| side_channel.get(&column.member))
}

fn require_value(table: &TableMap, column: &ColumnMap, value: &Value) -> Result<(), WriteError> {
    if value.is_null() && !column.nullable {
        return Err(WriteError::MissingRequiredValue {
            entity: table.entity.clone(),
            member: column.member.clone(),
        });
    }
    Ok(())
}

fn permit(table: &TableMap, operation: OperationKind) -> Result<(), WriteError> {
    let allowed = match operation {
        OperationKind::Insert => table.permissions.insert,
        OperationKind::Update | OperationKind::Patch | OperationKind::Detach => {
            table.permissions.update
        }
        OperationKind::Delete => table.permissions.delete,
    };
    if !allowed {
        return Err(WriteError::NotPermitted {
            entity: table.entity.clone(),
            operation,
        });
    }
    Ok(())
}

/// The relationship behind navigation member `name`, which must point the
/// expected way: `inverse` for collections, forward for references.
fn navigation<'t>(table: &'t TableMap, name: &str, inverse: bool) -> Result<&'t Relationship, WriteError> {
    let relationship = table
        .relationship(name)
        .ok_or_else(|| MappingError::UnknownRelationship {
            entity: table.entity.clone(),
            name: name.to_string(),
        })?;
    if relationship.is_inverse_from(&table.entity) != inverse {
        return Err(WriteError::InvalidNavigation {
            entity: table.entity.clone(),
            name: name.to_string(),
            expected: if inverse { "collection" } else { "reference" },
        });
    }
    Ok(relationship)
}

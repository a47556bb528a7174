use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::adapters::{AdapterSpec, ValueAdapter};
use super::errors::{AdapterError, MappingError};
use crate::types::{DataType, Value};

/// Read-only access to entity mappings. Must be fully populated before any
/// context graph is built; nothing in the planner mutates it.
pub trait MappingProvider: fmt::Debug + Send + Sync {
    fn table_map(&self, entity: &str) -> Option<&TableMap>;

    fn enum_definition(&self, name: &str) -> Option<&EnumDefinition>;

    fn require_table_map(&self, entity: &str) -> Result<&TableMap, MappingError> {
        self.table_map(entity)
            .ok_or_else(|| MappingError::unmapped(entity))
    }
}

/// `Entity.Member` pair naming one mapped column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColumnRef {
    pub entity: String,
    pub member: String,
}

impl ColumnRef {
    pub fn new(entity: impl Into<String>, member: impl Into<String>) -> Self {
        ColumnRef {
            entity: entity.into(),
            member: member.into(),
        }
    }
}

impl TryFrom<String> for ColumnRef {
    type Error = MappingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.split_once('.') {
            Some((entity, member)) if !entity.is_empty() && !member.is_empty() => {
                Ok(ColumnRef::new(entity, member))
            }
            _ => Err(MappingError::InvalidColumnRef { reference: value }),
        }
    }
}

impl From<ColumnRef> for String {
    fn from(value: ColumnRef) -> Self {
        format!("{}.{}", value.entity, value.member)
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity, self.member)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    /// Reference member: the declaring entity holds the foreign key.
    ManyToOne,
    /// Collection member: the related entity holds the foreign key.
    OneToMany,
}

/// Directed edge between a foreign-key column (the "many" side) and a
/// primary-key column (the "one" side), reachable through the navigation
/// member `name` on the declaring entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub name: String,
    pub kind: RelationshipKind,
    pub foreign_key: ColumnRef,
    pub primary_key: ColumnRef,
}

impl Relationship {
    /// Whether walking this relationship away from `entity` is an inverse
    /// (one-to-many) traversal: the primary key lives on `entity`.
    /// Self-referencing relationships fall back to the declared kind.
    pub fn is_inverse_from(&self, entity: &str) -> bool {
        if self.primary_key.entity == self.foreign_key.entity {
            return self.kind == RelationshipKind::OneToMany;
        }
        self.primary_key.entity == entity
    }

    /// Entity on the far side of the relationship when walked from `entity`.
    pub fn target_entity(&self, entity: &str) -> &str {
        if self.is_inverse_from(entity) {
            &self.foreign_key.entity
        } else {
            &self.primary_key.entity
        }
    }
}

/// Lookup relationship carried by a column: the column is a foreign key into
/// a small reference table whose `value_member` stands in for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRef {
    pub entity: String,
    pub value_member: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    /// A value is required when the column is not nullable.
    #[default]
    None,
    /// Identity / database generated key, returned after insert.
    Generated,
    /// Column omitted from the insert when no value is present.
    Database,
    /// Literal used when the entity carries no value.
    Literal(Value),
}

#[derive(Debug, Clone)]
pub struct ColumnMap {
    pub member: String,
    pub column: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: DefaultPolicy,
    pub adapter: Option<Arc<dyn ValueAdapter>>,
    pub lookup: Option<LookupRef>,
    /// Included in "all columns" selections.
    pub selectable: bool,
    /// Stored but absent from the in-memory entity; written only through
    /// the cascade side channel.
    pub shadow: bool,
}

impl ColumnMap {
    pub fn new(member: impl Into<String>, column: impl Into<String>, data_type: DataType) -> Self {
        ColumnMap {
            member: member.into(),
            column: column.into(),
            data_type,
            nullable: false,
            primary_key: false,
            default: DefaultPolicy::None,
            adapter: None,
            lookup: None,
            selectable: true,
            shadow: false,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn generated(mut self) -> Self {
        self.default = DefaultPolicy::Generated;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_adapter(mut self, adapter: &AdapterSpec) -> Self {
        self.adapter = Some(adapter.build());
        self
    }

    pub fn with_lookup(mut self, entity: impl Into<String>, value_member: impl Into<String>) -> Self {
        self.lookup = Some(LookupRef {
            entity: entity.into(),
            value_member: value_member.into(),
        });
        self
    }

    pub fn is_generated(&self) -> bool {
        self.default == DefaultPolicy::Generated
    }

    /// Apply the "to storage" transform, if any.
    pub fn to_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match &self.adapter {
            Some(adapter) => adapter.to_storage(value),
            None => Ok(value.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePermissions {
    #[serde(default = "allowed")]
    pub insert: bool,
    #[serde(default = "allowed")]
    pub update: bool,
    #[serde(default = "allowed")]
    pub delete: bool,
}

fn allowed() -> bool {
    true
}

impl Default for TablePermissions {
    fn default() -> Self {
        TablePermissions {
            insert: true,
            update: true,
            delete: true,
        }
    }
}

impl TablePermissions {
    pub fn read_only() -> Self {
        TablePermissions {
            insert: false,
            update: false,
            delete: false,
        }
    }
}

/// Mapping of one logical entity onto one table.
#[derive(Debug, Clone)]
pub struct TableMap {
    pub entity: String,
    pub table: String,
    pub columns: Vec<ColumnMap>,
    pub relationships: Vec<Relationship>,
    pub permissions: TablePermissions,
}

impl TableMap {
    pub fn new(entity: impl Into<String>, table: impl Into<String>) -> Self {
        TableMap {
            entity: entity.into(),
            table: table.into(),
            columns: Vec::new(),
            relationships: Vec::new(),
            permissions: TablePermissions::default(),
        }
    }

    pub fn column(&self, member: &str) -> Option<&ColumnMap> {
        self.columns.iter().find(|c| c.member == member)
    }

    pub fn require_column(&self, member: &str) -> Result<&ColumnMap, MappingError> {
        self.column(member)
            .ok_or_else(|| MappingError::unknown_member(&self.entity, member))
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    pub fn primary_keys(&self) -> Vec<&ColumnMap> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// The single key column. Composite keys are an unsupported shape for
    /// every algorithm that calls this.
    pub fn single_primary_key(&self) -> Result<&ColumnMap, MappingError> {
        let keys = self.primary_keys();
        match keys.as_slice() {
            [key] => Ok(key),
            [] => Err(MappingError::MissingPrimaryKey {
                entity: self.entity.clone(),
            }),
            _ => Err(MappingError::CompositeKey {
                entity: self.entity.clone(),
            }),
        }
    }

    pub fn lookup_columns(&self) -> impl Iterator<Item = &ColumnMap> {
        self.columns.iter().filter(|c| c.lookup.is_some())
    }
}

/// Enumeration declared at catalog level: variant name → stored integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumDefinition {
    pub name: String,
    pub variants: BTreeMap<String, i64>,
}

impl EnumDefinition {
    /// Coerce a literal (variant name or stored integer) into the stored
    /// integer representation.
    pub fn to_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(name) => self
                .variants
                .get(name)
                .map(|v| Value::Int(*v))
                .ok_or_else(|| self.unknown(value)),
            Value::Int(i) if self.variants.values().any(|v| v == i) => Ok(Value::Int(*i)),
            other => Err(self.unknown(other)),
        }
    }

    pub fn variant_name(&self, stored: i64) -> Option<&str> {
        self.variants
            .iter()
            .find(|(_, v)| **v == stored)
            .map(|(name, _)| name.as_str())
    }

    fn unknown(&self, value: &Value) -> AdapterError {
        AdapterError::UnknownVariant {
            enumeration: self.name.clone(),
            value: value.clone(),
        }
    }
}

/// In-memory mapping provider built from table maps (programmatically or
/// from a [`super::config::MappingConfig`]).
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
    tables: HashMap<String, TableMap>,
    enums: HashMap<String, EnumDefinition>,
}

impl MappingCatalog {
    /// Build and validate a catalog.
    pub fn new(
        tables: Vec<TableMap>,
        enums: Vec<EnumDefinition>,
    ) -> Result<Self, MappingError> {
        let mut catalog = MappingCatalog::default();
        for definition in enums {
            catalog.enums.insert(definition.name.clone(), definition);
        }
        for table in tables {
            if catalog.tables.contains_key(&table.entity) {
                return Err(MappingError::DuplicateEntity {
                    entity: table.entity,
                });
            }
            catalog.tables.insert(table.entity.clone(), table);
        }
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn entities(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    fn validate(&self) -> Result<(), MappingError> {
        for table in self.tables.values() {
            for column in &table.columns {
                if let DataType::Enum(name) = &column.data_type {
                    if !self.enums.contains_key(name) {
                        return Err(MappingError::UnknownEnum { name: name.clone() });
                    }
                }
                if let Some(lookup) = &column.lookup {
                    self.validate_lookup(table, column, lookup)?;
                }
            }
            for relationship in &table.relationships {
                self.validate_relationship(table, relationship)?;
            }
        }
        Ok(())
    }

    fn validate_relationship(
        &self,
        table: &TableMap,
        relationship: &Relationship,
    ) -> Result<(), MappingError> {
        if relationship.foreign_key.entity != table.entity
            && relationship.primary_key.entity != table.entity
        {
            return Err(MappingError::InvalidConfig {
                message: format!(
                    "Relationship `{}.{}` does not touch its declaring entity",
                    table.entity, relationship.name
                ),
            });
        }
        let fk_table = self.require_table_map(&relationship.foreign_key.entity)?;
        let fk_column = fk_table.require_column(&relationship.foreign_key.member)?;
        let pk_table = self.require_table_map(&relationship.primary_key.entity)?;
        let pk_column = pk_table.require_column(&relationship.primary_key.member)?;

        // Relationships may only target a single-column key.
        let key = pk_table.single_primary_key()?;
        if key.member != pk_column.member {
            return Err(MappingError::InvalidConfig {
                message: format!(
                    "Relationship `{}.{}` must target the primary key of `{}`",
                    table.entity, relationship.name, pk_table.entity
                ),
            });
        }
        if fk_column.primary_key && fk_table.primary_keys().len() > 1 {
            return Err(MappingError::CompositeKey {
                entity: fk_table.entity.clone(),
            });
        }
        Ok(())
    }

    fn validate_lookup(
        &self,
        table: &TableMap,
        column: &ColumnMap,
        lookup: &LookupRef,
    ) -> Result<(), MappingError> {
        let invalid = |reason: String| MappingError::InvalidLookup {
            entity: table.entity.clone(),
            member: column.member.clone(),
            reason,
        };
        let target = self
            .table_map(&lookup.entity)
            .ok_or_else(|| invalid(format!("entity `{}` is not mapped", lookup.entity)))?;
        target
            .single_primary_key()
            .map_err(|e| invalid(e.to_string()))?;
        let value = target.column(&lookup.value_member).ok_or_else(|| {
            invalid(format!(
                "`{}` has no member `{}`",
                lookup.entity, lookup.value_member
            ))
        })?;
        if value.primary_key {
            return Err(invalid("the lookup value member must not be the key".into()));
        }
        Ok(())
    }
}

impl MappingProvider for MappingCatalog {
    fn table_map(&self, entity: &str) -> Option<&TableMap> {
        self.tables.get(entity)
    }

    fn enum_definition(&self, name: &str) -> Option<&EnumDefinition> {
        self.enums.get(name)
    }
}

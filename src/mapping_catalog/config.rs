//! Entity mapping configuration.
//!
//! Mappings are declared in YAML with the following structure:
//!
//! ```yaml
//! enums:
//!   - name: CustomerTier
//!     variants: { Standard: 0, Gold: 1 }
//! entities:
//!   - entity: Customer               # Logical entity name
//!     table: customers               # Storage table
//!     permissions: { delete: false } # Optional, all verbs allowed by default
//!     columns:
//!       - { member: Id, column: id, type: int64, primary_key: true, default: generated }
//!       - { member: Tier, column: tier, type: { enum: CustomerTier } }
//!       - member: Active
//!         column: active
//!         type: text
//!         adapter: { kind: bool_flag, true_value: "Y", false_value: "N" }
//!     relationships:
//!       - name: Orders
//!         kind: one_to_many
//!         foreign_key: Order.CustomerId
//!         primary_key: Customer.Id
//! ```
//!
//! A column carrying `lookup: { entity: OrderStatus, value_member: Label }`
//! is a foreign key into a lookup table whose `Label` stands in for it.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_yaml;

use super::adapters::AdapterSpec;
use super::errors::MappingError;
use super::table_map::{
    ColumnMap, ColumnRef, DefaultPolicy, EnumDefinition, LookupRef, MappingCatalog, Relationship,
    RelationshipKind, TableMap, TablePermissions,
};
use crate::types::DataType;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub enums: Vec<EnumDefinition>,
    pub entities: Vec<EntityDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub entity: String,
    pub table: String,
    #[serde(default)]
    pub permissions: TablePermissions,
    pub columns: Vec<ColumnDefinition>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDefinition {
    pub member: String,
    /// Storage column name, defaults to the member name
    #[serde(default)]
    pub column: Option<String>,
    /// `int64`, or `{ enum: Name }` for enumerations.
    #[serde(rename = "type", with = "serde_yaml::with::singleton_map")]
    pub data_type: DataType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub primary_key: bool,
    /// `generated`, `database`, or `{ literal: value }`.
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub default: DefaultPolicy,
    #[serde(default)]
    pub adapter: Option<AdapterSpec>,
    #[serde(default)]
    pub lookup: Option<LookupRef>,
    #[serde(default = "default_true")]
    pub selectable: bool,
    #[serde(default)]
    pub shadow: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    pub kind: RelationshipKind,
    pub foreign_key: ColumnRef,
    pub primary_key: ColumnRef,
}

impl MappingConfig {
    /// Load a mapping configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, MappingError> {
        let contents = fs::read_to_string(path).map_err(|e| MappingError::ConfigReadError {
            error: e.to_string(),
        })?;

        Self::from_yaml_str(&contents)
    }

    /// Parse a mapping configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, MappingError> {
        serde_yaml::from_str(yaml).map_err(|e| MappingError::ConfigParseError {
            error: e.to_string(),
        })
    }

    /// Structural checks that do not need the full catalog.
    pub fn validate(&self) -> Result<(), MappingError> {
        if self.entities.is_empty() {
            return Err(MappingError::InvalidConfig {
                message: "Mapping must contain at least one entity".to_string(),
            });
        }
        for entity in &self.entities {
            let mut seen = std::collections::HashSet::new();
            for column in &entity.columns {
                if !seen.insert(&column.member) {
                    return Err(MappingError::InvalidConfig {
                        message: format!(
                            "Duplicate member `{}` on entity `{}`",
                            column.member, entity.entity
                        ),
                    });
                }
                if column.primary_key && column.nullable {
                    return Err(MappingError::InvalidConfig {
                        message: format!(
                            "Primary key `{}.{}` cannot be nullable",
                            entity.entity, column.member
                        ),
                    });
                }
            }
            let mut names = std::collections::HashSet::new();
            for rel in &entity.relationships {
                if !names.insert(&rel.name) || seen.contains(&rel.name) {
                    return Err(MappingError::InvalidConfig {
                        message: format!(
                            "Navigation member `{}` on entity `{}` is declared twice",
                            rel.name, entity.entity
                        ),
                    });
                }
            }
        }
        Ok(())
    }

    /// Validate and convert into a catalog usable by the planner.
    pub fn into_catalog(self) -> Result<MappingCatalog, MappingError> {
        self.validate()?;
        let tables = self.entities.into_iter().map(TableMap::from).collect();
        MappingCatalog::new(tables, self.enums)
    }
}

impl From<ColumnDefinition> for ColumnMap {
    fn from(def: ColumnDefinition) -> Self {
        ColumnMap {
            column: def.column.unwrap_or_else(|| def.member.clone()),
            member: def.member,
            data_type: def.data_type,
            nullable: def.nullable,
            primary_key: def.primary_key,
            default: def.default,
            adapter: def.adapter.as_ref().map(AdapterSpec::build),
            lookup: def.lookup,
            selectable: def.selectable,
            shadow: def.shadow,
        }
    }
}

impl From<EntityDefinition> for TableMap {
    fn from(def: EntityDefinition) -> Self {
        TableMap {
            entity: def.entity,
            table: def.table,
            columns: def.columns.into_iter().map(ColumnMap::from).collect(),
            relationships: def
                .relationships
                .into_iter()
                .map(|r| Relationship {
                    name: r.name,
                    kind: r.kind,
                    foreign_key: r.foreign_key,
                    primary_key: r.primary_key,
                })
                .collect(),
            permissions: def.permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping_catalog::MappingProvider;
    use std::io::Write;

    #[test]
    fn test_parse_minimal_mapping() {
        let yaml = r#"
entities:
  - entity: Region
    table: regions
    columns:
      - { member: Id, column: id, type: int64, primary_key: true, default: generated }
      - { member: Name, type: text }
"#;
        let catalog = MappingConfig::from_yaml_str(yaml)
            .unwrap()
            .into_catalog()
            .unwrap();
        let region = catalog.table_map("Region").unwrap();
        assert_eq!(region.table, "regions");
        assert_eq!(region.column("Name").unwrap().column, "Name");
        assert!(region.column("Id").unwrap().is_generated());
        assert!(region.permissions.delete);
    }

    #[test]
    fn test_sales_fixture_loads() {
        let catalog = MappingConfig::from_yaml_str(crate::mapping_catalog::testing::SALES_MAPPING)
            .unwrap()
            .into_catalog()
            .unwrap();
        let customer = catalog.table_map("Customer").unwrap();
        let tier = customer.column("Tier").unwrap();
        assert_eq!(tier.data_type, DataType::Enum("CustomerTier".into()));
        assert_eq!(tier.default, DefaultPolicy::Literal(0.into()));
        let active = customer.column("Active").unwrap();
        assert_eq!(active.default, DefaultPolicy::Literal("Y".into()));
        assert!(customer.column("Id").unwrap().is_generated());
        assert!(catalog.enum_definition("CustomerTier").is_some());
    }

    #[test]
    fn test_enum_type_and_literal_default() {
        let yaml = r#"
enums:
  - name: Tier
    variants: { Standard: 0, Gold: 1 }
entities:
  - entity: Account
    table: accounts
    columns:
      - { member: Id, type: int64, primary_key: true }
      - { member: Tier, type: { enum: Tier }, default: { literal: 0 } }
"#;
        let catalog = MappingConfig::from_yaml_str(yaml)
            .unwrap()
            .into_catalog()
            .unwrap();
        let tier = catalog.table_map("Account").unwrap().column("Tier").unwrap();
        assert_eq!(tier.data_type, DataType::Enum("Tier".into()));
        assert_eq!(tier.default, DefaultPolicy::Literal(0.into()));
    }

    #[test]
    fn test_unknown_enum_rejected() {
        let yaml = r#"
entities:
  - entity: Account
    table: accounts
    columns:
      - { member: Id, type: int64, primary_key: true }
      - { member: Tier, type: { enum: Missing } }
"#;
        let err = MappingConfig::from_yaml_str(yaml)
            .unwrap()
            .into_catalog()
            .unwrap_err();
        assert_eq!(err, MappingError::UnknownEnum { name: "Missing".into() });
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let yaml = r#"
entities:
  - entity: A
    table: a
    columns:
      - { member: Id, type: int64, primary_key: true }
      - { member: Id, type: text }
"#;
        let config = MappingConfig::from_yaml_str(yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(MappingError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_bad_column_ref_is_parse_error() {
        let yaml = r#"
entities:
  - entity: A
    table: a
    columns:
      - { member: Id, type: int64, primary_key: true }
    relationships:
      - { name: B, kind: many_to_one, foreign_key: BId, primary_key: B.Id }
"#;
        assert!(matches!(
            MappingConfig::from_yaml_str(yaml),
            Err(MappingError::ConfigParseError { .. })
        ));
    }

    #[test]
    fn test_from_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "entities:\n  - entity: A\n    table: a\n    columns:\n      - {{ member: Id, type: int64, primary_key: true }}"
        )
        .unwrap();
        let config = MappingConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.entities.len(), 1);

        let missing = MappingConfig::from_yaml_file("/definitely/not/here.yaml");
        assert!(matches!(missing, Err(MappingError::ConfigReadError { .. })));
    }
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Value;

/// In-memory entity instance handed to the cascade engine.
///
/// `references` and `collections` form the include set: only navigation
/// members present here are written. A present but empty collection means
/// the parent owns no children anymore; a `None` reference clears the
/// foreign key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub entity: String,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub references: BTreeMap<String, Option<Box<EntityRecord>>>,
    #[serde(default)]
    pub collections: BTreeMap<String, Vec<EntityRecord>>,
}

impl EntityRecord {
    pub fn new(entity: impl Into<String>) -> Self {
        EntityRecord {
            entity: entity.into(),
            ..Default::default()
        }
    }

    pub fn with(mut self, member: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(member.into(), value.into());
        self
    }

    pub fn with_reference(mut self, name: impl Into<String>, record: Option<EntityRecord>) -> Self {
        self.references.insert(name.into(), record.map(Box::new));
        self
    }

    pub fn with_collection(mut self, name: impl Into<String>, items: Vec<EntityRecord>) -> Self {
        self.collections.insert(name.into(), items);
        self
    }

    pub fn get(&self, member: &str) -> Option<&Value> {
        self.values.get(member)
    }

    pub fn set(&mut self, member: impl Into<String>, value: Value) {
        self.values.insert(member.into(), value);
    }

    pub fn reference(&self, name: &str) -> Option<&EntityRecord> {
        self.references.get(name)?.as_deref()
    }

    pub fn collection(&self, name: &str) -> &[EntityRecord] {
        self.collections.get(name).map(Vec::as_slice).unwrap_or(&[])
    }
}

//! Dynamic values and storage data types shared by the planner and the
//! write engine.

use std::fmt;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Storage type of a mapped column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Bool,
    Int32,
    Int64,
    Float64,
    Text,
    Timestamp,
    Uuid,
    /// Enumeration declared in the mapping catalog, stored as its integer value.
    Enum(String),
}

impl DataType {
    /// The "unset" sentinel for a key of this type.
    pub fn default_value(&self) -> Value {
        match self {
            DataType::Bool => Value::Bool(false),
            DataType::Int32 | DataType::Int64 | DataType::Enum(_) => Value::Int(0),
            DataType::Float64 => Value::Float(0.0),
            DataType::Text => Value::Text(String::new()),
            DataType::Timestamp => Value::Null,
            DataType::Uuid => Value::Uuid(Uuid::nil()),
        }
    }

    pub fn is_enum(&self) -> bool {
        matches!(self, DataType::Enum(_))
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Bool => f.write_str("bool"),
            DataType::Int32 => f.write_str("int32"),
            DataType::Int64 => f.write_str("int64"),
            DataType::Float64 => f.write_str("float64"),
            DataType::Text => f.write_str("text"),
            DataType::Timestamp => f.write_str("timestamp"),
            DataType::Uuid => f.write_str("uuid"),
            DataType::Enum(name) => write!(f, "enum({})", name),
        }
    }
}

/// A literal, parameter or column value.
///
/// Deserialization is untagged: JSON/YAML literals land in the closest
/// scalar variant and are coerced to the column type with [`Value::coerce_to`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True when the value is null or equals the type's unset sentinel.
    pub fn is_default_for(&self, data_type: &DataType) -> bool {
        self.is_null() || *self == data_type.default_value()
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a loosely typed literal into the representation used for
    /// `data_type`. Returns `None` when the conversion is impossible.
    /// Enum values are left alone; enum coercion needs the catalog.
    pub fn coerce_to(&self, data_type: &DataType) -> Option<Value> {
        let coerced = match (self, data_type) {
            (Value::Null, _) => Value::Null,
            (Value::Bool(b), DataType::Bool) => Value::Bool(*b),
            (Value::Int(i), DataType::Bool) => Value::Bool(*i != 0),
            (Value::Int(i), DataType::Int32 | DataType::Int64) => Value::Int(*i),
            (Value::Float(f), DataType::Int32 | DataType::Int64) if f.fract() == 0.0 => {
                Value::Int(*f as i64)
            }
            (Value::Int(i), DataType::Float64) => Value::Float(*i as f64),
            (Value::Float(f), DataType::Float64) => Value::Float(*f),
            (Value::Text(s), DataType::Text) => Value::Text(s.clone()),
            (Value::Text(s), DataType::Timestamp) => {
                Value::Timestamp(DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc))
            }
            (Value::Timestamp(t), DataType::Timestamp) => Value::Timestamp(*t),
            (Value::Text(s), DataType::Uuid) => Value::Uuid(Uuid::parse_str(s).ok()?),
            (Value::Uuid(u), DataType::Uuid) => Value::Uuid(*u),
            (other, DataType::Enum(_)) => other.clone(),
            _ => return None,
        };
        Some(coerced)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            _ => false,
        }
    }
}

// Floats compare by bit pattern so keys can live in hash sets.
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::Text(s) => s.hash(state),
            Value::Timestamp(t) => t.hash(state),
            Value::Uuid(u) => u.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "'{}'", s),
            Value::Timestamp(t) => write!(f, "'{}'", t.to_rfc3339()),
            Value::Uuid(u) => write!(f, "'{}'", u),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Uuid> for Value {
    fn from(v: Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

//! Value adapters: bidirectional transforms applied when a value moves
//! between the in-memory entity and storage.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::errors::AdapterError;
use crate::types::Value;

pub trait ValueAdapter: fmt::Debug + Send + Sync {
    /// Name used in error messages.
    fn name(&self) -> &str;

    fn to_storage(&self, value: &Value) -> Result<Value, AdapterError>;

    fn from_storage(&self, value: &Value) -> Result<Value, AdapterError>;
}

/// Adapter declaration as it appears in a mapping file.
///
/// ```yaml
/// adapter: { kind: bool_flag, true_value: "Y", false_value: "N" }
/// adapter: { kind: scale, factor: 100 }
/// adapter: { kind: upper_case }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterSpec {
    BoolFlag {
        true_value: String,
        false_value: String,
    },
    Scale {
        factor: i64,
    },
    UpperCase,
}

impl AdapterSpec {
    pub fn build(&self) -> Arc<dyn ValueAdapter> {
        match self {
            AdapterSpec::BoolFlag {
                true_value,
                false_value,
            } => Arc::new(BoolFlagAdapter {
                true_value: true_value.clone(),
                false_value: false_value.clone(),
            }),
            AdapterSpec::Scale { factor } => Arc::new(ScaleAdapter { factor: *factor }),
            AdapterSpec::UpperCase => Arc::new(UpperCaseAdapter),
        }
    }
}

/// Booleans stored as a pair of marker strings (`'Y'`/`'N'`).
#[derive(Debug, Clone)]
pub struct BoolFlagAdapter {
    pub true_value: String,
    pub false_value: String,
}

impl ValueAdapter for BoolFlagAdapter {
    fn name(&self) -> &str {
        "bool_flag"
    }

    fn to_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Bool(true) => Ok(Value::Text(self.true_value.clone())),
            Value::Bool(false) => Ok(Value::Text(self.false_value.clone())),
            // Already in storage form.
            Value::Text(s) if *s == self.true_value || *s == self.false_value => {
                Ok(value.clone())
            }
            other => Err(conversion(self, other)),
        }
    }

    fn from_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(s) if *s == self.true_value => Ok(Value::Bool(true)),
            Value::Text(s) if *s == self.false_value => Ok(Value::Bool(false)),
            other => Err(conversion(self, other)),
        }
    }
}

/// Decimal amounts stored as scaled integers (e.g. currency in cents).
#[derive(Debug, Clone)]
pub struct ScaleAdapter {
    pub factor: i64,
}

impl ValueAdapter for ScaleAdapter {
    fn name(&self) -> &str {
        "scale"
    }

    fn to_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => i
                .checked_mul(self.factor)
                .map(Value::Int)
                .ok_or_else(|| conversion(self, value)),
            Value::Float(f) => Ok(Value::Int((f * self.factor as f64).round() as i64)),
            other => Err(conversion(self, other)),
        }
    }

    fn from_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Int(i) => Ok(Value::Float(*i as f64 / self.factor as f64)),
            other => Err(conversion(self, other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpperCaseAdapter;

impl ValueAdapter for UpperCaseAdapter {
    fn name(&self) -> &str {
        "upper_case"
    }

    fn to_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        match value {
            Value::Null => Ok(Value::Null),
            Value::Text(s) => Ok(Value::Text(s.to_uppercase())),
            other => Err(conversion(self, other)),
        }
    }

    fn from_storage(&self, value: &Value) -> Result<Value, AdapterError> {
        Ok(value.clone())
    }
}

fn conversion(adapter: &dyn ValueAdapter, value: &Value) -> AdapterError {
    AdapterError::Conversion {
        adapter: adapter.name().to_string(),
        value: value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_flag_round_trip() {
        let adapter = AdapterSpec::BoolFlag {
            true_value: "Y".into(),
            false_value: "N".into(),
        }
        .build();
        assert_eq!(
            adapter.to_storage(&Value::Bool(true)).unwrap(),
            Value::Text("Y".into())
        );
        assert_eq!(
            adapter.from_storage(&Value::Text("N".into())).unwrap(),
            Value::Bool(false)
        );
        assert!(adapter.to_storage(&Value::Int(3)).is_err());
    }

    #[test]
    fn test_scale_rounds_floats() {
        let adapter = ScaleAdapter { factor: 100 };
        assert_eq!(
            adapter.to_storage(&Value::Float(12.25)).unwrap(),
            Value::Int(1225)
        );
        assert_eq!(
            adapter.from_storage(&Value::Int(250)).unwrap(),
            Value::Float(2.5)
        );
    }
}

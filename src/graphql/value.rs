//! The resolver-facing value sum type. Resolvers return `Value`, never a
//! concrete Rust struct, so the executor can walk arbitrary schemas without
//! generic parameters leaking into the public API.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    List(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Enum(String),
}

impl Value {
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Int(n) => serde_json::json!(n),
            Value::Float(n) => serde_json::json!(n),
            Value::String(s) | Value::Enum(s) => serde_json::Value::String(s),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::List(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(fields) => {
                serde_json::Value::Object(fields.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_nested_structures_to_json() {
        let mut obj = BTreeMap::new();
        obj.insert("id".to_string(), Value::Int(1));
        obj.insert("tags".to_string(), Value::List(vec![Value::String("a".to_string())]));
        let json: serde_json::Value = Value::Object(obj).into();
        assert_eq!(json, serde_json::json!({"id": 1, "tags": ["a"]}));
    }
}

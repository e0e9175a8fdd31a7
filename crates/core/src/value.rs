//! Closed free-form value type for event payloads and activity metadata.
//!
//! Mirrors the defensive `getStringPayload`/`getMapPayload`/`getSlicePayload`
//! helpers from the source system: extractors never panic and return a zero
//! value on type mismatch or missing key.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A free-form value, closed over the variants this system actually needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(n) => Some(*n),
            Value::F64(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(f) => Some(*f),
            Value::I64(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }
}

/// A free-form map, the payload type carried by events and activity metadata.
pub type ValueMap = BTreeMap<String, Value>;

/// Defensive extraction helpers — missing/mistyped keys yield zero values,
/// never an error, matching the source's payload-extraction behavior.
pub trait ValueMapExt {
    fn get_string(&self, key: &str) -> String;
    fn get_opt_string(&self, key: &str) -> Option<String>;
    fn get_bool(&self, key: &str) -> bool;
    fn get_i64(&self, key: &str) -> i64;
    fn get_map(&self, key: &str) -> ValueMap;
    fn get_list(&self, key: &str) -> Vec<Value>;
}

impl ValueMapExt for ValueMap {
    fn get_string(&self, key: &str) -> String {
        self.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_default()
    }

    fn get_opt_string(&self, key: &str) -> Option<String> {
        self.get(key).and_then(Value::as_str).map(str::to_string)
    }

    fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    fn get_i64(&self, key: &str) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(0)
    }

    fn get_map(&self, key: &str) -> ValueMap {
        self.get(key).and_then(Value::as_map).cloned().unwrap_or_default()
    }

    fn get_list(&self, key: &str) -> Vec<Value> {
        self.get(key)
            .and_then(Value::as_list)
            .map(|s| s.to_vec())
            .unwrap_or_default()
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::I64(i)
                } else {
                    Value::F64(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(a) => Value::List(a.into_iter().map(Value::from).collect()),
            serde_json::Value::Object(o) => {
                Value::Map(o.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::I64(n) => serde_json::Value::from(n),
            Value::F64(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s),
            Value::List(l) => serde_json::Value::Array(l.into_iter().map(Into::into).collect()),
            Value::Map(m) => {
                serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_yields_zero_values() {
        let map = ValueMap::new();
        assert_eq!(map.get_string("x"), "");
        assert!(!map.get_bool("x"));
        assert_eq!(map.get_i64("x"), 0);
        assert!(map.get_map("x").is_empty());
        assert!(map.get_list("x").is_empty());
    }

    #[test]
    fn mistyped_key_yields_zero_value() {
        let mut map = ValueMap::new();
        map.insert("x".to_string(), Value::Bool(true));
        assert_eq!(map.get_string("x"), "");
        assert_eq!(map.get_i64("x"), 0);
    }

    #[test]
    fn get_opt_string_is_none_when_absent_or_mistyped() {
        let mut map = ValueMap::new();
        assert!(map.get_opt_string("x").is_none());
        map.insert("x".to_string(), Value::Bool(true));
        assert!(map.get_opt_string("x").is_none());
        map.insert("y".to_string(), Value::String("hi".to_string()));
        assert_eq!(map.get_opt_string("y").as_deref(), Some("hi"));
    }

    #[test]
    fn json_roundtrip() {
        let json = serde_json::json!({"a": 1, "b": [true, null, "s"], "c": {"d": 1.5}});
        let value: Value = json.clone().into();
        let back: serde_json::Value = value.into();
        assert_eq!(json, back);
    }
}

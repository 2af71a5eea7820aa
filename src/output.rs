//! JSON interop for expression values.
//!
//! Converts between [`Value`] and [`serde_json::Value`] so hosts can seed
//! evaluation contexts from JSON and print results back out. The mapping is
//! lossy in exactly two places: `Undefined` and functions have no JSON form
//! and serialize as `null`.
//!
//! # Examples
//!
//! ```
//! use fennel::output::{from_json, to_json};
//! use fennel::value::Value;
//!
//! let value = from_json(&serde_json::json!({"a": [1, 2]}));
//! assert_eq!(to_json(&value), r#"{"a":[1,2]}"#);
//! ```

use serde_json::{Map, Number};

use crate::value::{ArrayRef, ObjectRef, Value};

/// Builds a [`Value`] tree from parsed JSON. Whole numbers become
/// `Integer`, everything else maps structurally.
pub fn from_json(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_json::Value::String(s) => Value::String(s.clone()),
        serde_json::Value::Array(items) => {
            Value::Array(ArrayRef::from_vec(items.iter().map(from_json).collect()))
        }
        serde_json::Value::Object(entries) => {
            let object = ObjectRef::new();
            for (key, value) in entries {
                object.set(key, from_json(value));
            }
            Value::Object(object)
        }
    }
}

/// Converts a [`Value`] into JSON. `Undefined` and functions become
/// `null`; non-finite floats also become `null`, as JSON has no NaN or
/// infinity.
pub fn to_json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Undefined | Value::Null | Value::Function(_) => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::Number((*n).into()),
        Value::Float(n) => Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Array(arr) => {
            serde_json::Value::Array(arr.to_vec().iter().map(to_json_value).collect())
        }
        Value::Object(obj) => {
            let mut entries: Vec<(String, Value)> = obj.entries();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            let mut map = Map::new();
            for (key, value) in entries {
                map.insert(key, to_json_value(&value));
            }
            serde_json::Value::Object(map)
        }
    }
}

/// Compact JSON text, with object keys sorted for deterministic output.
pub fn to_json(value: &Value) -> String {
    to_json_value(value).to_string()
}

/// Pretty-printed JSON text with sorted object keys.
pub fn to_json_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(&to_json_value(value)).unwrap_or_else(|_| "null".to_string())
}

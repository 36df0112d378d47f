//! Emptiness rules behind the `nothing` flag.
//!
//! A response counts as "nothing" when it is an empty sequence or a falsy
//! scalar. The test runs on the serialized response value so data types need
//! no extra trait; objects are never nothing, scalars follow JSON
//! truthiness.

use serde_json::Value;

/// Returns true when the serialized response counts as "nothing".
pub fn is_nothing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => {
            n.as_f64().map(|f| f == 0.0).unwrap_or(false)
                || n.as_i64().map(|i| i == 0).unwrap_or(false)
                || n.as_u64().map(|u| u == 0).unwrap_or(false)
        }
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(_) => false,
    }
}

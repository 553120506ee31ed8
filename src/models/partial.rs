//! Partial-update payload handling.
//!
//! Edit endpoints merge only the fields a client sends. Any field whose JSON value is
//! falsy (`null`, `false`, `0` or `""`) is dropped before the merge, so an edit can
//! never reset a field to zero or empty. Arrays and objects are always kept, even
//! when empty.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::errors::AppError;

/// Returns true for the JSON values an edit treats as "not provided".
pub fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Drop every top-level falsy field from an edit payload.
pub fn strip_falsy(fields: Map<String, Value>) -> Map<String, Value> {
    fields
        .into_iter()
        .filter(|(_, value)| !is_falsy(value))
        .collect()
}

/// Strip falsy fields, then deserialize the remainder into a typed update request.
pub fn parse_partial<T: DeserializeOwned>(payload: Value) -> Result<T, AppError> {
    match payload {
        Value::Object(fields) => Ok(serde_json::from_value(Value::Object(strip_falsy(
            fields,
        )))?),
        _ => Err(AppError::BadRequest(
            "Request body must be a JSON object".to_string(),
        )),
    }
}

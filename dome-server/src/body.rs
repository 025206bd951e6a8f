//! Helpers for pulling typed fields out of the free-form JSON body
//! (`bodyfields` in the original), returning `DomeError::BadRequest`
//! on a missing or mistyped key rather than a fixed struct-per-verb.

use dome_core::{DomeError, Result};
use serde_json::Value;

pub fn require_str<'a>(body: &'a Value, key: &str) -> Result<&'a str> {
    body.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DomeError::BadRequest(format!("missing or empty field: {key}")))
}

pub fn opt_str<'a>(body: &'a Value, key: &str) -> Option<&'a str> {
    body.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn require_i64(body: &Value, key: &str) -> Result<i64> {
    body.get(key)
        .and_then(Value::as_i64)
        .ok_or_else(|| DomeError::BadRequest(format!("missing or non-integer field: {key}")))
}

pub fn opt_i64(body: &Value, key: &str) -> Option<i64> {
    body.get(key).and_then(Value::as_i64)
}

pub fn opt_u32(body: &Value, key: &str) -> Option<u32> {
    body.get(key).and_then(Value::as_u64).map(|v| v as u32)
}

pub fn opt_bool(body: &Value, key: &str) -> Option<bool> {
    body.get(key).and_then(Value::as_bool)
}

pub fn opt_i64_vec(body: &Value, key: &str) -> Option<Vec<i64>> {
    body.get(key).and_then(Value::as_array).map(|arr| {
        arr.iter()
            .filter_map(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .collect()
    })
}

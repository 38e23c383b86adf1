//! Canonical key encoding for map and object member access

use super::Value;
use crate::error::{EngineError, Result};
use crate::heap::Heap;

/// Convert a key value to its canonical string encoding.
///
/// Strings are used as-is, integers in decimal, floats in their shortest
/// round-trip form, booleans as `1`/`0` and dates as microseconds. Any
/// other handle is a type error.
pub fn canonical_key(heap: &Heap, value: &Value) -> Result<String> {
    match value {
        Value::String(id) => heap.string_text(*id),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        Value::Date(us) => Ok(us.to_string()),
        other => Err(EngineError::type_error("string key", other)),
    }
}

//! Purpose: Rename the type discriminator key at every depth of a JSON value.
//! Exports: `rename_key`, `to_engine`, `from_engine`.
//! Role: Callers write `_`, tdjson expects `@type`; this is the only place that maps them.
//! Invariants: Only object keys equal to `from` are renamed; values are never touched.

use serde_json::{Map, Value};

pub(crate) const CALLER_TYPE_KEY: &str = "_";
pub(crate) const ENGINE_TYPE_KEY: &str = "@type";

pub(crate) fn rename_key(from: &str, to: &str, value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(rename_in_map(from, to, map)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|item| rename_key(from, to, item))
                .collect(),
        ),
        other => other,
    }
}

pub(crate) fn rename_in_map(from: &str, to: &str, map: Map<String, Value>) -> Map<String, Value> {
    map.into_iter()
        .map(|(key, value)| {
            let key = if key == from { to.to_string() } else { key };
            (key, rename_key(from, to, value))
        })
        .collect()
}

pub(crate) fn to_engine(value: Value) -> Value {
    rename_key(CALLER_TYPE_KEY, ENGINE_TYPE_KEY, value)
}

pub(crate) fn from_engine(value: Value) -> Value {
    rename_key(ENGINE_TYPE_KEY, CALLER_TYPE_KEY, value)
}

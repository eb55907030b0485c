//! JSON and JSON Lines record readers shared by the KB and inventory
//! importers.

use anyhow::{bail, Context, Result};
use serde_json::Value;

/// Keys whose array value holds the actual records of a wrapped export.
pub const WRAPPER_KEYS: &[&str] = &[
    "articles",
    "computers",
    "mobile_devices",
    "devices",
    "assets",
    "records",
    "items",
    "results",
    "data",
];

/// Records parsed from a JSON Lines file.
#[derive(Debug, Default)]
pub struct JsonlRecords {
    pub values: Vec<Value>,
    /// Non-empty lines that were not valid JSON.
    pub malformed: usize,
}

/// Parse one JSON value per non-empty line.
///
/// Malformed lines are counted and skipped. A file where every non-empty line
/// is malformed is an error.
pub fn parse_jsonl(content: &str) -> Result<JsonlRecords> {
    let mut out = JsonlRecords::default();
    let mut first_error = None;

    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim().trim_start_matches('\u{feff}');
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(Value::Array(items)) => out.values.extend(items),
            Ok(value) => out.values.push(value),
            Err(e) => {
                out.malformed += 1;
                first_error.get_or_insert_with(|| format!("line {}: {}", lineno + 1, e));
            }
        }
    }

    if out.values.is_empty() && out.malformed > 0 {
        bail!(
            "no valid JSON lines ({} malformed, first at {})",
            out.malformed,
            first_error.unwrap_or_default()
        );
    }
    Ok(out)
}

/// Parse a JSON document into its records: array elements, the array under a
/// wrapper key, or the single object itself.
pub fn parse_json(content: &str) -> Result<Vec<Value>> {
    let value: Value = serde_json::from_str(content.trim_start_matches('\u{feff}'))
        .context("invalid JSON document")?;
    Ok(unwrap_records(value))
}

pub fn unwrap_records(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let wrapper = WRAPPER_KEYS
                .iter()
                .find(|k| matches!(map.get(**k), Some(Value::Array(_))));
            match wrapper.and_then(|k| map.remove(*k)) {
                Some(Value::Array(items)) => items,
                _ => vec![Value::Object(map)],
            }
        }
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// Flatten nested objects into dotted keys with string values.
///
/// Arrays of scalars are joined with `", "`; arrays of objects are indexed
/// (`devices.0.serial`). Nulls and empty strings are dropped.
pub fn flatten(value: &Value) -> Vec<(String, String)> {
    let mut out = Vec::new();
    flatten_into("", value, &mut out);
    out
}

fn flatten_into(prefix: &str, value: &Value, out: &mut Vec<(String, String)>) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten_into(&join(k), v, out);
            }
        }
        Value::Array(items) if items.iter().all(|v| !v.is_object() && !v.is_array()) => {
            let joined = items
                .iter()
                .filter_map(scalar_text)
                .collect::<Vec<_>>()
                .join(", ");
            if !joined.is_empty() && !prefix.is_empty() {
                out.push((prefix.to_string(), joined));
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_into(&join(&i.to_string()), v, out);
            }
        }
        scalar => {
            if let Some(text) = scalar_text(scalar) {
                let key = if prefix.is_empty() { "value" } else { prefix };
                out.push((key.to_string(), text));
            }
        }
    }
}

/// String form of a scalar; `None` for null, empty strings, and containers.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Lowercase a header or key and collapse separators to `_`
/// (`"Serial Number"` → `"serial_number"`).
pub fn normalize_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut pending_sep = false;
    for c in key.chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

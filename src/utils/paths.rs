//! Dotted-path lookups into JSON documents (`"behavior.resume_downloads"`).
//!
//! Segment criteria and optimization conditions both address their inputs this
//! way, which keeps the rule tables plain data.

use serde_json::Value;

pub fn resolve<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|part| !part.is_empty())
        .try_fold(document, |current, part| match current {
            Value::Object(map) => map.get(part),
            Value::Array(items) => part.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Numeric view of a path. Booleans count as 0/1 so thresholds work on flags.
pub fn resolve_f64(document: &Value, path: &str) -> Option<f64> {
    match resolve(document, path)? {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

//! Canonical JSON for commit hashing.
//!
//! The hash input must be byte-identical on every peer, so it is produced
//! here rather than by `serde_json`'s default writer:
//! - compact, no whitespace between tokens
//! - object keys sorted lexicographically at every depth
//! - array order preserved (parent order is significant)

use serde_json::{Value, json};

/// Render `value` as canonical JSON.
#[must_use]
pub fn canonicalize_json(value: &Value) -> String {
    let mut buf = String::new();
    write_canonical(value, &mut buf);
    buf
}

/// Canonical hash input for a commit: `{"contents":<b64>,"parents":[...]}`.
#[must_use]
pub fn commit_hash_input(parents: &[&str], contents_b64: &str) -> String {
    canonicalize_json(&json!({
        "parents": parents,
        "contents": contents_b64,
    }))
}

fn write_canonical(value: &Value, buf: &mut String) {
    match value {
        Value::Null => buf.push_str("null"),
        Value::Bool(b) => buf.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => buf.push_str(&n.to_string()),
        // Value's Display applies serde_json's string escaping.
        Value::String(_) => buf.push_str(&value.to_string()),
        Value::Array(items) => {
            buf.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                write_canonical(item, buf);
            }
            buf.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            buf.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    buf.push(',');
                }
                buf.push_str(&Value::String(key.clone()).to_string());
                buf.push(':');
                if let Some(val) = map.get(key) {
                    write_canonical(val, buf);
                }
            }
            buf.push('}');
        }
    }
}

//! Structural signature extraction.
//!
//! # Signature Grammar
//! ```text
//! null            → null
//! string          → string
//! number          → number
//! boolean         → boolean
//! []              → []
//! [v, ...]        → [sig(v)]            first element only
//! {k: v, ...}     → {k1:sig(v1),...}    keys sorted
//! depth > MAX     → MAX_DEPTH
//! ```
//!
//! Heterogeneous arrays collapse to the shape of their first element. This is
//! a known imprecision kept for speed.
//!
//! Keys are written bare unless they contain grammar characters
//! (`:,{}[]"\\`); those are written as quoted JSON strings.

use serde_json::Value;

/// Deepest level that is still descended into. The root is level 0.
pub const MAX_DEPTH: usize = 10;

/// Emitted in place of any value nested deeper than [`MAX_DEPTH`].
pub const MAX_DEPTH_SENTINEL: &str = "MAX_DEPTH";

/// Build the canonical structural signature of `value`.
pub fn structure_signature(value: &Value) -> String {
    let mut out = String::with_capacity(64);
    write_structure(value, 0, &mut out);
    out
}

fn write_structure(value: &Value, depth: usize, out: &mut String) {
    if depth > MAX_DEPTH {
        out.push_str(MAX_DEPTH_SENTINEL);
        return;
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(_) => out.push_str("boolean"),
        Value::Number(_) => out.push_str("number"),
        Value::String(_) => out.push_str("string"),
        Value::Array(items) => match items.first() {
            None => out.push_str("[]"),
            Some(first) => {
                out.push('[');
                write_structure(first, depth + 1, out);
                out.push(']');
            }
        },
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_key(key, out);
                out.push(':');
                write_structure(child, depth + 1, out);
            }
            out.push('}');
        }
    }
}

fn write_key(key: &str, out: &mut String) {
    if key.contains([':', ',', '{', '}', '[', ']', '"', '\\']) {
        out.push_str(&Value::String(key.to_string()).to_string());
    } else {
        out.push_str(key);
    }
}

//! JSON-style serialization that tolerates cycles and failing values.

use std::collections::HashSet;

use crate::value::{format_number, InspectError, Value};

/// Marker substituted for any object reference met more than once.
pub const CIRCULAR: &str = "[Circular]";

const INDENT: &str = "  ";

/// Serialize `value` as pretty JSON with two-space indentation.
///
/// Any object or array that has already been visited during this call is
/// replaced by the string `"[Circular]"`. The seen-set is keyed by
/// allocation identity and is not path-scoped, so a shared (non-cyclic)
/// reference also collapses on its second occurrence. Big integers become
/// their decimal string. If an [`Inspect`](crate::Inspect) implementation
/// fails anywhere in the tree, the whole call falls back to the root value's
/// default string form.
pub fn safe_serialize(value: &Value) -> String {
    let mut ser = Serializer::default();
    match ser.write(value, 0) {
        Ok(Some(json)) => json,
        // A bare `undefined` (or symbol) has no JSON form
        Ok(None) => "undefined".to_string(),
        Err(_) => value.to_string(),
    }
}

#[derive(Default)]
struct Serializer {
    seen: HashSet<usize>,
}

impl Serializer {
    /// `Ok(None)` means the value is skipped (`undefined`, symbols).
    fn write(&mut self, value: &Value, depth: usize) -> Result<Option<String>, InspectError> {
        let json = match value {
            Value::Undefined | Value::Symbol(_) => return Ok(None),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) if n.is_finite() => format_number(*n),
            Value::Number(_) => "null".to_string(),
            Value::BigInt(n) => quote(&n.to_string()),
            Value::String(s) => quote(s),
            // Error objects carry no enumerable properties.
            Value::Error { .. } => "{}".to_string(),
            Value::Array(arr) => {
                if !self.seen.insert(arr.id()) {
                    return Ok(Some(quote(CIRCULAR)));
                }
                let mut parts = Vec::new();
                for item in arr.items() {
                    let part = self.write(&item, depth + 1)?;
                    parts.push(part.unwrap_or_else(|| "null".to_string()));
                }
                wrap('[', ']', parts, depth)
            }
            Value::Object(obj) => {
                if !self.seen.insert(obj.id()) {
                    return Ok(Some(quote(CIRCULAR)));
                }
                let mut parts = Vec::new();
                for (key, child) in obj.entries() {
                    if let Some(part) = self.write(&child, depth + 1)? {
                        parts.push(format!("{}: {}", quote(&key), part));
                    }
                }
                wrap('{', '}', parts, depth)
            }
            Value::Opaque(inner) => {
                let id = std::sync::Arc::as_ptr(inner) as *const () as usize;
                if !self.seen.insert(id) {
                    return Ok(Some(quote(CIRCULAR)));
                }
                let view = inner.inspect()?;
                return self.write(&view, depth);
            }
        };
        Ok(Some(json))
    }
}

fn quote(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

fn wrap(open: char, close: char, parts: Vec<String>, depth: usize) -> String {
    if parts.is_empty() {
        return format!("{}{}", open, close);
    }
    let inner_indent = INDENT.repeat(depth + 1);
    let outer_indent = INDENT.repeat(depth);
    let body = parts
        .iter()
        .map(|p| format!("{}{}", inner_indent, p))
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{}\n{}\n{}{}", open, body, outer_indent, close)
}

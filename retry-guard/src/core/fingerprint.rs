//! Stable identity for a tool invocation.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Identity key of a `(tool_name, parameters)` pair.
///
/// Rendered as `<tool_name>:<canonical-json>` where object keys are sorted at
/// every depth. Array order and scalar values are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the fingerprint of a tool call.
///
/// `null` parameters are treated as an empty object, so a call made without
/// arguments and one made with `{}` share an identity.
pub fn fingerprint(tool_name: &str, parameters: &Value) -> Fingerprint {
    let mut out = String::with_capacity(tool_name.len() + 16);
    out.push_str(tool_name);
    out.push(':');
    match parameters {
        Value::Null => out.push_str("{}"),
        other => write_canonical(other, &mut out),
    }
    Fingerprint(out)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, child)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // Display on a JSON string value yields the quoted, escaped form.
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(child, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

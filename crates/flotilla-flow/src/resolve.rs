//! Reference and template resolution over aggregation input trees.

use serde_json::Value;

use crate::context::{truthy, ExecutionContext};
use crate::value::{is_reference, is_step};

/// Resolve a step's input tree against the current context.
///
/// - A mapping with a `ref` key is replaced by the dotted-path lookup;
///   `invert: true` coerces the result to its logical negation.
/// - A string containing `{{…}}` has each occurrence substituted; missing
///   values stringify to the empty string (templates are for path
///   construction, so they never fail).
/// - A mapping with a `proc` key is a nested step definition and is not
///   descended into — the receiving procedure may execute it later.
/// - Other mappings and sequences are descended recursively.
pub fn resolve_input(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::Object(obj) => {
            if is_step(value) {
                return value.clone();
            }
            if is_reference(value) {
                let path = obj.get("ref").and_then(Value::as_str).unwrap_or_default();
                let looked_up = ctx.resolve_path(path);
                let invert = obj
                    .get("invert")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                return if invert {
                    Value::Bool(!truthy(&looked_up))
                } else {
                    looked_up
                };
            }
            Value::Object(
                obj.iter()
                    .map(|(k, v)| (k.clone(), resolve_input(v, ctx)))
                    .collect(),
            )
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| resolve_input(v, ctx)).collect())
        }
        Value::String(s) if s.contains("{{") => Value::String(substitute_templates(s, ctx)),
        other => other.clone(),
    }
}

/// Replace each `{{path}}` occurrence with the stringified lookup.
fn substitute_templates(template: &str, ctx: &ExecutionContext) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        rest = &rest[open + 2..];
        match rest.find("}}") {
            Some(close) => {
                let path = rest[..close].trim();
                out.push_str(&stringify(&ctx.resolve_path(path)));
                rest = &rest[close + 2..];
            }
            None => {
                // Unterminated marker: keep it verbatim.
                out.push_str("{{");
            }
        }
    }
    out.push_str(rest);
    out
}

/// Template stringification: refs carry type, templates flatten to text.
fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

//! The aggregation value model.
//!
//! An aggregation is a `serde_json::Value` tree in which two mapping shapes
//! are special:
//! - a mapping with a `ref` key is a *reference* into the execution context,
//! - a mapping with a `proc` key is a *step* naming a procedure to run.
//!
//! Everything else is literal data, except strings, which may carry
//! `{{path}}` template substitutions.

use serde_json::{json, Value};

use crate::error::{FlowError, FlowResult};

/// Reserved `proc` namespace of the built-in control operators.
pub const CONTROL_NAMESPACE: &str = "client";

/// Context key `client.map` binds each element under. Overwritten on every
/// iteration — nested maps must rebind via a named step.
pub const MAP_ITEM_KEY: &str = "item";

/// Scheduling tag of a step declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WhenTag {
    /// Resolve and execute in place (the default).
    Immediate,
    /// Do not execute; carry the step as a value to the parent procedure
    /// (e.g. a graph traversal that runs it per node).
    Parent,
    /// Pass the step value through unevaluated.
    Never,
    /// Gate by a custom context tag. No shipped procedure pushes one, so
    /// custom-tagged steps behave like `Never`.
    Custom(String),
}

impl WhenTag {
    pub fn parse(tag: Option<&str>) -> Self {
        match tag {
            None | Some("immediate") => Self::Immediate,
            Some("parent") => Self::Parent,
            Some("never") => Self::Never,
            Some(other) => Self::Custom(other.to_string()),
        }
    }
}

/// Parsed form of a step mapping.
#[derive(Debug, Clone)]
pub struct StepDef {
    /// Dotted procedure path.
    pub proc_path: String,
    pub input: Value,
    /// Binds the result into the execution context when present.
    pub name: Option<String>,
    pub when: WhenTag,
}

impl StepDef {
    /// Parse a step mapping. `proc` may be a dotted string or a sequence of
    /// identifiers (`["git", "add"]` ≡ `"git.add"`).
    pub fn from_value(value: &Value) -> FlowResult<Self> {
        let obj = value.as_object().ok_or_else(|| FlowError::InvalidStep {
            detail: "step must be a mapping".to_string(),
        })?;

        let proc_path = match obj.get("proc") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Array(parts)) if !parts.is_empty() => {
                let mut segments = Vec::with_capacity(parts.len());
                for part in parts {
                    match part.as_str() {
                        Some(s) if !s.is_empty() => segments.push(s),
                        _ => {
                            return Err(FlowError::InvalidStep {
                                detail: format!("non-identifier proc segment: {part}"),
                            })
                        }
                    }
                }
                segments.join(".")
            }
            other => {
                return Err(FlowError::InvalidStep {
                    detail: format!("proc must be a path, got {other:?}"),
                })
            }
        };

        let name = obj.get("name").and_then(Value::as_str).map(str::to_string);
        let when = WhenTag::parse(obj.get("when").and_then(Value::as_str));

        Ok(Self {
            proc_path,
            input: obj.get("input").cloned().unwrap_or(Value::Null),
            name,
            when,
        })
    }
}

/// Whether a value is a step mapping.
pub fn is_step(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.contains_key("proc"))
        .unwrap_or(false)
}

/// Whether a value is a reference mapping.
pub fn is_reference(value: &Value) -> bool {
    value
        .as_object()
        .map(|o| o.contains_key("ref") && !o.contains_key("proc"))
        .unwrap_or(false)
}

/// Build a step value.
pub fn step(proc_path: &str, input: Value) -> Value {
    json!({ "proc": proc_path, "input": input })
}

/// Build a step value that binds its result under `name`.
pub fn named_step(name: &str, proc_path: &str, input: Value) -> Value {
    json!({ "proc": proc_path, "input": input, "name": name })
}

/// Build a step with an explicit scheduling tag.
pub fn step_when(proc_path: &str, input: Value, when: &str) -> Value {
    json!({ "proc": proc_path, "input": input, "when": when })
}

/// Build a reference value.
pub fn reference(path: &str) -> Value {
    json!({ "ref": path })
}

/// Build a logically-negated reference value.
pub fn inverted_reference(path: &str) -> Value {
    json!({ "ref": path, "invert": true })
}

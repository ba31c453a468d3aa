//! The execution context an aggregation runs against.
//!
//! A flat mapping from identifier to result: the top-level `input` plus
//! every named step's result. Names always bind at the top level of the
//! running aggregation. Sequential operators mutate the context in place;
//! branching operators (`client.parallel`) hand each task its own copy, so
//! divergent bindings never leak across siblings.

use std::collections::HashMap;

use serde_json::Value;

/// Mapping from identifier to settled result.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    vars: HashMap<String, Value>,
}

impl ExecutionContext {
    /// Fresh context with `input` bound as the top-level input.
    pub fn root(input: Value) -> Self {
        let mut ctx = Self::default();
        ctx.bind("input", input);
        ctx
    }

    /// Bind a named result. Later bindings shadow earlier ones.
    pub fn bind(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Resolve a dotted path. The first segment is a context lookup, the
    /// rest descend through mappings. Any miss — unknown name, non-mapping
    /// intermediate, absent key — yields `Value::Null`, the unresolved
    /// marker, never an error.
    pub fn resolve_path(&self, path: &str) -> Value {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return Value::Null;
        };
        let Some(mut current) = self.vars.get(first) else {
            return Value::Null;
        };
        for segment in segments {
            match current.get(segment) {
                Some(next) => current = next,
                None => return Value::Null,
            }
        }
        current.clone()
    }
}

/// Logical truthiness of an aggregation value: null, false, zero, and the
/// empty string are falsy; everything else (including empty containers) is
/// truthy.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

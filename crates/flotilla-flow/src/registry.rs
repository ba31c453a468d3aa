//! Process-wide procedure registry.
//!
//! Maps dotted procedure paths to either a native handler (a function
//! value) or an aggregation (a data value) — a tagged variant, not
//! inheritance. Lookup is exact; there is no prefix matching. The registry
//! is intended to be fully populated at process start: a concurrent
//! `replace` registration is not guaranteed to be visible to in-flight
//! workflows.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::error::{FlowError, FlowResult};
use crate::interpreter::CallContext;

/// Boxed future returned by native handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = FlowResult<Value>> + Send>>;

/// A native procedure implementation. Receives the resolved input and a
/// [`CallContext`] for recursive invocation.
pub type NativeHandler = Arc<dyn Fn(Value, CallContext) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure as a [`NativeHandler`].
pub fn handler<F, Fut>(f: F) -> NativeHandler
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = FlowResult<Value>> + Send + 'static,
{
    Arc::new(move |input, ctx| Box::pin(f(input, ctx)))
}

/// What a registered path dispatches to.
#[derive(Clone)]
pub enum ProcedureKind {
    Handler(NativeHandler),
    Aggregation(Value),
}

impl std::fmt::Debug for ProcedureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Handler(_) => f.write_str("Handler(..)"),
            Self::Aggregation(_) => f.write_str("Aggregation(..)"),
        }
    }
}

/// Descriptive metadata attached at registration.
#[derive(Debug, Clone, Default)]
pub struct ProcedureMetadata {
    pub description: String,
    pub tags: Vec<String>,
}

/// One registry entry.
#[derive(Debug, Clone)]
pub struct ProcedureRecord {
    pub path: String,
    pub kind: ProcedureKind,
    pub metadata: ProcedureMetadata,
}

/// Registration options.
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Overwrite an existing entry instead of failing.
    pub replace: bool,
    pub metadata: Option<ProcedureMetadata>,
}

/// The process-wide path → procedure mapping.
#[derive(Default)]
pub struct ProcedureRegistry {
    entries: RwLock<HashMap<String, ProcedureRecord>>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native handler at `path`.
    pub fn register_handler(
        &self,
        path: &str,
        handler: NativeHandler,
        options: RegisterOptions,
    ) -> FlowResult<()> {
        self.insert(path, ProcedureKind::Handler(handler), options)
    }

    /// Register an aggregation definition at `path`.
    pub fn register_aggregation(
        &self,
        path: &str,
        aggregation: Value,
        options: RegisterOptions,
    ) -> FlowResult<()> {
        self.insert(path, ProcedureKind::Aggregation(aggregation), options)
    }

    fn insert(&self, path: &str, kind: ProcedureKind, options: RegisterOptions) -> FlowResult<()> {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(path) && !options.replace {
            return Err(FlowError::AlreadyRegistered {
                path: path.to_string(),
            });
        }
        entries.insert(
            path.to_string(),
            ProcedureRecord {
                path: path.to_string(),
                kind,
                metadata: options.metadata.unwrap_or_default(),
            },
        );
        Ok(())
    }

    /// Exact-path lookup.
    pub fn get(&self, path: &str) -> Option<ProcedureRecord> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(path)
            .cloned()
    }

    /// All registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect();
        paths.sort_unstable();
        paths
    }
}

//! Error taxonomy for aggregation interpretation and dispatch.

use thiserror::Error;

/// Errors produced by the flow layer.
#[derive(Debug, Error)]
pub enum FlowError {
    /// No procedure is registered at the path.
    #[error("procedure not found: {path}")]
    ProcedureNotFound { path: String },

    /// Registration collided without the `replace` flag.
    #[error("procedure already registered: {path}")]
    AlreadyRegistered { path: String },

    /// Aggregation nesting exceeded the interpreter's depth bound.
    #[error("aggregation nesting exceeded {max_depth} levels")]
    AggregationTooDeep { max_depth: usize },

    /// A `client.throw` step raised.
    #[error("{message}")]
    Thrown { message: String },

    /// A value violated a structural rule (e.g. a `visit` parameter that is
    /// neither a procedure path nor a deferred step).
    #[error("reference rule violation: {detail}")]
    RefRuleViolation { detail: String },

    /// A step declaration is malformed.
    #[error("invalid step: {detail}")]
    InvalidStep { detail: String },

    /// A dispatched procedure failed.
    #[error("procedure {path} failed: {message}")]
    ProcedureFailed { path: String, message: String },
}

/// Result type for flow operations.
pub type FlowResult<T> = std::result::Result<T, FlowError>;

impl FlowError {
    /// Wrap an arbitrary error as a procedure failure at `path`.
    pub fn failed(path: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::ProcedureFailed {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

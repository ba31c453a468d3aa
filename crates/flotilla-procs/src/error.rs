//! Error taxonomy for external collaborator calls.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by collaborator backends.
///
/// Failures are raised, never encoded as success-with-error — the one
/// exception is [`crate::pnpm::CommandOutput`], whose contract advertises an
/// explicit success boolean.
#[derive(Debug, Error)]
pub enum ProcError {
    /// Filesystem operation failed.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON file exists but does not parse.
    #[error("invalid JSON in {path}: {detail}")]
    InvalidJson { path: PathBuf, detail: String },

    /// The subprocess could not be spawned at all.
    #[error("failed to spawn `{command}`: {detail}")]
    SpawnFailed { command: String, detail: String },

    /// The subprocess ran and exited non-zero.
    #[error("command `{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The subprocess exceeded its hard per-call timeout and was killed.
    #[error("{phase} timed out after {limit_ms} ms")]
    Timeout { phase: String, limit_ms: u64 },
}

/// Result type for collaborator operations.
pub type ProcResult<T> = std::result::Result<T, ProcError>;

//! Error taxonomy for the workflow library.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by workflow execution.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("cleanup failed at {path}: {detail}")]
    CleanupFailed { path: String, detail: String },

    #[error("install failed: {stderr}")]
    InstallFailed { stderr: String },

    #[error("build failed: {stderr}")]
    BuildFailed { stderr: String },

    #[error("git {phase} failed: {detail}")]
    GitFailed { phase: String, detail: String },

    #[error("clone failed for {url}: {detail}")]
    CloneFailed { url: String, detail: String },

    #[error("target path already exists: {path}")]
    TargetExists { path: PathBuf },

    #[error("missing required argument: {name}")]
    MissingArgument { name: String },

    #[error(transparent)]
    Ecosystem(#[from] flotilla_core::EcosystemError),

    #[error(transparent)]
    Proc(#[from] flotilla_procs::ProcError),

    #[error(transparent)]
    Flow(#[from] flotilla_flow::FlowError),
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_is_visible_in_messages() {
        let err = WorkflowError::GitFailed {
            phase: "push".to_string(),
            detail: "remote rejected".to_string(),
        };
        assert!(err.to_string().contains("push"));

        let err = WorkflowError::CloneFailed {
            url: "github:flotilla/toolkit#main".to_string(),
            detail: "network".to_string(),
        };
        assert!(err.to_string().contains("toolkit"));
    }
}

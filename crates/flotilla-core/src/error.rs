//! Error taxonomy for ecosystem discovery and graph execution.

use std::path::PathBuf;

use thiserror::Error;

/// Errors produced by the orchestration core.
#[derive(Debug, Error)]
pub enum EcosystemError {
    /// The ecosystem manifest file does not exist.
    #[error("ecosystem manifest not found at {path}")]
    ManifestMissing { path: PathBuf },

    /// The manifest exists but does not parse into the expected shape.
    #[error("invalid ecosystem manifest at {path}: {detail}")]
    ManifestInvalid { path: PathBuf, detail: String },

    /// A package was referenced by name but is not part of the scanned set.
    #[error("package not scanned: {name}")]
    PackageNotScanned { name: String },

    /// The dependency graph contains a cycle; build order is undefined.
    #[error("dependency cycle detected involving packages: {nodes:?}")]
    CycleDetected { nodes: Vec<String> },

    /// Bubbled-up collaborator failure.
    #[error(transparent)]
    Proc(#[from] flotilla_procs::ProcError),
}

/// Convenience result alias.
pub type EcosystemResult<T> = std::result::Result<T, EcosystemError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_error_displays_node_names() {
        let err = EcosystemError::CycleDetected {
            nodes: vec!["a".to_string(), "b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains('a') && msg.contains('b'));
    }
}

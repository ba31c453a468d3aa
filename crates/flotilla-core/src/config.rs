//! Ecosystem configuration.

use serde::{Deserialize, Serialize};

/// Settings that identify the ecosystem and its conventions.
///
/// The `owner` is the fixed forge namespace whose git refs count as
/// ecosystem-internal; only those induce graph edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EcosystemConfig {
    /// Forge owner/namespace recognized as the ecosystem's own.
    pub owner: String,
    /// Forge host code used when synthesizing refs (e.g. "github").
    pub host: String,
    /// Branch assumed when a package has no current branch.
    pub primary_branch: String,
    /// Default executor concurrency for graph workflows.
    pub concurrency: usize,
}

impl Default for EcosystemConfig {
    fn default() -> Self {
        Self {
            owner: "flotilla".to_string(),
            host: "github".to_string(),
            primary_branch: "main".to_string(),
            concurrency: 4,
        }
    }
}

impl EcosystemConfig {
    /// npm scope form of the owner, e.g. `@flotilla`.
    pub fn scope(&self) -> String {
        format!("@{}", self.owner)
    }

    /// Full scoped package name, e.g. `@flotilla/toolkit`.
    pub fn scoped_name(&self, name: &str) -> String {
        if name.starts_with('@') {
            name.to_string()
        } else {
            format!("{}/{name}", self.scope())
        }
    }
}

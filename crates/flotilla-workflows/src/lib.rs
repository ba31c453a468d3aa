//! Flotilla Workflow Library
//!
//! The concrete workflows of the orchestrator — install, refresh, pull,
//! new, audit, rename — plus the shared aggregation primitives they are
//! built from and the native adapters that expose the external
//! collaborators (`fs.*`, `shell.exec`, `pnpm.*`, `git.*`) as registered
//! procedures.
//!
//! Call [`register_all`] once at process start; every workflow is then
//! reachable through the interpreter by path.

pub mod audit;
pub mod error;
pub mod install;
pub mod library;
pub mod new;
pub(crate) mod plan;
pub mod pull;
pub mod refresh;
pub mod register;
pub mod rename;

pub use error::{WorkflowError, WorkflowResult};
pub use register::{register_all, ProcSet};

/// Mint a short run identifier for correlating a workflow invocation's logs.
pub(crate) fn new_run_id() -> String {
    format!(
        "run-{}",
        uuid::Uuid::new_v4()
            .to_string()
            .split('-')
            .next()
            .unwrap_or("x")
    )
}

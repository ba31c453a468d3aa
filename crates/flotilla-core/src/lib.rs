//! Flotilla Core Library
//!
//! The workflow kernel of the flotilla orchestrator: manifest + scanner for
//! discovering the ecosystem's packages, a dependency graph of
//! ecosystem-internal edges, a Kahn-style topological leveler, and a
//! leveled parallel executor with bounded concurrency and fail-fast.

pub mod config;
pub mod error;
pub mod executor;
pub mod gitref;
pub mod graph;
pub mod level;
pub mod manifest;
pub mod scanner;
pub mod telemetry;

pub use config::EcosystemConfig;
pub use error::{EcosystemError, EcosystemResult};
pub use executor::{execute_graph, ExecutorOptions, GraphResult, NodeResult};
pub use gitref::{is_internal_ref, GitRef};
pub use graph::{ancestors_of, build_nodes, descendants_of, filter_from_root, DagNode};
pub use level::{build_leveled_graph, LeveledGraph};
pub use manifest::{manifest_path, Manifest, ManifestEntry, ProjectTemplate};
pub use scanner::{PackageDescriptor, ScanReport, Scanner};
pub use telemetry::init_tracing;

/// Flotilla version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

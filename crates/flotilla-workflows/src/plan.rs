//! Shared scan → build → level pipeline for the graph workflows.

use std::path::{Path, PathBuf};

use flotilla_core::{
    build_leveled_graph, build_nodes, EcosystemConfig, GraphResult, LeveledGraph, Manifest,
    NodeResult, ScanReport, Scanner,
};

use crate::error::WorkflowResult;
use crate::register::ProcSet;

/// Everything a graph workflow needs to run.
pub(crate) struct EcosystemPlan {
    pub report: ScanReport,
    pub graph: LeveledGraph,
}

/// Load the manifest, scan its packages, and level the dependency graph.
pub(crate) async fn load_plan(
    procs: &ProcSet,
    config: &EcosystemConfig,
    root: &Path,
) -> WorkflowResult<EcosystemPlan> {
    let manifest = Manifest::load(&procs.fs, root).await?;
    let scanner = Scanner::new(
        std::sync::Arc::clone(&procs.fs),
        std::sync::Arc::clone(&procs.git),
        config.clone(),
    );
    let report = scanner.scan(&manifest, root).await?;
    let graph = build_leveled_graph(build_nodes(&report.packages, config))?;
    Ok(EcosystemPlan { report, graph })
}

/// The ecosystem root directory for a workflow invocation.
pub(crate) fn resolve_root(root_path: &Option<PathBuf>) -> PathBuf {
    root_path.clone().unwrap_or_else(|| PathBuf::from("."))
}

/// Node results ordered by node name for stable output.
pub(crate) fn sorted_results(result: &GraphResult) -> Vec<NodeResult> {
    let mut results: Vec<NodeResult> = result.results.values().cloned().collect();
    results.sort_by(|a, b| a.node.cmp(&b.node));
    results
}

/// Failure summaries (`name: error`) from a graph run.
pub(crate) fn collect_errors(result: &GraphResult) -> Vec<String> {
    let mut errors: Vec<String> = result
        .results
        .values()
        .filter(|r| !r.success && !r.skipped)
        .map(|r| {
            format!(
                "{}: {}",
                r.node,
                r.error.as_deref().unwrap_or("unknown failure")
            )
        })
        .collect();
    errors.sort();
    errors
}

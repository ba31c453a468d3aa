//! The refresh workflow: clean + install + build + commit + push, for one
//! package, a subtree, or the whole ecosystem in dependency order.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::instrument;

use flotilla_core::{
    build_leveled_graph, execute_graph, filter_from_root, DagNode, EcosystemConfig,
    ExecutorOptions, NodeResult,
};
use flotilla_flow::{handler, CallContext, FlowError, FlowResult, ProcedureRegistry, RegisterOptions};

use crate::error::{WorkflowError, WorkflowResult};
use crate::plan::{collect_errors, load_plan, resolve_root, sorted_results};
use crate::register::{parse_input, to_value, ProcSet};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RefreshInput {
    /// Target package; required unless `all`.
    pub package: Option<String>,
    /// Refresh every scanned package.
    pub all: bool,
    /// Refresh the target and its prerequisites.
    pub recursive: bool,
    pub force: bool,
    pub skip_git: bool,
    pub dry_run: bool,
    /// Continue past failures (disables fail-fast).
    pub auto_confirm: bool,
    pub concurrency: Option<usize>,
    pub root_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub success: bool,
    pub run_id: String,
    pub results: Vec<NodeResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub plan: Vec<Vec<String>>,
    pub total_duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

fn single_input(node: &DagNode, input: &RefreshInput) -> Value {
    json!({
        "cwd": node.repo_path,
        "packageName": node.name,
        "force": input.force,
        "skipGit": input.skip_git,
        "dryRun": input.dry_run,
    })
}

/// Run the refresh workflow.
#[instrument(skip_all, fields(all = input.all, recursive = input.recursive, dry_run = input.dry_run))]
pub async fn run(
    procs: &ProcSet,
    config: &EcosystemConfig,
    flow: &CallContext,
    input: RefreshInput,
) -> WorkflowResult<RefreshOutcome> {
    let started = std::time::Instant::now();
    let run_id = crate::new_run_id();
    let root = resolve_root(&input.root_path);

    let plan = load_plan(procs, config, &root).await?;

    // Scope the graph: everything, the requested subtree, or one package.
    let graph = if input.all {
        plan.graph
    } else {
        let name = input
            .package
            .clone()
            .ok_or_else(|| WorkflowError::MissingArgument {
                name: "package".to_string(),
            })?;
        if input.recursive {
            let scoped = filter_from_root(&plan.graph.nodes, &name)?;
            build_leveled_graph(scoped)?
        } else {
            // Single package: a one-node graph keeps the reporting shape
            // identical to the multi-node paths.
            let node = plan.graph.nodes.get(&name).cloned().ok_or(
                flotilla_core::EcosystemError::PackageNotScanned { name },
            )?;
            let mut solo = std::collections::HashMap::new();
            let mut node = node;
            node.dependencies.clear();
            solo.insert(node.name.clone(), node);
            build_leveled_graph(solo)?
        }
    };

    let options = ExecutorOptions {
        concurrency: input.concurrency.unwrap_or(config.concurrency),
        fail_fast: !input.auto_confirm,
        ..ExecutorOptions::default()
    };

    let flow_clone = flow.clone();
    let input_clone = input.clone();
    let result = execute_graph(&graph, options, move |node| {
        let flow = flow_clone.clone();
        let payload = single_input(&node, &input_clone);
        async move {
            flow.call("refresh.single", payload)
                .await
                .map_err(|e| e.to_string())
        }
    })
    .await;

    Ok(RefreshOutcome {
        success: result.success,
        run_id,
        errors: collect_errors(&result),
        results: sorted_results(&result),
        warnings: plan.report.warnings,
        plan: graph.levels.clone(),
        total_duration_ms: started.elapsed().as_millis() as u64,
        completed_at: Utc::now(),
    })
}

/// Register the `refresh` workflow (the per-node `refresh.single` is an
/// aggregation owned by the library module).
pub fn register(
    registry: &Arc<ProcedureRegistry>,
    procs: &ProcSet,
    config: &EcosystemConfig,
) -> FlowResult<()> {
    let procs = procs.clone();
    let config = config.clone();
    registry.register_handler(
        "refresh",
        handler(move |input, ctx| {
            let procs = procs.clone();
            let config = config.clone();
            async move {
                let input: RefreshInput = parse_input("refresh", input)?;
                let outcome = run(&procs, &config, &ctx, input)
                    .await
                    .map_err(|e| FlowError::failed("refresh", e))?;
                Ok(to_value(outcome))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

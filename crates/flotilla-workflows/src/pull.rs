//! The pull workflow: `git pull` across the fleet.
//!
//! Dependency ordering is not semantically required for pulls; the leveled
//! executor is reused for symmetry with install and refresh.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::instrument;

use flotilla_core::{execute_graph, EcosystemConfig, ExecutorOptions, NodeResult};
use flotilla_flow::{handler, CallContext, FlowError, FlowResult, ProcedureRegistry, RegisterOptions};

use crate::error::WorkflowResult;
use crate::plan::{collect_errors, load_plan, resolve_root, sorted_results};
use crate::register::{parse_input, to_value, ProcSet};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PullInput {
    pub remote: Option<String>,
    pub rebase: bool,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub concurrency: Option<usize>,
    pub root_path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub success: bool,
    pub run_id: String,
    pub results: Vec<NodeResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub plan: Vec<Vec<String>>,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_operations: Option<Vec<String>>,
    pub completed_at: DateTime<Utc>,
}

/// Run the pull workflow.
#[instrument(skip_all, fields(dry_run = input.dry_run))]
pub async fn run(
    procs: &ProcSet,
    config: &EcosystemConfig,
    flow: &CallContext,
    input: PullInput,
) -> WorkflowResult<PullOutcome> {
    let started = std::time::Instant::now();
    let run_id = crate::new_run_id();
    let root = resolve_root(&input.root_path);

    let plan = load_plan(procs, config, &root).await?;

    if input.dry_run {
        let planned = plan
            .graph
            .levels
            .iter()
            .flatten()
            .map(|name| format!("git pull ({name})"))
            .collect();
        return Ok(PullOutcome {
            success: true,
            run_id,
            results: Vec::new(),
            errors: Vec::new(),
            warnings: plan.report.warnings,
            plan: plan.graph.levels.clone(),
            total_duration_ms: started.elapsed().as_millis() as u64,
            planned_operations: Some(planned),
            completed_at: Utc::now(),
        });
    }

    let options = ExecutorOptions {
        concurrency: input.concurrency.unwrap_or(config.concurrency),
        fail_fast: !input.continue_on_error,
        ..ExecutorOptions::default()
    };

    let flow_clone = flow.clone();
    let remote = input.remote.clone();
    let rebase = input.rebase;
    let result = execute_graph(&plan.graph, options, move |node| {
        let flow = flow_clone.clone();
        let payload = json!({
            "cwd": node.repo_path,
            "remote": remote,
            "rebase": rebase,
        });
        async move {
            flow.call("git.pull", payload)
                .await
                .map_err(|e| e.to_string())
        }
    })
    .await;

    Ok(PullOutcome {
        success: result.success,
        run_id,
        errors: collect_errors(&result),
        results: sorted_results(&result),
        warnings: plan.report.warnings,
        plan: plan.graph.levels.clone(),
        total_duration_ms: started.elapsed().as_millis() as u64,
        planned_operations: None,
        completed_at: Utc::now(),
    })
}

/// Register the `pull` workflow.
pub fn register(
    registry: &Arc<ProcedureRegistry>,
    procs: &ProcSet,
    config: &EcosystemConfig,
) -> FlowResult<()> {
    let procs = procs.clone();
    let config = config.clone();
    registry.register_handler(
        "pull",
        handler(move |input, ctx| {
            let procs = procs.clone();
            let config = config.clone();
            async move {
                let input: PullInput = parse_input("pull", input)?;
                let outcome = run(&procs, &config, &ctx, input)
                    .await
                    .map_err(|e| FlowError::failed("pull", e))?;
                Ok(to_value(outcome))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

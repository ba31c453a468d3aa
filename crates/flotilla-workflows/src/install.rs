//! The install workflow: clone what is missing, then install and build the
//! whole ecosystem in dependency order.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};

use flotilla_core::{execute_graph, EcosystemConfig, ExecutorOptions, GitRef, NodeResult};
use flotilla_flow::{
    handler, reference, step, CallContext, FlowError, FlowResult, ProcedureRegistry,
    RegisterOptions,
};

use crate::error::WorkflowResult;
use crate::plan::{collect_errors, load_plan, resolve_root, sorted_results};
use crate::register::{parse_input, to_value, ProcSet};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstallInput {
    pub root_path: Option<PathBuf>,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallOutcome {
    pub success: bool,
    pub run_id: String,
    /// Packages cloned because their directory was absent.
    pub cloned: Vec<String>,
    /// Packages already on disk.
    pub skipped: Vec<String>,
    pub results: Vec<NodeResult>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Leveled execution plan (node names per level).
    pub plan: Vec<Vec<String>>,
    pub total_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_operations: Option<Vec<String>>,
    pub completed_at: DateTime<Utc>,
}

/// Run the install workflow.
#[instrument(skip_all, fields(dry_run = input.dry_run))]
pub async fn run(
    procs: &ProcSet,
    config: &EcosystemConfig,
    flow: &CallContext,
    input: InstallInput,
) -> WorkflowResult<InstallOutcome> {
    let started = std::time::Instant::now();
    let run_id = crate::new_run_id();
    let root = resolve_root(&input.root_path);

    let manifest = flotilla_core::Manifest::load(&procs.fs, &root).await?;

    let mut cloned = Vec::new();
    let mut skipped = Vec::new();
    let mut errors = Vec::new();
    let mut planned = Vec::new();

    // Clone pass: every manifest entry whose directory is absent.
    for (name, entry) in &manifest.packages {
        let dir = manifest.base_dir(&root).join(&entry.path);
        if procs.fs.exists(&dir).await {
            skipped.push(name.clone());
            continue;
        }

        let Some(git_ref) = GitRef::parse(&entry.repo) else {
            errors.push(format!("{name}: unparseable repo ref {}", entry.repo));
            continue;
        };

        if input.dry_run {
            planned.push(format!("git clone {} {}", git_ref.clone_url(), dir.display()));
            continue;
        }

        info!(package = %name, url = %git_ref.clone_url(), "cloning");
        match procs
            .git
            .clone_repo(&git_ref.clone_url(), &dir, Some(&git_ref.ref_name))
            .await
        {
            Ok(()) => cloned.push(name.clone()),
            Err(e) => {
                warn!(package = %name, "clone failed: {e}");
                errors.push(format!("{name}: clone failed: {e}"));
            }
        }
    }

    // Scan and level on the now-populated tree.
    let plan = load_plan(procs, config, &root).await?;

    if input.dry_run {
        for level in &plan.graph.levels {
            for name in level {
                planned.push(format!("pnpm install && pnpm run build ({name})"));
            }
        }
        return Ok(InstallOutcome {
            success: errors.is_empty(),
            run_id,
            cloned,
            skipped,
            results: Vec::new(),
            errors,
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
    let result = execute_graph(&plan.graph, options, move |node| {
        let flow = flow_clone.clone();
        async move {
            flow.call("install.single", json!({ "cwd": node.repo_path }))
                .await
                .map_err(|e| e.to_string())
        }
    })
    .await;

    errors.extend(collect_errors(&result));
    let success = result.success && errors.is_empty();

    Ok(InstallOutcome {
        success,
        run_id,
        cloned,
        skipped,
        results: sorted_results(&result),
        errors,
        warnings: plan.report.warnings,
        plan: plan.graph.levels.clone(),
        total_duration_ms: started.elapsed().as_millis() as u64,
        planned_operations: None,
        completed_at: Utc::now(),
    })
}

/// Register `install` and the per-node `install.single` it dispatches.
pub fn register(
    registry: &Arc<ProcedureRegistry>,
    procs: &ProcSet,
    config: &EcosystemConfig,
) -> FlowResult<()> {
    registry.register_aggregation(
        "install.single",
        step(
            "pnpm.installAndBuild",
            json!({ "cwd": reference("input.cwd") }),
        ),
        RegisterOptions::default(),
    )?;

    let procs = procs.clone();
    let config = config.clone();
    registry.register_handler(
        "install",
        handler(move |input, ctx| {
            let procs = procs.clone();
            let config = config.clone();
            async move {
                let input: InstallInput = parse_input("install", input)?;
                let outcome = run(&procs, &config, &ctx, input)
                    .await
                    .map_err(|e| FlowError::failed("install", e))?;
                Ok(to_value(outcome))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

//! The new workflow: scaffold a package, wire up git, and register it in
//! the manifest.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use flotilla_core::{manifest_path, EcosystemConfig, GitRef, Manifest, ManifestEntry, ProjectTemplate};
use flotilla_flow::{handler, CallContext, FlowError, FlowResult, ProcedureRegistry, RegisterOptions};
use flotilla_procs::ShellRequest;

use crate::error::{WorkflowError, WorkflowResult};
use crate::plan::resolve_root;
use crate::register::{parse_input, to_value, ProcSet};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewInput {
    /// Short package name; the full name is the scoped form.
    pub name: String,
    /// Scaffolding generator to run after `pnpm init`.
    pub preset: Option<String>,
    pub root_path: Option<PathBuf>,
    pub skip_git: bool,
    pub skip_manifest: bool,
    pub dry_run: bool,
    pub create_remote: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOutcome {
    pub success: bool,
    pub name: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub planned_operations: Option<Vec<String>>,
    pub completed_at: DateTime<Utc>,
}

/// Run the new-package workflow.
#[instrument(skip_all, fields(name = %input.name, dry_run = input.dry_run))]
pub async fn run(
    procs: &ProcSet,
    config: &EcosystemConfig,
    flow: &CallContext,
    input: NewInput,
) -> WorkflowResult<NewOutcome> {
    if input.name.is_empty() {
        return Err(WorkflowError::MissingArgument {
            name: "name".to_string(),
        });
    }

    let root = resolve_root(&input.root_path);
    let full_name = config.scoped_name(&input.name);

    // The manifest supplies the project template; a missing manifest is
    // fine for a standalone scaffold.
    let manifest = Manifest::load(&procs.fs, &root).await.ok();
    let template = manifest
        .as_ref()
        .map(|m| m.project_template.clone())
        .unwrap_or_else(ProjectTemplate::default);
    let base = manifest
        .as_ref()
        .map(|m| m.base_dir(&root))
        .unwrap_or_else(|| root.clone());
    let target = base.join(&input.name);

    if procs.fs.exists(&target).await {
        return Err(WorkflowError::TargetExists { path: target });
    }

    if input.dry_run {
        let mut planned = vec![
            format!("mkdir {}", target.display()),
            format!("mkdir {}/src", target.display()),
            format!("write {}/src/index.ts", target.display()),
            "pnpm init".to_string(),
        ];
        if let Some(preset) = &input.preset {
            planned.push(format!("pnpm dlx {preset} generate"));
        }
        if !input.skip_git {
            planned.push("git init + add + commit".to_string());
        }
        if !input.skip_manifest {
            planned.push(format!("register {full_name} in {}", manifest_path(&root).display()));
        }
        return Ok(NewOutcome {
            success: true,
            name: full_name,
            path: target,
            planned_operations: Some(planned),
            completed_at: Utc::now(),
        });
    }

    info!(package = %full_name, path = %target.display(), "scaffolding");
    procs.fs.mkdir_p(&target).await?;
    procs.fs.mkdir_p(&target.join("src")).await?;
    for dir in &template.dirs {
        procs.fs.mkdir_p(&target.join(dir)).await?;
    }
    procs
        .fs
        .write(&target.join("src/index.ts"), "export {};\n")
        .await?;

    // External scaffolding: init, then the preset's generator.
    procs
        .shell
        .exec(ShellRequest {
            command: "pnpm init".to_string(),
            cwd: target.clone(),
            timeout_ms: flotilla_procs::SCRIPT_TIMEOUT_MS,
        })
        .await?;
    if let Some(preset) = &input.preset {
        procs
            .shell
            .exec(ShellRequest {
                command: format!("pnpm dlx {preset} generate"),
                cwd: target.clone(),
                timeout_ms: flotilla_procs::SCRIPT_TIMEOUT_MS,
            })
            .await?;
    }

    if !input.skip_git {
        flow.call(
            "git.initWorkflow",
            json!({
                "cwd": target,
                "message": format!("feat: scaffold {full_name}"),
                "createRemote": input.create_remote,
                "repoOwner": config.owner,
                "repoName": input.name,
            }),
        )
        .await?;
    }

    if !input.skip_manifest {
        let mut manifest = match manifest {
            Some(manifest) => manifest,
            None => Manifest {
                version: "1.0.0".to_string(),
                root: String::new(),
                packages: Default::default(),
                project_template: template,
            },
        };
        manifest.packages.insert(
            full_name.clone(),
            ManifestEntry {
                repo: GitRef::canonical(
                    &config.host,
                    &config.owner,
                    &input.name,
                    &config.primary_branch,
                ),
                path: input.name.clone(),
            },
        );
        if let Some(parent) = manifest_path(&root).parent() {
            procs.fs.mkdir_p(parent).await?;
        }
        manifest.save(&procs.fs, &root).await?;
    }

    Ok(NewOutcome {
        success: true,
        name: full_name,
        path: target,
        planned_operations: None,
        completed_at: Utc::now(),
    })
}

/// Register the `new` workflow.
pub fn register(
    registry: &Arc<ProcedureRegistry>,
    procs: &ProcSet,
    config: &EcosystemConfig,
) -> FlowResult<()> {
    let procs = procs.clone();
    let config = config.clone();
    registry.register_handler(
        "new",
        handler(move |input, ctx| {
            let procs = procs.clone();
            let config = config.clone();
            async move {
                let input: NewInput = parse_input("new", input)?;
                let outcome = run(&procs, &config, &ctx, input)
                    .await
                    .map_err(|e| FlowError::failed("new", e))?;
                Ok(to_value(outcome))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

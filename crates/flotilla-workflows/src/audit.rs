//! The audit workflow: template conformance and dependency hygiene across
//! the manifest's packages.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use flotilla_core::{is_internal_ref, EcosystemConfig, GitRef, Manifest};
use flotilla_flow::{handler, CallContext, FlowError, FlowResult, ProcedureRegistry, RegisterOptions};

use crate::error::WorkflowResult;
use crate::plan::resolve_root;
use crate::register::{parse_input, to_value, ProcSet};

/// Lockfiles that signal another package manager touched the tree.
const FOREIGN_LOCKFILES: [&str; 3] = ["package-lock.json", "yarn.lock", "npm-shrinkwrap.json"];

/// Only these template entries may be created by `--fix`: the `.gitignore`
/// file and missing template directories. Everything else is report-only.
const GITIGNORE_DEFAULT: &str = "node_modules/\ndist/\n*.tsbuildinfo\n";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditInput {
    pub root_path: Option<PathBuf>,
    pub fix: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageAudit {
    pub name: String,
    pub valid: bool,
    pub missing_files: Vec<String>,
    pub missing_dirs: Vec<String>,
    /// Foreign lockfiles present in the package directory.
    pub foreign_lockfiles: Vec<String>,
    /// External git dependencies absent from `pnpm.onlyBuiltDependencies`.
    pub unapproved_git_deps: Vec<String>,
    /// Entries created by fix mode.
    pub fixed: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditOutcome {
    pub success: bool,
    pub packages: Vec<PackageAudit>,
    pub fixed_count: usize,
    pub completed_at: DateTime<Utc>,
}

/// Run the audit workflow.
#[instrument(skip_all, fields(fix = input.fix))]
pub async fn run(
    procs: &ProcSet,
    config: &EcosystemConfig,
    input: AuditInput,
) -> WorkflowResult<AuditOutcome> {
    let root = resolve_root(&input.root_path);
    let manifest = Manifest::load(&procs.fs, &root).await?;

    let mut packages = Vec::new();
    let mut fixed_count = 0usize;

    for (name, entry) in &manifest.packages {
        let dir = manifest.base_dir(&root).join(&entry.path);
        let mut audit = audit_package(procs, config, &manifest, name, &dir).await;

        if input.fix {
            fixed_count += apply_fixes(procs, &dir, &mut audit).await;
        }

        audit.valid = audit.missing_files.is_empty()
            && audit.missing_dirs.is_empty()
            && audit.foreign_lockfiles.is_empty()
            && audit.unapproved_git_deps.is_empty();
        packages.push(audit);
    }

    Ok(AuditOutcome {
        success: packages.iter().all(|p| p.valid),
        packages,
        fixed_count,
        completed_at: Utc::now(),
    })
}

async fn audit_package(
    procs: &ProcSet,
    config: &EcosystemConfig,
    manifest: &Manifest,
    name: &str,
    dir: &Path,
) -> PackageAudit {
    let mut audit = PackageAudit {
        name: name.to_string(),
        valid: false,
        missing_files: Vec::new(),
        missing_dirs: Vec::new(),
        foreign_lockfiles: Vec::new(),
        unapproved_git_deps: Vec::new(),
        fixed: Vec::new(),
    };

    for file in &manifest.project_template.files {
        if !procs.fs.exists(&dir.join(file)).await {
            audit.missing_files.push(file.clone());
        }
    }
    for template_dir in &manifest.project_template.dirs {
        if !procs.fs.exists(&dir.join(template_dir)).await {
            audit.missing_dirs.push(template_dir.clone());
        }
    }

    for lockfile in FOREIGN_LOCKFILES {
        if procs.fs.exists(&dir.join(lockfile)).await {
            audit.foreign_lockfiles.push(lockfile.to_string());
        }
    }

    if let Ok(pkg) = procs.fs.read_json(&dir.join("package.json")).await {
        audit.unapproved_git_deps = unapproved_git_deps(&pkg, &config.owner);
    }

    audit
}

/// External git-specified deps that must be allow-listed before pnpm will
/// run their build scripts.
fn unapproved_git_deps(pkg: &Value, owner: &str) -> Vec<String> {
    let allowlist: Vec<&str> = pkg
        .pointer("/pnpm/onlyBuiltDependencies")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut unapproved = Vec::new();
    for table in ["dependencies", "devDependencies"] {
        if let Some(deps) = pkg.get(table).and_then(Value::as_object) {
            for (dep_name, version) in deps {
                let Some(spec) = version.as_str() else {
                    continue;
                };
                let external_git =
                    GitRef::parse(spec).is_some() && !is_internal_ref(spec, owner);
                if external_git
                    && !allowlist.contains(&dep_name.as_str())
                    && !unapproved.contains(dep_name)
                {
                    unapproved.push(dep_name.clone());
                }
            }
        }
    }
    unapproved
}

/// Create the whitelisted defaults; returns how many entries were fixed.
async fn apply_fixes(procs: &ProcSet, dir: &Path, audit: &mut PackageAudit) -> usize {
    let mut fixed = 0usize;

    if let Some(idx) = audit.missing_files.iter().position(|f| f == ".gitignore") {
        if procs
            .fs
            .write(&dir.join(".gitignore"), GITIGNORE_DEFAULT)
            .await
            .is_ok()
        {
            audit.missing_files.remove(idx);
            audit.fixed.push(".gitignore".to_string());
            fixed += 1;
        }
    }

    let dirs = std::mem::take(&mut audit.missing_dirs);
    for template_dir in dirs {
        if procs.fs.mkdir_p(&dir.join(&template_dir)).await.is_ok() {
            audit.fixed.push(format!("{template_dir}/"));
            fixed += 1;
        } else {
            audit.missing_dirs.push(template_dir);
        }
    }

    fixed
}

/// Register the `audit` workflow.
pub fn register(
    registry: &Arc<ProcedureRegistry>,
    procs: &ProcSet,
    config: &EcosystemConfig,
) -> FlowResult<()> {
    let procs = procs.clone();
    let config = config.clone();
    registry.register_handler(
        "audit",
        handler(move |input, _ctx: CallContext| {
            let procs = procs.clone();
            let config = config.clone();
            async move {
                let input: AuditInput = parse_input("audit", input)?;
                let outcome = run(&procs, &config, input)
                    .await
                    .map_err(|e| FlowError::failed("audit", e))?;
                Ok(to_value(outcome))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

//! The rename engine: coordinated rewrite of manifest entries, dependency
//! specifiers, and source-text imports across the fleet.
//!
//! Three passes over the manifest-listed packages: package names,
//! dependency tables (with owner/repo specifier rewrites), and source
//! imports via the [`SourceRewriter`] collaborator. Dry-run collects every
//! planned change as a typed record without writing; real runs write each
//! file atomically.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};

use flotilla_core::{is_internal_ref, EcosystemConfig, Manifest};
use flotilla_flow::{handler, FlowError, FlowResult, ProcedureRegistry, RegisterOptions};
use flotilla_procs::ImportChangeKind;

use crate::error::{WorkflowError, WorkflowResult};
use crate::plan::resolve_root;
use crate::register::{parse_input, to_value, ProcSet};

const DEP_TABLES: [&str; 4] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
];

const SOURCE_EXTENSIONS: [&str; 2] = ["ts", "tsx"];
const SOURCE_SKIP_DIRS: [&str; 3] = ["node_modules", "dist", ".git"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenameInput {
    pub old_name: String,
    pub new_name: String,
    pub root_path: Option<PathBuf>,
    pub dry_run: bool,
}

/// One planned or applied change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameChange {
    /// `package-name` | `dependency` | `import` | `dynamic-import`.
    pub kind: String,
    pub file: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub old: String,
    pub new: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameOutcome {
    pub success: bool,
    pub package_name_changes: usize,
    pub dependency_changes: usize,
    pub import_changes: usize,
    pub dynamic_import_changes: usize,
    pub files_changed: usize,
    pub changes: Vec<RenameChange>,
    pub errors: Vec<String>,
    pub dry_run: bool,
    pub completed_at: DateTime<Utc>,
}

/// Run the rename workflow.
#[instrument(skip_all, fields(old = %input.old_name, new = %input.new_name, dry_run = input.dry_run))]
pub async fn run(
    procs: &ProcSet,
    config: &EcosystemConfig,
    input: RenameInput,
) -> WorkflowResult<RenameOutcome> {
    if input.old_name.is_empty() || input.new_name.is_empty() {
        return Err(WorkflowError::MissingArgument {
            name: "oldName/newName".to_string(),
        });
    }

    let root = resolve_root(&input.root_path);
    let mut manifest = Manifest::load(&procs.fs, &root).await?;

    let old_repo = unscoped(&input.old_name).to_string();
    let new_repo = unscoped(&input.new_name).to_string();

    let mut changes: Vec<RenameChange> = Vec::new();
    let mut errors: Vec<String> = Vec::new();
    let mut files_changed = 0usize;

    // Passes 1 + 2: package names and dependency specifiers, one
    // package.json at a time so each file write stays atomic.
    let package_dirs: Vec<PathBuf> = manifest
        .packages
        .values()
        .map(|entry| manifest.base_dir(&root).join(&entry.path))
        .collect();

    for dir in &package_dirs {
        let pkg_path = dir.join("package.json");
        let mut pkg = match procs.fs.read_json(&pkg_path).await {
            Ok(pkg) => pkg,
            Err(e) => {
                errors.push(format!("{}: {e}", pkg_path.display()));
                continue;
            }
        };

        let changed = rewrite_package_json(
            &mut pkg,
            &pkg_path,
            &input.old_name,
            &input.new_name,
            &config.owner,
            &old_repo,
            &new_repo,
            &mut changes,
        );

        if changed {
            files_changed += 1;
            if !input.dry_run {
                let content = serde_json::to_string_pretty(&pkg)
                    .expect("package.json value is always serializable");
                if let Err(e) = procs.fs.write(&pkg_path, &content).await {
                    errors.push(format!("{}: {e}", pkg_path.display()));
                }
            }
        }
    }

    // Pass 3: source imports.
    for dir in &package_dirs {
        let extensions: Vec<String> = SOURCE_EXTENSIONS.iter().map(|s| s.to_string()).collect();
        let skip: Vec<String> = SOURCE_SKIP_DIRS.iter().map(|s| s.to_string()).collect();
        let files = match procs.fs.find_source_files(dir, &extensions, &skip).await {
            Ok(files) => files,
            Err(e) => {
                errors.push(format!("{}: {e}", dir.display()));
                continue;
            }
        };

        for file in files {
            let content = match procs.fs.read_text(&file).await {
                Ok(content) => content,
                Err(e) => {
                    errors.push(format!("{}: {e}", file.display()));
                    continue;
                }
            };

            let rewritten =
                procs
                    .rewriter
                    .rewrite_imports(&content, &input.old_name, &input.new_name);
            if rewritten.changes.is_empty() {
                continue;
            }

            for change in &rewritten.changes {
                changes.push(RenameChange {
                    kind: match change.kind {
                        ImportChangeKind::Import => "import".to_string(),
                        ImportChangeKind::DynamicImport => "dynamic-import".to_string(),
                    },
                    file: file.clone(),
                    line: Some(change.line),
                    old: change.old.clone(),
                    new: change.new.clone(),
                });
            }

            files_changed += 1;
            if !input.dry_run {
                if let Err(e) = procs.fs.write(&file, &rewritten.content).await {
                    errors.push(format!("{}: {e}", file.display()));
                }
            }
        }
    }

    // Manifest entry last, so a failed earlier pass leaves it untouched.
    if let Some(mut entry) = manifest.packages.remove(&input.old_name) {
        let owner_pair = format!("{}/{old_repo}", config.owner);
        let new_pair = format!("{}/{new_repo}", config.owner);
        let new_repo_spec = entry.repo.replace(&owner_pair, &new_pair);
        changes.push(RenameChange {
            kind: "package-name".to_string(),
            file: flotilla_core::manifest_path(&root),
            line: None,
            old: format!("{}: {}", input.old_name, entry.repo),
            new: format!("{}: {}", input.new_name, new_repo_spec),
        });
        entry.repo = new_repo_spec;
        manifest.packages.insert(input.new_name.clone(), entry);
        files_changed += 1;
        if !input.dry_run {
            if let Err(e) = manifest.save(&procs.fs, &root).await {
                errors.push(format!("manifest: {e}"));
            }
        }
    }

    let outcome = RenameOutcome {
        success: errors.is_empty(),
        package_name_changes: count_kind(&changes, "package-name"),
        dependency_changes: count_kind(&changes, "dependency"),
        import_changes: count_kind(&changes, "import"),
        dynamic_import_changes: count_kind(&changes, "dynamic-import"),
        files_changed,
        changes,
        errors,
        dry_run: input.dry_run,
        completed_at: Utc::now(),
    };
    info!(
        files = outcome.files_changed,
        deps = outcome.dependency_changes,
        imports = outcome.import_changes,
        "rename pass complete"
    );
    Ok(outcome)
}

fn unscoped(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn count_kind(changes: &[RenameChange], kind: &str) -> usize {
    changes.iter().filter(|c| c.kind == kind).count()
}

/// Rewrite the `name` field and the four dependency tables of one
/// package.json value. Returns whether anything changed.
#[allow(clippy::too_many_arguments)]
fn rewrite_package_json(
    pkg: &mut Value,
    file: &Path,
    old_name: &str,
    new_name: &str,
    owner: &str,
    old_repo: &str,
    new_repo: &str,
    changes: &mut Vec<RenameChange>,
) -> bool {
    let mut changed = false;

    if pkg.get("name").and_then(Value::as_str) == Some(old_name) {
        pkg["name"] = Value::String(new_name.to_string());
        changes.push(RenameChange {
            kind: "package-name".to_string(),
            file: file.to_path_buf(),
            line: None,
            old: old_name.to_string(),
            new: new_name.to_string(),
        });
        changed = true;
    }

    for table in DEP_TABLES {
        let Some(deps) = pkg.get_mut(table).and_then(Value::as_object_mut) else {
            continue;
        };
        let Some(version) = deps.remove(old_name) else {
            continue;
        };

        let old_spec = version.as_str().unwrap_or_default().to_string();
        let new_spec = if is_internal_ref(&old_spec, owner) {
            old_spec.replace(
                &format!("{owner}/{old_repo}"),
                &format!("{owner}/{new_repo}"),
            )
        } else {
            old_spec.clone()
        };

        deps.insert(new_name.to_string(), Value::String(new_spec.clone()));
        changes.push(RenameChange {
            kind: "dependency".to_string(),
            file: file.to_path_buf(),
            line: None,
            old: format!("{old_name}: {old_spec}"),
            new: format!("{new_name}: {new_spec}"),
        });
        changed = true;
    }

    changed
}

/// Register the `rename` workflow.
pub fn register(
    registry: &Arc<ProcedureRegistry>,
    procs: &ProcSet,
    config: &EcosystemConfig,
) -> FlowResult<()> {
    let procs = procs.clone();
    let config = config.clone();
    registry.register_handler(
        "rename",
        handler(move |input, _ctx| {
            let procs = procs.clone();
            let config = config.clone();
            async move {
                let input: RenameInput = parse_input("rename", input)?;
                let outcome = run(&procs, &config, input)
                    .await
                    .map_err(|e| FlowError::failed("rename", e))?;
                Ok(to_value(outcome))
            }
        }),
        RegisterOptions::default(),
    )?;
    Ok(())
}

//! Flotilla CLI - multi-repo ecosystem orchestrator
//!
//! Brings a fleet of interrelated packages to a consistent, buildable
//! state: discover them from the ecosystem manifest, level the dependency
//! graph, and run workflows across it in dependency order.
//!
//! ## Commands
//!
//! - `install`: clone missing packages, then install + build everything
//! - `refresh`: clean + install + build + commit + push
//! - `pull`: git pull across the fleet
//! - `new`: scaffold a package and register it
//! - `audit`: template conformance and dependency hygiene
//! - `rename`: rename a package across manifests, deps, and imports

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::Level;

use flotilla_core::{init_tracing, EcosystemConfig};
use flotilla_flow::{Interpreter, ProcedureRegistry};
use flotilla_workflows::{register_all, ProcSet};

#[derive(Parser)]
#[command(name = "flotilla")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Multi-repo ecosystem orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Ecosystem root directory (holds ecosystem/ecosystem.manifest.json)
    #[arg(long, global = true, env = "FLOTILLA_ROOT")]
    root: Option<PathBuf>,

    /// Ecosystem owner namespace
    #[arg(long, global = true, env = "FLOTILLA_OWNER")]
    owner: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clone missing packages, then install and build in dependency order
    Install {
        /// Plan only; perform no side effects
        #[arg(long)]
        dry_run: bool,

        /// Keep going past per-package failures
        #[arg(long)]
        continue_on_error: bool,

        /// Max packages in flight per level
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Clean + install + build + commit + push
    Refresh {
        /// Target package (omit with --all)
        package: Option<String>,

        /// Refresh every scanned package
        #[arg(long)]
        all: bool,

        /// Include the target's prerequisites
        #[arg(long)]
        recursive: bool,

        /// Remove node_modules, dist, and lockfiles first
        #[arg(long)]
        force: bool,

        /// Skip the commit + push step
        #[arg(long)]
        skip_git: bool,

        /// Plan only; perform no side effects
        #[arg(long)]
        dry_run: bool,

        /// Keep going past per-package failures
        #[arg(long)]
        auto_confirm: bool,

        /// Max packages in flight per level
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// git pull across the fleet
    Pull {
        /// Remote to pull from
        #[arg(long)]
        remote: Option<String>,

        /// Pull with --rebase
        #[arg(long)]
        rebase: bool,

        /// Plan only; perform no side effects
        #[arg(long)]
        dry_run: bool,

        /// Keep going past per-package failures
        #[arg(long)]
        continue_on_error: bool,

        /// Max packages in flight per level
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Scaffold a new package and register it in the manifest
    New {
        /// Short package name (scoped form is derived)
        name: String,

        /// Scaffolding generator to run after pnpm init
        #[arg(long)]
        preset: Option<String>,

        /// Skip git init + first commit
        #[arg(long)]
        skip_git: bool,

        /// Skip manifest registration
        #[arg(long)]
        skip_manifest: bool,

        /// Create the forge remote and push
        #[arg(long)]
        create_remote: bool,

        /// Plan only; perform no side effects
        #[arg(long)]
        dry_run: bool,
    },

    /// Check every package against the project template
    Audit {
        /// Create whitelisted defaults for fixable findings
        #[arg(long)]
        fix: bool,
    },

    /// Rename a package across manifests, dependencies, and imports
    Rename {
        /// Current package name
        old_name: String,

        /// New package name
        new_name: String,

        /// Collect planned changes without writing
        #[arg(long)]
        dry_run: bool,
    },
}

fn workflow_call(cli: &Cli) -> (String, Value) {
    let root = cli.root.clone();
    match &cli.command {
        Commands::Install {
            dry_run,
            continue_on_error,
            concurrency,
        } => (
            "install".to_string(),
            json!({
                "rootPath": root,
                "dryRun": dry_run,
                "continueOnError": continue_on_error,
                "concurrency": concurrency,
            }),
        ),
        Commands::Refresh {
            package,
            all,
            recursive,
            force,
            skip_git,
            dry_run,
            auto_confirm,
            concurrency,
        } => (
            "refresh".to_string(),
            json!({
                "rootPath": root,
                "package": package,
                "all": all,
                "recursive": recursive,
                "force": force,
                "skipGit": skip_git,
                "dryRun": dry_run,
                "autoConfirm": auto_confirm,
                "concurrency": concurrency,
            }),
        ),
        Commands::Pull {
            remote,
            rebase,
            dry_run,
            continue_on_error,
            concurrency,
        } => (
            "pull".to_string(),
            json!({
                "rootPath": root,
                "remote": remote,
                "rebase": rebase,
                "dryRun": dry_run,
                "continueOnError": continue_on_error,
                "concurrency": concurrency,
            }),
        ),
        Commands::New {
            name,
            preset,
            skip_git,
            skip_manifest,
            create_remote,
            dry_run,
        } => (
            "new".to_string(),
            json!({
                "rootPath": root,
                "name": name,
                "preset": preset,
                "skipGit": skip_git,
                "skipManifest": skip_manifest,
                "createRemote": create_remote,
                "dryRun": dry_run,
            }),
        ),
        Commands::Audit { fix } => (
            "audit".to_string(),
            json!({ "rootPath": root, "fix": fix }),
        ),
        Commands::Rename {
            old_name,
            new_name,
            dry_run,
        } => (
            "rename".to_string(),
            json!({
                "rootPath": root,
                "oldName": old_name,
                "newName": new_name,
                "dryRun": dry_run,
            }),
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json_logs, level);

    let mut config = EcosystemConfig::default();
    if let Some(owner) = &cli.owner {
        config.owner = owner.clone();
    }

    let registry = Arc::new(ProcedureRegistry::new());
    register_all(&registry, ProcSet::local(), config)
        .context("failed to register workflow procedures")?;
    let interpreter = Interpreter::new(registry);

    let (path, input) = workflow_call(&cli);
    let outcome = interpreter
        .call(&path, input)
        .await
        .with_context(|| format!("workflow `{path}` failed"))?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);

    if outcome.get("success") == Some(&Value::Bool(false)) {
        std::process::exit(1);
    }
    Ok(())
}

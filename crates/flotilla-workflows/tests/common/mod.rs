//! Shared test harness: fake collaborators wired into a full registry.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use flotilla_core::{EcosystemConfig, Manifest, ManifestEntry, ProjectTemplate};
use flotilla_flow::{Interpreter, ProcedureRegistry};
use flotilla_procs::fakes::{
    MemoryFileSystem, RecordingGit, RecordingPackageManager, ScriptedShell,
};
use flotilla_procs::QuotedSpecifierRewriter;
use flotilla_workflows::{register_all, ProcSet};

pub struct Harness {
    pub fs: Arc<MemoryFileSystem>,
    pub shell: Arc<ScriptedShell>,
    pub pnpm: Arc<RecordingPackageManager>,
    pub git: Arc<RecordingGit>,
    pub interpreter: Interpreter,
}

pub fn harness() -> Harness {
    let fs = Arc::new(MemoryFileSystem::new());
    let shell = Arc::new(ScriptedShell::new());
    let pnpm = Arc::new(RecordingPackageManager::new());
    let git = Arc::new(RecordingGit::with_fs(Arc::clone(&fs)));

    let procs = ProcSet {
        fs: fs.clone(),
        shell: shell.clone(),
        pnpm: pnpm.clone(),
        git: git.clone(),
        rewriter: Arc::new(QuotedSpecifierRewriter::new()),
    };
    let registry = Arc::new(ProcedureRegistry::new());
    register_all(&registry, procs, EcosystemConfig::default()).unwrap();

    Harness {
        fs,
        shell,
        pnpm,
        git,
        interpreter: Interpreter::new(registry),
    }
}

/// A manifest over `/eco` whose package names are `@flotilla/<short>`.
pub fn manifest(packages: &[&str]) -> Manifest {
    Manifest {
        version: "1.0.0".to_string(),
        root: "/eco".to_string(),
        packages: packages
            .iter()
            .map(|short| {
                (
                    format!("@flotilla/{short}"),
                    ManifestEntry {
                        repo: format!("github:flotilla/{short}#main"),
                        path: short.to_string(),
                    },
                )
            })
            .collect(),
        project_template: ProjectTemplate {
            files: vec!["package.json".to_string(), ".gitignore".to_string()],
            dirs: vec!["src".to_string()],
        },
    }
}

pub fn package_json(short: &str, internal_deps: &[&str]) -> String {
    let deps: serde_json::Map<String, Value> = internal_deps
        .iter()
        .map(|d| {
            (
                format!("@flotilla/{d}"),
                Value::String(format!("github:flotilla/{d}#main")),
            )
        })
        .collect();
    serde_json::to_string_pretty(&serde_json::json!({
        "name": format!("@flotilla/{short}"),
        "dependencies": deps,
    }))
    .unwrap()
}

/// Seed the manifest file plus a package.json per `(short, deps)` entry.
pub fn seed_ecosystem(h: &Harness, packages: &[(&str, &[&str])]) {
    let shorts: Vec<&str> = packages.iter().map(|(s, _)| *s).collect();
    h.fs.add_file(
        "/eco/ecosystem/ecosystem.manifest.json",
        serde_json::to_string_pretty(&manifest(&shorts)).unwrap(),
    );
    for (short, deps) in packages {
        h.fs.add_file(
            format!("/eco/{short}/package.json"),
            package_json(short, deps),
        );
    }
}

pub fn pkg_dir(short: &str) -> PathBuf {
    PathBuf::from(format!("/eco/{short}"))
}

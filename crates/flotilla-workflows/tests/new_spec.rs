//! New-package workflow: scaffold, git wiring, manifest registration.

mod common;

use std::path::Path;

use common::{harness, seed_ecosystem};
use flotilla_procs::FileSystem;
use serde_json::json;

#[tokio::test]
async fn test_new_scaffolds_and_registers() {
    let h = harness();
    seed_ecosystem(&h, &[("toolkit", &[])]);

    let out = h
        .interpreter
        .call(
            "new",
            json!({ "name": "gadget", "preset": "tsup-starter", "rootPath": "/eco" }),
        )
        .await
        .unwrap();

    assert_eq!(out["success"], json!(true));
    assert_eq!(out["name"], json!("@flotilla/gadget"));
    assert!(h.fs.exists(Path::new("/eco/gadget/src")).await);
    assert!(h.fs.file(Path::new("/eco/gadget/src/index.ts")).is_some());

    // Scaffolding commands: init then the preset's generator.
    let commands: Vec<String> = h.shell.calls().iter().map(|c| c.command.clone()).collect();
    assert_eq!(commands[0], "pnpm init");
    assert!(commands[1].contains("tsup-starter generate"));

    // Git init workflow ran.
    assert_eq!(h.git.count_of("init"), 1);
    assert_eq!(h.git.count_of("commit"), 1);

    // Manifest registration.
    let manifest = h
        .fs
        .file(Path::new("/eco/ecosystem/ecosystem.manifest.json"))
        .unwrap();
    assert!(manifest.contains("\"@flotilla/gadget\""));
    assert!(manifest.contains("github:flotilla/gadget#main"));
}

#[tokio::test]
async fn test_new_fails_when_target_exists() {
    let h = harness();
    seed_ecosystem(&h, &[("toolkit", &[])]);

    let err = h
        .interpreter
        .call("new", json!({ "name": "toolkit", "rootPath": "/eco" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
}

#[tokio::test]
async fn test_new_dry_run_plans_without_side_effects() {
    let h = harness();
    seed_ecosystem(&h, &[("toolkit", &[])]);

    let out = h
        .interpreter
        .call(
            "new",
            json!({ "name": "gadget", "rootPath": "/eco", "dryRun": true }),
        )
        .await
        .unwrap();

    let planned = out["plannedOperations"].as_array().unwrap();
    assert!(planned.iter().any(|p| p.as_str().unwrap().contains("mkdir")));
    assert!(planned.iter().any(|p| p.as_str().unwrap().contains("pnpm init")));

    assert!(h.fs.mutations().is_empty());
    assert!(h.shell.calls().is_empty());
    assert_eq!(h.git.count_of("init"), 0);
}

#[tokio::test]
async fn test_new_skip_flags() {
    let h = harness();
    seed_ecosystem(&h, &[("toolkit", &[])]);
    let manifest_before = h
        .fs
        .file(Path::new("/eco/ecosystem/ecosystem.manifest.json"))
        .unwrap();

    let out = h
        .interpreter
        .call(
            "new",
            json!({ "name": "gadget", "rootPath": "/eco", "skipGit": true, "skipManifest": true }),
        )
        .await
        .unwrap();

    assert_eq!(out["success"], json!(true));
    assert_eq!(h.git.count_of("init"), 0);
    let manifest_after = h
        .fs
        .file(Path::new("/eco/ecosystem/ecosystem.manifest.json"))
        .unwrap();
    assert_eq!(manifest_before, manifest_after);
}

//! Audit workflow: template conformance, lockfile hygiene, allowlists.

mod common;

use std::path::Path;

use common::{harness, seed_ecosystem};
use flotilla_procs::FileSystem;
use serde_json::json;

#[tokio::test]
async fn test_audit_flags_missing_template_entries() {
    let h = harness();
    // toolkit has everything; app misses .gitignore and src/.
    seed_ecosystem(&h, &[("toolkit", &[]), ("app", &["toolkit"])]);
    h.fs.add_file("/eco/toolkit/.gitignore", "node_modules/\n");
    h.fs.add_dir("/eco/toolkit/src");

    let out = h
        .interpreter
        .call("audit", json!({ "rootPath": "/eco" }))
        .await
        .unwrap();

    assert_eq!(out["success"], json!(false));
    let packages = out["packages"].as_array().unwrap();
    let by_name = |name: &str| {
        packages
            .iter()
            .find(|p| p["name"] == json!(format!("@flotilla/{name}")))
            .unwrap()
    };
    assert_eq!(by_name("toolkit")["valid"], json!(true));
    let app = by_name("app");
    assert_eq!(app["valid"], json!(false));
    assert_eq!(app["missingFiles"], json!([".gitignore"]));
    assert_eq!(app["missingDirs"], json!(["src"]));
}

#[tokio::test]
async fn test_audit_fix_creates_whitelisted_defaults_only() {
    let h = harness();
    seed_ecosystem(&h, &[("app", &[])]);

    let out = h
        .interpreter
        .call("audit", json!({ "rootPath": "/eco", "fix": true }))
        .await
        .unwrap();

    assert_eq!(out["fixedCount"], json!(2), ".gitignore and src/");
    assert!(h.fs.file(Path::new("/eco/app/.gitignore")).is_some());
    assert!(h.fs.exists(Path::new("/eco/app/src")).await);

    let packages = out["packages"].as_array().unwrap();
    assert_eq!(packages[0]["valid"], json!(true));
    assert_eq!(packages[0]["fixed"], json!([".gitignore", "src/"]));
}

#[tokio::test]
async fn test_audit_detects_foreign_lockfile() {
    let h = harness();
    seed_ecosystem(&h, &[("app", &[])]);
    h.fs.add_file("/eco/app/.gitignore", "x");
    h.fs.add_dir("/eco/app/src");
    h.fs.add_file("/eco/app/yarn.lock", "");

    let out = h
        .interpreter
        .call("audit", json!({ "rootPath": "/eco" }))
        .await
        .unwrap();

    let app = &out["packages"].as_array().unwrap()[0];
    assert_eq!(app["valid"], json!(false));
    assert_eq!(app["foreignLockfiles"], json!(["yarn.lock"]));
}

#[tokio::test]
async fn test_audit_flags_unapproved_external_git_deps() {
    let h = harness();
    seed_ecosystem(&h, &[("app", &[])]);
    h.fs.add_file("/eco/app/.gitignore", "x");
    h.fs.add_dir("/eco/app/src");
    h.fs.add_file(
        "/eco/app/package.json",
        serde_json::to_string_pretty(&json!({
            "name": "@flotilla/app",
            "dependencies": {
                "approved-fork": "github:stranger/approved#main",
                "rogue-fork": "github:stranger/rogue#main",
                "@flotilla/toolkit": "github:flotilla/toolkit#main",
                "express": "^4.18.0",
            },
            "pnpm": { "onlyBuiltDependencies": ["approved-fork"] }
        }))
        .unwrap(),
    );

    let out = h
        .interpreter
        .call("audit", json!({ "rootPath": "/eco" }))
        .await
        .unwrap();

    let app = &out["packages"].as_array().unwrap()[0];
    assert_eq!(
        app["unapprovedGitDeps"],
        json!(["rogue-fork"]),
        "internal refs and registry deps are not flagged; allowlisted forks pass"
    );
}

//! Rename engine: three-pass rewrites, dry-run records, round-trip.

mod common;

use std::path::Path;

use common::{harness, seed_ecosystem, Harness};
use serde_json::json;

fn seed_with_sources(h: &Harness) {
    seed_ecosystem(h, &[("toolkit", &[]), ("app", &["toolkit"])]);
    h.fs.add_file(
        "/eco/app/src/index.ts",
        concat!(
            "import { boot } from \"@flotilla/toolkit\";\n",
            "import helpers from \"@flotilla/toolkit/helpers\";\n",
            "const lazy = await import(\"@flotilla/toolkit\");\n",
            "export const label = \"@flotilla/toolkit\";\n",
        ),
    );
    // Files under skip dirs must never be rewritten.
    h.fs.add_file(
        "/eco/app/node_modules/dep/index.ts",
        "import x from \"@flotilla/toolkit\";\n",
    );
}

#[tokio::test]
async fn test_rename_rewrites_names_deps_imports_and_manifest() {
    let h = harness();
    seed_with_sources(&h);

    let out = h
        .interpreter
        .call(
            "rename",
            json!({
                "oldName": "@flotilla/toolkit",
                "newName": "@flotilla/kit",
                "rootPath": "/eco",
            }),
        )
        .await
        .unwrap();

    assert_eq!(out["success"], json!(true));
    // toolkit's own name + the manifest entry.
    assert_eq!(out["packageNameChanges"], json!(2));
    assert_eq!(out["dependencyChanges"], json!(1));
    assert_eq!(out["importChanges"], json!(2));
    assert_eq!(out["dynamicImportChanges"], json!(1));

    let toolkit_pkg = h.fs.file(Path::new("/eco/toolkit/package.json")).unwrap();
    assert!(toolkit_pkg.contains("\"@flotilla/kit\""));

    let app_pkg = h.fs.file(Path::new("/eco/app/package.json")).unwrap();
    assert!(app_pkg.contains("\"@flotilla/kit\": \"github:flotilla/kit#main\""));
    assert!(!app_pkg.contains("@flotilla/toolkit"));

    let source = h.fs.file(Path::new("/eco/app/src/index.ts")).unwrap();
    assert!(source.contains("from \"@flotilla/kit\""));
    assert!(source.contains("\"@flotilla/kit/helpers\""));
    assert!(source.contains("import(\"@flotilla/kit\")"));
    // A plain string mentioning the package is not an import.
    assert!(source.contains("label = \"@flotilla/toolkit\""));

    let untouched = h
        .fs
        .file(Path::new("/eco/app/node_modules/dep/index.ts"))
        .unwrap();
    assert!(untouched.contains("@flotilla/toolkit"));

    let manifest = h
        .fs
        .file(Path::new("/eco/ecosystem/ecosystem.manifest.json"))
        .unwrap();
    assert!(manifest.contains("\"@flotilla/kit\""));
    assert!(manifest.contains("github:flotilla/kit#main"));
    assert!(!manifest.contains("@flotilla/toolkit"));
}

#[tokio::test]
async fn test_rename_dry_run_records_without_writing() {
    let h = harness();
    seed_with_sources(&h);

    let out = h
        .interpreter
        .call(
            "rename",
            json!({
                "oldName": "@flotilla/toolkit",
                "newName": "@flotilla/kit",
                "rootPath": "/eco",
                "dryRun": true,
            }),
        )
        .await
        .unwrap();

    assert_eq!(out["success"], json!(true));
    let changes = out["changes"].as_array().unwrap();
    assert!(changes.len() >= 5);
    assert!(changes.iter().any(|c| c["kind"] == json!("package-name")));
    assert!(changes.iter().any(|c| c["kind"] == json!("dependency")));
    assert!(changes
        .iter()
        .any(|c| c["kind"] == json!("import") && c["line"] == json!(1)));
    assert!(changes.iter().any(|c| c["kind"] == json!("dynamic-import")));

    assert!(h.fs.mutations().is_empty(), "dry run never writes");
    let source = h.fs.file(Path::new("/eco/app/src/index.ts")).unwrap();
    assert!(source.contains("@flotilla/toolkit"));
}

#[tokio::test]
async fn test_rename_round_trip_restores_files() {
    let h = harness();
    seed_with_sources(&h);

    // Normalize: write the JSON files once through the engine's own
    // serializer so round-trip comparison is modulo pretty-printing.
    h.interpreter
        .call(
            "rename",
            json!({ "oldName": "@flotilla/toolkit", "newName": "@flotilla/toolkit2", "rootPath": "/eco" }),
        )
        .await
        .unwrap();
    h.interpreter
        .call(
            "rename",
            json!({ "oldName": "@flotilla/toolkit2", "newName": "@flotilla/toolkit", "rootPath": "/eco" }),
        )
        .await
        .unwrap();

    let baseline: Vec<(String, String)> = [
        "/eco/toolkit/package.json",
        "/eco/app/package.json",
        "/eco/app/src/index.ts",
        "/eco/ecosystem/ecosystem.manifest.json",
    ]
    .iter()
    .map(|p| (p.to_string(), h.fs.file(Path::new(p)).unwrap()))
    .collect();

    h.interpreter
        .call(
            "rename",
            json!({ "oldName": "@flotilla/toolkit", "newName": "@flotilla/kit", "rootPath": "/eco" }),
        )
        .await
        .unwrap();
    h.interpreter
        .call(
            "rename",
            json!({ "oldName": "@flotilla/kit", "newName": "@flotilla/toolkit", "rootPath": "/eco" }),
        )
        .await
        .unwrap();

    for (path, expected) in baseline {
        let actual = h.fs.file(Path::new(&path)).unwrap();
        assert_eq!(actual, expected, "round trip must restore {path}");
    }
}

#[tokio::test]
async fn test_rename_requires_both_names() {
    let h = harness();
    seed_ecosystem(&h, &[("toolkit", &[])]);

    let err = h
        .interpreter
        .call("rename", json!({ "oldName": "@flotilla/toolkit", "rootPath": "/eco" }))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("missing required argument"));
}

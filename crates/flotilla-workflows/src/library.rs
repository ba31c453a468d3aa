//! Shared aggregation primitives.
//!
//! These are data, not code: declarative pipelines interpreted by the flow
//! engine. They are the building blocks the graph workflows dispatch per
//! node (`refresh.single`, `pnpm.installAndBuild`) plus the small shared
//! verbs (`cleanup.force`, `fs.ensureDir`, `git.commitAndPush`,
//! `git.initWorkflow`).

use std::sync::Arc;

use serde_json::{json, Value};

use flotilla_flow::{
    inverted_reference, named_step, reference, step, FlowResult, ProcedureRegistry,
    RegisterOptions,
};

/// Register every aggregation primitive.
pub fn register(registry: &Arc<ProcedureRegistry>) -> FlowResult<()> {
    registry.register_aggregation("cleanup.force", cleanup_force(), RegisterOptions::default())?;
    registry.register_aggregation("fs.ensureDir", fs_ensure_dir(), RegisterOptions::default())?;
    registry.register_aggregation(
        "pnpm.installAndBuild",
        pnpm_install_and_build(),
        RegisterOptions::default(),
    )?;
    registry.register_aggregation(
        "git.commitAndPush",
        git_commit_and_push(),
        RegisterOptions::default(),
    )?;
    registry.register_aggregation(
        "git.initWorkflow",
        git_init_workflow(),
        RegisterOptions::default(),
    )?;
    registry.register_aggregation("refresh.single", refresh_single(), RegisterOptions::default())?;
    Ok(())
}

/// Best-effort removal of generated artifacts. Each path is wrapped in
/// tryCatch so one failure never stops the rest.
fn cleanup_force() -> Value {
    let rm = |target: &str, recursive: bool| {
        step(
            "client.tryCatch",
            json!({
                "try": step("fs.rm", json!({
                    "path": format!("{{{{input.cwd}}}}/{target}"),
                    "recursive": recursive,
                    "force": true,
                })),
                "catch": { "removed": false, "path": target },
            }),
        )
    };
    step(
        "client.chain",
        json!({
            "steps": [
                rm("node_modules", true),
                rm("dist", true),
                rm("pnpm-lock.yaml", false),
                rm("tsconfig.tsbuildinfo", false),
                step("client.identity", json!({ "cleaned": true, "cwd": reference("input.cwd") })),
            ]
        }),
    )
}

/// Recursive-create a directory unless it already exists.
fn fs_ensure_dir() -> Value {
    step(
        "client.chain",
        json!({
            "steps": [
                named_step("probe", "fs.exists", json!({ "path": reference("input.path") })),
                step("client.conditional", json!({
                    "condition": inverted_reference("probe.exists"),
                    "then": step("fs.mkdir", json!({ "path": reference("input.path"), "recursive": true })),
                })),
                step("client.identity", json!({ "path": reference("input.path"), "exists": true })),
            ]
        }),
    )
}

/// Install then build, raising on either phase's failure.
fn pnpm_install_and_build() -> Value {
    step(
        "client.chain",
        json!({
            "steps": [
                named_step("install", "pnpm.install", json!({ "cwd": reference("input.cwd") })),
                step("client.conditional", json!({
                    "condition": inverted_reference("install.success"),
                    "then": step("client.throw", json!({
                        "message": "install failed in {{input.cwd}}: {{install.stderr}}",
                    })),
                })),
                named_step("build", "pnpm.run", json!({
                    "script": "build",
                    "cwd": reference("input.cwd"),
                })),
                step("client.conditional", json!({
                    "condition": inverted_reference("build.success"),
                    "then": step("client.throw", json!({
                        "message": "build failed in {{input.cwd}}: {{build.stderr}}",
                    })),
                })),
                step("client.identity", json!({
                    "success": true,
                    "cwd": reference("input.cwd"),
                })),
            ]
        }),
    )
}

/// Stage all, commit, push.
fn git_commit_and_push() -> Value {
    step(
        "client.chain",
        json!({
            "steps": [
                step("git.add", json!({ "cwd": reference("input.cwd"), "all": true })),
                named_step("commit", "git.commit", json!({
                    "cwd": reference("input.cwd"),
                    "message": reference("input.message"),
                })),
                step("git.push", json!({ "cwd": reference("input.cwd") })),
                step("client.identity", json!({
                    "success": true,
                    "hash": reference("commit.hash"),
                })),
            ]
        }),
    )
}

/// Init, stage, commit — and optionally create the forge remote and push.
/// Remote creation shells out to `gh`; a missing tool is a user-visible
/// failure of that step.
fn git_init_workflow() -> Value {
    step(
        "client.chain",
        json!({
            "steps": [
                step("git.init", json!({ "cwd": reference("input.cwd") })),
                step("git.add", json!({ "cwd": reference("input.cwd"), "all": true })),
                named_step("commit", "git.commit", json!({
                    "cwd": reference("input.cwd"),
                    "message": reference("input.message"),
                })),
                step("client.conditional", json!({
                    "condition": reference("input.createRemote"),
                    "then": step("client.chain", json!({
                        "steps": [
                            step("shell.exec", json!({
                                "command": "gh repo create {{input.repoOwner}}/{{input.repoName}} --private --source . --push",
                                "cwd": reference("input.cwd"),
                            })),
                        ]
                    })),
                })),
                step("client.identity", json!({
                    "success": true,
                    "hash": reference("commit.hash"),
                })),
            ]
        }),
    )
}

/// Refresh one package: optional forced cleanup, install, build, and an
/// optional commit+push — or, in dry-run, the planned operations and
/// nothing else.
fn refresh_single() -> Value {
    step(
        "client.conditional",
        json!({
            "condition": reference("input.dryRun"),
            "then": step("client.identity", json!({
                "success": true,
                "dryRun": true,
                "name": reference("input.packageName"),
                "path": reference("input.cwd"),
                "plannedOperations": [
                    "cleanup.force (when forced)",
                    "pnpm install",
                    "pnpm run build",
                    "git add + commit + push (unless skipped)",
                ],
            })),
            "else": step("client.chain", json!({
                "steps": [
                    step("client.conditional", json!({
                        "condition": reference("input.force"),
                        "then": step("cleanup.force", json!({ "cwd": reference("input.cwd") })),
                    })),
                    named_step("install", "pnpm.install", json!({ "cwd": reference("input.cwd") })),
                    step("client.conditional", json!({
                        "condition": inverted_reference("install.success"),
                        "then": step("client.throw", json!({
                            "message": "install failed for {{input.packageName}}: {{install.stderr}}",
                        })),
                    })),
                    named_step("build", "pnpm.run", json!({
                        "script": "build",
                        "cwd": reference("input.cwd"),
                    })),
                    step("client.conditional", json!({
                        "condition": inverted_reference("build.success"),
                        "then": step("client.throw", json!({
                            "message": "build failed for {{input.packageName}}: {{build.stderr}}",
                        })),
                    })),
                    step("client.conditional", json!({
                        "condition": inverted_reference("input.skipGit"),
                        "then": step("git.commitAndPush", json!({
                            "cwd": reference("input.cwd"),
                            "message": "chore: refresh {{input.packageName}}",
                        })),
                    })),
                    step("client.identity", json!({
                        "success": true,
                        "name": reference("input.packageName"),
                        "path": reference("input.cwd"),
                        "operations": ["cleanup", "install", "build", "commit"],
                    })),
                ]
            })),
        }),
    )
}

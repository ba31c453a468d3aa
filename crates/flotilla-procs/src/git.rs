//! Git collaborator: CLI git plumbing over subprocesses.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcError, ProcResult};
use crate::{INSTALL_TIMEOUT_MS, SCRIPT_TIMEOUT_MS};

/// One changed file in a `git status` report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitFileStatus {
    pub path: String,
    /// Two-character porcelain status code, e.g. `"M "` or `"??"`.
    pub status: String,
    pub staged: bool,
}

/// Parsed `git status` for a working tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitStatus {
    pub branch: Option<String>,
    pub ahead: u32,
    pub behind: u32,
    pub files: Vec<GitFileStatus>,
    pub clean: bool,
}

/// Outcome of a `git pull`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullOutcome {
    /// Commits received by the pull (rev-list count old..new).
    pub commits: u32,
    pub fast_forward: bool,
}

/// Git plumbing the orchestrator depends on.
#[async_trait]
pub trait Git: Send + Sync {
    async fn status(&self, cwd: &Path) -> ProcResult<GitStatus>;
    async fn add_all(&self, cwd: &Path) -> ProcResult<()>;
    /// Commit staged changes; returns the new HEAD sha.
    async fn commit(&self, cwd: &Path, message: &str) -> ProcResult<String>;
    async fn push(&self, cwd: &Path) -> ProcResult<()>;
    async fn pull(&self, cwd: &Path, remote: Option<&str>, rebase: bool) -> ProcResult<PullOutcome>;
    async fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> ProcResult<()>;
    async fn checkout(&self, cwd: &Path, reference: &str) -> ProcResult<()>;
    async fn branches(&self, cwd: &Path) -> ProcResult<Vec<String>>;
    async fn current_branch(&self, cwd: &Path) -> ProcResult<String>;
    /// URL of the named remote; `None` when the remote is not configured.
    async fn remote_url(&self, cwd: &Path, name: &str) -> ProcResult<Option<String>>;
    async fn init(&self, cwd: &Path) -> ProcResult<()>;
}

/// Real backend spawning the `git` CLI.
#[derive(Debug, Default, Clone)]
pub struct GitCli;

impl GitCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        phase: &str,
        timeout_ms: u64,
    ) -> ProcResult<String> {
        debug!(?args, "git");
        let command_line = format!("git {}", args.join(" "));

        let mut cmd = tokio::process::Command::new("git");
        cmd.args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }

        let child = cmd.spawn().map_err(|e| ProcError::SpawnFailed {
            command: command_line.clone(),
            detail: e.to_string(),
        })?;

        let output = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ProcError::Timeout {
            phase: format!("git {phase}"),
            limit_ms: timeout_ms,
        })?
        .map_err(|e| ProcError::SpawnFailed {
            command: command_line.clone(),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(ProcError::CommandFailed {
                command: command_line,
                exit_code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn head_sha(&self, cwd: &Path) -> ProcResult<String> {
        let out = self
            .run(&["rev-parse", "HEAD"], Some(cwd), "rev-parse", SCRIPT_TIMEOUT_MS)
            .await?;
        Ok(out.trim().to_string())
    }
}

/// Parse the `## branch...upstream [ahead 1, behind 2]` header line.
fn parse_branch_header(line: &str) -> (Option<String>, u32, u32) {
    let rest = line.trim_start_matches("## ");
    if rest.starts_with("No commits yet on ") {
        return (
            Some(rest.trim_start_matches("No commits yet on ").to_string()),
            0,
            0,
        );
    }
    let branch = rest
        .split("...")
        .next()
        .map(|b| b.split(' ').next().unwrap_or(b).to_string());

    let mut ahead = 0;
    let mut behind = 0;
    if let (Some(start), Some(end)) = (rest.find('['), rest.rfind(']')) {
        for part in rest[start + 1..end].split(',') {
            let part = part.trim();
            if let Some(n) = part.strip_prefix("ahead ") {
                ahead = n.parse().unwrap_or(0);
            } else if let Some(n) = part.strip_prefix("behind ") {
                behind = n.parse().unwrap_or(0);
            }
        }
    }
    (branch, ahead, behind)
}

#[async_trait]
impl Git for GitCli {
    async fn status(&self, cwd: &Path) -> ProcResult<GitStatus> {
        let out = self
            .run(
                &["status", "--porcelain=v1", "--branch"],
                Some(cwd),
                "status",
                SCRIPT_TIMEOUT_MS,
            )
            .await?;

        let mut branch = None;
        let mut ahead = 0;
        let mut behind = 0;
        let mut files = Vec::new();

        for line in out.lines() {
            if line.starts_with("## ") {
                let (b, a, be) = parse_branch_header(line);
                branch = b;
                ahead = a;
                behind = be;
                continue;
            }
            if line.len() < 4 {
                continue;
            }
            let status = line[..2].to_string();
            let staged = !status.starts_with(' ') && !status.starts_with('?');
            files.push(GitFileStatus {
                path: line[3..].to_string(),
                status,
                staged,
            });
        }

        Ok(GitStatus {
            branch,
            ahead,
            behind,
            clean: files.is_empty(),
            files,
        })
    }

    async fn add_all(&self, cwd: &Path) -> ProcResult<()> {
        self.run(&["add", "-A"], Some(cwd), "add", SCRIPT_TIMEOUT_MS)
            .await
            .map(|_| ())
    }

    async fn commit(&self, cwd: &Path, message: &str) -> ProcResult<String> {
        self.run(
            &["commit", "-m", message],
            Some(cwd),
            "commit",
            SCRIPT_TIMEOUT_MS,
        )
        .await?;
        self.head_sha(cwd).await
    }

    async fn push(&self, cwd: &Path) -> ProcResult<()> {
        self.run(&["push"], Some(cwd), "push", INSTALL_TIMEOUT_MS)
            .await
            .map(|_| ())
    }

    async fn pull(&self, cwd: &Path, remote: Option<&str>, rebase: bool) -> ProcResult<PullOutcome> {
        let before = self.head_sha(cwd).await.ok();

        let mut args = vec!["pull"];
        if rebase {
            args.push("--rebase");
        }
        if let Some(remote) = remote {
            args.push(remote);
        }
        let out = self
            .run(&args, Some(cwd), "pull", INSTALL_TIMEOUT_MS)
            .await?;

        let after = self.head_sha(cwd).await.ok();
        let commits = match (before, after) {
            (Some(before), Some(after)) if before != after => {
                let range = format!("{before}..{after}");
                self.run(
                    &["rev-list", "--count", &range],
                    Some(cwd),
                    "rev-list",
                    SCRIPT_TIMEOUT_MS,
                )
                .await
                .ok()
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(0)
            }
            _ => 0,
        };

        Ok(PullOutcome {
            commits,
            fast_forward: out.contains("Fast-forward"),
        })
    }

    async fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> ProcResult<()> {
        let dest_str = dest.to_string_lossy().to_string();
        let mut args = vec!["clone"];
        if let Some(branch) = branch {
            args.push("--branch");
            args.push(branch);
        }
        args.push(url);
        args.push(&dest_str);
        self.run(&args, None, "clone", INSTALL_TIMEOUT_MS)
            .await
            .map(|_| ())
    }

    async fn checkout(&self, cwd: &Path, reference: &str) -> ProcResult<()> {
        self.run(
            &["checkout", reference],
            Some(cwd),
            "checkout",
            SCRIPT_TIMEOUT_MS,
        )
        .await
        .map(|_| ())
    }

    async fn branches(&self, cwd: &Path) -> ProcResult<Vec<String>> {
        let out = self
            .run(
                &["branch", "--format=%(refname:short)"],
                Some(cwd),
                "branch",
                SCRIPT_TIMEOUT_MS,
            )
            .await?;
        Ok(out
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    async fn current_branch(&self, cwd: &Path) -> ProcResult<String> {
        let out = self
            .run(
                &["symbolic-ref", "--short", "HEAD"],
                Some(cwd),
                "symbolic-ref",
                SCRIPT_TIMEOUT_MS,
            )
            .await?;
        Ok(out.trim().to_string())
    }

    async fn remote_url(&self, cwd: &Path, name: &str) -> ProcResult<Option<String>> {
        match self
            .run(
                &["remote", "get-url", name],
                Some(cwd),
                "remote",
                SCRIPT_TIMEOUT_MS,
            )
            .await
        {
            Ok(out) => Ok(Some(out.trim().to_string())),
            Err(ProcError::CommandFailed { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn init(&self, cwd: &Path) -> ProcResult<()> {
        self.run(&["init"], Some(cwd), "init", SCRIPT_TIMEOUT_MS)
            .await
            .map(|_| ())
    }
}

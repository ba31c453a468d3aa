//! Package-manager collaborator: pnpm installs and script runs.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcError, ProcResult};
use crate::{INSTALL_TIMEOUT_MS, SCRIPT_TIMEOUT_MS};

/// Captured outcome of a subprocess run.
///
/// This is the one collaborator result that advertises an explicit success
/// boolean: a failed install or build returns `success = false` with the
/// captured stderr rather than raising, so workflows can tag the phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    pub success: bool,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// An install invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstallRequest {
    pub cwd: PathBuf,
    /// Specific packages to add; empty means "install the manifest".
    #[serde(default)]
    pub packages: Vec<String>,
    /// Add to devDependencies.
    #[serde(default)]
    pub dev: bool,
}

/// Package-manager operations.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// `pnpm install` (or `pnpm add` when packages are given).
    async fn install(&self, request: InstallRequest) -> ProcResult<CommandOutput>;

    /// `pnpm run <script>` in `cwd`.
    async fn run_script(&self, script: &str, cwd: &Path) -> ProcResult<CommandOutput>;
}

/// Real backend spawning the `pnpm` CLI.
#[derive(Debug, Default, Clone)]
pub struct PnpmCli;

impl PnpmCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        &self,
        args: Vec<String>,
        cwd: &Path,
        phase: &str,
        timeout_ms: u64,
    ) -> ProcResult<CommandOutput> {
        debug!(?args, cwd = %cwd.display(), "pnpm");
        let command_line = format!("pnpm {}", args.join(" "));
        let start = Instant::now();

        let child = tokio::process::Command::new("pnpm")
            .args(&args)
            .current_dir(cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcError::SpawnFailed {
                command: command_line.clone(),
                detail: e.to_string(),
            })?;

        let output = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ProcError::Timeout {
            phase: phase.to_string(),
            limit_ms: timeout_ms,
        })?
        .map_err(|e| ProcError::SpawnFailed {
            command: command_line,
            detail: e.to_string(),
        })?;

        Ok(CommandOutput {
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl PackageManager for PnpmCli {
    async fn install(&self, request: InstallRequest) -> ProcResult<CommandOutput> {
        let mut args = Vec::new();
        if request.packages.is_empty() {
            args.push("install".to_string());
        } else {
            args.push("add".to_string());
            if request.dev {
                args.push("--save-dev".to_string());
            }
            args.extend(request.packages.iter().cloned());
        }
        self.run(args, &request.cwd, "install", INSTALL_TIMEOUT_MS)
            .await
    }

    async fn run_script(&self, script: &str, cwd: &Path) -> ProcResult<CommandOutput> {
        self.run(
            vec!["run".to_string(), script.to_string()],
            cwd,
            script,
            SCRIPT_TIMEOUT_MS,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_request_defaults() {
        let req: InstallRequest =
            serde_json::from_str(r#"{"cwd": "/tmp/pkg"}"#).unwrap();
        assert!(req.packages.is_empty());
        assert!(!req.dev);
    }

    #[test]
    fn test_command_output_serde_roundtrip() {
        let out = CommandOutput {
            success: false,
            exit_code: 1,
            stdout: String::new(),
            stderr: "boom".to_string(),
            duration_ms: 12,
        };
        let json = serde_json::to_string(&out).unwrap();
        let back: CommandOutput = serde_json::from_str(&json).unwrap();
        assert!(!back.success);
        assert_eq!(back.stderr, "boom");
    }
}

//! Shell collaborator: one-shot commands with a hard timeout.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProcError, ProcResult};
use crate::pnpm::CommandOutput;

/// A single shell invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellRequest {
    /// Command line, run through `sh -c`.
    pub command: String,
    /// Working directory.
    pub cwd: PathBuf,
    /// Hard timeout; the process is killed on expiry.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_timeout_ms() -> u64 {
    crate::SCRIPT_TIMEOUT_MS
}

/// Shell command execution.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Run a command to completion. A non-zero exit is an error; the
    /// captured stderr rides along in [`ProcError::CommandFailed`].
    async fn exec(&self, request: ShellRequest) -> ProcResult<CommandOutput>;
}

/// Real backend over `tokio::process` and `sh -c`.
#[derive(Debug, Default, Clone)]
pub struct SystemShell;

impl SystemShell {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Shell for SystemShell {
    async fn exec(&self, request: ShellRequest) -> ProcResult<CommandOutput> {
        debug!(command = %request.command, cwd = %request.cwd.display(), "exec");
        let start = Instant::now();

        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(&request.command)
            .current_dir(&request.cwd)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcError::SpawnFailed {
                command: request.command.clone(),
                detail: e.to_string(),
            })?;

        let output = tokio::time::timeout(
            std::time::Duration::from_millis(request.timeout_ms),
            child.wait_with_output(),
        )
        .await
        .map_err(|_| ProcError::Timeout {
            phase: request.command.clone(),
            limit_ms: request.timeout_ms,
        })?
        .map_err(|e| ProcError::SpawnFailed {
            command: request.command.clone(),
            detail: e.to_string(),
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            return Err(ProcError::CommandFailed {
                command: request.command,
                exit_code,
                stderr,
            });
        }

        Ok(CommandOutput {
            success: true,
            exit_code,
            stdout,
            stderr,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(command: &str, cwd: &std::path::Path) -> ShellRequest {
        ShellRequest {
            command: command.to_string(),
            cwd: cwd.to_path_buf(),
            timeout_ms: 5_000,
        }
    }

    #[tokio::test]
    async fn test_exec_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let out = SystemShell::new()
            .exec(request("echo hello", dir.path()))
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.exit_code, 0);
        assert!(out.stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = SystemShell::new().exec(request("false", dir.path())).await;
        assert!(matches!(result, Err(ProcError::CommandFailed { .. })));
    }

    #[tokio::test]
    async fn test_exec_timeout_kills_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut req = request("sleep 5", dir.path());
        req.timeout_ms = 50;
        let result = SystemShell::new().exec(req).await;
        assert!(matches!(result, Err(ProcError::Timeout { .. })));
    }
}

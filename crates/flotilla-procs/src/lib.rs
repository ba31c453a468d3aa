//! External collaborator contracts for flotilla.
//!
//! The orchestrator core never touches the filesystem, spawns a process, or
//! runs git directly — it goes through the traits defined here:
//! - [`FileSystem`]: existence checks, JSON reads, atomic writes, removal
//! - [`Shell`]: one-shot shell commands with a hard timeout
//! - [`PackageManager`]: pnpm install / script runs
//! - [`Git`]: CLI git plumbing (status, commit, push, pull, clone, ...)
//! - [`SourceRewriter`]: import-specifier rewriting for the rename engine
//!
//! All traits are async and backend-agnostic. Real backends live next to
//! each trait; in-memory recording fakes are provided for testing via the
//! `fakes` module.

pub mod error;
pub mod fakes;
pub mod fs;
pub mod git;
pub mod pnpm;
pub mod rewrite;
pub mod shell;

pub use error::{ProcError, ProcResult};
pub use fs::{DirEntryInfo, FileSystem, LocalFileSystem};
pub use git::{Git, GitCli, GitFileStatus, GitStatus, PullOutcome};
pub use pnpm::{CommandOutput, InstallRequest, PackageManager, PnpmCli};
pub use rewrite::{ImportChange, ImportChangeKind, QuotedSpecifierRewriter, RewrittenSource, SourceRewriter};
pub use shell::{Shell, ShellRequest, SystemShell};

/// Hard per-call timeout for package installs (spec: install ≈ 5 min).
pub const INSTALL_TIMEOUT_MS: u64 = 300_000;

/// Hard per-call timeout for build/script runs (spec: build ≈ 2 min).
pub const SCRIPT_TIMEOUT_MS: u64 = 120_000;

/// Hard per-call timeout for recursive removals.
pub const REMOVE_TIMEOUT_MS: u64 = 30_000;

/// Hard per-call timeout for single-file removals.
pub const REMOVE_FILE_TIMEOUT_MS: u64 = 10_000;

//! In-memory fakes for the collaborator traits (testing only).
//!
//! Provides `MemoryFileSystem`, `ScriptedShell`, `RecordingPackageManager`,
//! and `RecordingGit` that satisfy the trait contracts without touching the
//! host system. All fakes record the calls they receive so tests can assert
//! on side effects (or their absence, for dry runs).

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ProcError, ProcResult};
use crate::fs::{DirEntryInfo, FileSystem};
use crate::git::{Git, GitStatus, PullOutcome};
use crate::pnpm::{CommandOutput, InstallRequest, PackageManager};
use crate::shell::{Shell, ShellRequest};

fn not_found(path: &Path) -> ProcError {
    ProcError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such path"),
    }
}

fn ok_output() -> CommandOutput {
    CommandOutput {
        success: true,
        exit_code: 0,
        stdout: String::new(),
        stderr: String::new(),
        duration_ms: 1,
    }
}

// ---------------------------------------------------------------------------
// MemoryFileSystem
// ---------------------------------------------------------------------------

/// In-memory filesystem backed by a path → content map.
///
/// Directories exist when explicitly created or implied by a deeper entry.
/// Every mutating call is appended to the mutation log.
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<PathBuf, String>>,
    dirs: Mutex<BTreeSet<PathBuf>>,
    mutations: Mutex<Vec<String>>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a file without recording a mutation.
    pub fn add_file(&self, path: impl Into<PathBuf>, content: impl Into<String>) {
        self.files.lock().unwrap().insert(path.into(), content.into());
    }

    /// Seed a directory without recording a mutation.
    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.dirs.lock().unwrap().insert(path.into());
    }

    /// Current content of a file, if present.
    pub fn file(&self, path: &Path) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    /// All mutating calls (`write`, `mkdir`, `remove`) in order.
    pub fn mutations(&self) -> Vec<String> {
        self.mutations.lock().unwrap().clone()
    }

    fn record(&self, op: String) {
        self.mutations.lock().unwrap().push(op);
    }

    fn exists_sync(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        if files.contains_key(path) {
            return true;
        }
        let dirs = self.dirs.lock().unwrap();
        if dirs.contains(path) {
            return true;
        }
        // Implied directory: prefix of any known file or dir.
        files.keys().any(|p| p.starts_with(path) && p != path)
            || dirs.iter().any(|p| p.starts_with(path) && p != path)
    }
}

#[async_trait]
impl FileSystem for MemoryFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.exists_sync(path)
    }

    async fn read_json(&self, path: &Path) -> ProcResult<Value> {
        let text = self.read_text(path).await?;
        serde_json::from_str(&text).map_err(|e| ProcError::InvalidJson {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    async fn read_text(&self, path: &Path) -> ProcResult<String> {
        self.file(path).ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &Path, content: &str) -> ProcResult<()> {
        self.record(format!("write {}", path.display()));
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), content.to_string());
        Ok(())
    }

    async fn mkdir_p(&self, path: &Path) -> ProcResult<()> {
        self.record(format!("mkdir {}", path.display()));
        self.dirs.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    async fn remove(&self, path: &Path, recursive: bool, force: bool) -> ProcResult<()> {
        self.record(format!("remove {}", path.display()));
        let mut files = self.files.lock().unwrap();
        let mut dirs = self.dirs.lock().unwrap();

        let mut removed = files.remove(path).is_some() | dirs.remove(path);
        if recursive {
            let under: Vec<PathBuf> = files
                .keys()
                .filter(|p| p.starts_with(path))
                .cloned()
                .collect();
            for p in under {
                files.remove(&p);
                removed = true;
            }
            let under: Vec<PathBuf> = dirs
                .iter()
                .filter(|p| p.starts_with(path))
                .cloned()
                .collect();
            for p in under {
                dirs.remove(&p);
                removed = true;
            }
        }

        if removed || force {
            Ok(())
        } else {
            Err(not_found(path))
        }
    }

    async fn read_dir(&self, path: &Path) -> ProcResult<Vec<DirEntryInfo>> {
        if !self.exists_sync(path) {
            return Err(not_found(path));
        }
        let files = self.files.lock().unwrap();
        let dirs = self.dirs.lock().unwrap();
        let mut entries: BTreeMap<String, bool> = BTreeMap::new();

        for p in files.keys().chain(dirs.iter()) {
            if let Ok(rest) = p.strip_prefix(path) {
                let mut components = rest.components();
                if let Some(first) = components.next() {
                    let name = first.as_os_str().to_string_lossy().to_string();
                    let is_dir = components.next().is_some() || dirs.contains(p);
                    *entries.entry(name).or_insert(is_dir) |= is_dir;
                }
            }
        }

        Ok(entries
            .into_iter()
            .map(|(name, is_dir)| DirEntryInfo { name, is_dir })
            .collect())
    }

    async fn find_source_files(
        &self,
        root: &Path,
        extensions: &[String],
        skip_dirs: &[String],
    ) -> ProcResult<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        let mut out: Vec<PathBuf> = files
            .keys()
            .filter(|p| p.starts_with(root))
            .filter(|p| {
                p.extension()
                    .map(|ext| {
                        let ext = ext.to_string_lossy();
                        extensions.iter().any(|e| e.as_str() == ext)
                    })
                    .unwrap_or(false)
            })
            .filter(|p| {
                !p.components().any(|c| {
                    let name = c.as_os_str().to_string_lossy();
                    skip_dirs.iter().any(|s| s.as_str() == name)
                })
            })
            .cloned()
            .collect();
        out.sort();
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// ScriptedShell
// ---------------------------------------------------------------------------

/// Shell fake: records every request; commands containing a scripted
/// failure substring fail, everything else succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedShell {
    calls: Mutex<Vec<ShellRequest>>,
    fail_containing: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make any command whose line contains `fragment` fail.
    pub fn fail_commands_containing(&self, fragment: impl Into<String>) {
        self.fail_containing.lock().unwrap().push(fragment.into());
    }

    pub fn calls(&self) -> Vec<ShellRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Shell for ScriptedShell {
    async fn exec(&self, request: ShellRequest) -> ProcResult<CommandOutput> {
        self.calls.lock().unwrap().push(request.clone());
        let should_fail = self
            .fail_containing
            .lock()
            .unwrap()
            .iter()
            .any(|f| request.command.contains(f.as_str()));
        if should_fail {
            return Err(ProcError::CommandFailed {
                command: request.command,
                exit_code: 1,
                stderr: "scripted failure".to_string(),
            });
        }
        Ok(ok_output())
    }
}

// ---------------------------------------------------------------------------
// RecordingPackageManager
// ---------------------------------------------------------------------------

/// Package-manager fake: records installs and script runs; failures are
/// scripted per working directory and reported through the success boolean.
#[derive(Debug, Default)]
pub struct RecordingPackageManager {
    installs: Mutex<Vec<InstallRequest>>,
    scripts: Mutex<Vec<(String, PathBuf)>>,
    fail_install_in: Mutex<BTreeSet<PathBuf>>,
    fail_script_in: Mutex<BTreeSet<PathBuf>>,
}

impl RecordingPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_install_in(&self, cwd: impl Into<PathBuf>) {
        self.fail_install_in.lock().unwrap().insert(cwd.into());
    }

    pub fn fail_script_in(&self, cwd: impl Into<PathBuf>) {
        self.fail_script_in.lock().unwrap().insert(cwd.into());
    }

    pub fn installs(&self) -> Vec<InstallRequest> {
        self.installs.lock().unwrap().clone()
    }

    pub fn scripts(&self) -> Vec<(String, PathBuf)> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackageManager for RecordingPackageManager {
    async fn install(&self, request: InstallRequest) -> ProcResult<CommandOutput> {
        let fail = self
            .fail_install_in
            .lock()
            .unwrap()
            .contains(&request.cwd);
        self.installs.lock().unwrap().push(request);
        if fail {
            return Ok(CommandOutput {
                success: false,
                exit_code: 1,
                stdout: String::new(),
                stderr: "scripted install failure".to_string(),
                duration_ms: 1,
            });
        }
        Ok(ok_output())
    }

    async fn run_script(&self, script: &str, cwd: &Path) -> ProcResult<CommandOutput> {
        let fail = self.fail_script_in.lock().unwrap().contains(cwd);
        self.scripts
            .lock()
            .unwrap()
            .push((script.to_string(), cwd.to_path_buf()));
        if fail {
            return Ok(CommandOutput {
                success: false,
                exit_code: 1,
                stdout: String::new(),
                stderr: format!("scripted {script} failure"),
                duration_ms: 1,
            });
        }
        Ok(ok_output())
    }
}

// ---------------------------------------------------------------------------
// RecordingGit
// ---------------------------------------------------------------------------

/// Git fake: records operations as readable strings; branch and remote
/// answers are scripted per working directory.
///
/// When constructed with [`RecordingGit::with_fs`], `clone_repo`
/// materializes any files seeded for the URL into the shared
/// [`MemoryFileSystem`], so a cloned package is visible to a later scan.
#[derive(Default)]
pub struct RecordingGit {
    ops: Mutex<Vec<String>>,
    branches: Mutex<HashMap<PathBuf, String>>,
    remotes: Mutex<HashMap<PathBuf, String>>,
    without_repo: Mutex<BTreeSet<PathBuf>>,
    fail_ops: Mutex<Vec<String>>,
    clone_seeds: Mutex<HashMap<String, Vec<(PathBuf, String)>>>,
    fs: Option<Arc<MemoryFileSystem>>,
}

impl RecordingGit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fs(fs: Arc<MemoryFileSystem>) -> Self {
        Self {
            fs: Some(fs),
            ..Self::default()
        }
    }

    pub fn set_branch(&self, cwd: impl Into<PathBuf>, branch: impl Into<String>) {
        self.branches.lock().unwrap().insert(cwd.into(), branch.into());
    }

    pub fn set_remote(&self, cwd: impl Into<PathBuf>, url: impl Into<String>) {
        self.remotes.lock().unwrap().insert(cwd.into(), url.into());
    }

    /// Mark a directory as having no git repository: branch probes fail.
    pub fn mark_without_repo(&self, cwd: impl Into<PathBuf>) {
        self.without_repo.lock().unwrap().insert(cwd.into());
    }

    /// Make a git operation (by name: "push", "pull", "clone", ...) fail.
    pub fn fail_op(&self, op: impl Into<String>) {
        self.fail_ops.lock().unwrap().push(op.into());
    }

    /// Files to materialize in the shared fs when `url` is cloned.
    pub fn seed_clone(&self, url: impl Into<String>, files: Vec<(PathBuf, String)>) {
        self.clone_seeds.lock().unwrap().insert(url.into(), files);
    }

    pub fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    /// Count of recorded operations whose name matches `op`.
    pub fn count_of(&self, op: &str) -> usize {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter(|o| o.starts_with(op))
            .count()
    }

    fn check(&self, op: &str, detail: &str) -> ProcResult<()> {
        self.ops.lock().unwrap().push(format!("{op} {detail}"));
        if self.fail_ops.lock().unwrap().iter().any(|f| f == op) {
            return Err(ProcError::CommandFailed {
                command: format!("git {op}"),
                exit_code: 1,
                stderr: format!("scripted {op} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Git for RecordingGit {
    async fn status(&self, cwd: &Path) -> ProcResult<GitStatus> {
        self.check("status", &cwd.display().to_string())?;
        Ok(GitStatus {
            branch: self.branches.lock().unwrap().get(cwd).cloned(),
            ahead: 0,
            behind: 0,
            files: Vec::new(),
            clean: true,
        })
    }

    async fn add_all(&self, cwd: &Path) -> ProcResult<()> {
        self.check("add", &cwd.display().to_string())
    }

    async fn commit(&self, cwd: &Path, message: &str) -> ProcResult<String> {
        self.check("commit", &format!("{} {}", cwd.display(), message))?;
        Ok("f1ee71a0".to_string())
    }

    async fn push(&self, cwd: &Path) -> ProcResult<()> {
        self.check("push", &cwd.display().to_string())
    }

    async fn pull(&self, cwd: &Path, remote: Option<&str>, rebase: bool) -> ProcResult<PullOutcome> {
        self.check(
            "pull",
            &format!("{} {} rebase={rebase}", cwd.display(), remote.unwrap_or("origin")),
        )?;
        Ok(PullOutcome {
            commits: 0,
            fast_forward: true,
        })
    }

    async fn clone_repo(&self, url: &str, dest: &Path, branch: Option<&str>) -> ProcResult<()> {
        self.check(
            "clone",
            &format!("{url} -> {} branch={}", dest.display(), branch.unwrap_or("-")),
        )?;
        if let Some(fs) = &self.fs {
            fs.add_dir(dest);
            if let Some(files) = self.clone_seeds.lock().unwrap().get(url) {
                for (path, content) in files {
                    fs.add_file(path.clone(), content.clone());
                }
            }
        }
        Ok(())
    }

    async fn checkout(&self, cwd: &Path, reference: &str) -> ProcResult<()> {
        self.check("checkout", &format!("{} {reference}", cwd.display()))
    }

    async fn branches(&self, cwd: &Path) -> ProcResult<Vec<String>> {
        self.check("branch", &cwd.display().to_string())?;
        Ok(self
            .branches
            .lock()
            .unwrap()
            .get(cwd)
            .cloned()
            .into_iter()
            .collect())
    }

    async fn current_branch(&self, cwd: &Path) -> ProcResult<String> {
        if self.without_repo.lock().unwrap().contains(cwd) {
            return Err(ProcError::CommandFailed {
                command: "git symbolic-ref --short HEAD".to_string(),
                exit_code: 128,
                stderr: "not a git repository".to_string(),
            });
        }
        self.check("current-branch", &cwd.display().to_string())?;
        Ok(self
            .branches
            .lock()
            .unwrap()
            .get(cwd)
            .cloned()
            .unwrap_or_else(|| "main".to_string()))
    }

    async fn remote_url(&self, cwd: &Path, name: &str) -> ProcResult<Option<String>> {
        self.check("remote", &format!("{} {name}", cwd.display()))?;
        Ok(self.remotes.lock().unwrap().get(cwd).cloned())
    }

    async fn init(&self, cwd: &Path) -> ProcResult<()> {
        self.check("init", &cwd.display().to_string())
    }
}

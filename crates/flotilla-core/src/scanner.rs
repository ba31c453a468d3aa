//! Manifest-driven package discovery.
//!
//! The manifest is the authoritative set: the scanner never traverses
//! arbitrary directories. Problems with individual packages produce
//! warnings and skips, never a failed scan.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument, warn};

use flotilla_procs::{FileSystem, Git};

use crate::config::EcosystemConfig;
use crate::error::EcosystemResult;
use crate::gitref::is_internal_ref;
use crate::manifest::Manifest;

/// Discovered metadata for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDescriptor {
    /// Canonical identifier (declared name, or the manifest key).
    pub name: String,
    /// Absolute path on local disk.
    pub repo_path: PathBuf,
    /// `origin` remote URL, when configured.
    pub git_remote: Option<String>,
    /// Currently checked-out branch, when the directory is a git repo.
    pub current_branch: Option<String>,
    /// Names of other packages declared as ecosystem git-refs, in
    /// declaration order.
    pub internal_deps: Vec<String>,
}

/// Result of scanning the manifest's package set.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub packages: Vec<PackageDescriptor>,
    pub warnings: Vec<String>,
}

/// Scans manifest-listed packages on disk.
pub struct Scanner {
    fs: Arc<dyn FileSystem>,
    git: Arc<dyn Git>,
    config: EcosystemConfig,
}

impl Scanner {
    pub fn new(fs: Arc<dyn FileSystem>, git: Arc<dyn Git>, config: EcosystemConfig) -> Self {
        Self { fs, git, config }
    }

    /// Validate each listed package and collect its metadata.
    #[instrument(skip(self, manifest, root), fields(packages = manifest.packages.len()))]
    pub async fn scan(
        &self,
        manifest: &Manifest,
        root: &std::path::Path,
    ) -> EcosystemResult<ScanReport> {
        let mut report = ScanReport::default();

        for (key, entry) in &manifest.packages {
            let dir = manifest.base_dir(root).join(&entry.path);

            if !self.fs.exists(&dir).await {
                warn!(package = %key, dir = %dir.display(), "Package directory does not exist");
                report
                    .warnings
                    .push(format!("Package directory does not exist: {}", dir.display()));
                continue;
            }

            let package_json = dir.join("package.json");
            let pkg = match self.fs.read_json(&package_json).await {
                Ok(value) => value,
                Err(e) => {
                    warn!(package = %key, "unreadable package.json: {e}");
                    report
                        .warnings
                        .push(format!("Unreadable package.json for {key}: {e}"));
                    continue;
                }
            };

            let name = pkg
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(key)
                .to_string();
            let internal_deps = collect_internal_deps(&pkg, &self.config.owner);

            // Git probing is best-effort: a missing .git directory yields a
            // descriptor without branch/remote plus a warning.
            let (current_branch, git_remote) = match self.git.current_branch(&dir).await {
                Ok(branch) => {
                    let remote = self.git.remote_url(&dir, "origin").await.unwrap_or(None);
                    (Some(branch), remote)
                }
                Err(e) => {
                    debug!(package = %name, "git probe failed: {e}");
                    report
                        .warnings
                        .push(format!("No git repository for {name}: {e}"));
                    (None, None)
                }
            };

            report.packages.push(PackageDescriptor {
                name,
                repo_path: dir,
                git_remote,
                current_branch,
                internal_deps,
            });
        }

        debug!(
            scanned = report.packages.len(),
            warnings = report.warnings.len(),
            "scan complete"
        );
        Ok(report)
    }
}

/// Merge `dependencies` and `devDependencies`, keeping the keys whose
/// version strings satisfy the internal-ref predicate.
fn collect_internal_deps(pkg: &Value, owner: &str) -> Vec<String> {
    let mut deps = Vec::new();
    for table in ["dependencies", "devDependencies"] {
        if let Some(map) = pkg.get(table).and_then(Value::as_object) {
            for (dep_name, version) in map {
                if let Some(spec) = version.as_str() {
                    if is_internal_ref(spec, owner) && !deps.contains(dep_name) {
                        deps.push(dep_name.clone());
                    }
                }
            }
        }
    }
    deps
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_procs::fakes::{MemoryFileSystem, RecordingGit};
    use std::path::Path;

    fn package_json(name: &str, deps: &[(&str, &str)]) -> String {
        let deps: serde_json::Map<String, Value> = deps
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect();
        serde_json::json!({ "name": name, "dependencies": deps }).to_string()
    }

    fn manifest_two_packages() -> Manifest {
        serde_json::from_value(serde_json::json!({
            "version": "1.0.0",
            "root": "/eco",
            "packages": {
                "@flotilla/toolkit": { "repo": "github:flotilla/toolkit#main", "path": "toolkit" },
                "@flotilla/app": { "repo": "github:flotilla/app#main", "path": "app" }
            },
            "projectTemplate": { "files": [], "dirs": [] }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_scan_collects_internal_deps_only() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file(
            "/eco/toolkit/package.json",
            package_json("@flotilla/toolkit", &[("lodash", "^4.0.0")]),
        );
        fs.add_file(
            "/eco/app/package.json",
            package_json(
                "@flotilla/app",
                &[
                    ("@flotilla/toolkit", "github:flotilla/toolkit#main"),
                    ("express", "^4.18.0"),
                    ("some-fork", "github:stranger/fork#main"),
                ],
            ),
        );
        let git = Arc::new(RecordingGit::new());
        git.set_branch("/eco/app", "dev");

        let scanner = Scanner::new(fs, git, EcosystemConfig::default());
        let report = scanner
            .scan(&manifest_two_packages(), Path::new("/eco"))
            .await
            .unwrap();

        assert_eq!(report.packages.len(), 2);
        let app = report
            .packages
            .iter()
            .find(|p| p.name == "@flotilla/app")
            .unwrap();
        assert_eq!(app.internal_deps, vec!["@flotilla/toolkit"]);
        assert_eq!(app.current_branch.as_deref(), Some("dev"));
    }

    #[tokio::test]
    async fn test_scan_warns_and_skips_missing_dir() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file(
            "/eco/toolkit/package.json",
            package_json("@flotilla/toolkit", &[]),
        );
        let git = Arc::new(RecordingGit::new());

        let scanner = Scanner::new(fs, git, EcosystemConfig::default());
        let report = scanner
            .scan(&manifest_two_packages(), Path::new("/eco"))
            .await
            .unwrap();

        assert_eq!(report.packages.len(), 1);
        assert!(report
            .warnings
            .iter()
            .any(|w| w.contains("does not exist")));
    }

    #[tokio::test]
    async fn test_scan_without_git_keeps_descriptor() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file(
            "/eco/toolkit/package.json",
            package_json("@flotilla/toolkit", &[]),
        );
        fs.add_file("/eco/app/package.json", package_json("@flotilla/app", &[]));
        let git = Arc::new(RecordingGit::new());
        git.mark_without_repo("/eco/toolkit");

        let scanner = Scanner::new(fs, git, EcosystemConfig::default());
        let report = scanner
            .scan(&manifest_two_packages(), Path::new("/eco"))
            .await
            .unwrap();

        let toolkit = report
            .packages
            .iter()
            .find(|p| p.name == "@flotilla/toolkit")
            .unwrap();
        assert!(toolkit.current_branch.is_none());
        assert!(toolkit.git_remote.is_none());
        assert!(report.warnings.iter().any(|w| w.contains("No git repository")));
    }

    #[tokio::test]
    async fn test_scan_defaults_name_to_manifest_key() {
        let fs = Arc::new(MemoryFileSystem::new());
        fs.add_file("/eco/toolkit/package.json", "{}");
        fs.add_file("/eco/app/package.json", package_json("@flotilla/app", &[]));
        let git = Arc::new(RecordingGit::new());

        let scanner = Scanner::new(fs, git, EcosystemConfig::default());
        let report = scanner
            .scan(&manifest_two_packages(), Path::new("/eco"))
            .await
            .unwrap();

        assert!(report
            .packages
            .iter()
            .any(|p| p.name == "@flotilla/toolkit"));
    }
}

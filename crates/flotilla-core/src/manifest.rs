//! The ecosystem manifest: the persistent, human-edited package inventory.
//!
//! Lives at `<root>/ecosystem/ecosystem.manifest.json`. Only the rename,
//! new, and audit-fix workflows mutate it; every write is a full
//! read-modify-write through the atomic [`FileSystem::write`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use flotilla_procs::FileSystem;

use crate::error::{EcosystemError, EcosystemResult};

/// Required files and directories every package must contain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTemplate {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub dirs: Vec<String>,
}

impl Default for ProjectTemplate {
    fn default() -> Self {
        Self {
            files: vec![
                "package.json".to_string(),
                "tsconfig.json".to_string(),
                "README.md".to_string(),
                ".gitignore".to_string(),
            ],
            dirs: vec!["src".to_string()],
        }
    }
}

/// One package entry in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Git ref string, `host:owner/repo#ref`.
    pub repo: String,
    /// Path relative to the manifest root.
    pub path: String,
}

/// The ecosystem manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: String,
    /// Filesystem prefix for package paths; may begin with `~`.
    pub root: String,
    pub packages: BTreeMap<String, ManifestEntry>,
    #[serde(rename = "projectTemplate", default)]
    pub project_template: ProjectTemplate,
}

/// Location of the manifest file under an ecosystem root directory.
pub fn manifest_path(root: &Path) -> PathBuf {
    root.join("ecosystem").join("ecosystem.manifest.json")
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(base) = directories::BaseDirs::new() {
            let rest = rest.trim_start_matches('/');
            return base.home_dir().join(rest);
        }
    }
    PathBuf::from(path)
}

impl Manifest {
    /// Read the manifest from `<root>/ecosystem/ecosystem.manifest.json`.
    pub async fn load(fs: &Arc<dyn FileSystem>, root: &Path) -> EcosystemResult<Self> {
        let path = manifest_path(root);
        if !fs.exists(&path).await {
            return Err(EcosystemError::ManifestMissing { path });
        }
        let value = fs
            .read_json(&path)
            .await
            .map_err(|e| EcosystemError::ManifestInvalid {
                path: path.clone(),
                detail: e.to_string(),
            })?;
        serde_json::from_value(value).map_err(|e| EcosystemError::ManifestInvalid {
            path,
            detail: e.to_string(),
        })
    }

    /// Write the manifest back (pretty-printed, atomic).
    pub async fn save(&self, fs: &Arc<dyn FileSystem>, root: &Path) -> EcosystemResult<()> {
        let path = manifest_path(root);
        let content = serde_json::to_string_pretty(self)
            .expect("manifest is always serializable");
        fs.write(&path, &content).await?;
        Ok(())
    }

    /// Base directory for package paths (the manifest's own root, with `~`
    /// expanded; the ecosystem root is the fallback when unset).
    pub fn base_dir(&self, root: &Path) -> PathBuf {
        if self.root.is_empty() {
            root.to_path_buf()
        } else {
            expand_home(&self.root)
        }
    }

    /// Absolute directory of a listed package.
    pub fn package_dir(&self, root: &Path, name: &str) -> Option<PathBuf> {
        self.packages
            .get(name)
            .map(|entry| self.base_dir(root).join(&entry.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flotilla_procs::fakes::MemoryFileSystem;

    fn manifest_json() -> String {
        serde_json::json!({
            "version": "1.0.0",
            "root": "/eco",
            "packages": {
                "@flotilla/toolkit": { "repo": "github:flotilla/toolkit#main", "path": "toolkit" },
                "@flotilla/app": { "repo": "github:flotilla/app#main", "path": "app" }
            },
            "projectTemplate": { "files": ["package.json"], "dirs": ["src"] }
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_load_parses_entries() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/eco/ecosystem/ecosystem.manifest.json", manifest_json());
        let fs: Arc<dyn FileSystem> = Arc::new(fs);

        let manifest = Manifest::load(&fs, Path::new("/eco")).await.unwrap();
        assert_eq!(manifest.packages.len(), 2);
        assert_eq!(
            manifest.package_dir(Path::new("/eco"), "@flotilla/app"),
            Some(PathBuf::from("/eco/app"))
        );
    }

    #[tokio::test]
    async fn test_load_missing_manifest() {
        let fs: Arc<dyn FileSystem> = Arc::new(MemoryFileSystem::new());
        let err = Manifest::load(&fs, Path::new("/eco")).await.unwrap_err();
        assert!(matches!(err, EcosystemError::ManifestMissing { .. }));
    }

    #[tokio::test]
    async fn test_load_invalid_shape() {
        let fs = MemoryFileSystem::new();
        fs.add_file(
            "/eco/ecosystem/ecosystem.manifest.json",
            r#"{"version": 7}"#,
        );
        let fs: Arc<dyn FileSystem> = Arc::new(fs);

        let err = Manifest::load(&fs, Path::new("/eco")).await.unwrap_err();
        assert!(matches!(err, EcosystemError::ManifestInvalid { .. }));
    }

    #[tokio::test]
    async fn test_save_round_trips() {
        let fs = MemoryFileSystem::new();
        fs.add_file("/eco/ecosystem/ecosystem.manifest.json", manifest_json());
        let fs: Arc<dyn FileSystem> = Arc::new(fs);

        let mut manifest = Manifest::load(&fs, Path::new("/eco")).await.unwrap();
        manifest.packages.insert(
            "@flotilla/util".to_string(),
            ManifestEntry {
                repo: "github:flotilla/util#main".to_string(),
                path: "util".to_string(),
            },
        );
        manifest.save(&fs, Path::new("/eco")).await.unwrap();

        let reloaded = Manifest::load(&fs, Path::new("/eco")).await.unwrap();
        assert_eq!(reloaded.packages.len(), 3);
    }

    #[test]
    fn test_expand_home_passthrough() {
        assert_eq!(expand_home("/plain/path"), PathBuf::from("/plain/path"));
    }
}

//! Filesystem collaborator: existence, JSON reads, atomic writes, removal.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ProcError, ProcResult};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    /// File or directory name (no path prefix).
    pub name: String,
    /// True when the entry is a directory.
    pub is_dir: bool,
}

/// Filesystem operations the orchestrator depends on.
///
/// Guarantees:
/// - `write` is atomic relative to the target file: content lands via a
///   temp file in the same directory followed by a rename.
/// - `remove` with `force` treats a missing path as success.
/// - `find_source_files` never descends into the skip list.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Whether `path` exists (file or directory).
    async fn exists(&self, path: &Path) -> bool;

    /// Read and parse a JSON file. Invalid JSON is an error, not a default.
    async fn read_json(&self, path: &Path) -> ProcResult<Value>;

    /// Read a file as UTF-8 text.
    async fn read_text(&self, path: &Path) -> ProcResult<String>;

    /// Write `content` to `path` atomically (temp file + rename).
    async fn write(&self, path: &Path, content: &str) -> ProcResult<()>;

    /// Create `path` and any missing parents.
    async fn mkdir_p(&self, path: &Path) -> ProcResult<()>;

    /// Remove a file or directory tree.
    async fn remove(&self, path: &Path, recursive: bool, force: bool) -> ProcResult<()>;

    /// List a directory's entries.
    async fn read_dir(&self, path: &Path) -> ProcResult<Vec<DirEntryInfo>>;

    /// Walk `root` and collect files whose extension is in `extensions`,
    /// skipping any directory named in `skip_dirs`. Results are sorted.
    async fn find_source_files(
        &self,
        root: &Path,
        extensions: &[String],
        skip_dirs: &[String],
    ) -> ProcResult<Vec<PathBuf>>;
}

/// Real backend over `tokio::fs` (walkdir for the source-file walk).
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    fn io_err(path: &Path, source: std::io::Error) -> ProcError {
        ProcError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_json(&self, path: &Path) -> ProcResult<Value> {
        let text = self.read_text(path).await?;
        serde_json::from_str(&text).map_err(|e| ProcError::InvalidJson {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    async fn read_text(&self, path: &Path) -> ProcResult<String> {
        tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Self::io_err(path, e))
    }

    async fn write(&self, path: &Path, content: &str) -> ProcResult<()> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "file".to_string());
        let tmp = path.with_file_name(format!(".{file_name}.tmp"));
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| Self::io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| Self::io_err(path, e))
    }

    async fn mkdir_p(&self, path: &Path) -> ProcResult<()> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| Self::io_err(path, e))
    }

    async fn remove(&self, path: &Path, recursive: bool, force: bool) -> ProcResult<()> {
        let result = if recursive {
            tokio::fs::remove_dir_all(path).await
        } else {
            tokio::fs::remove_file(path).await
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) if force && e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(path, e)),
        }
    }

    async fn read_dir(&self, path: &Path) -> ProcResult<Vec<DirEntryInfo>> {
        let mut reader = tokio::fs::read_dir(path)
            .await
            .map_err(|e| Self::io_err(path, e))?;
        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| Self::io_err(path, e))?
        {
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| Self::io_err(&entry.path(), e))?;
            entries.push(DirEntryInfo {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn find_source_files(
        &self,
        root: &Path,
        extensions: &[String],
        skip_dirs: &[String],
    ) -> ProcResult<Vec<PathBuf>> {
        let root = root.to_path_buf();
        let extensions = extensions.to_vec();
        let skip_dirs = skip_dirs.to_vec();
        let files = tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            let walker = walkdir::WalkDir::new(&root).into_iter().filter_entry(|e| {
                if !e.file_type().is_dir() {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !skip_dirs.iter().any(|s| s.as_str() == name)
            });
            for entry in walker.flatten() {
                if !entry.file_type().is_file() {
                    continue;
                }
                let matches = entry
                    .path()
                    .extension()
                    .map(|ext| {
                        let ext = ext.to_string_lossy();
                        extensions.iter().any(|e| e.as_str() == ext)
                    })
                    .unwrap_or(false);
                if matches {
                    files.push(entry.path().to_path_buf());
                }
            }
            files.sort();
            files
        })
        .await
        .map_err(|e| ProcError::Io {
            path: PathBuf::new(),
            source: std::io::Error::other(e),
        })?;
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_then_read_json() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new();
        let path = dir.path().join("data.json");

        fs.write(&path, r#"{"ok": true}"#).await.unwrap();
        let value = fs.read_json(&path).await.unwrap();
        assert_eq!(value["ok"], serde_json::json!(true));
    }

    #[tokio::test]
    async fn test_read_json_rejects_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new();
        let path = dir.path().join("broken.json");
        fs.write(&path, "{not json").await.unwrap();

        let result = fs.read_json(&path).await;
        assert!(matches!(result, Err(ProcError::InvalidJson { .. })));
    }

    #[tokio::test]
    async fn test_remove_force_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new();
        let path = dir.path().join("missing");

        fs.remove(&path, true, true).await.unwrap();
        assert!(fs.remove(&path, true, false).await.is_err());
    }

    #[tokio::test]
    async fn test_find_source_files_skips_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new();
        fs.mkdir_p(&dir.path().join("src")).await.unwrap();
        fs.mkdir_p(&dir.path().join("node_modules/dep")).await.unwrap();
        fs.write(&dir.path().join("src/a.ts"), "export {}").await.unwrap();
        fs.write(&dir.path().join("node_modules/dep/b.ts"), "export {}")
            .await
            .unwrap();
        fs.write(&dir.path().join("src/readme.md"), "#").await.unwrap();

        let files = fs
            .find_source_files(
                dir.path(),
                &["ts".to_string(), "tsx".to_string()],
                &["node_modules".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("src/a.ts"));
    }

    #[tokio::test]
    async fn test_mkdir_p_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let fs = LocalFileSystem::new();
        let nested = dir.path().join("a/b/c");

        fs.mkdir_p(&nested).await.unwrap();
        fs.mkdir_p(&nested).await.unwrap();
        assert!(fs.exists(&nested).await);
    }
}

//! File explorer operations
//!
//! Every operation logs a single `fs` event carrying the action, the client
//! path and the outcome.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::{to_api_path, FsError, FsResult, PathResolver};

/// What a directory entry points at
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// A filesystem root (drive letter on Windows, `/` elsewhere)
    Drive,
    Dir,
    File,
}

/// A single listing entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirEntry {
    /// Display name
    pub name: String,
    /// Path to send back for follow-up requests (forward slashes)
    pub path: String,
    /// Whether the entry can be listed
    pub is_dir: bool,
    /// Entry kind
    pub kind: EntryKind,
}

impl DirEntry {
    fn root(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            is_dir: true,
            kind: EntryKind::Drive,
        }
    }
}

/// Directories first, then case-insensitive by name
fn listing_order(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.is_dir
        .cmp(&a.is_dir)
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
}

/// Log the outcome of a filesystem action
fn log_outcome<T>(action: &str, path: &str, result: &FsResult<T>, detail: Option<String>) {
    let path = if path.trim().is_empty() { "Root" } else { path };
    match result {
        Ok(_) => info!(
            action,
            path,
            status = "success",
            detail = detail.as_deref().unwrap_or(""),
            "fs"
        ),
        Err(e) => warn!(action, path, status = "error", detail = %e, "fs"),
    }
}

/// Filesystem operations exposed to clients
#[derive(Debug, Clone, Default)]
pub struct FileExplorer {
    resolver: PathResolver,
}

impl FileExplorer {
    /// Create an explorer; `root` confines every operation when set
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            resolver: PathResolver::new(root),
        }
    }

    /// List a directory; an empty path lists the roots
    pub async fn list(&self, raw: &str) -> FsResult<Vec<DirEntry>> {
        let result = if raw.trim().is_empty() {
            Ok(self.roots())
        } else {
            self.list_dir(raw).await
        };
        let detail = result.as_ref().ok().map(|e| format!("count={}", e.len()));
        log_outcome("list", raw, &result, detail);
        result
    }

    /// Read a file as text; invalid UTF-8 is replaced
    pub async fn read(&self, raw: &str) -> FsResult<String> {
        let result = self.read_text(raw).await;
        let detail = result.as_ref().ok().map(|c| format!("bytes={}", c.len()));
        log_outcome("read", raw, &result, detail);
        result
    }

    /// Write a text file, creating missing parent directories
    pub async fn write(&self, raw: &str, content: &str) -> FsResult<()> {
        let result = self.write_text(raw, content).await;
        log_outcome("write", raw, &result, Some(format!("bytes={}", content.len())));
        result
    }

    /// Create a directory and any missing parents
    pub async fn mkdir(&self, raw: &str) -> FsResult<()> {
        let result = self.make_dir(raw).await;
        log_outcome("mkdir", raw, &result, None);
        result
    }

    /// Delete a file or an empty directory
    pub async fn delete(&self, raw: &str) -> FsResult<()> {
        let result = self.remove(raw).await;
        log_outcome("delete", raw, &result, None);
        result
    }

    /// Resolve a path that must name an existing directory
    pub async fn resolve_dir(&self, raw: &str) -> FsResult<PathBuf> {
        let path = self.resolver.resolve(raw)?;
        let meta = tokio::fs::metadata(&path).await?;
        if !meta.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok(path)
    }

    fn roots(&self) -> Vec<DirEntry> {
        if let Some(root) = self.resolver.root() {
            let name = root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| to_api_path(root));
            return vec![DirEntry::root(name, to_api_path(root))];
        }
        platform_roots()
    }

    async fn list_dir(&self, raw: &str) -> FsResult<Vec<DirEntry>> {
        let dir = self.resolve_dir(raw).await?;

        let mut entries = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let path = entry.path();
            // Follow symlinks; a dangling link still shows up as a file
            let is_dir = match tokio::fs::metadata(&path).await {
                Ok(meta) => meta.is_dir(),
                Err(_) => match tokio::fs::symlink_metadata(&path).await {
                    Ok(_) => false,
                    Err(_) => continue,
                },
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: to_api_path(&path),
                is_dir,
                kind: if is_dir { EntryKind::Dir } else { EntryKind::File },
            });
        }

        entries.sort_by(listing_order);
        Ok(entries)
    }

    async fn read_text(&self, raw: &str) -> FsResult<String> {
        let path = self.resolver.resolve(raw)?;
        let meta = tokio::fs::metadata(&path).await?;
        if meta.is_dir() {
            return Err(FsError::NotAFile);
        }
        let bytes = tokio::fs::read(&path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn write_text(&self, raw: &str, content: &str) -> FsResult<()> {
        let path = self.resolver.resolve(raw)?;
        if is_dir(&path).await {
            return Err(FsError::NotAFile);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    async fn make_dir(&self, raw: &str) -> FsResult<()> {
        let path = self.resolver.resolve(raw)?;
        match tokio::fs::create_dir_all(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(FsError::NotADirectory),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, raw: &str) -> FsResult<()> {
        let path = self.resolver.resolve_entry(raw)?;
        if self.resolver.is_root(&path) {
            return Err(FsError::PermissionDenied);
        }

        // Do not follow symlinks: deleting a link removes the link
        let meta = tokio::fs::symlink_metadata(&path).await?;
        if meta.is_dir() {
            tokio::fs::remove_dir(&path).await.map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => FsError::NotFound,
                std::io::ErrorKind::PermissionDenied => FsError::PermissionDenied,
                _ => FsError::DirectoryNotEmpty,
            })
        } else {
            tokio::fs::remove_file(&path).await.map_err(FsError::from)
        }
    }
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_dir())
        .unwrap_or(false)
}

/// Existing drive letters, like the "This PC" view
#[cfg(windows)]
fn platform_roots() -> Vec<DirEntry> {
    (b'A'..=b'Z')
        .map(char::from)
        .filter(|letter| Path::new(&format!("{}:/", letter)).exists())
        .map(|letter| {
            let token = format!("{}:", letter);
            DirEntry::root(token.clone(), token)
        })
        .collect()
}

#[cfg(not(windows))]
fn platform_roots() -> Vec<DirEntry> {
    vec![DirEntry::root("/", "/")]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn api(dir: &TempDir, rel: &str) -> String {
        let base = to_api_path(&fs::canonicalize(dir.path()).unwrap());
        if rel.is_empty() {
            base
        } else {
            format!("{}/{}", base, rel)
        }
    }

    #[tokio::test]
    async fn test_list_roots() {
        let explorer = FileExplorer::default();
        let roots = explorer.list("").await.unwrap();
        assert!(!roots.is_empty());
        assert!(roots.iter().all(|r| r.kind == EntryKind::Drive && r.is_dir));
    }

    #[tokio::test]
    async fn test_list_roots_with_confinement() {
        let dir = tempdir().unwrap();
        let explorer = FileExplorer::new(Some(dir.path().to_path_buf()));
        let roots = explorer.list("  ").await.unwrap();
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].path, api(&dir, ""));
    }

    #[tokio::test]
    async fn test_list_sorted_dirs_first() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("A.txt"), "a").unwrap();
        fs::create_dir(dir.path().join("zeta")).unwrap();
        fs::create_dir(dir.path().join("Alpha")).unwrap();

        let explorer = FileExplorer::default();
        let entries = explorer.list(&api(&dir, "")).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "zeta", "A.txt", "b.txt"]);

        assert_eq!(entries[0].kind, EntryKind::Dir);
        assert_eq!(entries[2].kind, EntryKind::File);
        assert_eq!(entries[0].path, api(&dir, "Alpha"));
        assert!(!entries[0].path.contains('\\'));
    }

    #[tokio::test]
    async fn test_list_errors() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("file.txt"), "x").unwrap();
        let explorer = FileExplorer::default();

        assert!(matches!(
            explorer.list(&api(&dir, "missing")).await,
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            explorer.list(&api(&dir, "file.txt")).await,
            Err(FsError::NotADirectory)
        ));
        assert!(matches!(
            explorer.list("relative").await,
            Err(FsError::InvalidPath)
        ));
    }

    #[tokio::test]
    async fn test_write_creates_parents_and_read_back() {
        let dir = tempdir().unwrap();
        let explorer = FileExplorer::default();
        let target = api(&dir, "nested/deeper/notes.txt");

        explorer.write(&target, "hello\nworld").await.unwrap();
        assert_eq!(explorer.read(&target).await.unwrap(), "hello\nworld");
    }

    #[tokio::test]
    async fn test_read_invalid_utf8_is_lossy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("bin.dat"), [b'o', b'k', 0xff, 0xfe]).unwrap();
        let explorer = FileExplorer::default();

        let content = explorer.read(&api(&dir, "bin.dat")).await.unwrap();
        assert!(content.starts_with("ok"));
    }

    #[tokio::test]
    async fn test_read_errors() {
        let dir = tempdir().unwrap();
        let explorer = FileExplorer::default();
        assert!(matches!(
            explorer.read(&api(&dir, "")).await,
            Err(FsError::NotAFile)
        ));
        assert!(matches!(
            explorer.read(&api(&dir, "nope.txt")).await,
            Err(FsError::NotFound)
        ));
        assert!(matches!(explorer.read("").await, Err(FsError::EmptyPath)));
    }

    #[tokio::test]
    async fn test_write_onto_directory_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        let explorer = FileExplorer::default();
        assert!(matches!(
            explorer.write(&api(&dir, "sub"), "x").await,
            Err(FsError::NotAFile)
        ));
    }

    #[tokio::test]
    async fn test_mkdir_is_recursive_and_idempotent() {
        let dir = tempdir().unwrap();
        let explorer = FileExplorer::default();
        let target = api(&dir, "a/b/c");

        explorer.mkdir(&target).await.unwrap();
        explorer.mkdir(&target).await.unwrap();
        assert!(dir.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_delete_file_and_empty_dir() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("gone.txt"), "x").unwrap();
        fs::create_dir(dir.path().join("empty")).unwrap();
        let explorer = FileExplorer::default();

        explorer.delete(&api(&dir, "gone.txt")).await.unwrap();
        explorer.delete(&api(&dir, "empty")).await.unwrap();
        assert!(!dir.path().join("gone.txt").exists());
        assert!(!dir.path().join("empty").exists());
    }

    #[tokio::test]
    async fn test_delete_non_empty_dir_rejected() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("full")).unwrap();
        fs::write(dir.path().join("full/keep.txt"), "x").unwrap();
        let explorer = FileExplorer::default();

        assert!(matches!(
            explorer.delete(&api(&dir, "full")).await,
            Err(FsError::DirectoryNotEmpty)
        ));
        assert!(dir.path().join("full/keep.txt").exists());

        assert!(matches!(
            explorer.delete(&api(&dir, "missing")).await,
            Err(FsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_confined_root_cannot_be_deleted() {
        let dir = tempdir().unwrap();
        let explorer = FileExplorer::new(Some(dir.path().to_path_buf()));
        assert!(matches!(
            explorer.delete(&api(&dir, "")).await,
            Err(FsError::PermissionDenied)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_confined_write_outside_rejected() {
        let dir = tempdir().unwrap();
        let explorer = FileExplorer::new(Some(dir.path().to_path_buf()));
        assert!(matches!(
            explorer.write("/tmp/hostbridge-escape.txt", "x").await,
            Err(FsError::OutsideRoot)
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_confined_write_through_dangling_link_rejected() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        let target = outside.path().join("escaped.txt");
        std::os::unix::fs::symlink(&target, dir.path().join("trap")).unwrap();
        let explorer = FileExplorer::new(Some(dir.path().to_path_buf()));

        assert!(matches!(
            explorer.write(&api(&dir, "trap"), "x").await,
            Err(FsError::OutsideRoot)
        ));
        assert!(!target.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_confined_delete_removes_link_not_target() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("data.txt"), "keep").unwrap();
        std::os::unix::fs::symlink("data.txt", dir.path().join("link")).unwrap();
        let explorer = FileExplorer::new(Some(dir.path().to_path_buf()));

        explorer.delete(&api(&dir, "link")).await.unwrap();
        assert!(dir.path().join("data.txt").exists());
        assert!(fs::symlink_metadata(dir.path().join("link")).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_confined_delete_of_link_to_outside_removes_link() {
        let dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("precious.txt"), "x").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("precious.txt"),
            dir.path().join("link"),
        )
        .unwrap();
        let explorer = FileExplorer::new(Some(dir.path().to_path_buf()));

        explorer.delete(&api(&dir, "link")).await.unwrap();
        assert!(outside.path().join("precious.txt").exists());
    }
}

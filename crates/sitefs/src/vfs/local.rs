//! Local filesystem backend.
//!
//! Provides access to a real directory tree, with optional read-only mode.
//! Every entry it produces is decorated with its real filename, its path
//! relative to the root, and an opener.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs;

use super::meta::{Decoration, DirEntry, DirEntryKind, Opener};
use super::traits::{Capabilities, File, Filesystem};
use crate::error::{FsError, FsResult};
use crate::paths;

/// Local filesystem backend.
///
/// All operations are relative to `root`. For example, if `root` is
/// `/home/amy/site/content`, then `open("blog/a.md")` opens
/// `/home/amy/site/content/blog/a.md`.
#[derive(Debug, Clone)]
pub struct LocalFs {
    root: PathBuf,
    read_only: bool,
}

impl LocalFs {
    /// Create a new local filesystem rooted at the given path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: false,
        }
    }

    /// Create a read-only local filesystem.
    pub fn read_only(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            read_only: true,
        }
    }

    /// Get the root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to a real path within the root without
    /// following symlinks.
    ///
    /// Containment is checked lexically so that symlinked directories keep
    /// their link path; walking relies on that to detect cycles.
    fn resolve(&self, path: &str) -> FsResult<PathBuf> {
        let mut depth = 0usize;
        let mut full = self.root.clone();
        for part in path.split(['/', '\\']) {
            match part {
                "" | "." => {}
                ".." => {
                    if depth == 0 {
                        return Err(FsError::PermissionDenied(format!(
                            "path escapes root: {path}"
                        )));
                    }
                    depth -= 1;
                    full.pop();
                }
                p => {
                    depth += 1;
                    full.push(p);
                }
            }
        }
        Ok(full)
    }

    /// Check if write operations are allowed.
    fn check_writable(&self, path: &str) -> FsResult<()> {
        if self.read_only {
            Err(FsError::read_only(path))
        } else {
            Ok(())
        }
    }

    /// Extract permissions from std::fs::Metadata (unix only).
    #[cfg(unix)]
    fn extract_permissions(meta: &std::fs::Metadata) -> Option<u32> {
        use std::os::unix::fs::PermissionsExt;
        Some(meta.permissions().mode())
    }

    #[cfg(not(unix))]
    fn extract_permissions(_meta: &std::fs::Metadata) -> Option<u32> {
        None
    }

    /// Build a decorated entry for `rel` from already fetched metadata.
    fn entry(
        &self,
        rel: &str,
        full: PathBuf,
        meta: &std::fs::Metadata,
        symlink_target: Option<PathBuf>,
    ) -> DirEntry {
        let file_type = meta.file_type();
        // Special files (sockets, pipes, devices) are reported as files.
        let kind = if file_type.is_symlink() {
            DirEntryKind::Symlink
        } else if file_type.is_dir() {
            DirEntryKind::Directory
        } else {
            DirEntryKind::File
        };

        let entry = DirEntry {
            name: paths::base_name(rel).to_string(),
            kind,
            size: if kind == DirEntryKind::File { meta.len() } else { 0 },
            modified: meta.modified().ok(),
            permissions: Self::extract_permissions(meta),
            symlink_target,
            meta: Default::default(),
        };

        let this: Arc<dyn Filesystem> = Arc::new(self.clone());
        Decoration::new("local")
            .filename(full)
            .path(rel)
            .opener(Opener::for_path(Arc::clone(&this), rel))
            .fs(this)
            .apply(entry)
    }

    async fn list(&self, rel: String) -> FsResult<Vec<DirEntry>> {
        let full_path = self.resolve(&rel)?;
        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| FsError::io("readdir", &full_path, e))?;

        let mut entries = Vec::new();
        while let Some(child) = dir
            .next_entry()
            .await
            .map_err(|e| FsError::io("readdir", &full_path, e))?
        {
            let child_path = child.path();
            // symlink_metadata so links show up as links, not their targets
            let metadata = match fs::symlink_metadata(&child_path).await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(FsError::io("lstat", &child_path, e)),
            };
            let target = if metadata.file_type().is_symlink() {
                fs::read_link(&child_path).await.ok()
            } else {
                None
            };
            let name = child.file_name().to_string_lossy().into_owned();
            let child_rel = paths::join(&rel, &name);
            entries.push(self.entry(&child_rel, child_path, &metadata, target));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

#[async_trait]
impl Filesystem for LocalFs {
    fn name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only()
            .with_symlinks()
            .with_writes(!self.read_only)
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        let rel = paths::clean(path);
        let full_path = self.resolve(&rel)?;
        // stat follows symlinks
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| FsError::io("stat", &full_path, e))?;
        Ok(self.entry(&rel, full_path, &meta, None))
    }

    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        let rel = paths::clean(path);
        let full_path = self.resolve(&rel)?;
        let meta = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| FsError::io("lstat", &full_path, e))?;
        let target = if meta.file_type().is_symlink() {
            fs::read_link(&full_path).await.ok()
        } else {
            None
        };
        Ok(self.entry(&rel, full_path, &meta, target))
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        let rel = paths::clean(path);
        let full_path = self.resolve(&rel)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| FsError::io("open", &full_path, e))?;
        let name = paths::base_name(&rel).to_string();

        if meta.is_dir() {
            let this = self.clone();
            return Ok(File::dir(name, async move { this.list(rel).await }));
        }

        let file = fs::File::open(&full_path)
            .await
            .map_err(|e| FsError::io("open", &full_path, e))?;
        Ok(File::stream(name, file))
    }

    async fn create(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;

        // Ensure parent directory exists
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::io("mkdir", parent, e))?;
        }

        fs::write(&full_path, data)
            .await
            .map_err(|e| FsError::io("write", &full_path, e))
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| FsError::io("mkdir", &full_path, e))
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;
        let meta = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| FsError::io("remove", &full_path, e))?;

        let result = if meta.is_dir() {
            fs::remove_dir(&full_path).await
        } else {
            fs::remove_file(&full_path).await
        };
        result.map_err(|e| FsError::io("remove", &full_path, e))
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.check_writable(from)?;
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        // Ensure parent directory exists for destination
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::io("mkdir", parent, e))?;
        }

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| FsError::io("rename", &from_path, e))
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.check_writable(path)?;
        let full_path = self.resolve(path)?;
        let mut perms = fs::metadata(&full_path)
            .await
            .map_err(|e| FsError::io("chmod", &full_path, e))?
            .permissions();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            perms.set_mode(mode);
        }
        #[cfg(not(unix))]
        {
            perms.set_readonly(mode & 0o222 == 0);
        }

        fs::set_permissions(&full_path, perms)
            .await
            .map_err(|e| FsError::io("chmod", &full_path, e))
    }

    fn real_path(&self, path: &str) -> Option<PathBuf> {
        self.resolve(path).ok()
    }
}

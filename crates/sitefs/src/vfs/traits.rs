//! Core VFS traits and types.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::meta::DirEntry;
use crate::error::{FsError, FsResult};

/// Future returned by a directory handle's listing.
pub type ListFuture = Pin<Box<dyn Future<Output = FsResult<Vec<DirEntry>>> + Send>>;

/// A readable byte stream.
pub type ReadStream = Pin<Box<dyn AsyncRead + Send>>;

/// What a filesystem can do, fixed when it is constructed.
///
/// Callers branch on these flags instead of probing individual operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// `stat` returns entries for paths.
    pub stat: bool,
    /// Directories can be opened and listed.
    pub list: bool,
    /// `lstat` reports symlinks instead of following them.
    pub symlink_aware: bool,
    /// Mutating operations may succeed.
    pub writable: bool,
}

impl Capabilities {
    /// A listable, read-only filesystem that does not know about symlinks.
    pub const fn read_only() -> Self {
        Self {
            stat: true,
            list: true,
            symlink_aware: false,
            writable: false,
        }
    }

    /// Same flags with symlink awareness switched on.
    pub const fn with_symlinks(mut self) -> Self {
        self.symlink_aware = true;
        self
    }

    /// Same flags with writes allowed.
    pub const fn with_writes(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }
}

enum Body {
    Stream(ReadStream),
    Dir(Option<ListFuture>),
}

/// An open file or directory.
///
/// Regular files are byte streams. Directories carry a lazily evaluated
/// listing; the first `read_dir` produces the entries, later calls return an
/// empty list the way a directory read to its end does.
pub struct File {
    name: String,
    body: Body,
}

impl fmt::Debug for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("File")
            .field("name", &self.name)
            .field("is_dir", &self.is_dir())
            .finish()
    }
}

impl File {
    /// Wrap a readable stream.
    pub fn stream(name: impl Into<String>, reader: impl AsyncRead + Send + 'static) -> Self {
        Self {
            name: name.into(),
            body: Body::Stream(Box::pin(reader)),
        }
    }

    /// Wrap a directory listing. The future is not polled until `read_dir`.
    pub fn dir(
        name: impl Into<String>,
        listing: impl Future<Output = FsResult<Vec<DirEntry>>> + Send + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            body: Body::Dir(Some(Box::pin(listing))),
        }
    }

    /// The name this file was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the name reported by this handle.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.body, Body::Dir(_))
    }

    /// List the directory's entries.
    pub async fn read_dir(&mut self) -> FsResult<Vec<DirEntry>> {
        match &mut self.body {
            Body::Dir(listing) => match listing.take() {
                Some(fut) => fut.await,
                None => Ok(Vec::new()),
            },
            Body::Stream(_) => Err(FsError::NotADirectory(self.name.clone())),
        }
    }

    /// Read the whole file into memory.
    pub async fn read_to_end(self) -> FsResult<Vec<u8>> {
        let name = self.name.clone();
        let mut reader = self.into_reader()?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .await
            .map_err(|e| FsError::io("read", name, e))?;
        Ok(buf)
    }

    /// Take the underlying byte stream.
    pub fn into_reader(self) -> FsResult<ReadStream> {
        match self.body {
            Body::Stream(reader) => Ok(reader),
            Body::Dir(_) => Err(FsError::IsADirectory(self.name)),
        }
    }
}

/// Abstract filesystem interface.
///
/// All paths are virtual, `/`-separated and relative to the filesystem's
/// root; they are cleaned by the implementation before use. Entries returned
/// from `stat`, `lstat` and directory listings carry a [`FileMeta`] attribute
/// bag describing where they really live.
///
/// Mutating operations default to `PermissionDenied`; only filesystems whose
/// [`Capabilities::writable`] flag is set override them.
///
/// [`FileMeta`]: super::meta::FileMeta
#[async_trait]
pub trait Filesystem: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Fixed capability flags.
    fn capabilities(&self) -> Capabilities;

    /// Get metadata for a file or directory, following symlinks.
    async fn stat(&self, path: &str) -> FsResult<DirEntry>;

    /// Get metadata without following a final symlink.
    ///
    /// Filesystems that are not symlink-aware fall back to `stat`.
    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        self.stat(path).await
    }

    /// Open a file for reading or a directory for listing.
    async fn open(&self, path: &str) -> FsResult<File>;

    /// Open and list a directory.
    async fn read_dir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        self.open(path).await?.read_dir().await
    }

    /// Read the entire contents of a file.
    async fn read(&self, path: &str) -> FsResult<Vec<u8>> {
        self.open(path).await?.read_to_end().await
    }

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.stat(path).await.is_ok()
    }

    /// Create or truncate a file with the given contents.
    async fn create(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let _ = data;
        Err(FsError::read_only(path))
    }

    /// Create a directory and its parents.
    async fn mkdir(&self, path: &str) -> FsResult<()> {
        Err(FsError::read_only(path))
    }

    /// Remove a file or empty directory.
    async fn remove(&self, path: &str) -> FsResult<()> {
        Err(FsError::read_only(path))
    }

    /// Rename a file or directory.
    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let _ = to;
        Err(FsError::read_only(from))
    }

    /// Change permission bits.
    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let _ = mode;
        Err(FsError::read_only(path))
    }

    /// The real filesystem path backing a virtual path, if there is one.
    fn real_path(&self, path: &str) -> Option<PathBuf> {
        let _ = path;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dir_listing_is_consumed_once() {
        let mut f = File::dir("d", async { Ok(vec![DirEntry::file("a.txt", 1)]) });
        assert!(f.is_dir());
        assert_eq!(f.read_dir().await.unwrap().len(), 1);
        assert!(f.read_dir().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stream_is_not_a_directory() {
        let mut f = File::stream("a.txt", &b"hello"[..]);
        assert!(matches!(
            f.read_dir().await,
            Err(FsError::NotADirectory(_))
        ));
        let f = File::stream("a.txt", &b"hello"[..]);
        assert_eq!(f.read_to_end().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn dir_is_not_readable_as_bytes() {
        let f = File::dir("d", async { Ok(Vec::new()) });
        assert!(matches!(f.read_to_end().await, Err(FsError::IsADirectory(_))));
    }
}

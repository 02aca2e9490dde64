//! Mount-root decorator.
//!
//! Wraps the filesystem behind one mount so that every entry it yields knows
//! its path relative to the category root, and every directory carries the
//! mount's attributes plus an opener and filesystem handle that stay inside
//! the mount.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::meta::{Decoration, DirEntry, FileMeta, Opener};
use super::traits::{Capabilities, File, Filesystem};
use crate::error::FsResult;
use crate::paths;

struct Inner {
    fs: Arc<dyn Filesystem>,
    meta: FileMeta,
    prefix: String,
}

/// Decorates the entries of a single mount.
#[derive(Clone)]
pub struct DirDecoratorFs {
    inner: Arc<Inner>,
}

impl DirDecoratorFs {
    /// `prefix` is where the mount sits below its category root
    /// (`blog` for a `content/blog` mount, empty for `content`).
    pub fn new(fs: Arc<dyn Filesystem>, meta: FileMeta, prefix: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                fs,
                meta,
                prefix: paths::clean(&prefix.into()),
            }),
        }
    }

    fn decorate(&self, name: &str, entry: DirEntry) -> DirEntry {
        let mut decoration =
            Decoration::new("dird").path(paths::join(&self.inner.prefix, name));
        if !entry.is_file() {
            let this: Arc<dyn Filesystem> = Arc::new(self.clone());
            decoration = decoration
                .opener(Opener::for_path(Arc::clone(&this), name))
                .fs(this)
                .attrs(self.inner.meta.clone());
        }
        decoration.apply(entry)
    }
}

#[async_trait]
impl Filesystem for DirDecoratorFs {
    fn name(&self) -> &'static str {
        "dirdecorator"
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.fs.capabilities()
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        let entry = self.inner.fs.stat(&name).await?;
        Ok(self.decorate(&name, entry))
    }

    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        let entry = self.inner.fs.lstat(&name).await?;
        Ok(self.decorate(&name, entry))
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        let name = paths::clean(path);
        let mut file = self.inner.fs.open(&name).await?;
        if !file.is_dir() {
            return Ok(file);
        }

        let this = self.clone();
        Ok(File::dir(paths::base_name(&name).to_string(), async move {
            let children = file.read_dir().await?;
            Ok(children
                .into_iter()
                .map(|child| {
                    let child_name = paths::join(&name, &child.name);
                    this.decorate(&child_name, child)
                })
                .collect())
        }))
    }

    async fn create(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.inner.fs.create(path, data).await
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        self.inner.fs.mkdir(path).await
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        self.inner.fs.remove(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.inner.fs.rename(from, to).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.inner.fs.chmod(path, mode).await
    }

    fn real_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.fs.real_path(path)
    }
}

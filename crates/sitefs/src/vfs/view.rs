//! Path-scoped views.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::meta::{Decoration, DirEntry, Opener};
use super::traits::{Capabilities, File, Filesystem};
use crate::error::FsResult;
use crate::paths;

/// A view of `fs` below `base`: `layouts/_default/list.html` in the
/// underlying filesystem is `_default/list.html` here.
#[derive(Clone)]
pub struct SubViewFs {
    fs: Arc<dyn Filesystem>,
    base: Arc<str>,
}

impl SubViewFs {
    pub fn new(fs: Arc<dyn Filesystem>, base: &str) -> Self {
        Self {
            fs,
            base: paths::clean(base).into(),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    fn full(&self, path: &str) -> String {
        paths::join(&self.base, path)
    }

    fn decorate(&self, path: &str, entry: DirEntry) -> DirEntry {
        if entry.is_file() {
            return entry;
        }
        let this: Arc<dyn Filesystem> = Arc::new(self.clone());
        Decoration::new("view")
            .opener(Opener::for_path(Arc::clone(&this), path))
            .fs(this)
            .apply(entry)
    }
}

#[async_trait]
impl Filesystem for SubViewFs {
    fn name(&self) -> &'static str {
        "subview"
    }

    fn capabilities(&self) -> Capabilities {
        self.fs.capabilities()
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        let entry = self.fs.stat(&self.full(&name)).await?;
        Ok(self.decorate(&name, entry))
    }

    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        let entry = self.fs.lstat(&self.full(&name)).await?;
        Ok(self.decorate(&name, entry))
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        let name = paths::clean(path);
        let mut file = self.fs.open(&self.full(&name)).await?;
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
        self.fs.create(&self.full(path), data).await
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        self.fs.mkdir(&self.full(path)).await
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        self.fs.remove(&self.full(path)).await
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.fs.rename(&self.full(from), &self.full(to)).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.fs.chmod(&self.full(path), mode).await
    }

    fn real_path(&self, path: &str) -> Option<PathBuf> {
        self.fs.real_path(&self.full(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FsError;
    use crate::vfs::RootMappingFs;

    #[tokio::test]
    async fn view_strips_its_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("layouts/_default")).unwrap();
        std::fs::write(dir.path().join("layouts/_default/list.html"), "list").unwrap();

        let rfs = RootMappingFs::from_to([("layouts", dir.path().join("layouts"))])
            .await
            .unwrap();
        let view = SubViewFs::new(Arc::new(rfs), "layouts");

        assert_eq!(view.read("_default/list.html").await.unwrap(), b"list");
        let root = view.read_dir("").await.unwrap();
        assert_eq!(root[0].name, "_default");

        let mut sub = root[0].meta.open().await.unwrap();
        let files = sub.read_dir().await.unwrap();
        assert_eq!(files[0].name, "list.html");
        assert_eq!(files[0].meta.path(), "_default/list.html");
        assert_eq!(
            view.real_path("_default/list.html"),
            Some(dir.path().join("layouts/_default/list.html"))
        );

        assert!(matches!(
            view.create("x.html", b"").await,
            Err(FsError::PermissionDenied(_))
        ));
    }
}

//! Copy-on-write layer folding.
//!
//! A [`CowFs`] stacks filesystems so that reads check the outermost layer
//! first and fall back inwards when a layer lacks the path, while writes always go to one
//! designated layer. Folding themes under a project:
//!
//! ```text
//! project   ◄── reads start here, writes land here
//! theme a   ◄── shadows theme b
//! theme b
//! ```
//!
//! Folding is iterative: each [`CowFs::shadowed_by`] call pushes one more
//! layer on top, so reads walk a flat list instead of a chain of wrappers.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::meta::{Decoration, DirEntry, Opener};
use super::traits::{Capabilities, File, Filesystem};
use crate::error::{FsError, FsResult};
use crate::paths;

struct Inner {
    /// Outermost first.
    layers: Vec<Arc<dyn Filesystem>>,
    /// Index into `layers` of the layer that receives writes.
    writable: usize,
}

/// Composite with outer-shadows-inner reads and a single write target.
#[derive(Clone)]
pub struct CowFs {
    inner: Arc<Inner>,
}

impl fmt::Debug for CowFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.inner.layers.iter().map(|l| l.name()).collect();
        f.debug_struct("CowFs")
            .field("layers", &names)
            .field("writable", &self.inner.writable)
            .finish()
    }
}

impl CowFs {
    /// A composite with a single layer.
    pub fn single(layer: Arc<dyn Filesystem>) -> Self {
        Self {
            inner: Arc::new(Inner {
                layers: vec![layer],
                writable: 0,
            }),
        }
    }

    /// Reads check `overlay` first and fall back to `base`; writes go to
    /// `overlay`.
    pub fn new(base: Arc<dyn Filesystem>, overlay: Arc<dyn Filesystem>) -> Self {
        Self::single(base).shadowed_by(overlay)
    }

    /// Put `overlay` on top of every existing layer and route writes to it.
    pub fn shadowed_by(self, overlay: Arc<dyn Filesystem>) -> Self {
        let mut layers = Vec::with_capacity(self.inner.layers.len() + 1);
        layers.push(overlay);
        layers.extend(self.inner.layers.iter().cloned());
        Self {
            inner: Arc::new(Inner {
                layers,
                writable: 0,
            }),
        }
    }

    /// Fold `themes` (in configured precedence order) under `project`.
    ///
    /// Themes are applied last to first, so each earlier theme shadows the
    /// later ones, and the project shadows them all.
    pub fn fold_layers(
        project: Arc<dyn Filesystem>,
        themes: impl IntoIterator<Item = Arc<dyn Filesystem>, IntoIter: DoubleEndedIterator>,
    ) -> Self {
        let mut themes = themes.into_iter().rev();
        let folded = match themes.next() {
            Some(innermost) => themes.fold(Self::single(innermost), CowFs::shadowed_by),
            None => return Self::single(project),
        };
        folded.shadowed_by(project)
    }

    /// Layers, outermost first.
    pub fn layers(&self) -> &[Arc<dyn Filesystem>] {
        &self.inner.layers
    }

    fn write_layer(&self) -> &Arc<dyn Filesystem> {
        &self.inner.layers[self.inner.writable]
    }

    fn this(&self) -> Arc<dyn Filesystem> {
        Arc::new(self.clone())
    }

    /// Directories (and links that may be directories) reopen through the
    /// composite so their listings are merged too.
    fn decorate(&self, path: &str, entry: DirEntry) -> DirEntry {
        if entry.is_file() {
            return entry;
        }
        Decoration::new("cow")
            .opener(Opener::for_path(self.this(), path))
            .fs(self.this())
            .apply(entry)
    }

    async fn find(&self, path: &str, follow: bool) -> FsResult<(usize, DirEntry)> {
        for (idx, layer) in self.inner.layers.iter().enumerate() {
            let found = if follow {
                layer.stat(path).await
            } else {
                layer.lstat(path).await
            };
            match found {
                Ok(entry) => {
                    trace!(path, layer = idx, "cow hit");
                    return Ok((idx, entry));
                }
                Err(e) if e.is_absent() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FsError::not_found(path))
    }

    /// Union of every layer's listing from `start` inwards; the outermost
    /// entry for each name wins.
    async fn union(&self, path: &str, start: usize) -> FsResult<Vec<DirEntry>> {
        let mut seen = std::collections::HashSet::new();
        let mut entries = Vec::new();
        for layer in &self.inner.layers[start..] {
            let children = match layer.read_dir(path).await {
                Ok(children) => children,
                Err(e) if e.is_absent() => continue,
                Err(e) => return Err(e),
            };
            for child in children {
                if seen.insert(child.name.clone()) {
                    let child_path = paths::join(path, &child.name);
                    entries.push(self.decorate(&child_path, child));
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl Filesystem for CowFs {
    fn name(&self) -> &'static str {
        "cow"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only()
            .with_symlinks()
            .with_writes(self.write_layer().capabilities().writable)
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        let (_, entry) = self.find(&name, true).await?;
        Ok(self.decorate(&name, entry))
    }

    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        let (_, entry) = self.find(&name, false).await?;
        Ok(self.decorate(&name, entry))
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        let name = paths::clean(path);
        let (idx, entry) = self.find(&name, true).await?;
        if !entry.is_dir() {
            return self.inner.layers[idx].open(&name).await;
        }

        let this = self.clone();
        Ok(File::dir(entry.name, async move { this.union(&name, idx).await }))
    }

    async fn create(&self, path: &str, data: &[u8]) -> FsResult<()> {
        self.write_layer().create(path, data).await
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        self.write_layer().mkdir(path).await
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        self.write_layer().remove(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        self.write_layer().rename(from, to).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        self.write_layer().chmod(path, mode).await
    }

    fn real_path(&self, path: &str) -> Option<PathBuf> {
        self.inner.layers.iter().find_map(|l| l.real_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::RootMappingFs;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (f, content) in files {
            let p = dir.path().join(f);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, content).unwrap();
        }
        dir
    }

    async fn layouts(dir: &TempDir) -> Arc<dyn Filesystem> {
        Arc::new(
            RootMappingFs::from_to([("layouts", dir.path().join("layouts"))])
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn project_shadows_themes_in_order() {
        let project = tree(&[("layouts/index.html", "project")]);
        let theme_a = tree(&[
            ("layouts/index.html", "a"),
            ("layouts/single.html", "a"),
        ]);
        let theme_b = tree(&[
            ("layouts/single.html", "b"),
            ("layouts/list.html", "b"),
        ]);

        let fs = CowFs::fold_layers(
            layouts(&project).await,
            vec![layouts(&theme_a).await, layouts(&theme_b).await],
        );
        assert_eq!(fs.layers().len(), 3);

        assert_eq!(fs.read("layouts/index.html").await.unwrap(), b"project");
        assert_eq!(fs.read("layouts/single.html").await.unwrap(), b"a");
        assert_eq!(fs.read("layouts/list.html").await.unwrap(), b"b");

        let mut names: Vec<_> = fs
            .read_dir("layouts")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, ["index.html", "list.html", "single.html"]);
    }

    #[tokio::test]
    async fn directories_reopen_through_the_composite() {
        let project = tree(&[("layouts/_default/list.html", "p")]);
        let theme = tree(&[("layouts/_default/single.html", "t")]);
        let fs = CowFs::new(layouts(&theme).await, layouts(&project).await);

        let dir = fs.stat("layouts/_default").await.unwrap();
        let mut listing = dir.meta.open().await.unwrap();
        let mut names: Vec<_> = listing
            .read_dir()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        names.sort();
        assert_eq!(names, ["list.html", "single.html"]);
    }

    #[tokio::test]
    async fn outer_file_does_not_hide_inner_directory() {
        let project = tree(&[("layouts/partials", "not a dir")]);
        let theme = tree(&[("layouts/partials/x.html", "theme")]);
        let fs = CowFs::fold_layers(layouts(&project).await, vec![layouts(&theme).await]);

        let fi = fs.stat("layouts/partials/x.html").await.unwrap();
        assert_eq!(
            fi.meta.filename(),
            Some(theme.path().join("layouts/partials/x.html").as_path())
        );
        assert_eq!(fs.read("layouts/partials/x.html").await.unwrap(), b"theme");

        // The path itself still resolves to the outer file.
        assert!(!fs.stat("layouts/partials").await.unwrap().is_dir());
        assert!(fs.stat("layouts/partials/y.html").await.unwrap_err().is_absent());
    }

    #[tokio::test]
    async fn writes_go_to_the_project_only() {
        let project = tree(&[("layouts/keep.html", "")]);
        let theme = tree(&[("layouts/theme.html", "")]);

        let project_fs = Arc::new(
            RootMappingFs::from_to([("layouts", project.path().join("layouts"))])
                .await
                .unwrap()
                .with_writes(true),
        );
        let fs = CowFs::fold_layers(project_fs, vec![layouts(&theme).await]);
        assert!(fs.capabilities().writable);

        fs.create("layouts/new.html", b"new").await.unwrap();
        assert!(project.path().join("layouts/new.html").exists());
        assert!(!theme.path().join("layouts/new.html").exists());
    }

    #[tokio::test]
    async fn read_only_project_rejects_writes() {
        let project = tree(&[("layouts/a.html", "")]);
        let fs = CowFs::fold_layers(layouts(&project).await, Vec::new());
        assert!(!fs.capabilities().writable);
        assert!(matches!(
            fs.mkdir("layouts/x").await,
            Err(FsError::PermissionDenied(_))
        ));
    }
}

//! Ordered and language-weighted overlay.
//!
//! A `WeightedFs` holds an ordered list of layers, each the root directory of
//! one mount (as returned by [`RootMappingFs::dirs`]). Looking up a path
//! returns the first layer that has it. Listing a directory collects the
//! entries of every layer from that one onwards and then resolves
//! duplicates according to a [`MergePolicy`].
//!
//! Layers know where they are mounted below the category root, so a
//! `content/blog` mount shows up as `blog/` when the overlay root is listed.
//!
//! The overlay is read-only; every mutation is `PermissionDenied`.
//!
//! [`RootMappingFs::dirs`]: super::rootmapping::RootMappingFs::dirs

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::meta::{Decoration, DirEntry, FileMeta, Opener};
use super::noop::NoOpFs;
use super::traits::{Capabilities, File, Filesystem};
use crate::error::{FsError, FsResult};
use crate::paths::{self, LanguageSet};

/// How same-named entries from different layers are reconciled in a
/// directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Keep every entry from every layer, in layer order.
    Ordered,
    /// The first layer to provide a name wins.
    Shadow,
    /// Directories: first layer wins. Files: highest language weight wins,
    /// ties go to the earlier layer. Files are tagged with language, weight
    /// and translation base name.
    Language,
}

struct Layer {
    fs: Arc<dyn Filesystem>,
    meta: FileMeta,
    /// Mount point below the overlay root.
    prefix: String,
}

/// Where a virtual path sits relative to a layer's mount point.
enum Reach<'a> {
    /// Inside the layer, at this layer-relative path.
    Inside(&'a str),
    /// A proper ancestor of the mount point; the next segment towards it.
    Ancestor(&'a str),
    Outside,
}

impl Layer {
    fn reach<'a>(&'a self, path: &'a str) -> Reach<'a> {
        if let Some(rest) = paths::strip_prefix(path, &self.prefix) {
            return Reach::Inside(rest);
        }
        match paths::strip_prefix(&self.prefix, path) {
            Some(rest) if !rest.is_empty() => Reach::Ancestor(paths::first_segment(rest)),
            _ => Reach::Outside,
        }
    }
}

struct Inner {
    layers: Vec<Layer>,
    languages: LanguageSet,
    policy: MergePolicy,
}

/// Read-only overlay over an ordered list of mount roots.
#[derive(Clone)]
pub struct WeightedFs {
    inner: Arc<Inner>,
}

impl WeightedFs {
    /// Build an overlay from mount roots in priority order.
    ///
    /// Every source must carry a filesystem handle; with the
    /// [`MergePolicy::Language`] policy every source must also carry a
    /// language.
    pub fn new(
        policy: MergePolicy,
        languages: LanguageSet,
        sources: impl IntoIterator<Item = DirEntry>,
    ) -> FsResult<Self> {
        let mut layers = Vec::new();
        for source in sources {
            let invalid = |reason: &str| FsError::InvalidMapping {
                from: source.meta.path().to_string(),
                to: source
                    .meta
                    .filename()
                    .map(|f| f.display().to_string())
                    .unwrap_or_default(),
                reason: reason.to_string(),
            };

            let fs = source
                .meta
                .fs()
                .cloned()
                .ok_or_else(|| invalid("missing source filesystem"))?;
            if policy == MergePolicy::Language && source.meta.lang().is_empty() {
                return Err(invalid("missing source language"));
            }

            layers.push(Layer {
                fs,
                meta: source.meta.inheritable(),
                prefix: paths::clean(source.meta.path()),
            });
        }

        Ok(Self {
            inner: Arc::new(Inner {
                layers,
                languages,
                policy,
            }),
        })
    }

    /// Like [`WeightedFs::new`], but an empty source list yields a
    /// [`NoOpFs`].
    pub fn build(
        policy: MergePolicy,
        languages: LanguageSet,
        sources: Vec<DirEntry>,
    ) -> FsResult<Arc<dyn Filesystem>> {
        if sources.is_empty() {
            return Ok(Arc::new(NoOpFs));
        }
        Ok(Arc::new(Self::new(policy, languages, sources)?))
    }

    pub fn policy(&self) -> MergePolicy {
        self.inner.policy
    }

    fn this(&self) -> Arc<dyn Filesystem> {
        Arc::new(self.clone())
    }

    fn synthetic_dir(&self, path: &str) -> DirEntry {
        self.decorate_dir(path, DirEntry::directory(paths::base_name(path)).with_meta(
            FileMeta::new().with_path(path),
        ))
    }

    fn decorate_dir(&self, path: &str, entry: DirEntry) -> DirEntry {
        Decoration::new("lfs-dir")
            .opener(Opener::for_path(self.this(), path))
            .fs(self.this())
            .apply(entry)
    }

    /// Tag one entry found in `layer` at virtual path `path`.
    fn apply_meta(&self, layer: &Layer, path: &str, mut entry: DirEntry) -> DirEntry {
        if !entry.is_file() {
            entry.meta.merge_missing(&layer.meta);
            return self.decorate_dir(path, entry);
        }

        if self.inner.policy == MergePolicy::Language {
            let (file_lang, translation_base_name) =
                paths::lang_info_from(&self.inner.languages, &entry.name);
            let mut lang = layer.meta.lang().to_string();
            let mut weight = 0;
            if !file_lang.is_empty() {
                weight = 1;
                // myfile.sv.txt inside the sv layer beats myfile.sv.txt elsewhere
                if file_lang == lang {
                    weight += 1;
                }
                lang = file_lang;
            }
            entry.meta.set_lang(lang);
            entry.meta.set_weight(weight);
            entry.meta.set_translation_base_name(translation_base_name);
        }
        entry.meta.merge_missing(&layer.meta);
        entry
    }

    /// First layer providing `path`, and the decorated entry found there.
    async fn pick_first(&self, path: &str, follow: bool) -> FsResult<(usize, DirEntry)> {
        for (idx, layer) in self.inner.layers.iter().enumerate() {
            let rel = match layer.reach(path) {
                Reach::Inside(rel) => rel,
                Reach::Ancestor(_) => return Ok((idx, self.synthetic_dir(path))),
                Reach::Outside => continue,
            };
            let found = if follow {
                layer.fs.stat(rel).await
            } else {
                layer.fs.lstat(rel).await
            };
            match found {
                Ok(entry) => {
                    trace!(path, layer = idx, "picked");
                    let entry = entry.renamed(paths::base_name(path));
                    return Ok((idx, self.apply_meta(layer, path, entry)));
                }
                Err(e) if e.is_absent() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FsError::not_found(path))
    }

    async fn read_dirs(&self, path: &str, start: usize) -> FsResult<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for layer in &self.inner.layers[start..] {
            match layer.reach(path) {
                Reach::Inside(rel) => {
                    let children = match layer.fs.read_dir(rel).await {
                        Ok(children) => children,
                        Err(e) if e.is_absent() => continue,
                        Err(e) => return Err(e),
                    };
                    for child in children {
                        let child_path = paths::join(path, &child.name);
                        entries.push(self.apply_meta(layer, &child_path, child));
                    }
                }
                Reach::Ancestor(segment) => {
                    entries.push(self.synthetic_dir(&paths::join(path, segment)));
                }
                Reach::Outside => {}
            }
        }

        Ok(match self.inner.policy {
            MergePolicy::Ordered => entries,
            MergePolicy::Shadow => shadow(entries),
            MergePolicy::Language => filter_duplicates(entries),
        })
    }
}

/// Keep the first entry for every name.
fn shadow(entries: Vec<DirEntry>) -> Vec<DirEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.name.clone()))
        .collect()
}

/// Directories: first occurrence wins. Files: the highest weight wins, the
/// earliest layer breaks ties. Winners keep their listing position.
fn filter_duplicates(entries: Vec<DirEntry>) -> Vec<DirEntry> {
    let mut keep_dir: HashMap<&str, usize> = HashMap::new();
    let mut keep: HashMap<&str, (usize, i32)> = HashMap::new();

    for (idx, entry) in entries.iter().enumerate() {
        if entry.is_dir() {
            keep_dir.entry(entry.name.as_str()).or_insert(idx);
            continue;
        }
        let weight = entry.meta.weight();
        match keep.get(entry.name.as_str()) {
            Some(&(_, best)) if best >= weight => {}
            _ => {
                keep.insert(entry.name.as_str(), (idx, weight));
            }
        }
    }

    let winners: HashSet<usize> = keep_dir
        .into_values()
        .chain(keep.into_values().map(|(idx, _)| idx))
        .collect();

    entries
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| winners.contains(idx))
        .map(|(_, entry)| entry)
        .collect()
}

#[async_trait]
impl Filesystem for WeightedFs {
    fn name(&self) -> &'static str {
        "weighted"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only().with_symlinks()
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        Ok(self.pick_first(&name, true).await?.1)
    }

    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        Ok(self.pick_first(&name, false).await?.1)
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        let name = paths::clean(path);
        let (idx, entry) = self.pick_first(&name, true).await?;

        if !entry.is_dir() {
            let layer = &self.inner.layers[idx];
            return match layer.reach(&name) {
                Reach::Inside(rel) => Ok(layer.fs.open(rel).await?.with_name(entry.name)),
                _ => Err(FsError::not_found(&name)),
            };
        }

        let this = self.clone();
        Ok(File::dir(entry.name, async move {
            this.read_dirs(&name, idx).await
        }))
    }
}

//! Directory entries and the attribute bag attached to them.
//!
//! Every entry produced by a sitefs filesystem carries a [`FileMeta`]
//! describing where it really lives (`filename`), where it sits in the
//! virtual tree (`path`), which language it belongs to, and how to reopen
//! it. Layers add attributes through [`Decoration`]; the first layer to set
//! an attribute keeps it.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::SystemTime;

use super::traits::{File, Filesystem};
use crate::error::{FsError, FsResult};

/// Entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirEntryKind {
    File,
    Directory,
    Symlink,
}

type OpenFuture = Pin<Box<dyn Future<Output = FsResult<File>> + Send>>;

/// Deferred open operation.
///
/// Openers let a listing hand out entries without opening them; the entry
/// is opened through whatever filesystem produced it, with that layer's view
/// of the path.
#[derive(Clone)]
pub struct Opener(Arc<dyn Fn() -> OpenFuture + Send + Sync>);

impl Opener {
    pub fn new<F, Fut>(open: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FsResult<File>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(open())))
    }

    /// Open `path` on `fs` when invoked.
    pub fn for_path(fs: Arc<dyn Filesystem>, path: impl Into<String>) -> Self {
        let path = path.into();
        Self::new(move || {
            let fs = Arc::clone(&fs);
            let path = path.clone();
            async move { fs.open(&path).await }
        })
    }

    pub async fn open(&self) -> FsResult<File> {
        (self.0)().await
    }
}

impl fmt::Debug for Opener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Opener")
    }
}

/// Attribute bag carried by every decorated entry.
///
/// Setters ignore empty values so a layer can never clear what an earlier
/// layer recorded.
#[derive(Clone, Default)]
pub struct FileMeta {
    filename: Option<PathBuf>,
    path: Option<String>,
    lang: Option<String>,
    translation_base_name: Option<String>,
    weight: i32,
    ordered: bool,
    watch: bool,
    fs: Option<Arc<dyn Filesystem>>,
    opener: Option<Opener>,
    decorators: Vec<&'static str>,
}

impl fmt::Debug for FileMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileMeta")
            .field("filename", &self.filename)
            .field("path", &self.path)
            .field("lang", &self.lang)
            .field("translation_base_name", &self.translation_base_name)
            .field("weight", &self.weight)
            .field("ordered", &self.ordered)
            .field("watch", &self.watch)
            .field("fs", &self.fs.as_ref().map(|fs| fs.name()))
            .field("decorators", &self.decorator_trail())
            .finish()
    }
}

fn non_empty(s: impl Into<String>) -> Option<String> {
    let s = s.into();
    (!s.is_empty()).then_some(s)
}

impl FileMeta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.set_filename(filename);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.set_path(path);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.set_lang(lang);
        self
    }

    pub fn with_translation_base_name(mut self, name: impl Into<String>) -> Self {
        self.set_translation_base_name(name);
        self
    }

    pub fn with_weight(mut self, weight: i32) -> Self {
        self.set_weight(weight);
        self
    }

    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered |= ordered;
        self
    }

    pub fn with_watch(mut self, watch: bool) -> Self {
        self.watch |= watch;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn with_opener(mut self, opener: Opener) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn set_filename(&mut self, filename: impl Into<PathBuf>) {
        let filename = filename.into();
        if !filename.as_os_str().is_empty() {
            self.filename = Some(filename);
        }
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        if let Some(path) = non_empty(path) {
            self.path = Some(path.trim_start_matches('/').to_string());
        }
    }

    pub fn set_lang(&mut self, lang: impl Into<String>) {
        if let Some(lang) = non_empty(lang) {
            self.lang = Some(lang);
        }
    }

    pub fn set_translation_base_name(&mut self, name: impl Into<String>) {
        if let Some(name) = non_empty(name) {
            self.translation_base_name = Some(name);
        }
    }

    pub fn set_weight(&mut self, weight: i32) {
        if weight != 0 {
            self.weight = weight;
        }
    }

    /// Real filesystem path backing this entry.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Virtual path relative to the category root (e.g. `blog/a.md`).
    pub fn path(&self) -> &str {
        self.path.as_deref().unwrap_or("")
    }

    pub fn lang(&self) -> &str {
        self.lang.as_deref().unwrap_or("")
    }

    /// File name with extension and language suffix removed.
    pub fn translation_base_name(&self) -> &str {
        self.translation_base_name.as_deref().unwrap_or("")
    }

    /// Language precedence: 0 unknown, 1 tagged for some language, 2 tagged
    /// for the language of the layer it lives in.
    pub fn weight(&self) -> i32 {
        self.weight
    }

    /// Children are already in their intended order and must not be sorted.
    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    /// Whether this entry should be watched for changes.
    pub fn watch(&self) -> bool {
        self.watch
    }

    /// Filesystem to use when descending into this directory.
    pub fn fs(&self) -> Option<&Arc<dyn Filesystem>> {
        self.fs.as_ref()
    }

    pub fn opener(&self) -> Option<&Opener> {
        self.opener.as_ref()
    }

    /// Open the entry through its recorded opener.
    pub async fn open(&self) -> FsResult<File> {
        match &self.opener {
            Some(opener) => opener.open().await,
            None => Err(FsError::not_found(format!(
                "{}: no opener recorded",
                self.path()
            ))),
        }
    }

    /// Decorator ids applied to this entry, innermost first, `/`-joined.
    pub fn decorator_trail(&self) -> String {
        self.decorators.join("/")
    }

    /// The attributes a mount hands down to the entries below it: language
    /// and watch flag. Location, ordering and handles stay with their entry.
    pub fn inheritable(&self) -> FileMeta {
        FileMeta {
            lang: self.lang.clone(),
            watch: self.watch,
            ..FileMeta::default()
        }
    }

    /// Fill every unset attribute from `other`. Existing values win.
    pub fn merge_missing(&mut self, other: &FileMeta) {
        if self.filename.is_none() {
            self.filename = other.filename.clone();
        }
        if self.path.is_none() {
            self.path = other.path.clone();
        }
        if self.lang.is_none() {
            self.lang = other.lang.clone();
        }
        if self.translation_base_name.is_none() {
            self.translation_base_name = other.translation_base_name.clone();
        }
        if self.weight == 0 {
            self.weight = other.weight;
        }
        self.ordered |= other.ordered;
        self.watch |= other.watch;
        if self.fs.is_none() {
            self.fs = other.fs.clone();
        }
        if self.opener.is_none() {
            self.opener = other.opener.clone();
        }
    }
}

/// A directory entry with its attribute bag.
///
/// Used everywhere: `stat`, `lstat`, directory listings and walk callbacks.
#[derive(Debug, Clone)]
pub struct DirEntry {
    /// Name of the entry (not full path).
    pub name: String,
    pub kind: DirEntryKind,
    /// Size in bytes (0 for directories).
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Unix permissions (e.g., 0o644), if available.
    pub permissions: Option<u32>,
    /// For symlinks, the target path.
    pub symlink_target: Option<PathBuf>,
    pub meta: FileMeta,
}

impl DirEntry {
    /// Create a new directory entry.
    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, DirEntryKind::Directory, 0)
    }

    /// Create a new file entry.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, DirEntryKind::File, size)
    }

    /// Create a new symlink entry.
    pub fn symlink(name: impl Into<String>, target: impl Into<PathBuf>) -> Self {
        let mut entry = Self::new(name, DirEntryKind::Symlink, 0);
        entry.symlink_target = Some(target.into());
        entry
    }

    fn new(name: impl Into<String>, kind: DirEntryKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            modified: None,
            permissions: None,
            symlink_target: None,
            meta: FileMeta::default(),
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == DirEntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == DirEntryKind::File
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == DirEntryKind::Symlink
    }

    pub fn with_meta(mut self, meta: FileMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Replace the reported name, keeping everything else.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Attributes one layer adds to the entries passing through it.
///
/// The explicit virtual `path` and `opener` override earlier values since
/// they describe how *this* layer reaches the entry. The `filename` and the
/// `attrs` bag only fill gaps, so the innermost layer's real location and
/// the first mount's language survive any number of wrappers.
#[derive(Default)]
pub struct Decoration {
    /// Short id appended to the debug trail.
    pub id: &'static str,
    pub filename: Option<PathBuf>,
    pub path: Option<String>,
    /// Recorded on directories only.
    pub fs: Option<Arc<dyn Filesystem>>,
    pub opener: Option<Opener>,
    pub attrs: Option<FileMeta>,
}

impl Decoration {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    pub fn filename(mut self, filename: impl Into<PathBuf>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn fs(mut self, fs: Arc<dyn Filesystem>) -> Self {
        self.fs = Some(fs);
        self
    }

    pub fn opener(mut self, opener: Opener) -> Self {
        self.opener = Some(opener);
        self
    }

    pub fn attrs(mut self, attrs: FileMeta) -> Self {
        self.attrs = Some(attrs);
        self
    }

    /// Apply this decoration to an entry.
    pub fn apply(self, mut entry: DirEntry) -> DirEntry {
        let meta = &mut entry.meta;
        meta.decorators.push(self.id);

        if meta.filename.is_none() {
            if let Some(filename) = self.filename {
                meta.set_filename(filename);
            }
        }
        if let Some(path) = self.path {
            meta.set_path(path);
        }
        if let Some(opener) = self.opener {
            meta.opener = Some(opener);
        }
        if entry.kind == DirEntryKind::Directory {
            if let Some(fs) = self.fs {
                meta.fs = Some(fs);
            }
        }
        if let Some(attrs) = &self.attrs {
            meta.merge_missing(attrs);
        }
        entry
    }
}

//! Root mapping filesystem.
//!
//! Maps virtual prefixes (`content/blog`, `static`, …) onto real directories.
//! Lookups pick the longest registered prefix covering the path; several
//! mappings may share one prefix (language variants of the same logical
//! root), in which case they form an ordered bucket.
//!
//! ```text
//! content/blog  ──►  /site/content/blog      [sv]
//! content/blog  ──►  /site/content-en/blog   [en]
//! static        ──►  /themes/a/static
//! ```
//!
//! The root of this filesystem is synthetic: listing it yields one directory
//! per distinct registered prefix, in registration order.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, trace};

use super::decorate::DirDecoratorFs;
use super::meta::{Decoration, DirEntry, FileMeta, Opener};
use super::traits::{Capabilities, File, Filesystem};
use crate::error::{FsError, FsResult};
use crate::paths;

/// The top-level component a virtual path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Content,
    Data,
    I18n,
    Layouts,
    Assets,
    Static,
    Archetypes,
    Resources,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Content,
        Category::Data,
        Category::I18n,
        Category::Layouts,
        Category::Assets,
        Category::Static,
        Category::Archetypes,
        Category::Resources,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Content => "content",
            Category::Data => "data",
            Category::I18n => "i18n",
            Category::Layouts => "layouts",
            Category::Assets => "assets",
            Category::Static => "static",
            Category::Archetypes => "archetypes",
            Category::Resources => "resources",
        }
    }

    /// Category of a virtual path, from its first segment.
    pub fn of(path: &str) -> Option<Category> {
        paths::first_segment(&paths::clean(path)).parse().ok()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown component folder: {s}"))
    }
}

/// A binding from a virtual prefix to a real directory.
#[derive(Debug, Clone)]
pub struct RootMapping {
    from: String,
    to: PathBuf,
    meta: FileMeta,
}

impl RootMapping {
    /// Both sides are cleaned; `from` is a virtual path whose first segment
    /// names a [`Category`].
    pub fn new(from: impl AsRef<str>, to: impl AsRef<Path>) -> Self {
        Self {
            from: paths::clean(from.as_ref()),
            to: paths::clean_real(to.as_ref()),
            meta: FileMeta::default(),
        }
    }

    /// Attach attributes (language, watch flag) given to every entry
    /// resolved through this mapping.
    pub fn with_meta(mut self, meta: FileMeta) -> Self {
        self.meta = meta;
        self
    }

    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &Path {
        &self.to
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }

    pub fn category(&self) -> Option<Category> {
        Category::of(&self.from)
    }

    /// Real filename for a virtual path under this mapping.
    pub fn filename(&self, name: &str) -> PathBuf {
        match paths::strip_prefix(name, &self.from) {
            Some("") | None => self.to.clone(),
            Some(rest) => self.to.join(rest),
        }
    }

    /// Path relative to the category root: `content/blog/a.md` → `blog/a.md`.
    fn path(&self, category: Category, name: &str) -> String {
        paths::strip_prefix(name, category.as_str())
            .unwrap_or(name)
            .to_string()
    }
}

struct Mapped {
    rm: RootMapping,
    category: Category,
    fs: super::local::LocalFs,
}

impl Mapped {
    fn remainder<'a>(&self, name: &'a str) -> &'a str {
        paths::strip_prefix(name, &self.rm.from).unwrap_or("")
    }
}

struct Inner {
    /// Kept mappings in registration order.
    mappings: Vec<Mapped>,
    /// Prefix → indices into `mappings`.
    buckets: BTreeMap<String, Vec<usize>>,
    /// Distinct prefixes in registration order.
    roots: Vec<String>,
}

/// Filesystem that maps several real roots into one virtual tree.
#[derive(Clone)]
pub struct RootMappingFs {
    inner: Arc<Inner>,
    writable: bool,
}

impl fmt::Debug for RootMappingFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootMappingFs")
            .field("roots", &self.inner.roots)
            .field("writable", &self.writable)
            .finish()
    }
}

impl RootMappingFs {
    /// Register mappings in order.
    ///
    /// Mappings whose target does not exist are dropped; absent optional
    /// layers are expected. A prefix outside the known categories or a
    /// degenerate target is an `InvalidMapping` error.
    pub async fn new(mappings: impl IntoIterator<Item = RootMapping>) -> FsResult<Self> {
        let mut inner = Inner {
            mappings: Vec::new(),
            buckets: BTreeMap::new(),
            roots: Vec::new(),
        };

        for rm in mappings {
            let category = rm.category().ok_or_else(|| FsError::InvalidMapping {
                from: rm.from.clone(),
                to: rm.to.display().to_string(),
                reason: "first path segment is not a known component folder".into(),
            })?;

            if rm.to.as_os_str().len() < 2 {
                return Err(FsError::InvalidMapping {
                    from: rm.from.clone(),
                    to: rm.to.display().to_string(),
                    reason: "target path is too short".into(),
                });
            }

            match tokio::fs::metadata(&rm.to).await {
                Ok(_) => {}
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::NotFound | std::io::ErrorKind::NotADirectory
                    ) =>
                {
                    debug!(from = %rm.from, to = %rm.to.display(), "dropping mapping, target does not exist");
                    continue;
                }
                Err(e) => return Err(FsError::io("stat", &rm.to, e)),
            }

            let idx = inner.mappings.len();
            let bucket = inner.buckets.entry(rm.from.clone()).or_default();
            if bucket.is_empty() {
                inner.roots.push(rm.from.clone());
            }
            bucket.push(idx);

            let fs = super::local::LocalFs::new(rm.to.clone());
            inner.mappings.push(Mapped { rm, category, fs });
        }

        Ok(Self {
            inner: Arc::new(inner),
            writable: false,
        })
    }

    /// Convenience constructor taking `(from, to)` pairs.
    pub async fn from_to<S, P>(pairs: impl IntoIterator<Item = (S, P)>) -> FsResult<Self>
    where
        S: AsRef<str>,
        P: AsRef<Path>,
    {
        Self::new(pairs.into_iter().map(|(from, to)| RootMapping::new(from, to))).await
    }

    /// Allow writes; they go to `To + remainder` of the matching mapping.
    pub fn with_writes(mut self, writable: bool) -> Self {
        self.writable = writable;
        self
    }

    /// Registered mappings that survived registration, in order.
    pub fn mappings(&self) -> impl Iterator<Item = &RootMapping> {
        self.inner.mappings.iter().map(|m| &m.rm)
    }

    /// Distinct virtual prefixes in registration order.
    pub fn virtual_roots(&self) -> &[String] {
        &self.inner.roots
    }

    /// One directory entry per mapping whose prefix lies under `prefix`.
    ///
    /// Each entry is the mapping's target root, carrying the mapping's
    /// attributes and a filesystem handle scoped to that root; its `path` is
    /// the mount point relative to the category. Buckets are not flattened,
    /// so language variants of one prefix each appear.
    pub async fn dirs(&self, prefix: &str) -> FsResult<Vec<DirEntry>> {
        let prefix = paths::clean(prefix);
        let mut dirs = Vec::new();
        for mapped in &self.inner.mappings {
            if !paths::has_prefix(&mapped.rm.from, &prefix) {
                continue;
            }
            let mount_point = mapped.rm.path(mapped.category, &mapped.rm.from);
            let root = DirDecoratorFs::new(
                Arc::new(mapped.fs.clone()),
                mapped.rm.meta.clone(),
                mount_point,
            );
            let name = mapped
                .rm
                .to
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            dirs.push(root.stat("").await?.renamed(name));
        }
        Ok(dirs)
    }

    fn this(&self) -> Arc<dyn Filesystem> {
        Arc::new(self.clone())
    }

    /// Indices of the bucket with the longest prefix covering `name`.
    fn bucket(&self, name: &str) -> FsResult<Option<&[usize]>> {
        let mut best_len = 0;
        let mut best: Vec<(&String, &Vec<usize>)> = Vec::new();
        for (from, bucket) in &self.inner.buckets {
            if !paths::has_prefix(name, from) || from.len() < best_len {
                continue;
            }
            if from.len() > best_len {
                best_len = from.len();
                best.clear();
            }
            best.push((from, bucket));
        }

        match best.len() {
            0 => Ok(None),
            1 => Ok(Some(best[0].1.as_slice())),
            _ => Err(FsError::AmbiguousMapping {
                path: name.to_string(),
                candidates: best.into_iter().map(|(from, _)| from.clone()).collect(),
            }),
        }
    }

    fn mapped(&self, idx: usize) -> &Mapped {
        &self.inner.mappings[idx]
    }

    /// Synthetic entry for the root.
    fn root_entry(&self) -> DirEntry {
        Decoration::new("rm-root")
            .opener(Opener::for_path(self.this(), ""))
            .fs(self.this())
            .attrs(FileMeta::new().with_ordered(true))
            .apply(DirEntry::directory(""))
    }

    fn root_listing(&self) -> Vec<DirEntry> {
        let this = self.this();
        self.inner
            .roots
            .iter()
            .filter_map(|from| {
                let first = self.inner.buckets.get(from)?.first()?;
                let mapped = self.mapped(*first);
                Some(
                    Decoration::new("rm-root")
                        .path(mapped.rm.path(mapped.category, from))
                        .opener(Opener::for_path(Arc::clone(&this), from.clone()))
                        .fs(Arc::clone(&this))
                        .attrs(mapped.rm.meta.clone())
                        .apply(DirEntry::directory(from.clone())),
                )
            })
            .collect()
    }

    /// Decorate an entry resolved through `mapped` at virtual path `name`.
    fn decorate(&self, mapped: &Mapped, name: &str, entry: DirEntry) -> DirEntry {
        let mut decoration = Decoration::new("rm")
            .path(mapped.rm.path(mapped.category, name))
            .attrs(mapped.rm.meta.clone());
        // Symlinks may turn out to be directories once resolved.
        if !entry.is_file() {
            decoration = decoration
                .opener(Opener::for_path(self.this(), name))
                .fs(self.this());
        }
        decoration.apply(entry)
    }

    async fn resolve(&self, path: &str, follow: bool) -> FsResult<DirEntry> {
        let name = paths::clean(path);
        if name.is_empty() {
            return Ok(self.root_entry());
        }

        let Some(bucket) = self.bucket(&name)? else {
            return Err(FsError::not_found(&name));
        };

        for &idx in bucket {
            let mapped = self.mapped(idx);
            let rest = mapped.remainder(&name);
            // The mount point itself is always followed.
            let found = if follow || rest.is_empty() {
                mapped.fs.stat(rest).await
            } else {
                mapped.fs.lstat(rest).await
            };
            match found {
                Ok(entry) => {
                    trace!(path = %name, from = %mapped.rm.from, "resolved");
                    let entry = if rest.is_empty() {
                        entry.renamed(paths::base_name(&name))
                    } else {
                        entry
                    };
                    return Ok(self.decorate(mapped, &name, entry));
                }
                Err(e) if e.is_absent() => continue,
                Err(e) => return Err(e),
            }
        }

        Err(FsError::not_found(&name))
    }

    /// Mapping and remainder a write to `path` should land on.
    fn write_target(&self, path: &str) -> FsResult<(&Mapped, String)> {
        let name = paths::clean(path);
        if !self.writable || name.is_empty() {
            return Err(FsError::read_only(&name));
        }
        let bucket = self
            .bucket(&name)?
            .ok_or_else(|| FsError::PermissionDenied(format!("{name}: no mapping covers this path")))?;
        let mapped = self.mapped(bucket[0]);
        let rest = mapped.remainder(&name).to_string();
        Ok((mapped, rest))
    }
}

#[async_trait]
impl Filesystem for RootMappingFs {
    fn name(&self) -> &'static str {
        "rootmapping"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::read_only()
            .with_symlinks()
            .with_writes(self.writable)
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        self.resolve(path, true).await
    }

    async fn lstat(&self, path: &str) -> FsResult<DirEntry> {
        self.resolve(path, false).await
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        let name = paths::clean(path);
        if name.is_empty() {
            let listing = self.root_listing();
            return Ok(File::dir("", async move { Ok(listing) }));
        }

        let Some(bucket) = self.bucket(&name)? else {
            return Err(FsError::not_found(&name));
        };

        for &idx in bucket {
            let mapped = self.mapped(idx);
            let rest = mapped.remainder(&name).to_string();
            let file = match mapped.fs.open(&rest).await {
                Ok(f) => f,
                Err(e) if e.is_absent() => continue,
                Err(e) => return Err(e),
            };

            if !file.is_dir() {
                return Ok(file.with_name(name));
            }

            let this = self.clone();
            let dir_name = name.clone();
            return Ok(File::dir(name, async move {
                let mapped = this.mapped(idx);
                let children = mapped.fs.read_dir(&rest).await?;
                Ok(children
                    .into_iter()
                    .map(|child| {
                        let child_name = paths::join(&dir_name, &child.name);
                        this.decorate(mapped, &child_name, child)
                    })
                    .collect())
            }));
        }

        Err(FsError::not_found(&name))
    }

    async fn create(&self, path: &str, data: &[u8]) -> FsResult<()> {
        let (mapped, rest) = self.write_target(path)?;
        mapped.fs.create(&rest, data).await
    }

    async fn mkdir(&self, path: &str) -> FsResult<()> {
        let (mapped, rest) = self.write_target(path)?;
        mapped.fs.mkdir(&rest).await
    }

    async fn remove(&self, path: &str) -> FsResult<()> {
        let (mapped, rest) = self.write_target(path)?;
        mapped.fs.remove(&rest).await
    }

    async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let (src, src_rest) = self.write_target(from)?;
        let (dst, dst_rest) = self.write_target(to)?;
        if !std::ptr::eq(src, dst) {
            return Err(FsError::PermissionDenied(format!(
                "rename across mappings: {from} -> {to}"
            )));
        }
        src.fs.rename(&src_rest, &dst_rest).await
    }

    async fn chmod(&self, path: &str, mode: u32) -> FsResult<()> {
        let (mapped, rest) = self.write_target(path)?;
        mapped.fs.chmod(&rest, mode).await
    }

    fn real_path(&self, path: &str) -> Option<PathBuf> {
        let name = paths::clean(path);
        let bucket = self.bucket(&name).ok()??;
        Some(self.mapped(*bucket.first()?).rm.filename(&name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn tree(files: &[&str], dirs: &[&str]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for d in dirs {
            std::fs::create_dir_all(dir.path().join(d)).unwrap();
        }
        for f in files {
            let p = dir.path().join(f);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, "some content").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn root_lists_prefixes_in_registration_order() {
        let d = tree(&["f2t/myfile.txt"], &["f1t", "f3t"]);
        let rfs = RootMappingFs::from_to([
            ("static/bf1", d.path().join("f1t")),
            ("static/cf2", d.path().join("f2t")),
            ("static/af3", d.path().join("f3t")),
        ])
        .await
        .unwrap();

        let fif = rfs.stat("static/cf2/myfile.txt").await.unwrap();
        assert_eq!(fif.name, "myfile.txt");
        assert_eq!(
            fif.meta.filename(),
            Some(d.path().join("f2t/myfile.txt").as_path())
        );

        let names: Vec<_> = rfs
            .read_dir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["static/bf1", "static/cf2", "static/af3"]);
        assert!(rfs.stat("").await.unwrap().meta.is_ordered());
    }

    #[tokio::test]
    async fn filename_points_at_real_file() {
        let d = tree(&["f1t/foo/file.txt"], &[]);
        let rfs = RootMappingFs::from_to([
            ("static/f1", d.path().join("f1t")),
            ("static/f2", d.path().join("f2t")),
        ])
        .await
        .unwrap();

        let fi = rfs.stat("static/f1/foo/file.txt").await.unwrap();
        assert_eq!(
            fi.meta.filename(),
            Some(d.path().join("f1t/foo/file.txt").as_path())
        );

        let fi = rfs.stat("static/f1").await.unwrap();
        assert_eq!(fi.meta.filename(), Some(d.path().join("f1t").as_path()));

        // f2t does not exist, so its mapping was dropped.
        assert_eq!(rfs.virtual_roots(), ["static/f1"]);
        assert!(rfs.stat("static/f2").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn file_in_one_variant_does_not_hide_the_next() {
        let d = tree(&["sv/partials", "en/partials/x.html"], &[]);
        let rfs = RootMappingFs::new([
            RootMapping::new("layouts", d.path().join("sv"))
                .with_meta(FileMeta::new().with_lang("sv")),
            RootMapping::new("layouts", d.path().join("en"))
                .with_meta(FileMeta::new().with_lang("en")),
            // Runs through a file, so it is an absent layer.
            RootMapping::new("data", d.path().join("sv/partials/data")),
        ])
        .await
        .unwrap();
        assert_eq!(rfs.virtual_roots(), ["layouts"]);

        let fi = rfs.stat("layouts/partials/x.html").await.unwrap();
        assert_eq!(
            fi.meta.filename(),
            Some(d.path().join("en/partials/x.html").as_path())
        );
        assert_eq!(fi.meta.lang(), "en");

        let f = rfs.open("layouts/partials/x.html").await.unwrap();
        assert_eq!(f.read_to_end().await.unwrap(), b"some content");

        assert!(rfs.stat("layouts/partials/y.html").await.unwrap_err().is_absent());
    }

    #[tokio::test]
    async fn mount_carries_language_and_category_path() {
        let d = tree(&["themes/a/myblogcontent/test.txt"], &[]);
        let rm = RootMapping::new("content/blog", d.path().join("themes/a/myblogcontent"))
            .with_meta(FileMeta::new().with_lang("no"));
        let rfs = RootMappingFs::new([rm]).await.unwrap();

        let blog = rfs.stat("content/blog").await.unwrap();
        assert_eq!(
            blog.meta.filename(),
            Some(d.path().join("themes/a/myblogcontent").as_path())
        );
        assert_eq!(blog.meta.lang(), "no");

        let mut f = blog.meta.open().await.unwrap();
        let names: Vec<_> = f.read_dir().await.unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, ["test.txt"]);

        let dirs = rfs.read_dir("content/blog").await.unwrap();
        assert_eq!(dirs.len(), 1);
        let test_file = &dirs[0];
        assert_eq!(test_file.name, "test.txt");
        assert_eq!(
            test_file.meta.filename(),
            Some(d.path().join("themes/a/myblogcontent/test.txt").as_path())
        );
        assert_eq!(test_file.meta.path(), "blog/test.txt");
        assert_eq!(test_file.meta.lang(), "no");

        let content = test_file.meta.open().await.unwrap().read_to_end().await.unwrap();
        assert_eq!(content, b"some content");
    }

    #[tokio::test]
    async fn language_bucket_keeps_every_variant() {
        let d = tree(
            &[
                "a/mysvblogcontent/test.txt",
                "a/myenblogcontent/test.txt",
                "a/mysvdocs/test.txt",
            ],
            &[],
        );
        let rfs = RootMappingFs::new([
            RootMapping::new("content/blog", d.path().join("a/mysvblogcontent"))
                .with_meta(FileMeta::new().with_lang("sv")),
            RootMapping::new("content/blog", d.path().join("a/myenblogcontent"))
                .with_meta(FileMeta::new().with_lang("en")),
            RootMapping::new("content/docs", d.path().join("a/mysvdocs"))
                .with_meta(FileMeta::new().with_lang("sv")),
        ])
        .await
        .unwrap();

        let dirs = rfs.dirs("content/blog").await.unwrap();
        assert_eq!(dirs.len(), 2);
        assert_eq!(dirs[0].meta.lang(), "sv");
        assert_eq!(dirs[1].meta.lang(), "en");
        assert!(dirs[0].meta.fs().is_some());

        assert_eq!(rfs.dirs("content").await.unwrap().len(), 3);
        assert_eq!(rfs.virtual_roots(), ["content/blog", "content/docs"]);

        // First mapping in the bucket wins.
        let fi = rfs.stat("content/blog/test.txt").await.unwrap();
        assert_eq!(fi.meta.lang(), "sv");
    }

    #[tokio::test]
    async fn longest_prefix_wins() {
        let d = tree(&["outer/blog/a.md", "inner/a.md"], &[]);
        let rfs = RootMappingFs::from_to([
            ("content", d.path().join("outer")),
            ("content/blog", d.path().join("inner")),
        ])
        .await
        .unwrap();

        let fi = rfs.stat("content/blog/a.md").await.unwrap();
        assert_eq!(fi.meta.filename(), Some(d.path().join("inner/a.md").as_path()));

        // "content/blogx" is not under "content/blog".
        assert!(rfs.stat("content/blogx").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn unknown_category_is_invalid() {
        let d = tree(&[], &["x"]);
        let err = RootMappingFs::from_to([("nope/x", d.path().join("x"))])
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::InvalidMapping { .. }));
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn writes_need_opt_in() {
        let d = tree(&[], &["content"]);
        let rfs = RootMappingFs::from_to([("content", d.path().join("content"))])
            .await
            .unwrap();
        assert!(matches!(
            rfs.create("content/a.md", b"x").await,
            Err(FsError::PermissionDenied(_))
        ));

        let rfs = rfs.with_writes(true);
        rfs.create("content/new/a.md", b"x").await.unwrap();
        assert!(d.path().join("content/new/a.md").exists());
        assert_eq!(
            rfs.real_path("content/new/a.md"),
            Some(d.path().join("content/new/a.md"))
        );
    }

    #[test]
    fn category_parsing() {
        assert_eq!(Category::of("content/blog"), Some(Category::Content));
        assert_eq!(Category::of("/static"), Some(Category::Static));
        assert_eq!(Category::of("contentx"), None);
        assert_eq!("i18n".parse::<Category>(), Ok(Category::I18n));
    }
}

//! The named source views of a site.
//!
//! [`BaseFs::build`] registers one [`RootMappingFs`] per mount descriptor,
//! collects each one's mount roots per component folder and folds them
//! into a single [`CowFs`] with the project on top. The views are carved
//! out of that:
//!
//! | View | Backing |
//! |------|---------|
//! | `archetypes`, `layouts`, `assets`, `resources` | sub-view of the fold |
//! | `content` | language-weighted merge of the content roots |
//! | `data`, `i18n` | ordered merge of their roots |
//! | `static` | shadowing merge, one per language in multihost mode |
//!
//! Everything is built once and immutable afterwards.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, trace};

use crate::config::SiteConfig;
use crate::error::{FsError, FsResult};
use crate::mounts::MountsDescriptor;
use crate::paths::{self, LanguageSet};
use crate::vfs::{
    Category, CowFs, DirEntry, Filesystem, LocalFs, MergePolicy, NoOpFs, RootMappingFs, SubViewFs,
    WeightedFs,
};

/// One named view with the real directories behind it.
#[derive(Clone)]
pub struct SourceFilesystem {
    name: String,
    fs: Arc<dyn Filesystem>,
    /// Mount roots, highest priority first.
    dirs: Vec<DirEntry>,
    dirnames: Vec<PathBuf>,
    /// Subfolder of the publish dir this view syncs to (multihost static).
    publish_folder: String,
}

impl std::fmt::Debug for SourceFilesystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFilesystem")
            .field("name", &self.name)
            .field("fs", &self.fs.name())
            .field("dirnames", &self.dirnames)
            .finish()
    }
}

impl SourceFilesystem {
    fn new(name: impl Into<String>, fs: Arc<dyn Filesystem>, dirs: Vec<DirEntry>) -> Self {
        let dirnames = dirs
            .iter()
            .filter_map(|d| d.meta.filename().map(Path::to_path_buf))
            .collect();
        let view = Self {
            name: name.into(),
            fs,
            dirs,
            dirnames,
            publish_folder: String::new(),
        };
        debug!(view = %view.name, fs = view.fs.name(), roots = view.dirs.len(), "built view");
        view
    }

    fn with_publish_folder(mut self, folder: impl Into<String>) -> Self {
        self.publish_folder = folder.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fs(&self) -> &Arc<dyn Filesystem> {
        &self.fs
    }

    pub fn dirs(&self) -> &[DirEntry] {
        &self.dirs
    }

    /// Absolute root directories, highest priority first.
    pub fn dirnames(&self) -> &[PathBuf] {
        &self.dirnames
    }

    pub fn publish_folder(&self) -> &str {
        &self.publish_folder
    }

    /// Whether a real filename lives under one of this view's roots.
    pub fn contains(&self, filename: &Path) -> bool {
        self.dirnames.iter().any(|d| filename.starts_with(d))
    }

    /// The view-relative path of a real filename, or `None` when it is not
    /// under any of this view's roots.
    pub fn make_path_relative(&self, filename: &Path) -> Option<String> {
        self.dirs.iter().find_map(|dir| {
            let root = dir.meta.filename()?;
            let rest = filename.strip_prefix(root).ok()?;
            let rest: Vec<_> = rest
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect();
            Some(paths::join(dir.meta.path(), &rest.join("/")))
        })
    }

    /// Real filename behind a view-relative path; `rel` itself when it
    /// cannot be resolved.
    pub async fn real_filename(&self, rel: &str) -> PathBuf {
        match self.fs.stat(rel).await {
            Ok(entry) => entry
                .meta
                .filename()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(rel)),
            Err(_) => PathBuf::from(rel),
        }
    }

    /// Existing real directories at `from` below each root.
    pub async fn real_dirs(&self, from: &str) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for root in &self.dirnames {
            let dir = root.join(from);
            match tokio::fs::metadata(&dir).await {
                Ok(meta) if meta.is_dir() => dirs.push(dir),
                _ => trace!(dir = %dir.display(), "no real dir"),
            }
        }
        dirs
    }
}

/// The eight views.
#[derive(Debug, Clone)]
pub struct SourceFilesystems {
    pub content: SourceFilesystem,
    pub data: SourceFilesystem,
    pub i18n: SourceFilesystem,
    pub layouts: SourceFilesystem,
    pub archetypes: SourceFilesystem,
    pub assets: SourceFilesystem,
    pub resources: SourceFilesystem,
    /// Keyed by language in multihost mode, otherwise a single entry under
    /// the empty key.
    pub statics: BTreeMap<String, SourceFilesystem>,
}

impl SourceFilesystems {
    /// Static view for `lang`, falling back to the merged one.
    pub fn static_fs(&self, lang: &str) -> Arc<dyn Filesystem> {
        self.statics
            .get(lang)
            .or_else(|| self.statics.get(""))
            .map(|s| Arc::clone(&s.fs))
            .unwrap_or_else(|| Arc::new(NoOpFs))
    }

    /// Look a resource up in static, then assets, then content. Returns the
    /// entry and the view that has it; `NotFound` only if none does.
    pub async fn stat_resource(
        &self,
        lang: &str,
        filename: &str,
    ) -> FsResult<(DirEntry, Arc<dyn Filesystem>)> {
        for fs in [
            self.static_fs(lang),
            Arc::clone(&self.assets.fs),
            Arc::clone(&self.content.fs),
        ] {
            match fs.stat(filename).await {
                Ok(entry) => return Ok((entry, fs)),
                Err(e) if e.is_absent() => continue,
                Err(e) => return Err(e),
            }
        }
        Err(FsError::not_found(filename))
    }

    pub fn is_content(&self, filename: &Path) -> bool {
        self.content.contains(filename)
    }

    pub fn is_static(&self, filename: &Path) -> bool {
        self.statics.values().any(|s| s.contains(filename))
    }

    pub fn is_layout(&self, filename: &Path) -> bool {
        self.layouts.contains(filename)
    }

    pub fn is_data(&self, filename: &Path) -> bool {
        self.data.contains(filename)
    }

    pub fn is_asset(&self, filename: &Path) -> bool {
        self.assets.contains(filename)
    }

    pub fn is_i18n(&self, filename: &Path) -> bool {
        self.i18n.contains(filename)
    }

    /// Static-relative path of a real filename, if any static view has it.
    pub fn make_static_path_relative(&self, filename: &Path) -> Option<String> {
        self.statics
            .values()
            .find_map(|s| s.make_path_relative(filename))
    }

    /// Every view with its display name; per-language static views are
    /// named `static:<lang>`.
    pub fn views(&self) -> Vec<(String, &SourceFilesystem)> {
        let mut views: Vec<(String, &SourceFilesystem)> = [
            &self.content,
            &self.data,
            &self.i18n,
            &self.layouts,
            &self.archetypes,
            &self.assets,
            &self.resources,
        ]
        .into_iter()
        .map(|v| (v.name.clone(), v))
        .collect();
        for (lang, view) in &self.statics {
            let name = if lang.is_empty() {
                "static".to_string()
            } else {
                format!("static:{lang}")
            };
            views.push((name, view));
        }
        views
    }

    /// Look a view up by the name [`SourceFilesystems::views`] gives it.
    /// Plain `static` also finds the first per-language view.
    pub fn view(&self, name: &str) -> Option<&SourceFilesystem> {
        if name == "static" {
            return self.statics.get("").or_else(|| self.statics.values().next());
        }
        self.views()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }
}

/// A directory to watch for changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatchDir {
    pub category: String,
    /// Mount point relative to the category root.
    pub path: String,
    pub filename: PathBuf,
}

/// Mount roots and layers gathered from every descriptor.
#[derive(Default)]
struct Collector {
    /// Root mapping filesystems in shadow order, project first.
    layers: Vec<Arc<dyn Filesystem>>,
    dirs: BTreeMap<Category, Vec<DirEntry>>,
}

impl Collector {
    async fn collect(&mut self, md: &MountsDescriptor, default_lang: &str) -> FsResult<()> {
        let rfs = RootMappingFs::new(md.root_mappings(default_lang))
            .await?
            .with_writes(md.is_project);

        for category in Category::ALL {
            let dirs = rfs.dirs(category.as_str()).await?;
            self.dirs.entry(category).or_default().extend(dirs);
        }
        debug!(dir = %md.dir.display(), roots = rfs.virtual_roots().len(), project = md.is_project, "collected mounts");

        self.layers.push(Arc::new(rfs));
        Ok(())
    }

    fn dirs(&self, category: Category) -> Vec<DirEntry> {
        self.dirs.get(&category).cloned().unwrap_or_default()
    }

    fn fold(&self) -> CowFs {
        let mut layers = self.layers.iter().cloned();
        match layers.next() {
            Some(project) => CowFs::fold_layers(project, layers.collect::<Vec<_>>()),
            None => CowFs::single(Arc::new(NoOpFs)),
        }
    }
}

/// The source views of a site plus the publish target.
pub struct BaseFs {
    sources: SourceFilesystems,
    publish_fs: LocalFs,
    overlay: CowFs,
    collector: Collector,
}

impl BaseFs {
    /// Build every view from the project and its configured modules.
    pub async fn build(config: &SiteConfig) -> FsResult<Self> {
        Self::from_descriptors(config, MountsDescriptor::all(config)).await
    }

    /// Build from explicit descriptors, already in shadow order with the
    /// project (if any) first.
    pub async fn from_descriptors(
        config: &SiteConfig,
        descriptors: Vec<MountsDescriptor>,
    ) -> FsResult<Self> {
        // The resources view always needs its project directory.
        let resource_dir = config.abs_pathify(&config.resource_dir);
        if let Err(e) = tokio::fs::create_dir_all(&resource_dir).await {
            debug!(dir = %resource_dir.display(), error = %e, "could not create resource dir");
        }

        let default_lang = config.default_content_language.as_str();
        let mut collector = Collector::default();
        for md in &descriptors {
            collector.collect(md, default_lang).await?;
        }

        let overlay = collector.fold();
        let languages = config.language_set();
        let sources = build_views(config, &languages, &overlay, &collector)?;

        Ok(Self {
            sources,
            publish_fs: LocalFs::new(config.abs_publish_dir()),
            overlay,
            collector,
        })
    }

    pub fn sources(&self) -> &SourceFilesystems {
        &self.sources
    }

    /// Writable filesystem rooted at the publish dir.
    pub fn publish_fs(&self) -> &LocalFs {
        &self.publish_fs
    }

    /// The folded overlay of every root mapping, project outermost.
    pub fn overlay(&self) -> &CowFs {
        &self.overlay
    }

    /// Mount roots flagged for watching, per component folder.
    pub fn watch_dirs(&self) -> Vec<WatchDir> {
        self.collector
            .dirs
            .iter()
            .flat_map(|(category, dirs)| {
                dirs.iter().filter(|d| d.meta.watch()).filter_map(move |d| {
                    Some(WatchDir {
                        category: category.as_str().to_string(),
                        path: d.meta.path().to_string(),
                        filename: d.meta.filename()?.to_path_buf(),
                    })
                })
            })
            .collect()
    }

    /// Path of a real filename relative to the content root, or the
    /// filename unchanged when it is not content.
    pub fn relative_to_content_root(&self, filename: &Path) -> String {
        self.sources
            .content
            .make_path_relative(filename)
            .unwrap_or_else(|| filename.to_string_lossy().into_owned())
    }
}

fn build_views(
    config: &SiteConfig,
    languages: &LanguageSet,
    overlay: &CowFs,
    collector: &Collector,
) -> FsResult<SourceFilesystems> {
    let folded: Arc<dyn Filesystem> = Arc::new(overlay.clone());
    let sub_view = |category: Category| {
        SourceFilesystem::new(
            category.as_str(),
            Arc::new(SubViewFs::new(Arc::clone(&folded), category.as_str())),
            collector.dirs(category),
        )
    };
    let merged = |category: Category, policy: MergePolicy| -> FsResult<SourceFilesystem> {
        let dirs = collector.dirs(category);
        let fs = WeightedFs::build(policy, languages.clone(), dirs.clone())?;
        Ok(SourceFilesystem::new(category.as_str(), fs, dirs))
    };

    let static_dirs = collector.dirs(Category::Static);
    let mut statics = BTreeMap::new();
    if config.multihost {
        for language in config.languages() {
            let dirs: Vec<DirEntry> = static_dirs
                .iter()
                .filter(|d| d.meta.lang().is_empty() || d.meta.lang() == language.lang)
                .cloned()
                .collect();
            if dirs.is_empty() {
                continue;
            }
            let fs = WeightedFs::build(MergePolicy::Shadow, languages.clone(), dirs.clone())?;
            let name = format!("static:{}", language.lang);
            statics.insert(
                language.lang.clone(),
                SourceFilesystem::new(name, fs, dirs).with_publish_folder(language.lang.as_str()),
            );
        }
    } else {
        let fs = WeightedFs::build(MergePolicy::Shadow, languages.clone(), static_dirs.clone())?;
        statics.insert(String::new(), SourceFilesystem::new("static", fs, static_dirs));
    }

    Ok(SourceFilesystems {
        content: merged(Category::Content, MergePolicy::Language)?,
        data: merged(Category::Data, MergePolicy::Ordered)?,
        i18n: merged(Category::I18n, MergePolicy::Ordered)?,
        layouts: sub_view(Category::Layouts),
        archetypes: sub_view(Category::Archetypes),
        assets: sub_view(Category::Assets),
        resources: sub_view(Category::Resources),
        statics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, files: &[&str]) {
        for f in files {
            let p = root.join(f);
            std::fs::create_dir_all(p.parent().unwrap()).unwrap();
            std::fs::write(p, f.as_bytes()).unwrap();
        }
    }

    #[tokio::test]
    async fn views_cover_every_component_folder() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &[
                "content/post.md",
                "data/site.toml",
                "i18n/en.toml",
                "layouts/index.html",
                "archetypes/default.md",
                "assets/main.css",
                "static/robots.txt",
            ],
        );
        let config = SiteConfig::with_working_dir(dir.path());
        let base = BaseFs::build(&config).await.unwrap();
        let s = base.sources();

        assert_eq!(s.content.fs().read("post.md").await.unwrap(), b"content/post.md");
        assert_eq!(s.data.fs().read("site.toml").await.unwrap(), b"data/site.toml");
        assert_eq!(s.i18n.fs().read("en.toml").await.unwrap(), b"i18n/en.toml");
        assert!(s.layouts.fs().exists("index.html").await);
        assert!(s.archetypes.fs().exists("default.md").await);
        assert!(s.assets.fs().exists("main.css").await);
        assert!(s.static_fs("en").exists("robots.txt").await);

        // Created on build.
        assert!(dir.path().join("resources").is_dir());
        assert_eq!(s.resources.dirnames(), [dir.path().join("resources")]);

        assert!(s.is_content(&dir.path().join("content/post.md")));
        assert!(!s.is_content(&dir.path().join("contentx/post.md")));
        assert!(s.is_static(&dir.path().join("static/robots.txt")));
        assert_eq!(
            s.make_static_path_relative(&dir.path().join("static/robots.txt")),
            Some("robots.txt".to_string())
        );
        assert_eq!(
            base.relative_to_content_root(&dir.path().join("content/post.md")),
            "post.md"
        );
        assert_eq!(
            s.content.real_filename("post.md").await,
            dir.path().join("content/post.md")
        );
        assert_eq!(s.views().len(), 8);
    }

    #[tokio::test]
    async fn resources_are_writable_and_content_is_not() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &["content/a.md"]);
        let base = BaseFs::build(&SiteConfig::with_working_dir(dir.path()))
            .await
            .unwrap();
        let s = base.sources();

        s.resources.fs().create("_gen/x.css", b"x").await.unwrap();
        assert!(dir.path().join("resources/_gen/x.css").is_file());

        assert!(matches!(
            s.content.fs().create("b.md", b"").await,
            Err(FsError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn watch_dirs_are_flagged_mount_roots() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &["content/a.md", "layouts/x.html"]);
        let base = BaseFs::build(&SiteConfig::with_working_dir(dir.path()))
            .await
            .unwrap();

        let watched = base.watch_dirs();
        let categories: Vec<_> = watched.iter().map(|w| w.category.as_str()).collect();
        assert!(categories.contains(&"content"));
        assert!(categories.contains(&"layouts"));
        assert!(categories.contains(&"resources"));
        assert!(watched.iter().all(|w| w.filename.starts_with(dir.path())));
    }
}

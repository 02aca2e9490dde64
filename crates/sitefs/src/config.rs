//! Site configuration.
//!
//! Loaded from a TOML file such as:
//!
//! ```toml
//! content_dir = "content"
//! static_dir = ["static", "assets/static"]
//! default_content_language = "en"
//!
//! [languages.en]
//! weight = 1
//!
//! [languages.sv]
//! content_dir = "content/sv"
//! weight = 2
//!
//! [[modules]]
//! dir = "themes/base"
//! ```
//!
//! Every directory setting is relative to `working_dir` unless absolute.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::mounts::Mount;
use crate::paths::{self, LanguageSet};

/// Highest `static_dirN` index consulted.
pub const MAX_STATIC_DIR_INDEX: usize = 10;

/// A directory setting that may name one directory or several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DirList {
    One(String),
    Many(Vec<String>),
}

impl DirList {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            DirList::One(dir) => vec![dir.clone()],
            DirList::Many(dirs) => dirs.clone(),
        }
    }
}

impl Default for DirList {
    fn default() -> Self {
        DirList::One(default_static_dir())
    }
}

/// Top-level site configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Project root. Relative values are resolved against the directory of
    /// the configuration file by [`SiteConfig::load_from`].
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    #[serde(default = "default_publish_dir")]
    pub publish_dir: String,

    #[serde(default = "default_content_dir")]
    pub content_dir: String,

    #[serde(default = "default_layout_dir")]
    pub layout_dir: String,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    #[serde(default = "default_i18n_dir")]
    pub i18n_dir: String,

    #[serde(default = "default_archetype_dir")]
    pub archetype_dir: String,

    #[serde(default = "default_asset_dir")]
    pub asset_dir: String,

    #[serde(default = "default_resource_dir")]
    pub resource_dir: String,

    #[serde(default)]
    pub static_dir: DirList,

    #[serde(default = "default_language")]
    pub default_content_language: String,

    /// One static view per language instead of one merged view.
    #[serde(default)]
    pub multihost: bool,

    #[serde(default)]
    pub languages: BTreeMap<String, LanguageConfig>,

    /// Themes and modules in precedence order; earlier entries shadow later
    /// ones.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,

    /// Remaining keys; `static_dir0` … `static_dir10` are read from here.
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_publish_dir() -> String {
    "public".to_string()
}

fn default_content_dir() -> String {
    "content".to_string()
}

fn default_layout_dir() -> String {
    "layouts".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_i18n_dir() -> String {
    "i18n".to_string()
}

fn default_archetype_dir() -> String {
    "archetypes".to_string()
}

fn default_asset_dir() -> String {
    "assets".to_string()
}

fn default_resource_dir() -> String {
    "resources".to_string()
}

fn default_static_dir() -> String {
    "static".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_watch() -> bool {
    true
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            publish_dir: default_publish_dir(),
            content_dir: default_content_dir(),
            layout_dir: default_layout_dir(),
            data_dir: default_data_dir(),
            i18n_dir: default_i18n_dir(),
            archetype_dir: default_archetype_dir(),
            asset_dir: default_asset_dir(),
            resource_dir: default_resource_dir(),
            static_dir: DirList::default(),
            default_content_language: default_language(),
            multihost: false,
            languages: BTreeMap::new(),
            modules: Vec::new(),
            extra: BTreeMap::new(),
        }
    }
}

/// Per-language overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageConfig {
    #[serde(default)]
    pub content_dir: Option<String>,

    #[serde(default)]
    pub static_dir: Option<DirList>,

    #[serde(default)]
    pub weight: i32,

    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

/// A theme or module contributing mounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module root; relative to the working dir unless absolute.
    pub dir: PathBuf,

    /// Whether the module's directories should be watched for changes.
    #[serde(default = "default_watch")]
    pub watch: bool,

    /// Explicit mounts. Without any, every component folder of the module
    /// is mounted at its own name.
    #[serde(default)]
    pub mounts: Vec<Mount>,
}

/// A configured language with its settings resolved against the site
/// defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub lang: String,
    pub weight: i32,
    pub content_dir: String,
    /// `static_dir`, then `static_dir0` … `static_dir10`.
    pub static_dirs: Vec<String>,
}

/// Collect `static_dirN` values from leftover keys, in index order.
fn indexed_static_dirs(extra: &BTreeMap<String, toml::Value>) -> Vec<Option<Vec<String>>> {
    (0..=MAX_STATIC_DIR_INDEX)
        .map(|i| {
            extra
                .get(&format!("static_dir{i}"))
                .and_then(|v| v.clone().try_into::<DirList>().ok())
                .map(|dirs| dirs.to_vec())
        })
        .collect()
}

impl SiteConfig {
    /// Load configuration from a TOML file.
    ///
    /// A relative `working_dir` is taken relative to the file's directory.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))?;

        if config.working_dir.is_relative() {
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            config.working_dir = paths::clean_real(&base.join(&config.working_dir));
        }
        Ok(config)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).context("invalid site configuration")?;
        if config.default_content_language.is_empty() {
            anyhow::bail!("default_content_language must not be empty");
        }
        Ok(config)
    }

    /// Configuration rooted at `working_dir` with every other setting at its
    /// default.
    pub fn with_working_dir(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            ..Self::default()
        }
    }

    /// Resolve a setting against the working dir.
    pub fn abs_pathify(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            paths::clean_real(path)
        } else {
            paths::clean_real(&self.working_dir.join(path))
        }
    }

    /// Static dirs in declaration order: `static_dir`, then `static_dir0`
    /// through `static_dir10`.
    pub fn static_dirs(&self) -> Vec<String> {
        let mut dirs = self.static_dir.to_vec();
        for indexed in indexed_static_dirs(&self.extra).into_iter().flatten() {
            dirs.extend(indexed);
        }
        dirs
    }

    /// Configured languages ordered by weight, then code. Without a
    /// `[languages]` table the default content language is the only one.
    pub fn languages(&self) -> Vec<Language> {
        if self.languages.is_empty() {
            return vec![Language {
                lang: self.default_content_language.clone(),
                weight: 0,
                content_dir: self.content_dir.clone(),
                static_dirs: self.static_dirs(),
            }];
        }

        let site_indexed = indexed_static_dirs(&self.extra);
        let mut languages: Vec<Language> = self
            .languages
            .iter()
            .map(|(lang, cfg)| {
                let mut static_dirs = cfg
                    .static_dir
                    .as_ref()
                    .unwrap_or(&self.static_dir)
                    .to_vec();
                let own_indexed = indexed_static_dirs(&cfg.extra);
                for (own, site) in own_indexed.into_iter().zip(&site_indexed) {
                    if let Some(dirs) = own.or_else(|| site.clone()) {
                        static_dirs.extend(dirs);
                    }
                }

                Language {
                    lang: lang.clone(),
                    weight: cfg.weight,
                    content_dir: cfg
                        .content_dir
                        .clone()
                        .unwrap_or_else(|| self.content_dir.clone()),
                    static_dirs,
                }
            })
            .collect();

        languages.sort_by(|a, b| a.weight.cmp(&b.weight).then_with(|| a.lang.cmp(&b.lang)));
        languages
    }

    /// Language codes recognised in file name suffixes.
    pub fn language_set(&self) -> LanguageSet {
        self.languages().into_iter().map(|l| l.lang).collect()
    }

    pub fn abs_publish_dir(&self) -> PathBuf {
        self.abs_pathify(&self.publish_dir)
    }
}

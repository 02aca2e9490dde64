//! Mount descriptors: which real directories feed which component folders.
//!
//! The project's descriptor is derived from [`SiteConfig`]; each configured
//! module contributes one more, in precedence order. [`MountsDescriptor::all`]
//! returns them project first, which is the shadow order the view builder
//! expects.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ModuleConfig, SiteConfig};
use crate::vfs::{Category, FileMeta, RootMapping};

/// One source directory mounted at a virtual target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    /// Directory relative to the descriptor's root, or absolute.
    pub source: String,
    /// Virtual target; its first segment is a component folder.
    pub target: String,
    #[serde(default)]
    pub lang: Option<String>,
}

impl Mount {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            lang: None,
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    fn is_content(&self) -> bool {
        Category::of(&self.target) == Some(Category::Content)
    }
}

/// The mounts of the project or of one module.
#[derive(Debug, Clone)]
pub struct MountsDescriptor {
    /// Root that relative mount sources are resolved against.
    pub dir: PathBuf,
    pub mounts: Vec<Mount>,
    /// Candidate for watching in server mode.
    pub watch: bool,
    /// The project receives writes.
    pub is_project: bool,
}

impl MountsDescriptor {
    /// Derive the project's mounts from site configuration.
    pub fn project(config: &SiteConfig) -> Self {
        let abs = |dir: &str| config.abs_pathify(dir).to_string_lossy().into_owned();

        let mut mounts = static_mounts(config);
        mounts.extend(content_mounts(config));
        for (dir, target) in [
            (&config.i18n_dir, Category::I18n),
            (&config.layout_dir, Category::Layouts),
            (&config.data_dir, Category::Data),
            (&config.archetype_dir, Category::Archetypes),
            (&config.asset_dir, Category::Assets),
            (&config.resource_dir, Category::Resources),
        ] {
            mounts.push(Mount::new(abs(dir), target.as_str()));
        }

        Self {
            dir: config.working_dir.clone(),
            mounts,
            watch: true,
            is_project: true,
        }
    }

    /// Mounts of a configured module. Without explicit mounts every
    /// component folder is mounted at its own name.
    pub fn module(config: &SiteConfig, module: &ModuleConfig) -> Self {
        let mounts = if module.mounts.is_empty() {
            Category::ALL
                .iter()
                .map(|c| Mount::new(c.as_str(), c.as_str()))
                .collect()
        } else {
            module.mounts.clone()
        };

        Self {
            dir: config.abs_pathify(&module.dir),
            mounts,
            watch: module.watch,
            is_project: false,
        }
    }

    /// The project followed by every module, in shadow order.
    pub fn all(config: &SiteConfig) -> Vec<Self> {
        let mut all = vec![Self::project(config)];
        all.extend(config.modules.iter().map(|m| Self::module(config, m)));
        all
    }

    /// Root mappings for this descriptor. Content mounts without a language
    /// get `default_lang`.
    pub fn root_mappings(&self, default_lang: &str) -> Vec<RootMapping> {
        self.mounts
            .iter()
            .map(|mount| {
                let mut meta = FileMeta::new().with_watch(self.watch);
                match &mount.lang {
                    Some(lang) => meta.set_lang(lang.as_str()),
                    None if mount.is_content() => meta.set_lang(default_lang),
                    None => {}
                }
                RootMapping::new(&mount.target, self.dir.join(&mount.source)).with_meta(meta)
            })
            .collect()
    }
}

/// One content mount per language with the default language first; languages
/// sharing a content dir share the first one's mount.
fn content_mounts(config: &SiteConfig) -> Vec<Mount> {
    let default_lang = &config.default_content_language;
    let languages = config.languages();

    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    for language in languages.iter().filter(|l| &l.lang == default_lang) {
        seen.insert(language.content_dir.clone());
        ordered.push(language);
    }
    for language in &languages {
        if seen.insert(language.content_dir.clone()) {
            ordered.push(language);
        }
    }

    ordered
        .into_iter()
        .map(|language| {
            Mount::new(
                config
                    .abs_pathify(&language.content_dir)
                    .to_string_lossy()
                    .into_owned(),
                Category::Content.as_str(),
            )
            .with_lang(language.lang.as_str())
        })
        .collect()
}

/// Multihost sites get language-tagged static mounts per language; others one
/// untagged list across all languages. A later static dir shadows an earlier
/// one, so mounts are emitted last dir first.
fn static_mounts(config: &SiteConfig) -> Vec<Mount> {
    let abs = |dir: &str| config.abs_pathify(dir).to_string_lossy().into_owned();
    let target = Category::Static.as_str();
    let languages = config.languages();

    if config.multihost {
        return languages
            .iter()
            .flat_map(|language| {
                remove_duplicates_keep_right(language.static_dirs.clone())
                    .into_iter()
                    .rev()
                    .map(move |dir| Mount::new(abs(&dir), target).with_lang(language.lang.as_str()))
            })
            .collect();
    }

    let dirs: Vec<String> = languages
        .iter()
        .flat_map(|language| remove_duplicates_keep_right(language.static_dirs.clone()))
        .collect();
    remove_duplicates_keep_right(dirs)
        .into_iter()
        .rev()
        .map(|dir| Mount::new(abs(&dir), target))
        .collect()
}

/// Drop earlier duplicates, keeping each value at its last position.
pub fn remove_duplicates_keep_right(dirs: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out: Vec<String> = dirs
        .into_iter()
        .rev()
        .filter(|d| seen.insert(d.clone()))
        .collect();
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(&["a", "b", "a"], &["b", "a"])]
    #[case(&["a", "a", "a"], &["a"])]
    #[case(&["a", "b", "c"], &["a", "b", "c"])]
    #[case(&[], &[])]
    fn duplicates_keep_the_rightmost(#[case] input: &[&str], #[case] expected: &[&str]) {
        let input = input.iter().map(|s| s.to_string()).collect();
        assert_eq!(remove_duplicates_keep_right(input), expected);
    }

    fn config(toml: &str) -> SiteConfig {
        let mut config = SiteConfig::from_toml_str(toml).unwrap();
        config.working_dir = PathBuf::from("/site");
        config
    }

    fn targets(md: &MountsDescriptor, target: &str) -> Vec<(String, Option<String>)> {
        md.mounts
            .iter()
            .filter(|m| m.target == target)
            .map(|m| (m.source.clone(), m.lang.clone()))
            .collect()
    }

    #[test]
    fn project_content_has_the_default_language_first() {
        let md = MountsDescriptor::project(&config(
            r#"
default_content_language = "sv"
[languages.en]
weight = 1
[languages.sv]
weight = 2
content_dir = "content/sv"
[languages.nn]
weight = 3
content_dir = "content/sv"
"#,
        ));
        assert!(md.is_project);
        assert_eq!(
            targets(&md, "content"),
            [
                ("/site/content/sv".to_string(), Some("sv".to_string())),
                ("/site/content".to_string(), Some("en".to_string())),
            ]
        );
        assert_eq!(targets(&md, "layouts"), [("/site/layouts".to_string(), None)]);
        assert_eq!(md.mounts.len(), 1 + 2 + 6);
    }

    #[test]
    fn static_mounts_merge_unless_multihost() {
        let toml = r#"
static_dir = ["s1", "s2"]
[languages.en]
weight = 1
[languages.fr]
weight = 2
static_dir = ["s2", "s3"]
"#;
        let merged = MountsDescriptor::project(&config(toml));
        assert_eq!(
            targets(&merged, "static"),
            [
                ("/site/s3".to_string(), None),
                ("/site/s2".to_string(), None),
                ("/site/s1".to_string(), None),
            ]
        );

        let multihost = MountsDescriptor::project(&config(&format!("multihost = true\n{toml}")));
        let statics = targets(&multihost, "static");
        assert_eq!(statics.len(), 4);
        assert_eq!(statics[0], ("/site/s2".to_string(), Some("en".to_string())));
        assert_eq!(statics[1], ("/site/s1".to_string(), Some("en".to_string())));
        assert_eq!(statics[2], ("/site/s3".to_string(), Some("fr".to_string())));
    }

    #[test]
    fn modules_default_to_every_component_folder() {
        let config = config(
            r#"
[[modules]]
dir = "themes/a"

[[modules]]
dir = "/abs/theme"
watch = false
[[modules.mounts]]
source = "content"
target = "content/docs"
"#,
        );
        let all = MountsDescriptor::all(&config);
        assert_eq!(all.len(), 3);
        assert!(all[0].is_project);

        assert_eq!(all[1].dir, PathBuf::from("/site/themes/a"));
        assert_eq!(all[1].mounts.len(), Category::ALL.len());
        assert!(all[1].watch);

        let mappings = all[2].root_mappings("en");
        assert_eq!(mappings.len(), 1);
        assert_eq!(mappings[0].from(), "content/docs");
        assert_eq!(mappings[0].to(), PathBuf::from("/abs/theme/content"));
        assert_eq!(mappings[0].meta().lang(), "en");
        assert!(!mappings[0].meta().watch());
    }
}

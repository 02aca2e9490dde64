//! Virtual path helpers.
//!
//! Virtual paths are `/`-separated, relative, and carry no `.` / `..` or
//! trailing separators once cleaned. The synthetic root is the empty string.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// The set of configured language codes (e.g. `{"en", "sv"}`).
pub type LanguageSet = BTreeSet<String>;

/// Normalize a virtual path: strip leading/trailing separators and resolve
/// `.` and `..` lexically. `..` never escapes the root.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            p => parts.push(p),
        }
    }
    parts.join("/")
}

/// Join two virtual paths and clean the result.
pub fn join(base: &str, name: &str) -> String {
    if base.is_empty() {
        clean(name)
    } else if name.is_empty() {
        clean(base)
    } else {
        clean(&format!("{base}/{name}"))
    }
}

/// Component-aware prefix test on cleaned paths.
///
/// `content/blog` is under `content` but `contentx` is not.
pub fn has_prefix(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Remainder of `path` below `prefix`, without a leading separator.
pub fn strip_prefix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if !has_prefix(path, prefix) {
        return None;
    }
    Some(path[prefix.len()..].trim_start_matches('/'))
}

/// First segment of a virtual path (`content/blog` → `content`).
pub fn first_segment(path: &str) -> &str {
    path.split('/').next().unwrap_or("")
}

/// Last segment of a virtual path (`content/blog/a.md` → `a.md`).
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or("")
}

/// Lexically clean a real path without touching the filesystem.
pub fn clean_real(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Extension of a file name including the dot (`a.en.md` → `.md`).
fn ext(name: &str) -> &str {
    match name.rfind('.') {
        Some(idx) => &name[idx..],
        None => "",
    }
}

/// Extract the language code and translation base name from a file name.
///
/// A recognised language code before the extension wins over the language of
/// the layer the file lives in: with `en` configured, `mypost.en.md` yields
/// `("en", "mypost")`. Unknown codes are left in the base name:
/// `mypost.xx.md` yields `("", "mypost.xx")`.
pub fn lang_info_from(languages: &LanguageSet, name: &str) -> (String, String) {
    let base = base_name(name);
    let extension = ext(base);
    let mut translation_base_name = base.strip_suffix(extension).unwrap_or(base);

    let lang_ext = ext(translation_base_name);
    let file_lang = lang_ext.trim_start_matches('.');

    let mut lang = String::new();
    if !file_lang.is_empty() && languages.contains(file_lang) {
        lang = file_lang.to_string();
        translation_base_name = translation_base_name
            .strip_suffix(lang_ext)
            .unwrap_or(translation_base_name);
    }

    (lang, translation_base_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn langs() -> LanguageSet {
        ["en", "sv", "nn"].iter().map(|s| s.to_string()).collect()
    }

    #[rstest]
    #[case::empty("", "")]
    #[case::root("/", "")]
    #[case::trailing("content/blog/", "content/blog")]
    #[case::leading("/static/css", "static/css")]
    #[case::dot("content/./blog", "content/blog")]
    #[case::dotdot("content/blog/../docs", "content/docs")]
    #[case::escape("../../etc", "etc")]
    #[case::doubled("layouts//partials", "layouts/partials")]
    fn clean_paths(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(clean(input), expected);
    }

    #[rstest]
    #[case::exact("content", "content", true)]
    #[case::child("content/blog", "content", true)]
    #[case::sibling("contentx", "content", false)]
    #[case::empty_prefix("anything", "", true)]
    #[case::longer_prefix("content", "content/blog", false)]
    fn prefix_matching(#[case] path: &str, #[case] prefix: &str, #[case] expected: bool) {
        assert_eq!(has_prefix(path, prefix), expected);
    }

    #[test]
    fn strip_prefix_drops_separator() {
        assert_eq!(strip_prefix("content/blog/a.md", "content"), Some("blog/a.md"));
        assert_eq!(strip_prefix("content", "content"), Some(""));
        assert_eq!(strip_prefix("contentx/a", "content"), None);
    }

    #[rstest]
    #[case::tagged("mypost.en.md", "en", "mypost")]
    #[case::other_tag("mypost.sv.md", "sv", "mypost")]
    #[case::unknown_tag("mypost.xx.md", "", "mypost.xx")]
    #[case::untagged("mypost.md", "", "mypost")]
    #[case::no_ext("README", "", "README")]
    #[case::nested("blog/a.nn.txt", "nn", "a")]
    fn language_suffixes(#[case] name: &str, #[case] lang: &str, #[case] base: &str) {
        let (l, b) = lang_info_from(&langs(), name);
        assert_eq!(l, lang);
        assert_eq!(b, base);
    }

    #[test]
    fn clean_real_is_lexical() {
        assert_eq!(
            clean_real(Path::new("/a/b/../c/./d/")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(clean_real(Path::new("a/../../b")), PathBuf::from("../b"));
    }
}

//! Test utilities for sitefs.
//!
//! [`TestTree`] lays out files, directories and symlinks under a temporary
//! directory that is removed when the tree is dropped:
//!
//! ```no_run
//! use sitefs_testutil::TestTree;
//!
//! let tree = TestTree::new()
//!     .file("content/blog/a.md", "# A")
//!     .dir("static")
//!     .symlink("content/docs", "blog");
//! assert!(tree.path("content/blog/a.md").is_file());
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// An on-disk tree for a single test.
pub struct TestTree {
    _dir: TempDir,
    /// Canonical root; temp dirs may live behind a symlink.
    root: PathBuf,
}

impl fmt::Debug for TestTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTree").field("root", &self.root).finish()
    }
}

impl Default for TestTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTree {
    /// Create an empty tree.
    ///
    /// # Panics
    ///
    /// If the temporary directory cannot be created.
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonicalize temp dir");
        Self { _dir: dir, root }
    }

    /// The tree's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of `rel` inside the tree.
    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Write a file, creating parent directories.
    #[allow(clippy::expect_used)]
    pub fn file(self, rel: &str, content: impl AsRef<[u8]>) -> Self {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write file");
        self
    }

    /// Write several files whose content is their own relative path.
    pub fn files(self, rels: &[&str]) -> Self {
        rels.iter().fold(self, |tree, rel| tree.file(rel, rel))
    }

    /// Create a directory and its parents.
    #[allow(clippy::expect_used)]
    pub fn dir(self, rel: &str) -> Self {
        fs::create_dir_all(self.path(rel)).expect("create dir");
        self
    }

    /// Create a symlink at `rel` pointing at `target` (taken literally, so
    /// relative targets resolve from the link's directory).
    #[cfg(unix)]
    #[allow(clippy::expect_used)]
    pub fn symlink(self, rel: &str, target: &str) -> Self {
        let link = self.path(rel);
        if let Some(parent) = link.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::os::unix::fs::symlink(target, &link).expect("create symlink");
        self
    }

    /// Read a file back as a string.
    #[allow(clippy::expect_used)]
    pub fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.path(rel)).expect("read file")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_files_and_dirs() {
        let tree = TestTree::new()
            .file("a/b.txt", "hello")
            .files(&["c/d.md"])
            .dir("e/f");
        assert_eq!(tree.read("a/b.txt"), "hello");
        assert_eq!(tree.read("c/d.md"), "c/d.md");
        assert!(tree.path("e/f").is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn builds_symlinks() {
        let tree = TestTree::new().dir("real").symlink("link", "real");
        assert!(tree.path("link").is_dir());
        assert!(
            fs::symlink_metadata(tree.path("link"))
                .unwrap()
                .file_type()
                .is_symlink()
        );
    }
}

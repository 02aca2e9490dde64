//! Symlink-safe traversal of decorated filesystems.
//!
//! A [`Walkway`] visits every entry below a root in depth-first pre-order.
//! Directories are opened through the opener recorded in their metadata, so
//! walking a composite view keeps merging layers at every level. Children
//! are sorted by name unless the directory says it is already ordered.
//!
//! Symlinked directories are resolved to their real target; one that
//! resolves to a directory already walked is pruned silently.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::paths;
use crate::vfs::{DirEntry, DirEntryKind, Filesystem, NoOpFs};

/// Never descended into, whatever mounts point at it.
const EXCLUDED_DIR: &str = "/var";

/// What the visitor wants done with the entry it was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Continue,
    /// Do not descend into this directory. Same as `Continue` for files.
    SkipDir,
}

/// An entry or a failure delivered to the visitor.
#[derive(Debug)]
pub enum WalkEvent<'a> {
    Entry {
        /// Path relative to the walk root.
        path: &'a str,
        entry: &'a DirEntry,
    },
    /// Resolving, opening or listing failed. Returning `Ok` skips the
    /// affected entry; returning the error aborts the walk.
    Error {
        path: &'a str,
        entry: Option<&'a DirEntry>,
        error: FsError,
    },
}

/// Walk lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    Unstarted,
    Walking,
    Done,
}

/// Single-use tree walker.
///
/// Holds the set of directories already walked, so one instance must not be
/// shared between concurrent walks; create one per walk.
pub struct Walkway<F> {
    fs: Arc<dyn Filesystem>,
    root: String,
    start: Option<DirEntry>,
    visitor: F,
    state: WalkState,
    seen: HashSet<PathBuf>,
}

impl<F> Walkway<F>
where
    F: FnMut(WalkEvent<'_>) -> FsResult<Visit>,
{
    /// Walk `fs` from `root`.
    pub fn new(fs: Arc<dyn Filesystem>, root: &str, visitor: F) -> Self {
        Self {
            fs,
            root: paths::clean(root),
            start: None,
            visitor,
            state: WalkState::Unstarted,
            seen: HashSet::new(),
        }
    }

    /// Walk from an already resolved directory entry, using the filesystem
    /// recorded in its metadata. Paths are reported relative to it.
    pub fn from_entry(entry: DirEntry, visitor: F) -> Self {
        let fs = entry
            .meta
            .fs()
            .cloned()
            .unwrap_or_else(|| Arc::new(NoOpFs) as Arc<dyn Filesystem>);
        Self {
            fs,
            root: String::new(),
            start: Some(entry),
            visitor,
            state: WalkState::Unstarted,
            seen: HashSet::new(),
        }
    }

    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Run the walk.
    ///
    /// # Panics
    ///
    /// A `Walkway` walks once; calling this again is a programming error.
    pub async fn walk(&mut self) -> FsResult<()> {
        if self.state != WalkState::Unstarted {
            panic!("this walkway is already walked");
        }
        self.state = WalkState::Walking;
        let result = self.run().await;
        self.state = WalkState::Done;
        result
    }

    async fn run(&mut self) -> FsResult<()> {
        let caps = self.fs.capabilities();
        if !caps.list {
            return Ok(());
        }

        let root_path = self.root.clone();
        let root = match self.start.take() {
            Some(entry) => entry,
            None => {
                let found = if caps.symlink_aware {
                    self.fs.lstat(&root_path).await
                } else {
                    self.fs.stat(&root_path).await
                };
                match found {
                    Ok(entry) => entry,
                    Err(error) => {
                        (self.visitor)(WalkEvent::Error {
                            path: &root_path,
                            entry: None,
                            error,
                        })?;
                        return Ok(());
                    }
                }
            }
        };

        if root.kind == DirEntryKind::File {
            (self.visitor)(WalkEvent::Error {
                path: &root_path,
                entry: Some(&root),
                error: FsError::NotADirectory(format!("{root_path}: file to walk must be a directory")),
            })?;
            return Ok(());
        }

        // Children are pushed in reverse so they pop in listing order.
        let mut stack = vec![(String::new(), root)];
        while let Some((path, entry)) = stack.pop() {
            let (entry, is_link) = match resolve_symlink(entry).await {
                Ok(resolved) => resolved,
                Err((entry, error)) => {
                    (self.visitor)(WalkEvent::Error {
                        path: &path,
                        entry: Some(&entry),
                        error,
                    })?;
                    continue;
                }
            };

            let real = entry.meta.filename().map(Path::to_path_buf);
            if entry.is_dir() && is_link {
                if let Some(real) = &real {
                    if self.seen.contains(real) {
                        debug!(path = %path, real = %real.display(), "skipping symlink cycle");
                        continue;
                    }
                }
            }

            let visit = (self.visitor)(WalkEvent::Entry {
                path: &path,
                entry: &entry,
            })?;
            if !entry.is_dir() || visit == Visit::SkipDir {
                continue;
            }

            if let Some(real) = &real {
                if real.as_path() == Path::new(EXCLUDED_DIR) {
                    continue;
                }
                self.mark_seen(real).await;
            }

            let mut children = match read_children(&entry).await {
                Ok(children) => children,
                Err(error) => {
                    (self.visitor)(WalkEvent::Error {
                        path: &path,
                        entry: Some(&entry),
                        error,
                    })?;
                    continue;
                }
            };

            if !entry.meta.is_ordered() {
                children.sort_by(|a, b| a.name.cmp(&b.name));
            }

            for child in children.into_iter().rev() {
                let child_path = paths::join(&path, &child.name);
                stack.push((child_path, child));
            }
        }

        Ok(())
    }

    /// Record a directory as walked under its canonical real path.
    async fn mark_seen(&mut self, real: &Path) {
        let canonical = tokio::fs::canonicalize(real)
            .await
            .unwrap_or_else(|_| real.to_path_buf());
        self.seen.insert(canonical);
    }
}

async fn read_children(entry: &DirEntry) -> FsResult<Vec<DirEntry>> {
    let mut dir = entry.meta.open().await?;
    dir.read_dir().await
}

/// Replace a symlink entry with its target's metadata. The returned flag is
/// true when a link was followed.
async fn resolve_symlink(entry: DirEntry) -> Result<(DirEntry, bool), (DirEntry, FsError)> {
    if !entry.is_symlink() {
        return Ok((entry, false));
    }

    // Links only come from real directories, which always record a filename.
    let Some(filename) = entry.meta.filename().map(Path::to_path_buf) else {
        return Ok((entry, false));
    };

    let link = match tokio::fs::canonicalize(&filename).await {
        Ok(link) => link,
        Err(e) => return Err((entry, FsError::io("resolve", &filename, e))),
    };
    let target = match tokio::fs::metadata(&link).await {
        Ok(target) => target,
        Err(e) => return Err((entry, FsError::io("stat", &link, e))),
    };

    let mut resolved = entry;
    resolved.kind = if target.is_dir() {
        DirEntryKind::Directory
    } else {
        DirEntryKind::File
    };
    resolved.size = if target.is_dir() { 0 } else { target.len() };
    resolved.modified = target.modified().ok();
    resolved.meta.set_filename(link);
    Ok((resolved, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::{LocalFs, RootMapping, RootMappingFs};

    async fn collect(fs: Arc<dyn Filesystem>, root: &str) -> Vec<String> {
        let mut names = Vec::new();
        let mut w = Walkway::new(fs, root, |event| match event {
            WalkEvent::Entry { path, entry } => {
                if !entry.is_dir() {
                    names.push(path.to_string());
                }
                Ok(Visit::Continue)
            }
            WalkEvent::Error { error, .. } => Err(error),
        });
        w.walk().await.unwrap();
        assert_eq!(w.state(), WalkState::Done);
        drop(w);
        names
    }

    #[tokio::test]
    async fn walks_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["b.txt", "a.txt", "c.txt"] {
            std::fs::write(dir.path().join(f), "content").unwrap();
        }
        let names = collect(Arc::new(LocalFs::new(dir.path())), "").await;
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn root_mapping_order_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        for d in ["a/b", "c/d", "e/f"] {
            std::fs::create_dir_all(dir.path().join(d)).unwrap();
            std::fs::write(dir.path().join(d).join("test.txt"), "some content").unwrap();
        }
        let rfs = RootMappingFs::new([
            RootMapping::new("static/b", dir.path().join("e/f")),
            RootMapping::new("static/a", dir.path().join("c/d")),
            RootMapping::new("static/c", dir.path().join("a/b")),
        ])
        .await
        .unwrap();

        let mut filenames = Vec::new();
        let mut w = Walkway::new(Arc::new(rfs), "", |event| {
            if let WalkEvent::Entry { entry, .. } = event {
                if entry.is_file() {
                    let f = entry.meta.filename().unwrap();
                    filenames.push(f.strip_prefix(dir.path()).unwrap().to_path_buf());
                }
            }
            Ok(Visit::Continue)
        });
        w.walk().await.unwrap();
        drop(w);

        let expected: Vec<PathBuf> = ["e/f/test.txt", "c/d/test.txt", "a/b/test.txt"]
            .iter()
            .map(PathBuf::from)
            .collect();
        assert_eq!(filenames, expected);
    }

    #[tokio::test]
    async fn skip_dir_prunes_subtree() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("drafts")).unwrap();
        std::fs::write(dir.path().join("drafts/x.md"), "").unwrap();
        std::fs::write(dir.path().join("post.md"), "").unwrap();

        let mut seen = Vec::new();
        let mut w = Walkway::new(Arc::new(LocalFs::new(dir.path())), "", |event| match event {
            WalkEvent::Entry { path, entry } => {
                seen.push(path.to_string());
                if entry.is_dir() && entry.name == "drafts" {
                    return Ok(Visit::SkipDir);
                }
                Ok(Visit::Continue)
            }
            WalkEvent::Error { error, .. } => Err(error),
        });
        w.walk().await.unwrap();
        drop(w);
        assert_eq!(seen, ["", "drafts", "post.md"]);
    }

    #[tokio::test]
    async fn missing_root_is_reported_to_the_visitor() {
        let dir = tempfile::tempdir().unwrap();
        let mut errors = 0;
        let mut w = Walkway::new(Arc::new(LocalFs::new(dir.path())), "nope", |event| {
            if let WalkEvent::Error { error, .. } = event {
                assert!(error.is_not_found());
                errors += 1;
            }
            Ok(Visit::Continue)
        });
        w.walk().await.unwrap();
        drop(w);
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn visitor_errors_abort() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let mut w = Walkway::new(Arc::new(LocalFs::new(dir.path())), "", |event| match event {
            WalkEvent::Entry { entry, .. } if entry.is_file() => {
                Err(FsError::PermissionDenied("stop".into()))
            }
            _ => Ok(Visit::Continue),
        });
        assert!(matches!(w.walk().await, Err(FsError::PermissionDenied(_))));
    }

    #[tokio::test]
    async fn noop_walk_does_nothing() {
        let mut calls = 0;
        let mut w = Walkway::new(Arc::new(NoOpFs), "", |_| {
            calls += 1;
            Ok(Visit::Continue)
        });
        w.walk().await.unwrap();
        drop(w);
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    #[should_panic(expected = "already walked")]
    async fn walking_twice_panics() {
        let mut w = Walkway::new(Arc::new(NoOpFs), "", |_| Ok(Visit::Continue));
        w.walk().await.unwrap();
        let _ = w.walk().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlink_cycles_are_pruned() {
        use std::os::unix::fs::symlink;

        let work = tempfile::tempdir().unwrap();
        let work_dir = work.path().canonicalize().unwrap();
        let blog_real = work_dir.join("blog/real");
        let docs = work_dir.join("docs");
        std::fs::create_dir_all(&blog_real).unwrap();
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(blog_real.join("a.txt"), "content").unwrap();
        std::fs::write(docs.join("b.txt"), "content").unwrap();
        symlink("real", work_dir.join("blog/symlinked")).unwrap();
        symlink("../real", blog_real.join("cyclic")).unwrap();
        symlink("../blog/real/cyclic", docs.join("docsreal")).unwrap();

        let names = collect(Arc::new(LocalFs::new(&work_dir)), "").await;
        assert_eq!(names, ["blog/real/a.txt", "docs/b.txt"]);

        // From docs alone the link is not a cycle yet.
        let names = collect(Arc::new(LocalFs::new(&docs)), "").await;
        assert_eq!(names, ["b.txt", "docsreal/a.txt"]);
    }
}

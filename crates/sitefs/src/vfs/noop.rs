//! Empty filesystem used for categories with no mounts.

use async_trait::async_trait;

use super::meta::DirEntry;
use super::traits::{Capabilities, File, Filesystem};
use crate::error::{FsError, FsResult};
use crate::paths;

/// A filesystem containing only an empty root directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpFs;

#[async_trait]
impl Filesystem for NoOpFs {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn capabilities(&self) -> Capabilities {
        // Nothing to list; walkers stop before opening the root.
        Capabilities {
            list: false,
            ..Capabilities::read_only()
        }
    }

    async fn stat(&self, path: &str) -> FsResult<DirEntry> {
        if paths::clean(path).is_empty() {
            Ok(DirEntry::directory(""))
        } else {
            Err(FsError::not_found(path))
        }
    }

    async fn open(&self, path: &str) -> FsResult<File> {
        self.stat(path).await?;
        Ok(File::dir("", async { Ok(Vec::new()) }))
    }
}

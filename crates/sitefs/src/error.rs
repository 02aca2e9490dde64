//! Error types shared by every sitefs filesystem.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type FsResult<T> = Result<T, FsError>;

/// Filesystem operation errors.
///
/// `NotFound` is the expected, recoverable outcome of probing a path that no
/// layer provides. `AmbiguousMapping` and `InvalidMapping` are integrity
/// faults in the registered roots and should abort the build.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("ambiguous root mapping for {path:?}: {candidates:?}")]
    AmbiguousMapping {
        path: String,
        candidates: Vec<String>,
    },
    #[error("invalid root mapping {from:?} -> {to:?}: {reason}")]
    InvalidMapping {
        from: String,
        to: String,
        reason: String,
    },
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("{op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Create a `NotFound` error for a path.
    pub fn not_found(path: impl AsRef<str>) -> Self {
        FsError::NotFound(path.as_ref().to_string())
    }

    /// Create a `PermissionDenied` error for a path.
    pub fn read_only(path: impl AsRef<str>) -> Self {
        FsError::PermissionDenied(format!("{}: filesystem is read-only", path.as_ref()))
    }

    /// Wrap an I/O error with the operation and real path it came from.
    ///
    /// I/O kinds that belong to the taxonomy (missing files, permissions,
    /// existing targets) are mapped onto the matching variant so callers can
    /// probe-and-fallback without inspecting `io::ErrorKind`.
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => {
                FsError::PermissionDenied(format!("{op} {}: {source}", path.display()))
            }
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path.display().to_string()),
            io::ErrorKind::IsADirectory => FsError::IsADirectory(path.display().to_string()),
            io::ErrorKind::NotADirectory => FsError::NotADirectory(path.display().to_string()),
            _ => FsError::Io { op, path, source },
        }
    }

    /// True for the expected "no layer has this path" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound(_))
    }

    /// True when the path does not exist in this layer: missing outright, or
    /// reached through a file (`ENOTDIR`). Layered lookups fall through on it.
    pub fn is_absent(&self) -> bool {
        matches!(self, FsError::NotFound(_) | FsError::NotADirectory(_))
    }

    /// True for configuration-integrity faults that must not be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FsError::AmbiguousMapping { .. } | FsError::InvalidMapping { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let err = FsError::io(
            "stat",
            "/nope",
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(err.is_not_found());
        assert!(!err.is_fatal());
    }

    #[test]
    fn paths_through_a_file_are_absent() {
        let err = FsError::io(
            "stat",
            "/site/layouts/partials/x.html",
            io::Error::from(io::ErrorKind::NotADirectory),
        );
        assert!(matches!(err, FsError::NotADirectory(_)));
        assert!(err.is_absent());
        assert!(!err.is_not_found());
        assert!(!FsError::read_only("x").is_absent());
    }

    #[test]
    fn other_io_errors_keep_their_source() {
        let err = FsError::io("open", "/x", io::Error::other("disk on fire"));
        match err {
            FsError::Io { op, path, source } => {
                assert_eq!(op, "open");
                assert_eq!(path, PathBuf::from("/x"));
                assert_eq!(source.to_string(), "disk on fire");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn ambiguous_mapping_is_fatal() {
        let err = FsError::AmbiguousMapping {
            path: "content/blog".into(),
            candidates: vec!["content/blog".into(), "content/blo".into()],
        };
        assert!(err.is_fatal());
        assert!(err.to_string().contains("content/blog"));
    }
}

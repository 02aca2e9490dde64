//! sitefs: layered virtual filesystems for site sources.
//!
//! This crate provides:
//!
//! - **vfs**: root mappings, language-weighted overlays, copy-on-write
//!   layer folding and the decorated entries they all share
//! - **walk**: a symlink-safe tree walker over any of them
//! - **basefs**: the eight named views of a site (content, data, i18n,
//!   layouts, archetypes, assets, resources, static)
//! - **config** / **mounts**: site configuration and the mount descriptors
//!   derived from it

pub mod basefs;
pub mod config;
pub mod error;
pub mod mounts;
pub mod paths;
pub mod vfs;
pub mod walk;

pub use basefs::{BaseFs, SourceFilesystem, SourceFilesystems, WatchDir};
pub use config::SiteConfig;
pub use error::{FsError, FsResult};
pub use mounts::{Mount, MountsDescriptor};
pub use walk::{Visit, WalkEvent, WalkState, Walkway};

//! Virtual filesystems for site sources.
//!
//! The building blocks, leaf first:
//!
//! - **LocalFs**: a real directory tree
//! - **RootMappingFs**: maps virtual prefixes (`content/blog`) to real roots
//! - **DirDecoratorFs**: tags one mount's directories with its attributes
//! - **WeightedFs**: ordered overlay of mount roots with duplicate resolution
//! - **CowFs**: folds project and theme mappings into one composite
//! - **SubViewFs**: a path-scoped view of a composite (`layouts/…`)
//! - **NoOpFs**: the empty filesystem
//!
//! # Design
//!
//! ```text
//! CowFs ── project RootMappingFs ── LocalFs per mount
//!      └── theme RootMappingFs   ── LocalFs per mount
//!
//! content view = WeightedFs(Dirs("content") from every RootMappingFs)
//! layouts view = SubViewFs(CowFs, "layouts")
//! ```
//!
//! Every entry carries a [`FileMeta`] recording its real filename, its path
//! relative to its category, its language and an opener. Directories reopen
//! through the outermost filesystem that produced them, so walking a view
//! keeps merging layers all the way down.

mod decorate;
mod local;
mod meta;
mod noop;
mod overlay;
mod rootmapping;
mod traits;
mod view;
mod weighted;

pub use decorate::DirDecoratorFs;
pub use local::LocalFs;
pub use meta::{Decoration, DirEntry, DirEntryKind, FileMeta, Opener};
pub use noop::NoOpFs;
pub use overlay::CowFs;
pub use rootmapping::{Category, RootMapping, RootMappingFs};
pub use traits::{Capabilities, File, Filesystem, ListFuture, ReadStream};
pub use view::SubViewFs;
pub use weighted::{MergePolicy, WeightedFs};

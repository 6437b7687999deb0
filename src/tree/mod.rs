//! In-memory tree model.
//!
//! This module provides:
//! - `entry`: `FileEntry`, `Listing`, natural sibling ordering and `Space`
//! - `walker`: recursive filesystem walker producing listings
//! - `store`: the lock-guarded `TreeState` container with path-addressed ranges
//! - `diff`: keep/delete/insert edit scripts between two listings

pub mod diff;
pub mod entry;
pub mod store;
pub mod walker;

pub use diff::{apply, diff, UpdateOp};
pub use entry::{is_valid_listing, natural_cmp, sibling_order, FileEntry, Listing, Space};
pub use store::{slice_in, TreeError, TreeState};
pub use walker::{EntryKind, FileSystem, LocalFs, Stat, Walker};

use std::borrow::Cow;
use std::path::{Component, Path};

/// Normal components of a relative path.
///
/// Names that are not valid UTF-8 never appear in a listing, so converting
/// them lossily only means they will not match anything.
pub fn path_parts(rel: &Path) -> Vec<Cow<'_, str>> {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect()
}

/// True if every component of `rel` is valid UTF-8 and none is hidden.
pub(crate) fn is_visible_path(rel: &Path) -> bool {
    rel.components().all(|c| match c {
        Component::Normal(part) => part.to_str().is_some_and(|s| !s.starts_with('.')),
        _ => true,
    })
}

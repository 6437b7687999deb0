//! Lock-guarded tree state with path-addressed ranges.
//!
//! `TreeState` holds the canonical [`Listing`] and the last [`Space`]
//! reading. Every operation takes the lock once, so slice-then-mutate
//! sequences are atomic with respect to readers and never interleave with
//! other mutations.

use crate::tree::entry::{sibling_order, FileEntry, Listing, Space};
use crate::tree::path_parts;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::ops::Range;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Structural errors raised by the tree container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error("parent folder is missing for {path}")]
    MissingParent { path: PathBuf },

    #[error("edit script consumed {consumed} of {expected} entries")]
    ScriptMismatch { expected: usize, consumed: usize },
}

/// Statistics about mutations applied to the tree.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TreeStats {
    /// Wholesale listing replacements.
    pub root_swaps: u64,
    /// Ranges replaced with fresh entries.
    pub range_replacements: u64,
    /// Ranges removed.
    pub range_deletions: u64,
}

#[derive(Debug, Default)]
struct TreeInner {
    listing: Listing,
    space: Space,
    stats: TreeStats,
}

/// The single current listing and space record.
///
/// Created empty; the first full walk installs the root at index 0.
#[derive(Debug, Default)]
pub struct TreeState {
    inner: RwLock<TreeInner>,
}

impl TreeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn space(&self) -> Space {
        self.inner.read().space
    }

    pub fn set_space(&self, space: Space) {
        self.inner.write().space = space;
    }

    /// Snapshot copy of the whole listing.
    pub fn root_listing(&self) -> Listing {
        self.inner.read().listing.clone()
    }

    pub fn set_root_listing(&self, listing: Listing) {
        self.swap_root_listing(listing);
    }

    /// Install `listing` and return the one it replaced.
    pub fn swap_root_listing(&self, listing: Listing) -> Listing {
        let mut inner = self.inner.write();
        inner.stats.root_swaps += 1;
        std::mem::replace(&mut inner.listing, listing)
    }

    /// Aggregated size of the root entry, if a walk has completed.
    pub fn root_size(&self) -> Option<u64> {
        self.inner.read().listing.first().map(|root| root.size)
    }

    pub fn len(&self) -> usize {
        self.inner.read().listing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().listing.is_empty()
    }

    pub fn stats(&self) -> TreeStats {
        self.inner.read().stats.clone()
    }

    /// Index range of `path` and its descendants in the current listing.
    ///
    /// See [`slice_in`] for the matching rules.
    pub fn slice_for(&self, path: &Path, is_file: bool) -> Range<usize> {
        slice_in(&self.inner.read().listing, &path_parts(path), is_file)
    }

    /// Copy of the entries at `path`.
    pub fn get_range(&self, path: &Path, is_file: bool) -> Listing {
        let inner = self.inner.read();
        let range = slice_in(&inner.listing, &path_parts(path), is_file);
        inner.listing[range].to_vec()
    }

    /// Replace the entries at `path` with `entries`.
    ///
    /// Refuses to insert below a parent that is not in the tree.
    pub fn replace_range(
        &self,
        path: &Path,
        is_file: bool,
        entries: Listing,
    ) -> Result<(), TreeError> {
        let mut inner = self.inner.write();
        replace_in(&mut inner.listing, path, is_file, entries)?;
        inner.stats.range_replacements += 1;
        Ok(())
    }

    /// Remove `path` and its descendants. Returns the number of entries removed.
    pub fn delete_range(&self, path: &Path) -> usize {
        let mut inner = self.inner.write();
        let range = slice_in(&inner.listing, &path_parts(path), false);
        let removed = range.len();
        if removed > 0 {
            inner.listing.drain(range);
            inner.stats.range_deletions += 1;
        }
        removed
    }

    /// Bring the range at `path` in line with a fresh walk of that path.
    ///
    /// An empty `fresh` listing deletes the path. The directories above it
    /// get their aggregates recomputed from their children; their mtimes only
    /// move forward, so a deletion leaves them as they were until the next
    /// full walk. Returns `false` when the stored range already equals
    /// `fresh`.
    pub fn update_path(&self, path: &Path, fresh: Listing) -> Result<bool, TreeError> {
        let parts = path_parts(path);
        let is_file = fresh.first().is_some_and(|e| e.isfile);
        let mut inner = self.inner.write();
        let range = slice_in(&inner.listing, &parts, is_file);

        if inner.listing[range.clone()] == fresh[..] {
            return Ok(false);
        }
        if fresh.is_empty() {
            inner.listing.drain(range);
            inner.stats.range_deletions += 1;
        } else {
            replace_in(&mut inner.listing, path, is_file, fresh)?;
            inner.stats.range_replacements += 1;
        }
        refresh_ancestors(&mut inner.listing, &parts);
        Ok(true)
    }

    /// Get a summary of the tree for debugging.
    pub fn debug_summary(&self) -> String {
        let inner = self.inner.read();
        format!(
            "TreeState: {} entries, {} bytes tracked, stats: {:?}",
            inner.listing.len(),
            inner.listing.first().map_or(0, |root| root.size),
            inner.stats
        )
    }
}

fn replace_in(
    listing: &mut Listing,
    path: &Path,
    is_file: bool,
    entries: Listing,
) -> Result<(), TreeError> {
    let parts = path_parts(path);
    if let Some((_, parent)) = parts.split_last() {
        if slice_in(listing, parent, false).is_empty() {
            return Err(TreeError::MissingParent {
                path: path.to_path_buf(),
            });
        }
    }
    let range = slice_in(listing, &parts, is_file);
    listing.splice(range, entries);
    Ok(())
}

/// Recompute size and mtime of every directory above `parts`, deepest first.
fn refresh_ancestors<S: AsRef<str>>(listing: &mut Listing, parts: &[S]) {
    for depth in (0..parts.len()).rev() {
        let range = slice_in(listing, &parts[..depth], false);
        if range.is_empty() || listing[range.start].isfile {
            continue;
        }

        let dir = &listing[range.start];
        let child_level = dir.level + 1;
        let (size, mtime) = listing[range.start + 1..range.end]
            .iter()
            .filter(|e| e.level == child_level)
            .fold((0, dir.mtime), |(size, mtime), e| {
                (size + e.size, mtime.max(e.mtime))
            });

        let dir = &mut listing[range.start];
        dir.size = size;
        dir.mtime = mtime;
    }
}

/// Locate `parts` in `listing`.
///
/// Walks level by level: at each component the siblings of the current
/// subtree are scanned in order until the name matches, a sibling sorting
/// after the target is reached, or the subtree ends. Intermediate components
/// only match directories. For the last component an entry of the hinted
/// kind wins, with a same-named entry of the other kind as fallback.
///
/// The empty path covers the whole listing. A missing path yields the empty
/// range at which its entries would be inserted.
pub fn slice_in<S: AsRef<str>>(listing: &[FileEntry], parts: &[S], is_file: bool) -> Range<usize> {
    if parts.is_empty() {
        return 0..listing.len();
    }

    let mut begin = listing.len().min(1);
    let mut end = listing.len();
    for (depth, part) in parts.iter().enumerate() {
        let level = depth as u32 + 1;
        let last = depth + 1 == parts.len();
        let want_file = last && is_file;

        match find_sibling(&listing[begin..end], level, part.as_ref(), want_file, last) {
            Ok(offset) => {
                begin += offset;
                end = subtree_end(listing, begin);
                if !last {
                    begin += 1;
                }
            }
            Err(offset) => {
                let at = begin + offset;
                return at..at;
            }
        }
    }
    begin..end
}

/// `Ok(offset)` of the matching sibling, or `Err(offset)` where it would go.
fn find_sibling(
    entries: &[FileEntry],
    level: u32,
    name: &str,
    want_file: bool,
    any_kind: bool,
) -> Result<usize, usize> {
    let mut fallback = None;
    for (i, entry) in entries.iter().enumerate() {
        if entry.level < level {
            return fallback.ok_or(i);
        }
        if entry.level > level {
            continue;
        }
        if entry.name == name {
            if entry.isfile == want_file {
                return Ok(i);
            }
            if any_kind && fallback.is_none() {
                fallback = Some(i);
            }
            continue;
        }
        if sibling_order(&entry.name, entry.isfile, name, want_file) == Ordering::Greater {
            return fallback.ok_or(i);
        }
    }
    fallback.ok_or(entries.len())
}

fn subtree_end(listing: &[FileEntry], index: usize) -> usize {
    let level = listing[index].level;
    listing[index + 1..]
        .iter()
        .position(|e| e.level <= level)
        .map_or(listing.len(), |offset| index + 1 + offset)
}

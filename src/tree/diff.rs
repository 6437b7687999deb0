//! Edit scripts between two listings.
//!
//! [`diff`] is a greedy left-to-right containment scan, not a minimal edit
//! distance: it is linear when changes are localized (one file added, removed
//! or modified), which is what a filesystem watcher sees almost all the time.

use crate::tree::entry::{FileEntry, Listing};
use crate::tree::store::TreeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One step of an edit script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOp {
    /// Copy the next `n` entries of the old listing.
    #[serde(rename = "keep")]
    Keep(usize),
    /// Skip the next `n` entries of the old listing.
    #[serde(rename = "del")]
    Delete(usize),
    /// Splice in new entries.
    #[serde(rename = "ins")]
    Insert(Vec<FileEntry>),
}

/// Multiset of the entries remaining after a cursor.
struct Remaining<'a> {
    counts: HashMap<&'a FileEntry, usize>,
}

impl<'a> Remaining<'a> {
    fn new(entries: &'a [FileEntry]) -> Self {
        let mut counts = HashMap::with_capacity(entries.len());
        for entry in entries {
            *counts.entry(entry).or_insert(0) += 1;
        }
        Self { counts }
    }

    fn contains(&self, entry: &FileEntry) -> bool {
        self.counts.get(entry).is_some_and(|&n| n > 0)
    }

    fn take(&mut self, entry: &FileEntry) {
        if let Some(n) = self.counts.get_mut(entry) {
            *n = n.saturating_sub(1);
        }
    }
}

fn push_delete(ops: &mut Vec<UpdateOp>, count: usize) {
    match ops.last_mut() {
        Some(UpdateOp::Delete(n)) => *n += count,
        _ => ops.push(UpdateOp::Delete(count)),
    }
}

fn flush_keep(ops: &mut Vec<UpdateOp>, keep: &mut usize) {
    if *keep > 0 {
        ops.push(UpdateOp::Keep(*keep));
        *keep = 0;
    }
}

/// Edit script turning `old` into `new`.
///
/// Equal heads are kept. Otherwise the run of old entries that never
/// reappear in the rest of `new` is deleted; failing that, the run of new
/// entries absent from the rest of `old` is inserted. When both heads do
/// reappear later (entries swapped places) one old entry is deleted so the
/// scan always advances.
pub fn diff(old: &[FileEntry], new: &[FileEntry]) -> Vec<UpdateOp> {
    let mut ops = Vec::new();
    let mut old_rest = Remaining::new(old);
    let mut new_rest = Remaining::new(new);
    let (mut oidx, mut nidx, mut keep) = (0, 0, 0);

    while oidx < old.len() && nidx < new.len() {
        if old[oidx] == new[nidx] {
            old_rest.take(&old[oidx]);
            new_rest.take(&new[nidx]);
            keep += 1;
            oidx += 1;
            nidx += 1;
            continue;
        }
        flush_keep(&mut ops, &mut keep);

        let start = oidx;
        while oidx < old.len() && !new_rest.contains(&old[oidx]) {
            old_rest.take(&old[oidx]);
            oidx += 1;
        }
        if oidx > start {
            push_delete(&mut ops, oidx - start);
            continue;
        }

        let start = nidx;
        while nidx < new.len() && !old_rest.contains(&new[nidx]) {
            new_rest.take(&new[nidx]);
            nidx += 1;
        }
        if nidx > start {
            ops.push(UpdateOp::Insert(new[start..nidx].to_vec()));
            continue;
        }

        old_rest.take(&old[oidx]);
        oidx += 1;
        push_delete(&mut ops, 1);
    }

    flush_keep(&mut ops, &mut keep);
    if oidx < old.len() {
        push_delete(&mut ops, old.len() - oidx);
    } else if nidx < new.len() {
        ops.push(UpdateOp::Insert(new[nidx..].to_vec()));
    }
    ops
}

/// Apply an edit script to `old`.
///
/// The script must account for every entry of `old` exactly once.
pub fn apply(old: &[FileEntry], ops: &[UpdateOp]) -> Result<Listing, TreeError> {
    let mut out = Vec::with_capacity(old.len());
    let mut cursor = 0;

    for op in ops {
        match op {
            UpdateOp::Keep(n) | UpdateOp::Delete(n) => {
                let end = cursor + n;
                if end > old.len() {
                    return Err(TreeError::ScriptMismatch {
                        expected: old.len(),
                        consumed: end,
                    });
                }
                if let UpdateOp::Keep(_) = op {
                    out.extend_from_slice(&old[cursor..end]);
                }
                cursor = end;
            }
            UpdateOp::Insert(items) => out.extend(items.iter().cloned()),
        }
    }

    if cursor != old.len() {
        return Err(TreeError::ScriptMismatch {
            expected: old.len(),
            consumed: cursor,
        });
    }
    Ok(out)
}

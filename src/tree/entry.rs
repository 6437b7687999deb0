//! Listing entries, sibling ordering and disk-space records.
//!
//! A [`Listing`] is a depth-first pre-order serialization of a directory
//! tree: every directory is immediately followed by all of its descendants,
//! and siblings appear in [`sibling_order`].

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One file or directory in a [`Listing`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileEntry {
    /// Depth in the tree; the root is 0.
    pub level: u32,
    /// Basename of the entry (empty for the root).
    pub name: String,
    /// Opaque fingerprint of the on-disk file identity.
    pub key: String,
    /// Unix seconds. For directories, the max over the whole subtree.
    pub mtime: i64,
    /// Bytes. For directories, the sum of all descendant file sizes.
    pub size: u64,
    /// Regular file (`1` on the wire) or directory (`0`).
    #[serde(with = "flag")]
    pub isfile: bool,
}

/// Ordered pre-order sequence of entries describing a whole subtree.
pub type Listing = Vec<FileEntry>;

impl FileEntry {
    /// Compare two siblings by [`sibling_order`].
    pub fn sibling_cmp(&self, other: &FileEntry) -> Ordering {
        sibling_order(&self.name, self.isfile, &other.name, other.isfile)
    }
}

/// Total order used among entries sharing a parent.
///
/// Natural, case-insensitive order on the name first. Files and directories
/// are interleaved; only when two names compare equal does a directory sort
/// before a file, and raw byte order breaks any remaining tie.
pub fn sibling_order(a: &str, a_isfile: bool, b: &str, b_isfile: bool) -> Ordering {
    natural_cmp(a, b)
        .then(a_isfile.cmp(&b_isfile))
        .then_with(|| a.cmp(b))
}

/// Case-insensitive comparison that orders embedded digit runs numerically.
///
/// `file2` sorts before `file10`; `Readme` and `readme` compare equal.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = chunks(a);
    let mut right = chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => match chunk_cmp(x, y) {
                Ordering::Equal => continue,
                ord => return ord,
            },
        }
    }
}

/// Split into alternating runs of ASCII digits and everything else.
fn chunks(s: &str) -> impl Iterator<Item = &str> {
    let mut rest = s;
    std::iter::from_fn(move || {
        let digit = rest.chars().next()?.is_ascii_digit();
        let end = rest
            .find(|c: char| c.is_ascii_digit() != digit)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        rest = tail;
        Some(chunk)
    })
}

fn is_digits(chunk: &str) -> bool {
    chunk.starts_with(|c: char| c.is_ascii_digit())
}

fn chunk_cmp(x: &str, y: &str) -> Ordering {
    match (is_digits(x), is_digits(y)) {
        (true, true) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x
            .chars()
            .flat_map(char::to_lowercase)
            .cmp(y.chars().flat_map(char::to_lowercase)),
    }
}

/// Check the pre-order invariant: only the first entry sits at level 0 and
/// no entry is more than one level deeper than its predecessor.
pub fn is_valid_listing(listing: &[FileEntry]) -> bool {
    let Some(first) = listing.first() else {
        return true;
    };
    let mut prev = first.level;
    for entry in &listing[1..] {
        if entry.level == 0 || entry.level > prev + 1 {
            return false;
        }
        prev = entry.level;
    }
    true
}

/// Disk-space reading for the filesystem holding the watched root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Space {
    pub total: u64,
    pub used: u64,
    pub free: u64,
    /// Aggregated size of the watched tree (the root entry's size).
    pub storage: u64,
}

impl Space {
    /// True if any field moved by strictly more than `tolerance` bytes.
    pub fn differs_by_more_than(&self, other: &Space, tolerance: u64) -> bool {
        self.total.abs_diff(other.total) > tolerance
            || self.used.abs_diff(other.used) > tolerance
            || self.free.abs_diff(other.free) > tolerance
            || self.storage.abs_diff(other.storage) > tolerance
    }
}

/// `bool` carried as the integer `0`/`1`.
mod flag {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        match u8::deserialize(deserializer)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(D::Error::custom(format!("invalid isfile flag {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: u32, name: &str, isfile: bool) -> FileEntry {
        FileEntry {
            level,
            name: name.to_string(),
            key: String::new(),
            mtime: 0,
            size: 0,
            isfile,
        }
    }

    #[test]
    fn test_natural_order_numbers() {
        let mut names = vec!["file2", "file10", "file1"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["file1", "file2", "file10"]);
    }

    #[test]
    fn test_natural_order_case_insensitive() {
        assert_eq!(natural_cmp("Beta", "alpha"), Ordering::Greater);
        assert_eq!(natural_cmp("README", "readme"), Ordering::Equal);
        assert_eq!(natural_cmp("img007", "img7"), Ordering::Equal);
        assert_eq!(natural_cmp("a", "a1"), Ordering::Less);
    }

    #[test]
    fn test_sibling_order_interleaves_files_and_dirs() {
        let mut siblings = vec![
            entry(1, "zeta", false),
            entry(1, "beta.txt", true),
            entry(1, "alpha", false),
        ];
        siblings.sort_by(FileEntry::sibling_cmp);
        let names: Vec<_> = siblings.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta.txt", "zeta"]);

        // Same name: directory first.
        assert_eq!(sibling_order("x", false, "x", true), Ordering::Less);
        // Natural tie broken by raw bytes so the order stays total.
        assert_eq!(sibling_order("A", true, "a", true), Ordering::Less);
    }

    #[test]
    fn test_listing_validity() {
        let good = vec![
            entry(0, "", false),
            entry(1, "a", false),
            entry(2, "b", true),
            entry(1, "c", true),
        ];
        assert!(is_valid_listing(&good));
        assert!(is_valid_listing(&[]));

        let jump = vec![entry(0, "", false), entry(2, "deep", true)];
        assert!(!is_valid_listing(&jump));

        let second_root = vec![entry(0, "", false), entry(0, "", false)];
        assert!(!is_valid_listing(&second_root));
    }

    #[test]
    fn test_space_tolerance() {
        const MB: u64 = 1 << 20;
        let base = Space {
            total: 100 * MB,
            used: 40 * MB,
            free: 60 * MB,
            storage: 5 * MB,
        };

        let small = Space {
            used: base.used + MB - 1,
            free: base.free - MB + 1,
            ..base
        };
        assert!(!small.differs_by_more_than(&base, MB));

        let big = Space {
            storage: base.storage + MB + 1,
            ..base
        };
        assert!(big.differs_by_more_than(&base, MB));
    }

    #[test]
    fn test_entry_wire_shape() {
        let file = FileEntry {
            level: 2,
            name: "b.txt".to_string(),
            key: "1f".to_string(),
            mtime: 1_700_000_000,
            size: 3,
            isfile: true,
        };
        let json = serde_json::to_value(&file).unwrap();
        assert_eq!(json["isfile"], 1);
        assert_eq!(json["level"], 2);
        assert_eq!(json["size"], 3);

        let back: FileEntry = serde_json::from_value(json).unwrap();
        assert_eq!(back, file);

        let bad = serde_json::json!({
            "level": 1, "name": "x", "key": "", "mtime": 0, "size": 0, "isfile": 7
        });
        assert!(serde_json::from_value::<FileEntry>(bad).is_err());
    }
}

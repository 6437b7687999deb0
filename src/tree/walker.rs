//! Recursive directory walker producing [`Listing`]s.
//!
//! The walker reads the filesystem through the [`FileSystem`] trait so the
//! stat-classify-recurse-fold step can run against an in-memory tree in tests.
//! Filesystem races (entries vanishing mid-walk, permission errors on one
//! directory) degrade the result instead of failing the walk.

use crate::tree::entry::{sibling_order, FileEntry, Listing};
use crate::tree::path_parts;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// Classification of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    /// Symlinks, sockets, devices and anything else; never listed.
    Other,
}

/// The subset of stat results the walker needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub kind: EntryKind,
    pub size: u64,
    pub mtime: i64,
    pub key: String,
}

impl Stat {
    /// Build from metadata obtained without following symlinks.
    pub fn from_metadata(meta: &Metadata) -> Self {
        let file_type = meta.file_type();
        let kind = if file_type.is_file() {
            EntryKind::File
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::Other
        };
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);

        Self {
            kind,
            size: meta.len(),
            mtime,
            key: file_key(meta),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }
}

#[cfg(unix)]
fn file_key(meta: &Metadata) -> String {
    use std::os::unix::fs::MetadataExt;
    format!("{:x}", meta.ino())
}

#[cfg(not(unix))]
fn file_key(meta: &Metadata) -> String {
    meta.created()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| format!("{:x}", d.as_nanos()))
        .unwrap_or_default()
}

/// Read-only view of a filesystem.
pub trait FileSystem: Send + Sync {
    /// Stat `path` without following symlinks.
    fn stat(&self, path: &Path) -> io::Result<Stat>;

    /// Child names of a directory in iteration order. An `Err` item means
    /// iteration broke off at that point.
    fn read_dir<'a>(
        &'a self,
        path: &Path,
    ) -> io::Result<Box<dyn Iterator<Item = io::Result<OsString>> + 'a>>;
}

/// The real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

impl FileSystem for LocalFs {
    fn stat(&self, path: &Path) -> io::Result<Stat> {
        fs::symlink_metadata(path).map(|meta| Stat::from_metadata(&meta))
    }

    fn read_dir<'a>(
        &'a self,
        path: &Path,
    ) -> io::Result<Box<dyn Iterator<Item = io::Result<OsString>> + 'a>> {
        let entries = fs::read_dir(path)?;
        Ok(Box::new(entries.map(|entry| entry.map(|e| e.file_name()))))
    }
}

/// Walks subtrees below a fixed root directory.
#[derive(Debug, Clone)]
pub struct Walker<F = LocalFs> {
    fs: F,
    root: PathBuf,
}

impl Walker<LocalFs> {
    /// Walker over the real filesystem.
    pub fn local(root: impl Into<PathBuf>) -> Self {
        Self::new(LocalFs, root)
    }
}

impl<F: FileSystem> Walker<F> {
    pub fn new(fs: F, root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            root: root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Listing for the subtree at `rel` (empty path = whole tree).
    pub fn walk(&self, rel: &Path) -> Listing {
        self.walk_with(rel, None)
    }

    /// Like [`Walker::walk`], reusing a stat the caller already holds for `rel`.
    ///
    /// The returned listing starts at level `rel.components().count()`.
    /// A path that does not exist yields an empty listing.
    pub fn walk_with(&self, rel: &Path, stat: Option<Stat>) -> Listing {
        let parts = path_parts(rel);
        let name = parts.last().map(|s| s.to_string()).unwrap_or_default();
        let mut out = Vec::new();
        self.walk_into(&self.root.join(rel), name, parts.len() as u32, stat, &mut out);
        out
    }

    fn walk_into(
        &self,
        path: &Path,
        name: String,
        level: u32,
        stat: Option<Stat>,
        out: &mut Listing,
    ) {
        let stat = match stat {
            Some(stat) => stat,
            None => match self.fs.stat(path) {
                Ok(stat) => stat,
                Err(e) if e.kind() == ErrorKind::NotFound => return,
                Err(e) => {
                    tracing::warn!("Cannot stat {}: {}", path.display(), e);
                    return;
                }
            },
        };

        let isfile = match stat.kind {
            EntryKind::File => true,
            EntryKind::Dir => false,
            EntryKind::Other => return,
        };
        let index = out.len();
        out.push(FileEntry {
            level,
            name,
            key: stat.key,
            mtime: stat.mtime,
            size: if isfile { stat.size } else { 0 },
            isfile,
        });
        if isfile {
            return;
        }

        for (child_name, child_stat) in self.children(path) {
            let start = out.len();
            let child_path = path.join(&child_name);
            self.walk_into(&child_path, child_name, level + 1, Some(child_stat), out);

            if let Some(child) = out.get(start) {
                let (mtime, size) = (child.mtime, child.size);
                let dir = &mut out[index];
                dir.mtime = dir.mtime.max(mtime);
                dir.size += size;
            }
        }
    }

    /// Visible file and directory children of `dir`, in sibling order.
    fn children(&self, dir: &Path) -> Vec<(String, Stat)> {
        let names = match self.fs.read_dir(dir) {
            Ok(names) => names,
            Err(e) if e.kind() == ErrorKind::NotFound => return Vec::new(),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::debug!("Permission denied listing {}", dir.display());
                return Vec::new();
            }
            Err(e) => {
                tracing::warn!("Cannot list {}: {}", dir.display(), e);
                return Vec::new();
            }
        };

        let mut children = Vec::new();
        for name in names {
            let name = match name {
                Ok(name) => name,
                Err(e) => {
                    tracing::warn!("Listing of {} stopped early: {}", dir.display(), e);
                    break;
                }
            };
            let name = match name.into_string() {
                Ok(name) => name,
                Err(raw) => {
                    tracing::debug!("Skipping non UTF-8 name {:?} in {}", raw, dir.display());
                    continue;
                }
            };
            if name.starts_with('.') {
                continue;
            }

            match self.fs.stat(&dir.join(&name)) {
                Ok(stat) if stat.kind != EntryKind::Other => children.push((name, stat)),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!("Cannot stat {}: {}", dir.join(&name).display(), e),
            }
        }

        children.sort_by(|(a, sa), (b, sb)| sibling_order(a, sa.is_file(), b, sb.is_file()));
        children
    }
}

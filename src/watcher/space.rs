//! Disk usage of the filesystem holding the watched root.

use crate::tree::Space;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

pub(crate) struct SpaceProbe {
    root: PathBuf,
    disks: Disks,
}

impl SpaceProbe {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            disks: Disks::new_with_refreshed_list(),
        }
    }

    /// Current reading; `storage` is the tracked tree size.
    ///
    /// Falls back to zeros for the disk fields when no mount point contains
    /// the root.
    pub(crate) fn read(&mut self, storage: u64) -> Space {
        self.disks.refresh_list();
        let mounts: Vec<&Path> = self.disks.list().iter().map(|d| d.mount_point()).collect();

        match containing_mount(&self.root, &mounts) {
            Some(index) => {
                let disk = &self.disks.list()[index];
                usage(disk.total_space(), disk.available_space(), storage)
            }
            None => {
                tracing::debug!("No mount point found for {}", self.root.display());
                Space {
                    storage,
                    ..Space::default()
                }
            }
        }
    }
}

/// Index of the deepest mount point containing `root`.
fn containing_mount(root: &Path, mounts: &[&Path]) -> Option<usize> {
    mounts
        .iter()
        .enumerate()
        .filter(|(_, mount)| root.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(index, _)| index)
}

fn usage(total: u64, available: u64, storage: u64) -> Space {
    Space {
        total,
        used: total.saturating_sub(available),
        free: available,
        storage,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deepest_mount_wins() {
        let mounts = [Path::new("/"), Path::new("/srv"), Path::new("/srv/data"), Path::new("/srvx")];
        assert_eq!(containing_mount(Path::new("/srv/data/files"), &mounts), Some(2));
        assert_eq!(containing_mount(Path::new("/srv/other"), &mounts), Some(1));
        assert_eq!(containing_mount(Path::new("/home"), &mounts), Some(0));
        assert_eq!(containing_mount(Path::new("/home"), &mounts[1..]), None);
    }

    #[test]
    fn test_usage_fields() {
        let space = usage(1000, 250, 42);
        assert_eq!(space.total, 1000);
        assert_eq!(space.used, 750);
        assert_eq!(space.free, 250);
        assert_eq!(space.storage, 42);
        assert_eq!(usage(10, 20, 0).used, 0);
    }

    #[test]
    fn test_reading_reports_storage() {
        let mut disks = SpaceProbe::new(&std::env::temp_dir());
        let space = disks.read(123);
        assert_eq!(space.storage, 123);
        assert!(space.used <= space.total);
    }
}

//! OS-notification-driven watch loop.
//!
//! Raw notify events are drained in bursts, mapped to the paths they name,
//! and coalesced so each burst re-walks only the topmost changed subtrees.
//! A full re-walk still happens every `full_refresh_secs`, because low-level
//! notifications can be dropped or merged under heavy churn.

use crate::tree::is_visible_path;
use crate::watcher::runner::WatchLoop;
use crate::watcher::WatcherError;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Instant;

/// A recursive OS watch on the root plus the queue its events land in.
pub(crate) struct NotifySource {
    _watcher: RecommendedWatcher,
    pub(crate) event_rx: Receiver<Result<Event, notify::Error>>,
}

impl NotifySource {
    pub(crate) fn new(root: &Path) -> Result<Self, WatcherError> {
        let (tx, rx) = channel();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatcherError::WatchPath {
                path: root.to_path_buf(),
                source: e,
            })?;
        tracing::debug!("Using native watcher for {}", root.display());

        Ok(Self {
            _watcher: watcher,
            event_rx: rx,
        })
    }
}

pub(crate) fn run(
    ctx: &mut WatchLoop,
    events: &Receiver<Result<Event, notify::Error>>,
) -> Result<(), WatcherError> {
    let root = ctx.walker.root().to_path_buf();

    while !ctx.should_quit() {
        ctx.full_refresh()?;
        let session = Instant::now();
        let mut next_space = Instant::now();

        while !ctx.should_quit() && session.elapsed() < ctx.config.full_refresh_interval() {
            if Instant::now() >= next_space {
                ctx.refresh_space()?;
                next_space = Instant::now() + ctx.config.space_check_interval();
            }

            let first = match events.recv_timeout(ctx.config.event_wait()) {
                Ok(first) => first,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(WatcherError::EventChannelClosed),
            };

            match collect_burst(&root, std::iter::once(first).chain(events.try_iter())) {
                Burst::Resync => break,
                Burst::Paths(paths) if paths.is_empty() => {}
                Burst::Paths(paths) => {
                    tracing::debug!("Re-walking {} changed paths", paths.len());
                    ctx.update_paths(&paths)?;
                }
            }
        }
    }
    Ok(())
}

/// What one burst of notifications asks the loop to do.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Burst {
    /// Re-walk these paths, already coalesced.
    Paths(Vec<PathBuf>),
    /// Events were lost; start a new session with a full walk.
    Resync,
}

pub(crate) fn collect_burst(
    root: &Path,
    events: impl IntoIterator<Item = Result<Event, notify::Error>>,
) -> Burst {
    let mut paths = Vec::new();
    let mut resync = false;
    for result in events {
        match result {
            Ok(event) => paths.extend(changed_paths(root, &event)),
            Err(e) => {
                tracing::warn!("Notification error under {}: {}", root.display(), e);
                resync = true;
            }
        }
    }
    if resync {
        Burst::Resync
    } else {
        Burst::Paths(coalesce_paths(paths))
    }
}

/// Paths (relative to `root`) that `event` reports as changed.
///
/// Access events, hidden paths and paths outside the root are ignored.
pub(crate) fn changed_paths(root: &Path, event: &Event) -> Vec<PathBuf> {
    if matches!(event.kind, EventKind::Access(_)) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| {
            let rel = path.strip_prefix(root).ok()?;
            is_visible_path(rel).then(|| rel.to_path_buf())
        })
        .collect()
}

/// Deduplicate `paths` and drop any path below another one in the set.
pub fn coalesce_paths(mut paths: Vec<PathBuf>) -> Vec<PathBuf> {
    paths.sort();
    paths.dedup();

    let mut kept: Vec<PathBuf> = Vec::with_capacity(paths.len());
    for path in paths {
        // Sorted by components, so a covering ancestor is always the last kept.
        if kept.last().is_some_and(|ancestor| path.starts_with(ancestor)) {
            continue;
        }
        kept.push(path);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, ModifyKind, RemoveKind, RenameMode};

    fn paths(list: &[&str]) -> Vec<PathBuf> {
        list.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_coalesce_drops_descendants() {
        let dirs = paths(&["a/b", "a", "c/d", "a/b/c", "ab", "c/d", "c/e"]);
        assert_eq!(coalesce_paths(dirs), paths(&["a", "ab", "c/d", "c/e"]));
    }

    #[test]
    fn test_coalesce_root_covers_everything() {
        let dirs = paths(&["x/y", "", "z"]);
        assert_eq!(coalesce_paths(dirs), paths(&[""]));
    }

    #[test]
    fn test_changed_paths_are_the_entries_themselves() {
        let root = Path::new("/srv/root");
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(PathBuf::from("/srv/root/sub/new.txt"))
            .add_path(PathBuf::from("/srv/root/top.txt"));
        assert_eq!(changed_paths(root, &event), paths(&["sub/new.txt", "top.txt"]));
    }

    #[test]
    fn test_changed_paths_rename_reports_both_sides() {
        let root = Path::new("/r");
        let event = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/r/a/old"))
            .add_path(PathBuf::from("/r/b/new"));
        assert_eq!(changed_paths(root, &event), paths(&["a/old", "b/new"]));
    }

    #[test]
    fn test_changed_paths_ignores_hidden_outside_and_access() {
        let root = Path::new("/r");
        let hidden = Event::new(EventKind::Remove(RemoveKind::File))
            .add_path(PathBuf::from("/r/.git/index"))
            .add_path(PathBuf::from("/r/docs/.draft.swp"))
            .add_path(PathBuf::from("/elsewhere/file"));
        assert!(changed_paths(root, &hidden).is_empty());

        let access = Event::new(EventKind::Access(AccessKind::Any))
            .add_path(PathBuf::from("/r/docs/readme"));
        assert!(changed_paths(root, &access).is_empty());

        let on_root = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/r"));
        assert_eq!(changed_paths(root, &on_root), paths(&[""]));
    }

    #[test]
    fn test_burst_coalesces_top_level_file_to_itself() {
        let root = Path::new("/r");
        let burst = collect_burst(
            root,
            vec![
                Ok(Event::new(EventKind::Create(CreateKind::Folder))
                    .add_path(PathBuf::from("/r/big/new"))),
                Ok(Event::new(EventKind::Create(CreateKind::File))
                    .add_path(PathBuf::from("/r/big/new/f.txt"))),
                Ok(Event::new(EventKind::Modify(ModifyKind::Any))
                    .add_path(PathBuf::from("/r/top.txt"))),
            ],
        );
        assert_eq!(burst, Burst::Paths(paths(&["big/new", "top.txt"])));
    }

    #[test]
    fn test_burst_with_error_forces_resync() {
        let root = Path::new("/r");
        let burst = collect_burst(
            root,
            vec![
                Ok(Event::new(EventKind::Create(CreateKind::File))
                    .add_path(PathBuf::from("/r/a.txt"))),
                Err(notify::Error::generic("queue overflow")),
            ],
        );
        assert_eq!(burst, Burst::Resync);
    }
}

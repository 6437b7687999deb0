//! The watcher service handle.
//!
//! `TreeWatcher` owns the tree state, the cancellation flag and the watcher
//! thread. Snapshot reads work from any thread and keep returning the last
//! known state even if the watcher thread has died.

use crate::broadcast::{BroadcastSink, Broadcaster, Message};
use crate::config::WatcherConfig;
use crate::tree::{Listing, Space, TreeState};
use crate::watcher::runner::WatchLoop;
use crate::watcher::WatcherError;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tokio::runtime::Handle;

/// A running watcher over one root directory.
///
/// `stop()` (and `Drop`) block until the thread exits, and the thread may be
/// waiting on a broadcast running on `runtime`; call them from outside the
/// runtime's worker threads, e.g. via `spawn_blocking`.
pub struct TreeWatcher {
    root: PathBuf,
    tree: Arc<TreeState>,
    quit: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<(), WatcherError>>>,
}

impl TreeWatcher {
    /// Validate the root and spawn the watcher thread.
    ///
    /// Fails immediately if `config.root` is missing or not a directory.
    /// Broadcasts are delivered to `sink` on `runtime`.
    pub fn start(
        mut config: WatcherConfig,
        sink: Arc<dyn BroadcastSink>,
        runtime: Handle,
    ) -> Result<Self, WatcherError> {
        let root = validate_root(&config.root)?;
        config.root = root.clone();

        let tree = Arc::new(TreeState::new());
        let quit = Arc::new(AtomicBool::new(false));
        let runner = WatchLoop::new(
            config,
            Arc::clone(&tree),
            Broadcaster::new(runtime, sink),
            Arc::clone(&quit),
        );

        let thread = thread::Builder::new()
            .name("tree-watcher".to_string())
            .spawn(move || runner.run())
            .map_err(WatcherError::Spawn)?;
        tracing::info!("Watching {}", root.display());

        Ok(Self {
            root,
            tree,
            quit,
            thread: Some(thread),
        })
    }

    /// The canonical root being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Shared handle to the tree state.
    pub fn tree(&self) -> Arc<TreeState> {
        Arc::clone(&self.tree)
    }

    pub fn space(&self) -> Space {
        self.tree.space()
    }

    pub fn root_listing(&self) -> Listing {
        self.tree.root_listing()
    }

    /// Messages that bring a newly connected subscriber up to date.
    pub fn initial_messages(&self) -> [Message; 2] {
        [
            Message::Root(self.tree.root_listing()),
            Message::Space(self.tree.space()),
        ]
    }

    /// Whether the watcher thread is still alive.
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Ask the thread to exit and wait for it.
    ///
    /// Returns the error that ended the thread, if it died on its own.
    pub fn stop(&mut self) -> Result<(), WatcherError> {
        self.quit.store(true, Ordering::Relaxed);
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| WatcherError::ThreadPanicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for TreeWatcher {
    fn drop(&mut self) {
        if self.thread.is_some() {
            if let Err(e) = self.stop() {
                tracing::warn!("Watcher for {} ended with error: {}", self.root.display(), e);
            }
        }
    }
}

fn validate_root(root: &Path) -> Result<PathBuf, WatcherError> {
    let io_err = |source| WatcherError::Io {
        path: root.to_path_buf(),
        source,
    };
    let meta = fs::metadata(root).map_err(io_err)?;
    if !meta.is_dir() {
        return Err(WatcherError::InvalidRoot {
            path: root.to_path_buf(),
        });
    }
    fs::canonicalize(root).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::{ListingMirror, PubSub};
    use crate::config::WatchMode;
    use std::time::Duration;
    use tempfile::tempdir;

    fn fast_config(root: &Path, mode: WatchMode) -> WatcherConfig {
        WatcherConfig::new(root)
            .mode(mode)
            .poll_base(Duration::from_millis(20))
            .event_timeout(Duration::from_millis(20))
    }

    /// Wait until the mirror matches the watcher's tree and `check` holds.
    async fn converge(
        mirror: &ListingMirror,
        watcher: &TreeWatcher,
        check: impl Fn(&Listing) -> bool,
    ) -> Listing {
        for _ in 0..200 {
            let listing = mirror.listing().await;
            if check(&listing) && listing == watcher.root_listing() {
                return listing;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "mirror never converged: mirror={:?} tree={:?}",
            mirror.listing().await,
            watcher.root_listing()
        );
    }

    fn names(listing: &Listing) -> Vec<(u32, &str)> {
        listing.iter().map(|e| (e.level, e.name.as_str())).collect()
    }

    async fn stop(mut watcher: TreeWatcher) {
        tokio::task::spawn_blocking(move || watcher.stop())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_polling_watcher_tracks_changes() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("a.txt"), "hello").unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();
        fs::write(temp.path().join("sub").join("b.txt"), "abc").unwrap();

        let pubsub = Arc::new(PubSub::new());
        let mut mirror = ListingMirror::new();
        mirror.listen(pubsub.subscribe());

        let watcher = TreeWatcher::start(
            fast_config(temp.path(), WatchMode::Poll),
            pubsub.clone(),
            Handle::current(),
        )
        .unwrap();
        assert!(watcher.is_running());

        let listing = converge(&mirror, &watcher, |l| l.len() == 4).await;
        assert_eq!(
            names(&listing),
            vec![(0, ""), (1, "a.txt"), (1, "sub"), (2, "b.txt")]
        );
        assert_eq!(listing[0].size, 8);

        fs::remove_file(temp.path().join("sub").join("b.txt")).unwrap();
        let listing = converge(&mirror, &watcher, |l| l.len() == 3).await;
        assert_eq!(names(&listing), vec![(0, ""), (1, "a.txt"), (1, "sub")]);
        assert_eq!(listing[2].size, 0);
        assert_eq!(listing[0].size, 5);

        stop(watcher).await;
        mirror.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_notified_watcher_tracks_changes() {
        let temp = tempdir().unwrap();
        fs::create_dir(temp.path().join("sub")).unwrap();

        let pubsub = Arc::new(PubSub::new());
        let mut mirror = ListingMirror::new();
        mirror.listen(pubsub.subscribe());

        // Directories created in a burst can race the recursive watch, so a
        // short full refresh backs up anything the events miss.
        let watcher = TreeWatcher::start(
            fast_config(temp.path(), WatchMode::Notify).full_refresh(Duration::from_secs(1)),
            pubsub.clone(),
            Handle::current(),
        )
        .unwrap();
        converge(&mirror, &watcher, |l| l.len() == 2).await;

        fs::write(temp.path().join("sub").join("new.txt"), "12345678").unwrap();
        fs::write(temp.path().join(".hidden"), "x").unwrap();
        let listing = converge(&mirror, &watcher, |l| l.len() == 3 && l[2].size == 8).await;
        assert_eq!(names(&listing), vec![(0, ""), (1, "sub"), (2, "new.txt")]);
        assert_eq!(listing[2].size, 8);

        fs::create_dir_all(temp.path().join("deep").join("er")).unwrap();
        fs::write(temp.path().join("deep").join("er").join("f"), "1").unwrap();
        let listing = converge(&mirror, &watcher, |l| l.len() == 6 && l[0].size == 9).await;
        assert_eq!(
            names(&listing),
            vec![
                (0, ""),
                (1, "deep"),
                (2, "er"),
                (3, "f"),
                (1, "sub"),
                (2, "new.txt"),
            ]
        );

        stop(watcher).await;
        mirror.stop().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_snapshot_reads_and_initial_messages() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("one"), "1").unwrap();

        let pubsub = Arc::new(PubSub::new());
        let mut mirror = ListingMirror::new();
        mirror.listen(pubsub.subscribe());
        let watcher = TreeWatcher::start(
            fast_config(temp.path(), WatchMode::Poll),
            pubsub.clone(),
            Handle::current(),
        )
        .unwrap();
        converge(&mirror, &watcher, |l| l.len() == 2).await;

        let [root, space] = watcher.initial_messages();
        assert_eq!(root, Message::Root(watcher.root_listing()));
        assert_eq!(space, Message::Space(watcher.space()));
        assert_eq!(watcher.root(), fs::canonicalize(temp.path()).unwrap());

        stop(watcher).await;
        mirror.stop().await;
    }

    #[tokio::test]
    async fn test_start_rejects_bad_roots() {
        let temp = tempdir().unwrap();
        let file = temp.path().join("plain.txt");
        fs::write(&file, "x").unwrap();
        let sink = Arc::new(PubSub::new());

        let missing = TreeWatcher::start(
            WatcherConfig::new(temp.path().join("missing")),
            sink.clone(),
            Handle::current(),
        );
        assert!(matches!(missing, Err(WatcherError::Io { .. })));

        let not_dir = TreeWatcher::start(WatcherConfig::new(&file), sink, Handle::current());
        assert!(matches!(not_dir, Err(WatcherError::InvalidRoot { .. })));
    }
}

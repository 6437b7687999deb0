//! The state shared by both watcher loops and the steps they run.
//!
//! Every step mutates the tree first and only then broadcasts, and the
//! broadcast blocks until delivered, so subscribers see diffs in exactly the
//! order the tree went through them.

use crate::broadcast::{Broadcaster, Message};
use crate::config::{WatchMode, WatcherConfig};
use crate::tree::{diff, FileEntry, Space, TreeError, TreeState, Walker};
use crate::watcher::space::SpaceProbe;
use crate::watcher::{events, poll, WatcherError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

pub struct WatchLoop {
    pub(crate) config: WatcherConfig,
    pub(crate) walker: Walker,
    tree: Arc<TreeState>,
    broadcaster: Broadcaster,
    quit: Arc<AtomicBool>,
    space: SpaceProbe,
}

impl WatchLoop {
    pub fn new(
        config: WatcherConfig,
        tree: Arc<TreeState>,
        broadcaster: Broadcaster,
        quit: Arc<AtomicBool>,
    ) -> Self {
        Self {
            walker: Walker::local(&config.root),
            space: SpaceProbe::new(&config.root),
            config,
            tree,
            broadcaster,
            quit,
        }
    }

    /// Run until the quit flag is set or an unrecoverable error occurs.
    pub fn run(mut self) -> Result<(), WatcherError> {
        let result = match self.config.mode {
            WatchMode::Poll => poll::run(&mut self),
            WatchMode::Notify => {
                events::NotifySource::new(self.walker.root())
                    .and_then(|source| events::run(&mut self, &source.event_rx))
            }
            WatchMode::Auto => match events::NotifySource::new(self.walker.root()) {
                Ok(source) => events::run(&mut self, &source.event_rx),
                Err(e) => {
                    tracing::warn!(
                        "Native watcher unavailable for {}: {}, falling back to polling",
                        self.walker.root().display(),
                        e
                    );
                    poll::run(&mut self)
                }
            },
        };

        match &result {
            Ok(()) => tracing::info!("Watcher for {} stopped", self.walker.root().display()),
            Err(e) => tracing::error!("Watcher for {} died: {}", self.walker.root().display(), e),
        }
        result
    }

    pub(crate) fn should_quit(&self) -> bool {
        self.quit.load(Ordering::Relaxed)
    }

    /// Sleep for `total`, waking every event timeout to check the quit flag.
    pub(crate) fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        let slice = self.config.event_wait();
        while !self.should_quit() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }

    /// Re-walk the whole tree, install it and broadcast the difference.
    ///
    /// Returns how long the walk took.
    pub(crate) fn full_refresh(&self) -> Result<Duration, WatcherError> {
        let started = Instant::now();
        let fresh = self.walker.walk(Path::new(""));
        let took = started.elapsed();

        if took > self.config.slow_walk_threshold() {
            tracing::warn!(
                "Walking {} took {:.1}s for {} entries",
                self.walker.root().display(),
                took.as_secs_f64(),
                fresh.len()
            );
        }

        let old = self.tree.swap_root_listing(fresh.clone());
        self.publish(&old, &fresh)?;
        tracing::debug!("{}", self.tree.debug_summary());
        Ok(took)
    }

    /// Re-walk each path in `paths` and broadcast one diff for the batch.
    ///
    /// A path that no longer exists on disk is removed from the tree.
    pub(crate) fn update_paths(&self, paths: &[PathBuf]) -> Result<(), WatcherError> {
        let baseline = self.tree.root_listing();
        let mut changed = false;

        for path in paths {
            let fresh = self.walker.walk(path);
            match self.tree.update_path(path, fresh) {
                Ok(updated) => changed |= updated,
                Err(TreeError::MissingParent { path }) => {
                    tracing::warn!(
                        "Parent of {} is not in the tree, re-walking everything",
                        path.display()
                    );
                    let fresh = self.walker.walk(Path::new(""));
                    self.tree.set_root_listing(fresh.clone());
                    return self.publish(&baseline, &fresh);
                }
                Err(e) => return Err(e.into()),
            }
        }

        if changed {
            let current = self.tree.root_listing();
            self.publish(&baseline, &current)?;
        }
        Ok(())
    }

    /// Read disk usage and broadcast it if it moved past the tolerance.
    pub(crate) fn refresh_space(&mut self) -> Result<(), WatcherError> {
        let storage = self.tree.root_size().unwrap_or(0);
        let reading = self.space.read(storage);
        self.publish_space(reading)?;
        Ok(())
    }

    /// Store and broadcast `reading` unless it is within the tolerance of
    /// the last one. Returns whether it was broadcast.
    fn publish_space(&self, reading: Space) -> Result<bool, WatcherError> {
        if !reading.differs_by_more_than(&self.tree.space(), self.config.space_tolerance_bytes) {
            return Ok(false);
        }

        self.tree.set_space(reading);
        self.broadcaster.send(&Message::Space(reading))?;
        Ok(true)
    }

    fn publish(&self, old: &[FileEntry], new: &[FileEntry]) -> Result<(), WatcherError> {
        if old == new {
            return Ok(());
        }
        let ops = diff(old, new);
        tracing::debug!("Broadcasting update with {} ops", ops.len());
        self.broadcaster.send(&Message::Update(ops))?;
        Ok(())
    }
}

//! Tree Mirror
//!
//! Keeps a live, in-memory listing of a directory tree and pushes incremental
//! updates to subscribers as the tree changes on disk.
//!
//! ## Data Flow
//!
//! ```text
//! Filesystem Change
//!        ↓
//! notify event (or poll tick)     [WATCHER THREAD]
//!        ↓
//! coalesce to topmost changed paths
//!        ↓
//! Walker re-walks those subtrees
//!        ↓
//! TreeState.update_path() [single write lock]
//!        ↓
//! diff(old, new) → Message::Update
//!        ↓
//! Broadcaster hands off to the runtime, waits for delivery
//!        ↓
//! BroadcastSink → PubSub → subscribers      [ASYNC RUNTIME]
//! ```
//!
//! A full re-walk runs every 30 seconds regardless of notifications, and disk
//! usage is re-read every 5 seconds and broadcast when it moves more than
//! 1 MiB.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tree_mirror::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pubsub = Arc::new(PubSub::new());
//!     let mut mirror = ListingMirror::new();
//!     mirror.listen(pubsub.subscribe());
//!
//!     let watcher = TreeWatcher::start(
//!         WatcherConfig::new("/srv/files"),
//!         pubsub.clone(),
//!         tokio::runtime::Handle::current(),
//!     )?;
//!
//!     tokio::time::sleep(std::time::Duration::from_secs(1)).await;
//!     println!("{} entries", mirror.listing().await.len());
//!
//!     tokio::task::spawn_blocking(move || drop(watcher)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Structure
//!
//! - [`tree`]: entries, walking, the shared tree state and listing diffs
//! - [`broadcast`]: wire messages, subscriber fan-out and a client-side mirror
//! - [`watcher`]: the watcher thread and its start/stop handle
//! - [`config`]: watcher settings

#![warn(rustdoc::missing_crate_level_docs)]

pub mod broadcast;
pub mod config;
pub mod tree;
pub mod watcher;

/// Re-exports for convenience.
pub mod prelude {
    pub use crate::broadcast::{BroadcastSink, ListingMirror, Message, PubSub, Subscription};
    pub use crate::config::{WatchMode, WatcherConfig};
    pub use crate::tree::{apply, diff, FileEntry, Listing, Space, TreeState, UpdateOp, Walker};
    pub use crate::watcher::{TreeWatcher, WatcherError};
}

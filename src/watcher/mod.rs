//! Watcher thread keeping the tree in sync with the disk.
//!
//! This module provides:
//! - `service`: `TreeWatcher`, the start/stop handle owning the thread
//! - `runner`: one refresh/update/broadcast cycle, shared by both loops
//! - `events`: the OS-notification-driven loop
//! - `poll`: the polling fallback loop
//! - `space`: disk usage readings

pub(crate) mod events;
pub(crate) mod poll;
pub(crate) mod runner;
pub mod service;
pub(crate) mod space;

pub use events::coalesce_paths;
pub use service::TreeWatcher;

use crate::broadcast::BroadcastError;
use crate::tree::TreeError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur in the watcher system.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Failed to create watcher: {0}")]
    WatcherCreation(#[from] notify::Error),

    #[error("Failed to watch path {path}: {source}")]
    WatchPath {
        path: PathBuf,
        source: notify::Error,
    },

    #[error("Watch root {path} is not a directory")]
    InvalidRoot { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Notification channel closed")]
    EventChannelClosed,

    #[error("Failed to spawn watcher thread: {0}")]
    Spawn(io::Error),

    #[error("Watcher thread panicked")]
    ThreadPanicked,
}

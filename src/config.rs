//! Watcher configuration.
//!
//! Loaded once before the watcher starts, from a TOML file or built in code.
//! Every field except `root` has a default.

use crate::watcher::WatcherError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How change detection is driven.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchMode {
    /// OS notifications, falling back to polling when unavailable.
    #[default]
    Auto,
    /// OS notifications only; fail if they cannot be set up.
    Notify,
    /// Periodic full re-walks.
    Poll,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Directory to mirror.
    pub root: PathBuf,
    #[serde(default)]
    pub mode: WatchMode,
    /// Full re-walk period while running on notifications.
    #[serde(default = "default_full_refresh_secs")]
    pub full_refresh_secs: u64,
    #[serde(default = "default_space_interval_secs")]
    pub space_interval_secs: u64,
    /// Space changes at or below this many bytes are not broadcast.
    #[serde(default = "default_space_tolerance_bytes")]
    pub space_tolerance_bytes: u64,
    /// Upper bound on one wait for notification events; also bounds
    /// shutdown latency.
    #[serde(default = "default_event_timeout_ms")]
    pub event_timeout_ms: u64,
    #[serde(default = "default_poll_base_ms")]
    pub poll_base_ms: u64,
    /// Polling pause grows by this multiple of the last walk's duration.
    #[serde(default = "default_poll_walk_factor")]
    pub poll_walk_factor: u32,
    #[serde(default = "default_slow_walk_warn_ms")]
    pub slow_walk_warn_ms: u64,
}

fn default_full_refresh_secs() -> u64 {
    30
}

fn default_space_interval_secs() -> u64 {
    5
}

fn default_space_tolerance_bytes() -> u64 {
    1 << 20
}

fn default_event_timeout_ms() -> u64 {
    100
}

fn default_poll_base_ms() -> u64 {
    100
}

fn default_poll_walk_factor() -> u32 {
    8
}

fn default_slow_walk_warn_ms() -> u64 {
    1000
}

impl WatcherConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: WatchMode::default(),
            full_refresh_secs: default_full_refresh_secs(),
            space_interval_secs: default_space_interval_secs(),
            space_tolerance_bytes: default_space_tolerance_bytes(),
            event_timeout_ms: default_event_timeout_ms(),
            poll_base_ms: default_poll_base_ms(),
            poll_walk_factor: default_poll_walk_factor(),
            slow_walk_warn_ms: default_slow_walk_warn_ms(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, WatcherError> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, WatcherError> {
        let content = fs::read_to_string(path).map_err(|e| WatcherError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn mode(mut self, mode: WatchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn full_refresh(mut self, every: Duration) -> Self {
        self.full_refresh_secs = every.as_secs().max(1);
        self
    }

    pub fn space_interval(mut self, every: Duration) -> Self {
        self.space_interval_secs = every.as_secs().max(1);
        self
    }

    pub fn space_tolerance(mut self, bytes: u64) -> Self {
        self.space_tolerance_bytes = bytes;
        self
    }

    pub fn event_timeout(mut self, timeout: Duration) -> Self {
        self.event_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn poll_base(mut self, base: Duration) -> Self {
        self.poll_base_ms = base.as_millis() as u64;
        self
    }

    pub fn full_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.full_refresh_secs)
    }

    pub fn space_check_interval(&self) -> Duration {
        Duration::from_secs(self.space_interval_secs)
    }

    pub fn event_wait(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms.max(1))
    }

    /// Pause between polling walks given how long the last walk took.
    pub fn poll_pause(&self, walk: Duration) -> Duration {
        Duration::from_millis(self.poll_base_ms) + walk * self.poll_walk_factor
    }

    pub fn slow_walk_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_walk_warn_ms)
    }
}

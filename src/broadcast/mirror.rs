//! Subscriber-side mirror of the watched tree.
//!
//! `ListingMirror` consumes messages from a [`Subscription`] and applies them
//! to a local listing, the way a connected client keeps its view in sync.

use crate::broadcast::message::Message;
use crate::broadcast::pubsub::Subscription;
use crate::tree::{apply, Listing, Space};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Local copy of the tree as reconstructed from messages.
#[derive(Debug, Clone, Default)]
pub struct MirrorState {
    pub listing: Listing,
    pub space: Space,
    /// Number of messages applied.
    pub applied: u64,
    /// Set when a message could not be decoded or applied; the mirror stays
    /// stale until the next `Root` message.
    pub desynced: bool,
}

impl MirrorState {
    /// Apply one encoded message.
    pub fn apply_text(&mut self, text: &str) {
        let message = match Message::decode(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!("Mirror received undecodable message: {}", e);
                self.desynced = true;
                return;
            }
        };

        match message {
            Message::Root(listing) => {
                self.listing = listing;
                self.desynced = false;
            }
            Message::Update(ops) => {
                if self.desynced {
                    return;
                }
                match apply(&self.listing, &ops) {
                    Ok(listing) => self.listing = listing,
                    Err(e) => {
                        tracing::warn!("Mirror out of sync: {}", e);
                        self.desynced = true;
                        return;
                    }
                }
            }
            Message::Space(space) => self.space = space,
        }
        self.applied += 1;
    }
}

/// A mirror fed by a background listener task.
pub struct ListingMirror {
    state: Arc<RwLock<MirrorState>>,
    listener_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ListingMirror {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(MirrorState::default())),
            listener_handle: None,
        }
    }

    /// Handle to the mirrored state.
    pub fn state(&self) -> Arc<RwLock<MirrorState>> {
        Arc::clone(&self.state)
    }

    pub async fn listing(&self) -> Listing {
        self.state.read().await.listing.clone()
    }

    pub async fn space(&self) -> Space {
        self.state.read().await.space
    }

    /// Start applying messages from `subscription` in a background task.
    pub fn listen(&mut self, subscription: Subscription) {
        let state = Arc::clone(&self.state);
        let handle = tokio::spawn(async move {
            Self::listener_loop(state, subscription.receiver).await;
        });
        self.listener_handle = Some(handle);
    }

    async fn listener_loop(
        state: Arc<RwLock<MirrorState>>,
        mut rx: mpsc::UnboundedReceiver<Arc<str>>,
    ) {
        while let Some(text) = rx.recv().await {
            state.write().await.apply_text(&text);
        }
        tracing::debug!("Mirror subscription closed, stopping listener");
    }

    /// Stop the listener task.
    pub async fn stop(&mut self) {
        if let Some(handle) = self.listener_handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }

    pub fn is_listening(&self) -> bool {
        self.listener_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Default for ListingMirror {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::pubsub::{BroadcastSink, PubSub};
    use crate::tree::{diff, FileEntry, UpdateOp};

    fn entry(level: u32, name: &str, size: u64) -> FileEntry {
        FileEntry {
            level,
            name: name.to_string(),
            key: String::new(),
            mtime: 0,
            size,
            isfile: level > 0,
        }
    }

    fn encode(message: &Message) -> String {
        message.encode().unwrap()
    }

    #[test]
    fn test_apply_sequence() {
        let v1 = vec![entry(0, "", 1), entry(1, "a", 1)];
        let v2 = vec![entry(0, "", 3), entry(1, "a", 1), entry(1, "b", 2)];

        let mut state = MirrorState::default();
        state.apply_text(&encode(&Message::Update(diff(&[], &v1))));
        assert_eq!(state.listing, v1);
        state.apply_text(&encode(&Message::Update(diff(&v1, &v2))));
        assert_eq!(state.listing, v2);
        assert_eq!(state.applied, 2);
        assert!(!state.desynced);
    }

    #[test]
    fn test_bad_update_desyncs_until_root() {
        let v1 = vec![entry(0, "", 1)];
        let mut state = MirrorState::default();
        state.apply_text(&encode(&Message::Update(vec![UpdateOp::Keep(4)])));
        assert!(state.desynced);

        // Ignored while desynced.
        state.apply_text(&encode(&Message::Update(diff(&[], &v1))));
        assert!(state.listing.is_empty());

        state.apply_text(&encode(&Message::Root(v1.clone())));
        assert!(!state.desynced);
        assert_eq!(state.listing, v1);

        state.apply_text("not json");
        assert!(state.desynced);
    }

    #[tokio::test]
    async fn test_listener_applies_broadcasts() {
        let pubsub = PubSub::new();
        let mut mirror = ListingMirror::new();
        assert!(!mirror.is_listening());
        mirror.listen(pubsub.subscribe());

        let listing = vec![entry(0, "", 2), entry(1, "x", 2)];
        let space = Space {
            total: 9,
            used: 5,
            free: 4,
            storage: 2,
        };
        pubsub
            .broadcast(encode(&Message::Update(diff(&[], &listing))).into())
            .await;
        pubsub.broadcast(encode(&Message::Space(space)).into()).await;

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        assert!(mirror.is_listening());
        assert_eq!(mirror.listing().await, listing);
        assert_eq!(mirror.space().await, space);

        mirror.stop().await;
        assert!(!mirror.is_listening());
    }
}

//! Subscriber fan-out and the thread-to-runtime broadcast handoff.

use crate::broadcast::message::Message;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Errors that can occur while handing a message to the sink.
#[derive(Error, Debug)]
pub enum BroadcastError {
    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broadcast task was dropped before completing")]
    Aborted,
}

/// Something that fans an encoded message out to subscribers.
///
/// Implementations must not block on slow or disconnected subscribers.
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn broadcast(&self, message: Arc<str>);
}

/// Identifier handed out by [`PubSub::subscribe`].
pub type SubscriberId = u64;

/// A subscriber's end of the fan-out.
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub receiver: mpsc::UnboundedReceiver<Arc<str>>,
}

/// In-process sink with one unbounded queue per subscriber.
///
/// Closed queues are skipped, not removed; whoever owns the subscription
/// calls [`PubSub::unsubscribe`].
#[derive(Debug, Default)]
pub struct PubSub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::UnboundedSender<Arc<str>>>>,
    next_id: AtomicU64,
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, sender);
        Subscription { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    fn push(&self, message: &Arc<str>) {
        for (id, sender) in self.subscribers.lock().iter() {
            if sender.send(Arc::clone(message)).is_err() {
                tracing::trace!("Subscriber {} is disconnected", id);
            }
        }
    }
}

#[async_trait]
impl BroadcastSink for PubSub {
    async fn broadcast(&self, message: Arc<str>) {
        self.push(&message);
    }
}

/// The single point where the watcher thread hands work to the async runtime.
///
/// [`Broadcaster::send`] runs the sink on the runtime and blocks the calling
/// thread until the fan-out has finished, so the next tree mutation cannot
/// overtake a broadcast still in flight. It must not be called from inside
/// the runtime.
#[derive(Clone)]
pub struct Broadcaster {
    runtime: Handle,
    sink: Arc<dyn BroadcastSink>,
}

impl Broadcaster {
    pub fn new(runtime: Handle, sink: Arc<dyn BroadcastSink>) -> Self {
        Self { runtime, sink }
    }

    pub fn send(&self, message: &Message) -> Result<(), BroadcastError> {
        let encoded: Arc<str> = message.encode()?.into();
        let sink = Arc::clone(&self.sink);
        let (done_tx, done_rx) = oneshot::channel();

        self.runtime.spawn(async move {
            sink.broadcast(encoded).await;
            let _ = done_tx.send(());
        });

        done_rx.blocking_recv().map_err(|_| BroadcastError::Aborted)
    }
}

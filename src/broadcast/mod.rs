//! Broadcasting tree changes to subscribers.
//!
//! This module provides:
//! - `message`: the JSON wire messages (`root`, `update`, `space`)
//! - `pubsub`: the subscriber fan-out and the blocking thread-to-runtime handoff
//! - `mirror`: a subscriber that rebuilds the listing from messages

pub mod message;
pub mod mirror;
pub mod pubsub;

pub use message::Message;
pub use mirror::{ListingMirror, MirrorState};
pub use pubsub::{BroadcastError, BroadcastSink, Broadcaster, PubSub, SubscriberId, Subscription};

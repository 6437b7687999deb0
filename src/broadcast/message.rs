//! Wire messages pushed to subscribers.

use crate::tree::{FileEntry, Space, UpdateOp};
use serde::{Deserialize, Serialize};

/// A message as seen by subscribers.
///
/// Encodes as a single-key JSON object: `{"root": [...]}`,
/// `{"update": [...]}` or `{"space": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    /// Full listing, for a subscriber that has no state yet.
    Root(Vec<FileEntry>),
    /// Edit script against the previous listing.
    Update(Vec<UpdateOp>),
    Space(Space),
}

impl Message {
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

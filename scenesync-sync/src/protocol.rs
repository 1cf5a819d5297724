//! Wire messages exchanged between peers.
//!
//! One local-change pass produces, in order:
//! 1. a `Create` per entity that appeared, dependencies first
//! 2. a `Remove` per entity that disappeared
//! 3. one `Rename` batch
//! 4. an `Update` per entity whose fields changed
//!
//! Receivers apply messages in arrival order. References to entities that
//! have not arrived yet are linked when they do.

use scenesync_proxy::{DatablockDelta, DatablockProxy, Removal, Rename};
use scenesync_types::Identifier;
use serde::{Deserialize, Serialize};

/// Protocol version for compatibility checking.
pub const PROTOCOL_VERSION: u32 = 1;

/// A synchronization message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SyncMessage {
    /// Full snapshot of an entity to create.
    Create(DatablockProxy),
    /// Field changes of an existing entity.
    Update(EntityUpdate),
    /// An entity to remove.
    Remove(Removal),
    /// Entities to rename.
    Rename(Vec<Rename>),
}

impl SyncMessage {
    /// Identifiers of the entities the message is about.
    #[must_use]
    pub fn identifiers(&self) -> Vec<Identifier> {
        match self {
            Self::Create(proxy) => vec![proxy.uuid()],
            Self::Update(update) => vec![update.uuid],
            Self::Remove(removal) => vec![removal.uuid],
            Self::Rename(renames) => renames.iter().map(|r| r.uuid).collect(),
        }
    }
}

/// Field changes of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityUpdate {
    pub uuid: Identifier,
    pub delta: DatablockDelta,
}

/// A message with the protocol version and the sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    /// Name of the sending peer.
    pub sender: String,
    pub message: SyncMessage,
}

impl Envelope {
    /// Wraps a message with the current protocol version.
    #[must_use]
    pub fn new(sender: impl Into<String>, message: SyncMessage) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            sender: sender.into(),
            message,
        }
    }
}

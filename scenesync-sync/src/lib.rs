//! Session layer and wire protocol for scenesync.
//!
//! A [`SyncSession`] keeps one peer's live graph and the snapshot shared
//! with other peers consistent:
//!
//! 1. **Load**: snapshot every synchronized collection of the host
//! 2. **Local pass**: detect created, removed, renamed and modified
//!    entities and turn them into [`SyncMessage`]s
//! 3. **Remote pass**: apply messages received from peers, replying with
//!    renames when a creation collides with a local name
//!
//! The session performs no I/O. [`codec`] encodes [`Envelope`]s as JSON,
//! optionally in length-prefixed frames, for whatever transport the caller
//! uses.
//!
//! # Example
//!
//! ```
//! use scenesync_proxy::{LiveGraph, MemoryGraph};
//! use scenesync_sync::{SyncConfig, SyncSession};
//!
//! let mut graph = MemoryGraph::with_collections(&["objects"]);
//! graph.create("objects", "Cube", None).unwrap();
//!
//! let mut session = SyncSession::new(SyncConfig::default());
//! session.load(&mut graph);
//!
//! graph.create("objects", "Cone", None).unwrap();
//! let changes = session.local_changes(&mut graph, &[]);
//! assert_eq!(changes.messages().len(), 1);
//! ```

pub mod codec;
mod config;
mod error;
mod protocol;
mod session;

pub use config::{DEFAULT_COLLECTIONS, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use protocol::{EntityUpdate, Envelope, PROTOCOL_VERSION, SyncMessage};
pub use session::{LocalChanges, SyncSession};

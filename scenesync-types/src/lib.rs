//! Core type definitions for scenesync.
//!
//! This crate defines the small, host-agnostic types shared by the proxy
//! engine and the session layer:
//! - [`Identifier`]: the stable UUID joining a live entity to its proxy
//! - [`LiveHandle`]: an opaque handle to an entity owned by the host graph
//! - [`LivePath`]: the address of a struct nested inside a live entity
//!
//! Everything that knows about proxies, deltas or a concrete host lives in
//! `scenesync-proxy`, not here.

mod ids;
mod path;

pub use ids::{Identifier, LiveHandle};
pub use path::{LivePath, Segment};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}

//! Error types for the proxy layer.

use scenesync_types::{Identifier, LiveHandle};
use thiserror::Error;

/// Result type for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;

/// Result type for host accessor operations.
pub type HostResult<T> = Result<T, HostError>;

/// Failures reported by a [`LiveGraph`](crate::LiveGraph) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// No collection, entity, field or element at the given location.
    #[error("not found: {0}")]
    NotFound(String),

    /// The handle refers to an entity that was already destroyed, typically
    /// as a side effect of an earlier removal.
    #[error("dangling handle {0}")]
    Dangling(LiveHandle),

    /// The field exists on the type but not on this instance.
    #[error("missing field {0}")]
    MissingField(String),

    /// The field cannot be written.
    #[error("read-only field {0}")]
    ReadOnly(String),

    /// The host refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Errors that can occur while loading, saving, diffing or applying proxies.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// Structural recursion went deeper than the configured limit.
    #[error("nested attribute depth {depth} exceeds limit {limit} at {path}")]
    MaxDepthExceeded {
        depth: usize,
        limit: usize,
        path: String,
    },

    /// The host accessor failed.
    #[error("host error: {0}")]
    Host(#[from] HostError),

    /// No proxy registered for the identifier.
    #[error("missing proxy for {0}")]
    MissingProxy(Identifier),

    /// No live entity registered for the identifier.
    #[error("missing live entity for {0}")]
    MissingLive(Identifier),

    /// Incoming and resolved identifiers disagree.
    #[error("identifier mismatch: incoming {incoming}, resolved {resolved}")]
    IdentityMismatch {
        incoming: Identifier,
        resolved: Identifier,
    },

    /// A delta does not fit the proxy value it is applied to.
    #[error("delta does not match proxy value at {0}")]
    DeltaMismatch(String),

    /// No proxy collection with this name.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),

    /// The construction strategy could not instantiate the entity.
    #[error("construction failed for {0}")]
    ConstructionFailed(String),
}

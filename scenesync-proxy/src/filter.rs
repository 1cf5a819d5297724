//! Inclusion policy deciding which entities and fields are synchronized.

use crate::host::LiveGraph;
use scenesync_types::LiveHandle;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Decides what takes part in synchronization.
pub trait FilterPolicy: Send + Sync {
    /// Returns true if the entity of `collection` is tracked.
    fn is_tracked(&self, collection: &str, graph: &dyn LiveGraph, handle: LiveHandle) -> bool;

    /// Returns true if the top-level field of entities in `collection` is
    /// snapshotted.
    fn is_synchronized_field(&self, _collection: &str, _field: &str) -> bool {
        true
    }
}

/// Tracks every entity and every field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrackAll;

impl FilterPolicy for TrackAll {
    fn is_tracked(&self, _collection: &str, _graph: &dyn LiveGraph, _handle: LiveHandle) -> bool {
        true
    }
}

/// Configurable filter excluding host-internal or transient entities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncFilter {
    /// Host kinds never tracked, whatever their collection.
    pub excluded_kinds: BTreeSet<String>,
    /// Entities whose name starts with one of these are not tracked.
    pub excluded_prefixes: Vec<String>,
    /// Per collection, top-level fields left out of snapshots.
    pub excluded_fields: BTreeMap<String, BTreeSet<String>>,
}

impl SyncFilter {
    /// Creates a filter excluding nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Excludes every entity of the given host kind.
    #[must_use]
    pub fn exclude_kind(mut self, kind: &str) -> Self {
        self.excluded_kinds.insert(kind.to_string());
        self
    }

    /// Excludes entities whose name starts with `prefix`.
    #[must_use]
    pub fn exclude_prefix(mut self, prefix: &str) -> Self {
        self.excluded_prefixes.push(prefix.to_string());
        self
    }

    /// Leaves `field` out of the snapshots of `collection`.
    #[must_use]
    pub fn exclude_field(mut self, collection: &str, field: &str) -> Self {
        self.excluded_fields
            .entry(collection.to_string())
            .or_default()
            .insert(field.to_string());
        self
    }
}

impl FilterPolicy for SyncFilter {
    fn is_tracked(&self, _collection: &str, graph: &dyn LiveGraph, handle: LiveHandle) -> bool {
        if let Some(kind) = graph.kind(handle)
            && self.excluded_kinds.contains(&kind)
        {
            return false;
        }
        match graph.name(handle) {
            Some(name) => !self
                .excluded_prefixes
                .iter()
                .any(|prefix| name.starts_with(prefix.as_str())),
            None => false,
        }
    }

    fn is_synchronized_field(&self, collection: &str, field: &str) -> bool {
        self.excluded_fields
            .get(collection)
            .is_none_or(|fields| !fields.contains(field))
    }
}

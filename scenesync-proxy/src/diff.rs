//! Structural diff between live collections and their snapshots.
//!
//! Detects which standalone entities were added, removed or renamed since
//! the last pass. Field-level changes inside entities are found by
//! [`DatablockProxy::diff`](crate::DatablockProxy::diff) instead.

use crate::collection::DatablockCollectionProxy;
use crate::context::Context;
use crate::data::DataProxy;
use scenesync_types::Identifier;
use std::collections::{BTreeMap, HashSet};
use tracing::{error, info};

/// Additions, removals and renames of one collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectionDiff {
    /// Live name -> collection name, in name order.
    pub items_added: BTreeMap<String, String>,
    /// Identifiers present in the snapshot but no longer live.
    pub items_removed: Vec<Identifier>,
    /// Identifier and new live name of entities whose name changed.
    pub items_renamed: Vec<(Identifier, String)>,
}

impl CollectionDiff {
    /// Compares the tracked live entities of the collection with `proxy`.
    ///
    /// Untagged live entities receive an identifier. When two live entities
    /// carry the same identifier, which happens when the host duplicates an
    /// entity with its fields, the later one is reset and treated as new.
    pub fn compute(ctx: &mut Context<'_>, proxy: &DatablockCollectionProxy) -> Self {
        let mut diff = Self::default();
        let collection = proxy.name();
        let Some(items) = ctx.graph.items(collection) else {
            return diff;
        };

        let filter = ctx.filter;
        let mut live_ids = HashSet::new();
        for (name, live) in items {
            if !filter.is_tracked(collection, &*ctx.graph, live) {
                continue;
            }
            if let Some(uuid) = ctx.graph.identifier(live)
                && live_ids.contains(&uuid)
            {
                info!("duplicate identifier {uuid} in {collection} for {name}, resetting");
                if let Err(e) = ctx.graph.set_identifier(live, None) {
                    error!("cannot reset identifier of {collection}[{name}]: {e}");
                    continue;
                }
            }
            let uuid = match ctx.ensure_identifier(live) {
                Ok(uuid) => uuid,
                Err(e) => {
                    error!("cannot tag {collection}[{name}]: {e}");
                    continue;
                }
            };
            live_ids.insert(uuid);

            match proxy.find(&uuid) {
                None => {
                    diff.items_added.insert(name, collection.to_string());
                }
                Some(entry) if entry.name() != Some(name.as_str()) => {
                    diff.items_renamed.push((uuid, name));
                }
                Some(_) => {}
            }
        }

        diff.items_removed = proxy
            .identifiers()
            .filter(|uuid| !live_ids.contains(uuid))
            .collect();
        diff
    }

    /// Returns true if nothing was added, removed or renamed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items_added.is_empty() && self.items_removed.is_empty() && self.items_renamed.is_empty()
    }
}

/// Collection diffs over every synchronized collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlendDiff {
    /// Non-empty diffs, in collection order.
    pub collection_deltas: Vec<(String, CollectionDiff)>,
}

impl BlendDiff {
    /// Diffs each collection of `collections` present in `data`.
    pub fn compute(ctx: &mut Context<'_>, data: &DataProxy, collections: &[String]) -> Self {
        let mut blend = Self::default();
        for name in collections {
            let Some(proxy) = data.collection(name) else {
                continue;
            };
            let diff = CollectionDiff::compute(ctx, proxy);
            if !diff.is_empty() {
                blend.collection_deltas.push((name.clone(), diff));
            }
        }
        blend
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection_deltas.is_empty()
    }
}

//! Root snapshot of every synchronized collection.

use crate::changeset::{Changeset, Rename};
use crate::collection::DatablockCollectionProxy;
use crate::context::Context;
use crate::datablock::DatablockProxy;
use crate::delta::DatablockDelta;
use crate::diff::BlendDiff;
use crate::error::{ProxyError, ProxyResult};
use crate::state::ProxyState;
use scenesync_types::{Identifier, LiveHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Standalone-entity collections keyed by collection name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataProxy {
    collections: BTreeMap<String, DatablockCollectionProxy>,
}

impl DataProxy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshots every listed collection the host has.
    pub fn load(ctx: &mut Context<'_>, collections: &[String]) -> Self {
        let mut data = Self::default();
        for name in collections {
            if ctx.graph.items(name).is_none() {
                debug!("load: host has no collection {name}");
                continue;
            }
            let proxy = DatablockCollectionProxy::load(ctx, name);
            data.collections.insert(name.clone(), proxy);
        }
        data
    }

    /// Writes every collection into the host, lower creation ranks first so
    /// that most references resolve immediately.
    pub fn save(&self, ctx: &mut Context<'_>) {
        let mut ordered: Vec<&DatablockCollectionProxy> = self.collections.values().collect();
        ordered.sort_by_key(|proxy| ctx.strategies.rank(proxy.name()));
        for proxy in ordered {
            proxy.save(ctx);
        }
    }

    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&DatablockCollectionProxy> {
        self.collections.get(name)
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut DatablockCollectionProxy> {
        self.collections.get_mut(name)
    }

    /// Collections in name order.
    pub fn collections(&self) -> impl Iterator<Item = &DatablockCollectionProxy> {
        self.collections.values()
    }

    /// Adds an empty collection snapshot if none exists under `name`.
    pub fn ensure_collection(&mut self, name: &str) -> &mut DatablockCollectionProxy {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| DatablockCollectionProxy::new(name))
    }

    /// Entry for an identifier, looked up through the registry.
    #[must_use]
    pub fn find(&self, state: &ProxyState, uuid: &Identifier) -> Option<&DatablockProxy> {
        let collection = state.proxy_collection(uuid)?;
        self.collections.get(collection)?.find(uuid)
    }

    fn owner_mut(
        &mut self,
        state: &ProxyState,
        uuid: &Identifier,
    ) -> Option<&mut DatablockCollectionProxy> {
        let collection = state.proxy_collection(uuid)?;
        self.collections.get_mut(collection)
    }

    /// Reconciles local additions, removals and renames, collection by
    /// collection. Creations are ordered by rank.
    pub fn update(&mut self, ctx: &mut Context<'_>, diff: &BlendDiff) -> Changeset {
        let mut changeset = Changeset::new();
        for (name, collection_diff) in &diff.collection_deltas {
            let Some(proxy) = self.collections.get_mut(name) else {
                error!("update: {}", ProxyError::UnknownCollection(name.clone()));
                continue;
            };
            changeset.extend(proxy.update(ctx, collection_diff));
        }
        changeset.sort_creations(ctx.strategies);
        changeset
    }

    /// Creates an entity received from a peer in its collection.
    pub fn create_entity(
        &mut self,
        ctx: &mut Context<'_>,
        incoming: DatablockProxy,
    ) -> ProxyResult<(Option<LiveHandle>, Vec<Rename>)> {
        let name = incoming.collection().to_string();
        if ctx.graph.items(&name).is_none() {
            return Err(ProxyError::UnknownCollection(name));
        }
        self.ensure_collection(&name).create_entity(ctx, incoming)
    }

    /// Applies an entity delta received from a peer.
    pub fn update_entity(
        &mut self,
        ctx: &mut Context<'_>,
        delta: &DatablockDelta,
    ) -> Option<LiveHandle> {
        let Some(proxy) = self.collections.get_mut(&delta.collection) else {
            error!("update: {}", ProxyError::UnknownCollection(delta.collection.clone()));
            return None;
        };
        proxy.update_entity(ctx, delta)
    }

    /// Removes an entity received from a peer.
    pub fn remove_entity(
        &mut self,
        ctx: &mut Context<'_>,
        uuid: &Identifier,
    ) -> Option<DatablockProxy> {
        let Some(proxy) = self.owner_mut(ctx.state, uuid) else {
            error!("remove: {}", ProxyError::MissingProxy(*uuid));
            return None;
        };
        proxy.remove_entity(ctx, uuid)
    }

    /// Renames an entity received from a peer.
    pub fn rename_entity(
        &mut self,
        ctx: &mut Context<'_>,
        uuid: &Identifier,
        new_name: &str,
    ) -> Option<String> {
        let Some(proxy) = self.owner_mut(ctx.state, uuid) else {
            error!("rename: {}", ProxyError::MissingProxy(*uuid));
            return None;
        };
        proxy.rename_entity(ctx, uuid, new_name)
    }

    /// Computes the field changes of a local entity and applies them to its
    /// snapshot. Returns `None` when nothing changed.
    pub fn diff_entity(
        &mut self,
        ctx: &mut Context<'_>,
        uuid: &Identifier,
    ) -> ProxyResult<Option<DatablockDelta>> {
        let Some(proxy) = self.owner_mut(ctx.state, uuid).and_then(|c| c.find_mut(uuid)) else {
            return Err(ProxyError::MissingProxy(*uuid));
        };
        let Some(live) = proxy.target(ctx) else {
            return Err(ProxyError::MissingLive(*uuid));
        };
        let Some(delta) = proxy.diff(ctx, live)? else {
            return Ok(None);
        };
        proxy.apply(ctx, &delta, false)?;
        Ok(Some(delta))
    }
}

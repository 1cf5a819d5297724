//! Snapshot of a top-level collection owning its entities by identity.
//!
//! This is the creation, removal and rename authority: every standalone
//! entity is created, removed or renamed through the collection proxy that
//! owns it, which keeps the registry and the snapshot in step.

use crate::changeset::{Changeset, Removal, Rename};
use crate::context::Context;
use crate::datablock::DatablockProxy;
use crate::delta::DatablockDelta;
use crate::diff::CollectionDiff;
use crate::error::{HostError, ProxyError, ProxyResult};
use scenesync_types::{Identifier, LiveHandle};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// Snapshot of one top-level collection, keyed by identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatablockCollectionProxy {
    name: String,
    entries: BTreeMap<Identifier, DatablockProxy>,
}

impl DatablockCollectionProxy {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Name of the live collection mirrored.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn contains(&self, uuid: &Identifier) -> bool {
        self.entries.contains_key(uuid)
    }

    /// Entry for an identifier.
    #[must_use]
    pub fn find(&self, uuid: &Identifier) -> Option<&DatablockProxy> {
        self.entries.get(uuid)
    }

    pub fn find_mut(&mut self, uuid: &Identifier) -> Option<&mut DatablockProxy> {
        self.entries.get_mut(uuid)
    }

    /// Entries whose cached name is `name`. Names are not unique across
    /// peers, so several entries may match.
    #[must_use]
    pub fn search(&self, name: &str) -> Vec<&DatablockProxy> {
        self.entries
            .values()
            .filter(|proxy| proxy.name() == Some(name))
            .collect()
    }

    /// First entry whose cached name is `name`.
    #[must_use]
    pub fn search_one(&self, name: &str) -> Option<&DatablockProxy> {
        self.search(name).into_iter().next()
    }

    /// Entries in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = &DatablockProxy> {
        self.entries.values()
    }

    /// Identifiers in order.
    pub fn identifiers(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.entries.keys().copied()
    }

    /// Inserts an entry without touching the host or the registry.
    pub fn insert(&mut self, proxy: DatablockProxy) -> Option<DatablockProxy> {
        self.entries.insert(proxy.uuid(), proxy)
    }

    /// Snapshots every tracked entity of the live collection and registers
    /// it.
    ///
    /// An entity sharing the identifier of an entity already loaded (a host
    /// duplicate) gets a fresh identifier. An entity that fails to load is
    /// logged and skipped.
    pub fn load(ctx: &mut Context<'_>, name: &str) -> Self {
        let mut proxy = Self::new(name);
        let Some(items) = ctx.graph.items(name) else {
            debug!("load: no live collection {name}");
            return proxy;
        };
        let filter = ctx.filter;
        for (item_name, live) in items {
            if !filter.is_tracked(name, &*ctx.graph, live) {
                continue;
            }
            if let Some(uuid) = ctx.graph.identifier(live)
                && proxy.entries.contains_key(&uuid)
            {
                info!("load: duplicate identifier {uuid} for {name}[{item_name}], resetting");
                if let Err(e) = ctx.graph.set_identifier(live, None) {
                    error!("load: cannot reset identifier of {name}[{item_name}]: {e}");
                    continue;
                }
            }
            match DatablockProxy::load(ctx, name, live) {
                Ok(entry) => {
                    ctx.state.register(entry.uuid(), live, name);
                    proxy.entries.insert(entry.uuid(), entry);
                }
                Err(e) => error!("load: {name}[{item_name}] skipped: {e}"),
            }
        }
        proxy
    }

    /// Writes every entry into the live collection.
    ///
    /// Entries reuse the registered entity, or a live entity of the same
    /// name, before a new one is instantiated. Each written entity is
    /// registered and the references waiting for it are resolved. Does
    /// nothing when empty or when the host has no such collection.
    pub fn save(&self, ctx: &mut Context<'_>) {
        if self.entries.is_empty() || ctx.graph.items(&self.name).is_none() {
            return;
        }
        for entry in self.entries.values() {
            let existing = entry.target(ctx).or_else(|| {
                entry
                    .name()
                    .and_then(|name| ctx.graph.get(&self.name, name))
            });
            let result = match existing {
                Some(live) => entry.update_standalone(ctx, live),
                None => entry.instantiate(ctx),
            };
            match result {
                Ok(live) => {
                    ctx.state.register(entry.uuid(), live, &self.name);
                    ctx.state.resolve(&mut *ctx.graph, entry.uuid(), live);
                }
                Err(e) => warn!("save: {entry} skipped: {e}"),
            }
        }
    }

    /// Creates the live entity for a snapshot received from a peer, then
    /// registers it and resolves the references waiting for it.
    ///
    /// Returns the live entity, `None` if none was created, and the renames
    /// applied to local entities to resolve a name conflict.
    pub fn create_entity(
        &mut self,
        ctx: &mut Context<'_>,
        incoming: DatablockProxy,
    ) -> ProxyResult<(Option<LiveHandle>, Vec<Rename>)> {
        let (live, mut renames) = incoming.create_standalone(ctx)?;
        for rename in &mut renames {
            if let Some(local) = self.entries.get_mut(&rename.uuid) {
                local.set_name(&rename.new_name);
            }
        }
        let Some(live) = live else {
            return Ok((None, renames));
        };

        let uuid = incoming.uuid();
        info!("create: {incoming} as {live}");
        ctx.state.register(uuid, live, &self.name);
        self.entries.insert(uuid, incoming);
        let resolved = ctx.state.resolve(&mut *ctx.graph, uuid, live);
        if resolved > 0 {
            debug!("create: resolved {resolved} deferred reference(s) to {uuid}");
        }
        self.remove_placeholder(ctx);
        Ok((Some(live), renames))
    }

    /// Drops the transitional container once a real one exists beside it.
    fn remove_placeholder(&mut self, ctx: &mut Context<'_>) {
        if self.name != ctx.config.container_collection {
            return;
        }
        let Some(placeholder) = ctx.config.placeholder_container.as_deref() else {
            return;
        };
        let Some(items) = ctx.graph.items(&self.name) else {
            return;
        };
        if items.len() != 2 {
            return;
        }
        let Some(live) = items
            .iter()
            .find_map(|(name, live)| (name == placeholder).then_some(*live))
        else {
            return;
        };

        let strategies = ctx.strategies;
        match strategies.entity(&self.name).remove(live, ctx) {
            Ok(()) => info!("removed placeholder {}[{placeholder}]", self.name),
            Err(e) => warn!("cannot remove placeholder {}[{placeholder}]: {e}", self.name),
        }
        if let Some(uuid) = ctx.state.identifier_of(live) {
            ctx.state.unregister(&uuid);
            self.entries.remove(&uuid);
        }
    }

    /// Applies an entity delta received from a peer.
    ///
    /// Missing proxies, identity mismatches and missing live entities are
    /// logged and the update is dropped. Returns the live entity after the
    /// update; when the update re-created it, the registry is repointed.
    pub fn update_entity(
        &mut self,
        ctx: &mut Context<'_>,
        delta: &DatablockDelta,
    ) -> Option<LiveHandle> {
        let uuid = delta.uuid;
        let Some(proxy) = self.entries.get_mut(&uuid) else {
            error!("update: {}", ProxyError::MissingProxy(uuid));
            return None;
        };
        let Some(live) = proxy.target(ctx) else {
            error!("update: {}", ProxyError::MissingLive(uuid));
            return None;
        };
        if let Some(resolved) = ctx.graph.identifier(live)
            && resolved != uuid
        {
            error!(
                "update: {}",
                ProxyError::IdentityMismatch {
                    incoming: uuid,
                    resolved
                }
            );
            return None;
        }

        match proxy.apply(ctx, delta, true) {
            Ok(Some(updated)) => {
                if updated != live {
                    warn!("update: {proxy} re-created, {live} is now {updated}");
                    ctx.state.set_live(uuid, updated);
                }
                Some(updated)
            }
            Ok(None) => None,
            Err(e) => {
                error!("update: {proxy}: {e}");
                None
            }
        }
    }

    /// Removes an entity and its entry.
    ///
    /// A live entity that is already gone, typically destroyed as a side
    /// effect of an earlier removal in the same batch, is not an error: the
    /// entry is dropped regardless. Returns the removed entry.
    pub fn remove_entity(
        &mut self,
        ctx: &mut Context<'_>,
        uuid: &Identifier,
    ) -> Option<DatablockProxy> {
        match ctx.state.live(uuid) {
            Some(live) => {
                let strategies = ctx.strategies;
                match strategies.entity(&self.name).remove(live, ctx) {
                    Ok(()) => info!("remove: {}[{uuid}] ({live})", self.name),
                    Err(HostError::Dangling(handle)) => {
                        warn!("remove: {}[{uuid}] already destroyed ({handle})", self.name);
                    }
                    Err(e) => error!("remove: {}[{uuid}]: {e}", self.name),
                }
                let purged = ctx.state.purge_owner(live);
                if purged > 0 {
                    debug!("remove: dropped {purged} pending link(s) into {}[{uuid}]", self.name);
                }
            }
            None => warn!("remove: {}", ProxyError::MissingLive(*uuid)),
        }
        ctx.state.unregister(uuid);
        self.entries.remove(uuid)
    }

    /// Renames an entity received from a peer. Returns the name the host
    /// assigned, which is also cached in the proxy.
    pub fn rename_entity(
        &mut self,
        ctx: &mut Context<'_>,
        uuid: &Identifier,
        new_name: &str,
    ) -> Option<String> {
        let Some(proxy) = self.entries.get_mut(uuid) else {
            error!("rename: {}", ProxyError::MissingProxy(*uuid));
            return None;
        };
        let Some(live) = proxy.target(ctx) else {
            error!("rename: {}", ProxyError::MissingLive(*uuid));
            return None;
        };
        match ctx.graph.rename(live, new_name) {
            Ok(actual) => {
                if actual != new_name {
                    warn!("rename: {proxy} to {new_name} became {actual}");
                }
                info!("rename: {proxy} into {actual}");
                proxy.set_name(&actual);
                Some(actual)
            }
            Err(e) => {
                error!("rename: {proxy}: {e}");
                None
            }
        }
    }

    /// Reconciles local additions, removals and renames reported by `diff`.
    ///
    /// Additions are processed in name order, removals and renames in the
    /// order reported. A failing item is logged and skipped.
    pub fn update(&mut self, ctx: &mut Context<'_>, diff: &CollectionDiff) -> Changeset {
        let mut changeset = Changeset::new();

        for (name, collection) in &diff.items_added {
            info!("perform creation for {collection}[{name}]");
            let Some(live) = ctx.graph.get(collection, name) else {
                error!("update: added {collection}[{name}] not found");
                continue;
            };
            match DatablockProxy::load(ctx, collection, live) {
                Ok(proxy) => {
                    let uuid = proxy.uuid();
                    ctx.state.register(uuid, live, collection);
                    ctx.state.resolve(&mut *ctx.graph, uuid, live);
                    self.entries.insert(uuid, proxy.clone());
                    changeset.creations.push(proxy);
                }
                Err(e @ ProxyError::MaxDepthExceeded { .. }) => {
                    error!("update: {collection}[{name}] nested too deep, skipped: {e}");
                }
                Err(e) => error!("update: cannot load {collection}[{name}]: {e}"),
            }
        }

        for uuid in &diff.items_removed {
            let Some(proxy) = self.entries.remove(uuid) else {
                error!("update: removal of {}", ProxyError::MissingProxy(*uuid));
                continue;
            };
            info!("perform removal for {proxy}");
            ctx.state.unregister(uuid);
            changeset.removals.push(Removal {
                uuid: *uuid,
                collection: self.name.clone(),
                label: proxy.to_string(),
            });
        }

        for (uuid, new_name) in &diff.items_renamed {
            let Some(proxy) = self.entries.get_mut(uuid) else {
                error!("update: rename of {}", ProxyError::MissingProxy(*uuid));
                continue;
            };
            let expected = ctx.state.live(uuid);
            let actual = ctx.graph.get(&self.name, new_name);
            if actual.is_none() || actual != expected {
                error!(
                    "update: rename {}[{new_name}] is {actual:?}, expected {expected:?} for {proxy}",
                    self.name
                );
            }
            let old_name = proxy.name().unwrap_or_default().to_string();
            changeset.renames.push(Rename {
                uuid: *uuid,
                old_name,
                new_name: new_name.clone(),
                label: proxy.to_string(),
            });
            proxy.set_name(new_name);
        }

        changeset
    }
}

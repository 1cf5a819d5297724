//! Synchronization session: stateful sync logic without I/O.
//!
//! The session owns the identity registry and the root snapshot of one
//! peer. It turns local edits into [`SyncMessage`]s and applies messages
//! received from other peers. The caller handles transport and decides
//! when each pass runs; the two passes must never run concurrently.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{EntityUpdate, Envelope, SyncMessage};
use scenesync_proxy::{
    BlendDiff, Changeset, Context, DataProxy, DatablockCollectionProxy, DatablockProxy,
    LiveGraph, ProxyState, Removal, Rename, StrategyTable,
};
use scenesync_types::{Identifier, LiveHandle};
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Everything one local-change pass found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalChanges {
    /// Entities created, removed or renamed.
    pub changeset: Changeset,
    /// Field changes of existing entities.
    pub updates: Vec<EntityUpdate>,
}

impl LocalChanges {
    /// Returns true if there is nothing to send.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changeset.is_empty() && self.updates.is_empty()
    }

    /// Messages to broadcast: creations, removals, one rename batch, then
    /// updates.
    #[must_use]
    pub fn messages(&self) -> Vec<SyncMessage> {
        let mut messages: Vec<SyncMessage> = self
            .changeset
            .creations
            .iter()
            .cloned()
            .map(SyncMessage::Create)
            .collect();
        messages.extend(
            self.changeset
                .removals
                .iter()
                .cloned()
                .map(SyncMessage::Remove),
        );
        if !self.changeset.renames.is_empty() {
            messages.push(SyncMessage::Rename(self.changeset.renames.clone()));
        }
        messages.extend(self.updates.iter().cloned().map(SyncMessage::Update));
        messages
    }
}

/// Synchronization state of one peer.
pub struct SyncSession {
    config: SyncConfig,
    strategies: StrategyTable,
    state: ProxyState,
    data: DataProxy,
}

impl SyncSession {
    /// Creates a session with the built-in construction strategies.
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        Self::with_strategies(config, StrategyTable::with_defaults())
    }

    /// Creates a session with a custom strategy table.
    #[must_use]
    pub fn with_strategies(config: SyncConfig, strategies: StrategyTable) -> Self {
        Self {
            config,
            strategies,
            state: ProxyState::new(),
            data: DataProxy::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Identity registry and pending references.
    #[must_use]
    pub fn state(&self) -> &ProxyState {
        &self.state
    }

    /// Root snapshot.
    #[must_use]
    pub fn data(&self) -> &DataProxy {
        &self.data
    }

    /// Snapshot of a synchronized collection.
    #[must_use]
    pub fn collection(&self, name: &str) -> Option<&DatablockCollectionProxy> {
        self.data.collection(name)
    }

    /// Snapshot of an entity.
    #[must_use]
    pub fn find(&self, uuid: &Identifier) -> Option<&DatablockProxy> {
        self.data.find(&self.state, uuid)
    }

    /// Wraps a message for sending from this peer.
    #[must_use]
    pub fn envelope(&self, message: SyncMessage) -> Envelope {
        Envelope::new(self.config.peer_name.clone(), message)
    }

    fn split<'a>(&'a mut self, graph: &'a mut dyn LiveGraph) -> (Context<'a>, &'a mut DataProxy) {
        let ctx = Context::new(
            graph,
            &mut self.state,
            &self.strategies,
            &self.config.filter,
            &self.config.proxy,
        );
        (ctx, &mut self.data)
    }

    fn check_collection(&self, collection: &str) -> SyncResult<()> {
        if self.config.is_synchronized(collection) {
            Ok(())
        } else {
            Err(SyncError::UnknownCollection(collection.to_string()))
        }
    }

    // ── Whole-graph passes ───────────────────────────────────────

    /// Snapshots every synchronized collection of the host, replacing any
    /// previous state.
    pub fn load(&mut self, graph: &mut dyn LiveGraph) {
        self.state = ProxyState::new();
        let collections = self.config.collections.clone();
        let (mut ctx, data) = self.split(graph);
        *data = DataProxy::load(&mut ctx, &collections);
        info!("loaded {} entities", ctx.state.len());
    }

    /// Writes the snapshot into the host, dependencies first.
    pub fn save(&mut self, graph: &mut dyn LiveGraph) {
        let (mut ctx, data) = self.split(graph);
        data.save(&mut ctx);
        let pending = ctx.state.unresolved().pending_links();
        if pending > 0 {
            warn!("save: {pending} reference(s) still unresolved");
        }
    }

    /// Detects local changes and brings the snapshot up to date.
    ///
    /// `updated` lists the live entities the host reports as modified.
    /// Entities created by this pass are sent whole and get no update.
    pub fn local_changes(
        &mut self,
        graph: &mut dyn LiveGraph,
        updated: &[LiveHandle],
    ) -> LocalChanges {
        let collections = self.config.collections.clone();
        let (mut ctx, data) = self.split(graph);
        let diff = BlendDiff::compute(&mut ctx, data, &collections);
        let changeset = data.update(&mut ctx, &diff);

        let mut seen: HashSet<Identifier> = changeset
            .creations
            .iter()
            .map(DatablockProxy::uuid)
            .collect();
        let mut updates = Vec::new();
        for live in updated {
            let Some(uuid) = ctx.state.identifier_of(*live) else {
                debug!("local update of untracked {live} ignored");
                continue;
            };
            if !seen.insert(uuid) {
                continue;
            }
            match data.diff_entity(&mut ctx, &uuid) {
                Ok(Some(delta)) => updates.push(EntityUpdate { uuid, delta }),
                Ok(None) => {}
                Err(e) => warn!("local update of {live}: {e}"),
            }
        }

        LocalChanges { changeset, updates }
    }

    // ── Inbound ──────────────────────────────────────────────────

    /// Creates an entity received from a peer. Returns the local renames
    /// made to resolve a name conflict, which peers must also apply.
    pub fn create(
        &mut self,
        graph: &mut dyn LiveGraph,
        incoming: DatablockProxy,
    ) -> SyncResult<Vec<Rename>> {
        self.check_collection(incoming.collection())?;
        let (mut ctx, data) = self.split(graph);
        let (live, renames) = data.create_entity(&mut ctx, incoming)?;
        if live.is_none() {
            debug!("create: no entity created");
        }
        Ok(renames)
    }

    /// Applies field changes received from a peer. Returns the live entity
    /// updated, if any.
    pub fn update(
        &mut self,
        graph: &mut dyn LiveGraph,
        update: &EntityUpdate,
    ) -> SyncResult<Option<LiveHandle>> {
        if update.uuid != update.delta.uuid {
            return Err(SyncError::Protocol(format!(
                "update for {} carries a delta for {}",
                update.uuid, update.delta.uuid
            )));
        }
        self.check_collection(&update.delta.collection)?;
        let (mut ctx, data) = self.split(graph);
        Ok(data.update_entity(&mut ctx, &update.delta))
    }

    /// Removes an entity on a peer's request. Returns its last snapshot.
    pub fn remove(
        &mut self,
        graph: &mut dyn LiveGraph,
        removal: &Removal,
    ) -> Option<DatablockProxy> {
        info!("remove {} ({})", removal.uuid, removal.label);
        let (mut ctx, data) = self.split(graph);
        data.remove_entity(&mut ctx, &removal.uuid)
    }

    /// Renames entities on a peer's request.
    ///
    /// When the host assigns a different name than requested, the actual
    /// name is returned as a rename for the peers to follow.
    pub fn rename(&mut self, graph: &mut dyn LiveGraph, renames: &[Rename]) -> Vec<Rename> {
        let (mut ctx, data) = self.split(graph);
        let mut corrections = Vec::new();
        for rename in renames {
            info!("rename {} ({}) into {}", rename.uuid, rename.old_name, rename.new_name);
            let Some(actual) = data.rename_entity(&mut ctx, &rename.uuid, &rename.new_name) else {
                continue;
            };
            if actual != rename.new_name {
                corrections.push(Rename {
                    uuid: rename.uuid,
                    old_name: rename.new_name.clone(),
                    new_name: actual.clone(),
                    label: format!("Conflict {} into {actual}", rename.new_name),
                });
            }
        }
        corrections
    }

    /// Applies one received message. Returns the messages to send back.
    pub fn handle(
        &mut self,
        graph: &mut dyn LiveGraph,
        message: SyncMessage,
    ) -> SyncResult<Vec<SyncMessage>> {
        let replies = match message {
            SyncMessage::Create(proxy) => self.create(graph, proxy)?,
            SyncMessage::Update(update) => {
                self.update(graph, &update)?;
                Vec::new()
            }
            SyncMessage::Remove(removal) => {
                self.remove(graph, &removal);
                Vec::new()
            }
            SyncMessage::Rename(renames) => self.rename(graph, &renames),
        };
        Ok(if replies.is_empty() {
            Vec::new()
        } else {
            vec![SyncMessage::Rename(replies)]
        })
    }

    /// Applies one received envelope. Returns the envelopes to send back.
    pub fn receive(
        &mut self,
        graph: &mut dyn LiveGraph,
        envelope: Envelope,
    ) -> SyncResult<Vec<Envelope>> {
        debug!("received {:?} from {}", envelope.message.identifiers(), envelope.sender);
        let replies = self.handle(graph, envelope.message)?;
        Ok(replies.into_iter().map(|m| self.envelope(m)).collect())
    }
}

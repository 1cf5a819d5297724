//! Snapshot of one standalone entity.

use crate::changeset::Rename;
use crate::context::Context;
use crate::delta::DatablockDelta;
use crate::error::{ProxyError, ProxyResult};
use crate::struct_proxy::{Fields, StructProxy};
use crate::value::ProxyValue;
use scenesync_types::{Identifier, LiveHandle, LivePath};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info, warn};

/// Field holding the entity name.
pub const NAME_FIELD: &str = "name";

/// Last synchronized state of a standalone entity: its identifier, the
/// collection owning it and its top-level fields.
///
/// The name lives in the `name` leaf. It is written at creation and changed
/// only through renames, never through field updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatablockProxy {
    uuid: Identifier,
    collection: String,
    fields: StructProxy,
}

impl DatablockProxy {
    #[must_use]
    pub fn new(uuid: Identifier, collection: &str, fields: StructProxy) -> Self {
        Self {
            uuid,
            collection: collection.to_string(),
            fields,
        }
    }

    #[must_use]
    pub fn uuid(&self) -> Identifier {
        self.uuid
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[must_use]
    pub fn fields(&self) -> &StructProxy {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut StructProxy {
        &mut self.fields
    }

    /// Cached entity name.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.leaf(NAME_FIELD)?.as_str()
    }

    /// Replaces the cached entity name.
    pub fn set_name(&mut self, name: &str) {
        self.fields
            .insert(NAME_FIELD, ProxyValue::Leaf(serde_json::Value::from(name)));
    }

    /// Snapshots the live entity, minting its identifier if it has none.
    pub fn load(ctx: &mut Context<'_>, collection: &str, live: LiveHandle) -> ProxyResult<Self> {
        let uuid = ctx.ensure_identifier(live)?;
        let fields = StructProxy::read(ctx, &LivePath::entity(live), Some(collection))?;
        Ok(Self::new(uuid, collection, fields))
    }

    /// The live entity registered for this identifier, if still alive.
    #[must_use]
    pub fn target(&self, ctx: &Context<'_>) -> Option<LiveHandle> {
        ctx.state.resolve_live(&self.uuid, &*ctx.graph)
    }

    /// Builds a brand new live entity through the collection's strategy and
    /// writes every field into it.
    pub(crate) fn instantiate(&self, ctx: &mut Context<'_>) -> ProxyResult<LiveHandle> {
        let strategies = ctx.strategies;
        let live = strategies
            .entity(&self.collection)
            .instantiate(self, ctx)
            .ok_or_else(|| ProxyError::ConstructionFailed(self.to_string()))?;
        self.update_standalone(ctx, live)
    }

    /// Writes every field into an existing live entity and tags it with
    /// this identifier. Returns the entity actually written, which differs
    /// from `live` when the strategy had to re-create it.
    pub(crate) fn update_standalone(
        &self,
        ctx: &mut Context<'_>,
        live: LiveHandle,
    ) -> ProxyResult<LiveHandle> {
        ctx.graph.set_identifier(live, Some(self.uuid))?;
        let strategies = ctx.strategies;
        let live = strategies
            .entity(&self.collection)
            .before_save(&self.fields, live, ctx)
            .ok_or_else(|| ProxyError::ConstructionFailed(self.to_string()))?;
        self.fields
            .save_except(ctx, &LivePath::entity(live), &[NAME_FIELD]);
        Ok(live)
    }

    /// Creates the live entity for a snapshot received from a peer.
    ///
    /// Returns the new live entity, or `None` when nothing was created, and
    /// the renames performed on local entities to resolve a name conflict.
    /// Registration is left to the owning collection.
    pub fn create_standalone(
        &self,
        ctx: &mut Context<'_>,
    ) -> ProxyResult<(Option<LiveHandle>, Vec<Rename>)> {
        if self.target(ctx).is_some() {
            warn!("create: {self} already registered, ignored");
            return Ok((None, Vec::new()));
        }
        let Some(name) = self.name() else {
            error!("create: {self} has no name, ignored");
            return Ok((None, Vec::new()));
        };

        let mut renames = Vec::new();
        if let Some(existing) = ctx.graph.get(&self.collection, name) {
            match ctx.graph.identifier(existing) {
                None => {
                    info!("create: adopting untagged {}[{name}] for {self}", self.collection);
                    return Ok((Some(self.update_standalone(ctx, existing)?), renames));
                }
                Some(uuid) if uuid == self.uuid => {
                    error!("create: unregistered identifier for {self}, ignored");
                    return Ok((None, renames));
                }
                Some(uuid) => {
                    let unique = format!("{name}_{uuid}");
                    let actual = ctx.graph.rename(existing, &unique)?;
                    warn!(
                        "create: name conflict, renamed existing {}[{name}] into {actual}",
                        self.collection
                    );
                    renames.push(Rename {
                        uuid,
                        old_name: name.to_string(),
                        new_name: actual.clone(),
                        label: format!("Conflict {}[{name}] into {actual}", self.collection),
                    });
                }
            }
        }

        match self.instantiate(ctx) {
            Ok(live) => Ok((Some(live), renames)),
            Err(e) => {
                warn!("create: cannot create {self}: {e}");
                Ok((None, renames))
            }
        }
    }

    /// Applies an entity delta to this snapshot and, with `to_live`, to the
    /// registered live entity.
    ///
    /// Returns the live entity after the update, which differs from the
    /// registered one when the update forced a re-creation.
    pub fn apply(
        &mut self,
        ctx: &mut Context<'_>,
        delta: &DatablockDelta,
        to_live: bool,
    ) -> ProxyResult<Option<LiveHandle>> {
        if !to_live {
            self.fields.apply(ctx, None, &delta.fields);
            return Ok(None);
        }
        let live = self
            .target(ctx)
            .ok_or(ProxyError::MissingLive(self.uuid))?;
        let strategies = ctx.strategies;
        let live = strategies
            .entity(&self.collection)
            .before_save(&delta.fields, live, ctx)
            .ok_or_else(|| ProxyError::ConstructionFailed(self.to_string()))?;
        self.fields
            .apply(ctx, Some(&LivePath::entity(live)), &delta.fields);
        Ok(Some(live))
    }

    /// Compares this snapshot with the live entity. The name is excluded,
    /// renames travel separately.
    pub fn diff(
        &self,
        ctx: &mut Context<'_>,
        live: LiveHandle,
    ) -> ProxyResult<Option<DatablockDelta>> {
        let Some(mut fields) =
            self.fields
                .diff_scoped(ctx, &LivePath::entity(live), Some(&self.collection))?
        else {
            return Ok(None);
        };
        fields.fields.remove(NAME_FIELD);
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(DatablockDelta {
            uuid: self.uuid,
            collection: self.collection.clone(),
            fields,
        }))
    }
}

impl fmt::Display for DatablockProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DatablockProxy {} for {}[{}]",
            self.uuid,
            self.collection,
            self.name().unwrap_or("")
        )
    }
}

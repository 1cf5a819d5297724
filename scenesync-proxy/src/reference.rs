//! References to standalone entities owned elsewhere.
//!
//! A reference is stored as the target's [`Identifier`] and resolved through
//! the registry at the last moment. A target that does not exist yet leaves
//! a deferred action in the unresolved-reference table instead of failing.

use crate::context::Context;
use crate::delta::MemberDelta;
use crate::error::{HostResult, ProxyResult};
use crate::host::{FieldWrite, LiveGraph};
use scenesync_types::{Identifier, LiveHandle, LivePath};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Pointer to a standalone entity by identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefProxy {
    uuid: Identifier,
    /// Human-readable name of the target when the reference was taken.
    label: String,
}

impl RefProxy {
    #[must_use]
    pub fn new(uuid: Identifier, label: &str) -> Self {
        Self {
            uuid,
            label: label.to_string(),
        }
    }

    /// References a live entity, minting its identifier if needed.
    pub fn from_live(ctx: &mut Context<'_>, live: LiveHandle) -> HostResult<Self> {
        let uuid = ctx.ensure_identifier(live)?;
        let label = ctx.graph.name(live).unwrap_or_default();
        Ok(Self { uuid, label })
    }

    #[must_use]
    pub fn uuid(&self) -> Identifier {
        self.uuid
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The live target, if registered and still alive.
    #[must_use]
    pub fn target(&self, ctx: &Context<'_>) -> Option<LiveHandle> {
        ctx.state.resolve_live(&self.uuid, &*ctx.graph)
    }
}

impl fmt::Display for RefProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RefProxy {} ({})", self.uuid, self.label)
    }
}

/// Writes a single reference field, deferring the write while the target is
/// unresolved.
///
/// Any write still pending for the field is withdrawn first.
pub(crate) fn write_reference(
    ctx: &mut Context<'_>,
    at: &LivePath,
    name: &str,
    value: Option<&RefProxy>,
) -> HostResult<()> {
    let cancelled = ctx.state.cancel_field(at, name);
    if cancelled > 0 {
        debug!("{at}.{name}: overwritten, {cancelled} pending write(s) dropped");
    }
    let Some(reference) = value else {
        return ctx.graph.set_field(at, name, FieldWrite::Reference(None));
    };
    if let Some(target) = reference.target(ctx) {
        return ctx
            .graph
            .set_field(at, name, FieldWrite::Reference(Some(target)));
    }
    debug!("{at}.{name}: {reference} unresolved, deferring");
    let path = at.clone();
    let field = name.to_string();
    ctx.state.defer(
        &mut *ctx.graph,
        reference.uuid,
        at,
        name,
        Box::new(move |graph: &mut dyn LiveGraph, target: LiveHandle| {
            graph.set_field(&path, &field, FieldWrite::Reference(Some(target)))
        }),
    );
    Ok(())
}

/// Membership list of entities owned elsewhere, keyed by identifier.
///
/// Never creates nor destroys the referenced entities, only the edges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefCollectionProxy {
    members: BTreeMap<Identifier, RefProxy>,
}

impl RefCollectionProxy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member.
    #[must_use]
    pub fn with(mut self, member: RefProxy) -> Self {
        self.members.insert(member.uuid, member);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[must_use]
    pub fn contains(&self, uuid: &Identifier) -> bool {
        self.members.contains_key(uuid)
    }

    #[must_use]
    pub fn get(&self, uuid: &Identifier) -> Option<&RefProxy> {
        self.members.get(uuid)
    }

    /// Member identifiers in order.
    pub fn identifiers(&self) -> impl Iterator<Item = Identifier> + '_ {
        self.members.keys().copied()
    }

    /// Snapshots the members of the collection `at.name`.
    ///
    /// Null slots are skipped.
    pub(crate) fn load(
        ctx: &mut Context<'_>,
        at: &LivePath,
        name: &str,
        members: &[Option<LiveHandle>],
    ) -> ProxyResult<Self> {
        let mut proxy = Self::default();
        for (index, member) in members.iter().enumerate() {
            let Some(live) = member else {
                warn!("{at}.{name}[{index}] is null, skipped");
                continue;
            };
            let reference = RefProxy::from_live(ctx, *live)?;
            proxy.members.insert(reference.uuid, reference);
        }
        Ok(proxy)
    }

    /// Inserts every member into the live collection `at.name`.
    ///
    /// Does nothing when empty or when the struct at `at` is absent.
    /// Unresolved members are linked once their target is created.
    pub(crate) fn save(&self, ctx: &mut Context<'_>, at: &LivePath, name: &str) -> HostResult<()> {
        if self.members.is_empty() || ctx.graph.fields(at).is_none() {
            return Ok(());
        }
        let mode = ctx.strategies.insertion(name);
        for reference in self.members.values() {
            match reference.target(ctx) {
                Some(target) => {
                    if let Err(e) = mode.insert(&mut *ctx.graph, at, name, target) {
                        warn!("cannot insert {reference} into {at}.{name}: {e}");
                    }
                }
                None => {
                    debug!("{at}.{name}: {reference} unresolved, deferring");
                    let path = at.clone();
                    let field = name.to_string();
                    ctx.state.defer(
                        &mut *ctx.graph,
                        reference.uuid,
                        at,
                        name,
                        Box::new(move |graph: &mut dyn LiveGraph, target: LiveHandle| {
                            mode.insert(graph, &path, &field, target)
                        }),
                    );
                }
            }
        }
        Ok(())
    }

    /// Applies membership changes to this snapshot and, when `at` is given,
    /// to the live collection `at.name`.
    ///
    /// Each member is handled on its own: a failure is logged and the batch
    /// continues. An addition whose target has not arrived yet is deferred;
    /// deleting that member again withdraws the deferred link.
    pub(crate) fn apply(
        &mut self,
        ctx: &mut Context<'_>,
        at: Option<&LivePath>,
        name: &str,
        members: &BTreeMap<Identifier, MemberDelta>,
    ) {
        let mode = ctx.strategies.insertion(name);
        for (uuid, change) in members {
            match change {
                MemberDelta::Addition(reference) => {
                    self.members.insert(*uuid, reference.clone());
                    let Some(at) = at else { continue };
                    match reference.target(ctx) {
                        Some(target) => {
                            if let Err(e) = mode.insert(&mut *ctx.graph, at, name, target) {
                                warn!("cannot insert {reference} into {at}.{name}: {e}");
                            }
                        }
                        None => {
                            warn!("{at}.{name}: {reference} not available yet, deferring");
                            let path = at.clone();
                            let field = name.to_string();
                            ctx.state.defer(
                                &mut *ctx.graph,
                                *uuid,
                                at,
                                name,
                                Box::new(move |graph: &mut dyn LiveGraph, target: LiveHandle| {
                                    mode.insert(graph, &path, &field, target)
                                }),
                            );
                        }
                    }
                }
                MemberDelta::Deletion(reference) => {
                    self.members.remove(uuid);
                    let Some(at) = at else { continue };
                    if ctx.state.cancel(uuid, at, name) {
                        continue;
                    }
                    match reference.target(ctx) {
                        Some(target) => {
                            if let Err(e) = ctx.graph.unlink(at, name, target) {
                                warn!("cannot remove {reference} from {at}.{name}: {e}");
                            }
                        }
                        None => debug!("{at}.{name}: {reference} already gone"),
                    }
                }
            }
        }
    }

    /// Set difference between the live members and this snapshot.
    ///
    /// Returns `None` when membership is unchanged.
    pub(crate) fn diff(
        &self,
        ctx: &mut Context<'_>,
        members: &[Option<LiveHandle>],
    ) -> ProxyResult<Option<BTreeMap<Identifier, MemberDelta>>> {
        let mut live = BTreeMap::new();
        for target in members.iter().flatten() {
            let reference = RefProxy::from_live(ctx, *target)?;
            live.insert(reference.uuid, reference);
        }

        let mut changes = BTreeMap::new();
        for (uuid, reference) in &live {
            if !self.members.contains_key(uuid) {
                changes.insert(*uuid, MemberDelta::Addition(reference.clone()));
            }
        }
        for (uuid, reference) in &self.members {
            if !live.contains_key(uuid) {
                changes.insert(*uuid, MemberDelta::Deletion(reference.clone()));
            }
        }
        Ok((!changes.is_empty()).then_some(changes))
    }
}

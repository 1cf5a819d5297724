//! Identity registry and unresolved-reference table.
//!
//! [`ProxyState`] is the only mutable state shared by the components of one
//! session. It is owned by the session and handed down explicitly through
//! [`Context`](crate::Context); nothing in this crate reaches it globally.

use crate::error::HostResult;
use crate::host::LiveGraph;
use scenesync_types::{Identifier, LiveHandle, LivePath};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

/// A linking action waiting for its target entity to exist.
///
/// Receives the host and the now-available target.
pub type DeferredLink = Box<dyn FnOnce(&mut dyn LiveGraph, LiveHandle) -> HostResult<()> + Send>;

/// A deferred action and the field it writes into.
struct PendingLink {
    at: LivePath,
    field: String,
    link: DeferredLink,
}

impl PendingLink {
    fn writes(&self, at: &LivePath, field: &str) -> bool {
        self.at == *at && self.field == field
    }

    /// True for `at.field` itself and for any struct nested below it.
    fn is_within(&self, at: &LivePath, field: &str) -> bool {
        if self.writes(at, field) {
            return true;
        }
        let below = at.field(field);
        self.at.root() == below.root() && self.at.segments().starts_with(below.segments())
    }
}

/// References to identifiers that are not in the registry yet, each with the
/// actions to run once the target appears.
///
/// Needed because no creation order can satisfy every dependency: containers
/// reference each other and entities may reference entities created later
/// in the same batch. Each action is keyed by its target and by the field it
/// writes, so a later change to that field can withdraw it.
#[derive(Default)]
pub struct UnresolvedRefs {
    refs: HashMap<Identifier, Vec<PendingLink>>,
}

impl UnresolvedRefs {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the action linking `target` into `at.field`.
    ///
    /// Replaces an action already waiting for the same target and field.
    pub fn append(&mut self, target: Identifier, at: &LivePath, field: &str, link: DeferredLink) {
        let links = self.refs.entry(target).or_default();
        links.retain(|pending| !pending.writes(at, field));
        links.push(PendingLink {
            at: at.clone(),
            field: field.to_string(),
            link,
        });
    }

    /// Withdraws the action linking `target` into `at.field`.
    ///
    /// Returns true if one was waiting.
    pub fn cancel(&mut self, target: &Identifier, at: &LivePath, field: &str) -> bool {
        let Some(links) = self.refs.get_mut(target) else {
            return false;
        };
        let before = links.len();
        links.retain(|pending| !pending.writes(at, field));
        let cancelled = links.len() != before;
        if links.is_empty() {
            self.refs.remove(target);
        }
        cancelled
    }

    /// Withdraws every action writing into `at.field` or below it, whatever
    /// the target. Returns the number withdrawn.
    pub fn cancel_field(&mut self, at: &LivePath, field: &str) -> usize {
        self.drop_where(|pending| pending.is_within(at, field))
    }

    /// Withdraws every action writing into the entity `owner`.
    pub fn purge_owner(&mut self, owner: LiveHandle) -> usize {
        self.drop_where(|pending| pending.at.root() == owner)
    }

    fn drop_where(&mut self, mut predicate: impl FnMut(&PendingLink) -> bool) -> usize {
        let mut dropped = 0;
        self.refs.retain(|_, links| {
            let before = links.len();
            links.retain(|pending| !predicate(pending));
            dropped += before - links.len();
            !links.is_empty()
        });
        dropped
    }

    /// Runs and clears every action registered for `target`, in registration
    /// order. Returns the number of actions run.
    pub fn resolve(
        &mut self,
        target: Identifier,
        live: LiveHandle,
        graph: &mut dyn LiveGraph,
    ) -> usize {
        let Some(links) = self.refs.remove(&target) else {
            return 0;
        };
        let count = links.len();
        for PendingLink { at, field, link } in links {
            info!("resolving reference to {target} ({live}) in {at}.{field}");
            if let Err(e) = link(&mut *graph, live) {
                warn!("deferred link to {target} ({live}) failed: {e}");
            }
        }
        count
    }

    /// Returns true if actions are waiting for `target`.
    #[must_use]
    pub fn is_pending(&self, target: &Identifier) -> bool {
        self.refs.contains_key(target)
    }

    /// Number of distinct unresolved targets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.refs.len()
    }

    /// Returns true if nothing is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Total number of waiting actions.
    #[must_use]
    pub fn pending_links(&self) -> usize {
        self.refs.values().map(Vec::len).sum()
    }
}

impl fmt::Debug for UnresolvedRefs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.refs.iter().map(|(k, v)| (k, v.len())))
            .finish()
    }
}

/// Identity registry of one session.
///
/// Maps each identifier to its live entity and to the collection owning its
/// proxy. The proxies themselves are owned by their collection; the registry
/// only locates them, so there is never more than one proxy per identifier.
#[derive(Debug, Default)]
pub struct ProxyState {
    /// Identifier -> live entity.
    datablocks: HashMap<Identifier, LiveHandle>,
    /// Identifier -> name of the collection owning the proxy.
    proxies: HashMap<Identifier, String>,
    /// References waiting for their target.
    unresolved: UnresolvedRefs,
}

impl ProxyState {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts both mappings for an identifier.
    pub fn register(&mut self, id: Identifier, live: LiveHandle, collection: &str) {
        self.datablocks.insert(id, live);
        self.proxies.insert(id, collection.to_string());
    }

    /// Repoints the live mapping of an identifier, e.g. after a morph.
    pub fn set_live(&mut self, id: Identifier, live: LiveHandle) {
        self.datablocks.insert(id, live);
    }

    /// Removes both mappings. Returns the live entity that was registered.
    pub fn unregister(&mut self, id: &Identifier) -> Option<LiveHandle> {
        self.proxies.remove(id);
        self.datablocks.remove(id)
    }

    /// Registered live entity, without checking it still exists.
    #[must_use]
    pub fn live(&self, id: &Identifier) -> Option<LiveHandle> {
        self.datablocks.get(id).copied()
    }

    /// Registered live entity, only if the host still has it.
    #[must_use]
    pub fn resolve_live(&self, id: &Identifier, graph: &dyn LiveGraph) -> Option<LiveHandle> {
        self.live(id).filter(|live| graph.contains(*live))
    }

    /// Collection owning the proxy of an identifier.
    #[must_use]
    pub fn proxy_collection(&self, id: &Identifier) -> Option<&str> {
        self.proxies.get(id).map(String::as_str)
    }

    /// Reverse lookup of the identifier registered for a live entity.
    #[must_use]
    pub fn identifier_of(&self, live: LiveHandle) -> Option<Identifier> {
        self.datablocks
            .iter()
            .find_map(|(id, handle)| (*handle == live).then_some(*id))
    }

    /// Returns true if the identifier has a live entity.
    #[must_use]
    pub fn is_registered(&self, id: &Identifier) -> bool {
        self.datablocks.contains_key(id)
    }

    /// Number of registered live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.datablocks.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.datablocks.is_empty()
    }

    /// The unresolved-reference table.
    #[must_use]
    pub fn unresolved(&self) -> &UnresolvedRefs {
        &self.unresolved
    }

    /// Defers `link`, which writes into `at.field`, until `target` is
    /// registered.
    ///
    /// If the target already resolves, the action runs immediately so no
    /// entry lingers for an existing entity.
    pub fn defer(
        &mut self,
        graph: &mut dyn LiveGraph,
        target: Identifier,
        at: &LivePath,
        field: &str,
        link: DeferredLink,
    ) {
        match self.resolve_live(&target, &*graph) {
            Some(live) => {
                debug!("reference to {target} already resolved, linking now");
                self.unresolved.cancel(&target, at, field);
                if let Err(e) = link(&mut *graph, live) {
                    warn!("link to {target} ({live}) failed: {e}");
                }
            }
            None => {
                debug!("deferring link to unresolved {target} in {at}.{field}");
                self.unresolved.append(target, at, field, link);
            }
        }
    }

    /// Withdraws the pending link of `target` into `at.field`.
    pub fn cancel(&mut self, target: &Identifier, at: &LivePath, field: &str) -> bool {
        let cancelled = self.unresolved.cancel(target, at, field);
        if cancelled {
            debug!("cancelled pending link to {target} in {at}.{field}");
        }
        cancelled
    }

    /// Withdraws every pending link writing into `at.field` or below it.
    pub fn cancel_field(&mut self, at: &LivePath, field: &str) -> usize {
        self.unresolved.cancel_field(at, field)
    }

    /// Withdraws every pending link writing into the entity `owner`.
    pub fn purge_owner(&mut self, owner: LiveHandle) -> usize {
        self.unresolved.purge_owner(owner)
    }

    /// Runs every action waiting for `target`, now available as `live`.
    pub fn resolve(&mut self, graph: &mut dyn LiveGraph, target: Identifier, live: LiveHandle) -> usize {
        self.unresolved.resolve(target, live, graph)
    }
}

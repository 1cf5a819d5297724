//! Construction strategy table.
//!
//! Per-collection logic to instantiate, prepare and remove live entities,
//! plus the per-field policies used when writing collections back into the
//! host. The engine looks strategies up by collection name; unknown names
//! fall back to [`DefaultStrategy`].

use crate::context::Context;
use crate::datablock::DatablockProxy;
use crate::error::HostResult;
use crate::host::{LiveGraph, LiveValue};
use crate::struct_proxy::Fields;
use scenesync_types::{LiveHandle, LivePath};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a member is inserted into a reference collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ReferenceInsertion {
    /// Set-like insertion, a no-op when already a member.
    #[default]
    Link,
    /// Sequence-like insertion at the end.
    Append,
}

impl ReferenceInsertion {
    /// Inserts `target` into the collection field `name` of the struct at `at`.
    pub fn insert(
        self,
        graph: &mut dyn LiveGraph,
        at: &LivePath,
        name: &str,
        target: LiveHandle,
    ) -> HostResult<()> {
        match self {
            Self::Link => graph.link(at, name, target),
            Self::Append => graph.append(at, name, target),
        }
    }
}

/// How a live struct collection is shrunk before incoming elements are
/// written into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TruncatePolicy {
    /// Remove every element, then add all incoming ones.
    ClearAndRebuild,
    /// Drop surplus elements from the end, then add the missing ones.
    Resize,
    /// Remove live keys absent from the proxy, add proxy keys absent live.
    #[default]
    KeyDifference,
}

/// Instantiation and teardown logic for one collection.
pub trait ConstructionStrategy: Send + Sync {
    /// Creates the live entity for `proxy`. Returns `None` if it cannot be
    /// built; the caller logs and moves on.
    fn instantiate(&self, proxy: &DatablockProxy, ctx: &mut Context<'_>) -> Option<LiveHandle> {
        let name = proxy.name()?;
        match ctx.graph.create(proxy.collection(), name, None) {
            Ok(live) => Some(live),
            Err(e) => {
                warn!("cannot create {proxy}: {e}");
                None
            }
        }
    }

    /// Runs before incoming fields are written into `live`.
    ///
    /// Returns the entity to write into, which differs from `live` when the
    /// incoming fields force the host to re-create it.
    fn before_save(
        &self,
        _incoming: &dyn Fields,
        live: LiveHandle,
        _ctx: &mut Context<'_>,
    ) -> Option<LiveHandle> {
        Some(live)
    }

    /// Destroys the live entity.
    fn remove(&self, live: LiveHandle, ctx: &mut Context<'_>) -> HostResult<()> {
        ctx.graph.remove(live)
    }
}

/// Plain creation by name, plain removal.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStrategy;

impl ConstructionStrategy for DefaultStrategy {}

/// Lights are created with their sub-type and re-created when it changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct LightStrategy;

impl LightStrategy {
    /// Leaf holding the light sub-type.
    pub const KIND_FIELD: &'static str = "type";
}

impl ConstructionStrategy for LightStrategy {
    fn instantiate(&self, proxy: &DatablockProxy, ctx: &mut Context<'_>) -> Option<LiveHandle> {
        let name = proxy.name()?;
        let kind = proxy
            .fields()
            .leaf(Self::KIND_FIELD)
            .and_then(serde_json::Value::as_str);
        match ctx.graph.create(proxy.collection(), name, kind) {
            Ok(live) => Some(live),
            Err(e) => {
                warn!("cannot create {proxy}: {e}");
                None
            }
        }
    }

    fn before_save(
        &self,
        incoming: &dyn Fields,
        live: LiveHandle,
        ctx: &mut Context<'_>,
    ) -> Option<LiveHandle> {
        let Some(kind) = incoming
            .leaf(Self::KIND_FIELD)
            .and_then(serde_json::Value::as_str)
        else {
            return Some(live);
        };
        if ctx.graph.kind(live).as_deref() == Some(kind) {
            return Some(live);
        }
        match ctx.graph.set_kind(live, kind) {
            Ok(morphed) => {
                debug!("light {live} morphed into {kind} as {morphed}");
                Some(morphed)
            }
            Err(e) => {
                warn!("cannot change light {live} into {kind}: {e}");
                Some(live)
            }
        }
    }
}

/// Workspace containers drop every membership edge before being removed.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContainerStrategy;

impl ConstructionStrategy for ContainerStrategy {
    fn remove(&self, live: LiveHandle, ctx: &mut Context<'_>) -> HostResult<()> {
        let at = LivePath::entity(live);
        for (field, value) in ctx.graph.fields(&at).unwrap_or_default() {
            let LiveValue::References(members) = value else {
                continue;
            };
            for member in members.into_iter().flatten() {
                if let Err(e) = ctx.graph.unlink(&at, &field, member) {
                    debug!("unlink {member} from {at}.{field}: {e}");
                }
            }
        }
        ctx.graph.remove(live)
    }
}

/// Strategies and policies keyed by collection or field name.
#[derive(Clone)]
pub struct StrategyTable {
    entities: HashMap<String, Arc<dyn ConstructionStrategy>>,
    fallback: Arc<dyn ConstructionStrategy>,
    insertion: HashMap<String, ReferenceInsertion>,
    truncation: HashMap<String, TruncatePolicy>,
    ranks: HashMap<String, u32>,
}

impl StrategyTable {
    /// Creates a table where everything uses the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            fallback: Arc::new(DefaultStrategy),
            insertion: HashMap::new(),
            truncation: HashMap::new(),
            ranks: HashMap::new(),
        }
    }

    /// Creates the table with the built-in strategies for a scene graph.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut table = Self::new();
        table.register("lights", Arc::new(LightStrategy));
        table.register("scenes", Arc::new(ContainerStrategy));

        table.set_insertion("objects", ReferenceInsertion::Link);
        table.set_insertion("children", ReferenceInsertion::Link);
        table.set_insertion("materials", ReferenceInsertion::Append);

        for field in ["modifiers", "constraints"] {
            table.set_truncation(field, TruncatePolicy::ClearAndRebuild);
        }
        for field in ["vertices", "edges", "loops", "polygons"] {
            table.set_truncation(field, TruncatePolicy::Resize);
        }

        table.set_rank("objects", 1);
        table.set_rank("collections", 2);
        table.set_rank("scenes", 3);
        info!("strategy table initialized with built-in strategies");
        table
    }

    /// Registers the strategy of a collection, replacing any previous one.
    pub fn register(&mut self, collection: &str, strategy: Arc<dyn ConstructionStrategy>) {
        self.entities.insert(collection.to_string(), strategy);
    }

    /// Sets how members are inserted into reference collections named `field`.
    pub fn set_insertion(&mut self, field: &str, mode: ReferenceInsertion) {
        self.insertion.insert(field.to_string(), mode);
    }

    /// Sets how struct collections named `field` are truncated.
    pub fn set_truncation(&mut self, field: &str, policy: TruncatePolicy) {
        self.truncation.insert(field.to_string(), policy);
    }

    /// Sets the creation rank of a collection.
    pub fn set_rank(&mut self, collection: &str, rank: u32) {
        self.ranks.insert(collection.to_string(), rank);
    }

    /// Strategy of a collection.
    #[must_use]
    pub fn entity(&self, collection: &str) -> &dyn ConstructionStrategy {
        &**self.entities.get(collection).unwrap_or(&self.fallback)
    }

    /// Insertion mode of a reference collection field.
    #[must_use]
    pub fn insertion(&self, field: &str) -> ReferenceInsertion {
        self.insertion.get(field).copied().unwrap_or_default()
    }

    /// Truncation policy of a struct collection field.
    #[must_use]
    pub fn truncation(&self, field: &str) -> TruncatePolicy {
        self.truncation.get(field).copied().unwrap_or_default()
    }

    /// Creation rank of a collection. Entities of lower rank are created
    /// first; data kinds without a rank come first.
    #[must_use]
    pub fn rank(&self, collection: &str) -> u32 {
        self.ranks.get(collection).copied().unwrap_or(0)
    }
}

impl Default for StrategyTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for StrategyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut entities: Vec<_> = self.entities.keys().collect();
        entities.sort();
        f.debug_struct("StrategyTable")
            .field("entities", &entities)
            .field("insertion", &self.insertion)
            .field("truncation", &self.truncation)
            .field("ranks", &self.ranks)
            .finish()
    }
}

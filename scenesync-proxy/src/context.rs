//! Per-pass context threaded through every proxy operation.

use crate::config::ProxyConfig;
use crate::error::{HostResult, ProxyError, ProxyResult};
use crate::filter::FilterPolicy;
use crate::host::LiveGraph;
use crate::state::ProxyState;
use crate::strategy::StrategyTable;
use scenesync_types::{Identifier, LiveHandle, LivePath};

/// Everything a proxy operation may read or mutate.
///
/// Built by the session for the duration of one pass (local-change detection
/// or remote application). The two passes never overlap, so a single
/// exclusive borrow of the host and of the registry is enough.
pub struct Context<'a> {
    /// The live graph being mirrored.
    pub graph: &'a mut dyn LiveGraph,
    /// Identity registry and unresolved references.
    pub state: &'a mut ProxyState,
    /// Per-collection construction logic.
    pub strategies: &'a StrategyTable,
    /// Inclusion policy for entities and fields.
    pub filter: &'a dyn FilterPolicy,
    /// Engine tunables.
    pub config: &'a ProxyConfig,
}

impl<'a> Context<'a> {
    /// Assembles a context from its parts.
    #[must_use]
    pub fn new(
        graph: &'a mut dyn LiveGraph,
        state: &'a mut ProxyState,
        strategies: &'a StrategyTable,
        filter: &'a dyn FilterPolicy,
        config: &'a ProxyConfig,
    ) -> Self {
        Self {
            graph,
            state,
            strategies,
            filter,
            config,
        }
    }

    /// Returns the identifier of a live entity, minting and writing one if
    /// the entity has none yet.
    pub fn ensure_identifier(&mut self, live: LiveHandle) -> HostResult<Identifier> {
        if let Some(id) = self.graph.identifier(live) {
            return Ok(id);
        }
        let id = Identifier::new();
        self.graph.set_identifier(live, Some(id))?;
        Ok(id)
    }

    /// Fails once `path` nests deeper than the configured limit.
    pub(crate) fn check_depth(&self, path: &LivePath) -> ProxyResult<()> {
        if path.depth() > self.config.max_depth {
            return Err(ProxyError::MaxDepthExceeded {
                depth: path.depth(),
                limit: self.config.max_depth,
                path: path.to_string(),
            });
        }
        Ok(())
    }
}

//! Proxy engine configuration.

use serde::{Deserialize, Serialize};

/// Default structural-nesting limit when snapshotting an entity.
pub const DEFAULT_MAX_DEPTH: usize = 30;

/// Tunables of the proxy engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Maximum nesting of structs below an entity before loading gives up.
    pub max_depth: usize,
    /// Collection holding the top-level workspace containers.
    pub container_collection: String,
    /// Name of the transitional container a session may still hold after
    /// initialization. Removed once a real container is received.
    pub placeholder_container: Option<String>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            container_collection: "scenes".to_string(),
            placeholder_container: Some("_to_be_removed_".to_string()),
        }
    }
}

//! Session configuration.

use crate::error::SyncResult;
use scenesync_proxy::{ProxyConfig, SyncFilter};
use serde::{Deserialize, Serialize};

/// Collections synchronized by default, in dependency order.
pub const DEFAULT_COLLECTIONS: [&str; 8] = [
    "images",
    "lights",
    "cameras",
    "materials",
    "meshes",
    "objects",
    "collections",
    "scenes",
];

/// Configuration of a synchronization session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Name this peer reports in outgoing envelopes.
    pub peer_name: String,
    /// Top-level collections taking part in synchronization.
    pub collections: Vec<String>,
    /// Proxy engine tunables.
    pub proxy: ProxyConfig,
    /// Entities and fields left out of synchronization.
    pub filter: SyncFilter,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            peer_name: "scenesync peer".to_string(),
            collections: DEFAULT_COLLECTIONS.iter().map(|c| c.to_string()).collect(),
            proxy: ProxyConfig::default(),
            filter: SyncFilter::default(),
        }
    }
}

impl SyncConfig {
    /// Parses a JSON document; missing keys keep their default.
    pub fn from_json(json: &str) -> SyncResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns true if `collection` is synchronized.
    #[must_use]
    pub fn is_synchronized(&self, collection: &str) -> bool {
        self.collections.iter().any(|c| c == collection)
    }
}

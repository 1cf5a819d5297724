//! Result of one synchronization pass over standalone collections.

use crate::datablock::DatablockProxy;
use crate::strategy::StrategyTable;
use scenesync_types::Identifier;
use serde::{Deserialize, Serialize};

/// A standalone entity that disappeared locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Removal {
    pub uuid: Identifier,
    /// Collection the entity belonged to.
    pub collection: String,
    pub label: String,
}

/// A standalone entity whose name changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rename {
    pub uuid: Identifier,
    pub old_name: String,
    pub new_name: String,
    pub label: String,
}

/// Creations, removals and renames detected by one pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changeset {
    pub creations: Vec<DatablockProxy>,
    pub removals: Vec<Removal>,
    pub renames: Vec<Rename>,
}

impl Changeset {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the pass found nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creations.is_empty() && self.removals.is_empty() && self.renames.is_empty()
    }

    /// Appends the lists of another changeset.
    pub fn extend(&mut self, other: Changeset) {
        self.creations.extend(other.creations);
        self.removals.extend(other.removals);
        self.renames.extend(other.renames);
    }

    /// Stably orders creations by collection rank, so that entities are sent
    /// before the entities that depend on them.
    pub fn sort_creations(&mut self, strategies: &StrategyTable) {
        self.creations
            .sort_by_key(|proxy| strategies.rank(proxy.collection()));
    }
}

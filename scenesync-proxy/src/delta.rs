//! Delta model.
//!
//! A [`Delta`] describes the change of one mapping entry (a field name or a
//! collection key). Nested changes are carried by [`DeltaValue`], so one
//! synchronization pass yields one delta tree per changed entity. Deltas are
//! never merged or compacted.

use crate::reference::RefProxy;
use crate::struct_proxy::Fields;
use crate::value::ProxyValue;
use scenesync_types::Identifier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Change of one mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Delta {
    /// The entry appeared, or its value must be replaced wholesale.
    Addition { value: ProxyValue },
    /// The entry disappeared. Carries the old value.
    Deletion { value: ProxyValue },
    /// The entry changed in place.
    Update {
        value: DeltaValue,
        /// The value before the change, kept for diagnostics.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        previous: Option<Box<ProxyValue>>,
    },
}

impl Delta {
    /// An in-place update without diagnostics.
    #[must_use]
    pub fn update(value: DeltaValue) -> Self {
        Self::Update {
            value,
            previous: None,
        }
    }

    /// Returns true for an addition.
    #[must_use]
    pub fn is_addition(&self) -> bool {
        matches!(self, Self::Addition { .. })
    }

    /// Returns true for a deletion.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        matches!(self, Self::Deletion { .. })
    }
}

/// Payload of an in-place update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DeltaValue {
    /// New leaf value.
    Leaf(serde_json::Value),
    /// Changes inside a nested struct.
    Struct(StructDelta),
    /// New target of a single reference.
    Reference(Option<RefProxy>),
    /// Membership changes of a reference collection.
    References(BTreeMap<Identifier, MemberDelta>),
    /// Per-key changes of a struct collection, in live order.
    Elements(Vec<(String, Delta)>),
}

/// Membership change of a reference collection.
///
/// Reference collections have no in-place updates: a changed member is a
/// deletion followed by an addition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum MemberDelta {
    Addition(RefProxy),
    Deletion(RefProxy),
}

impl MemberDelta {
    /// The reference being added or removed.
    #[must_use]
    pub fn reference(&self) -> &RefProxy {
        match self {
            Self::Addition(r) | Self::Deletion(r) => r,
        }
    }
}

/// Changed fields of one struct, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructDelta {
    pub fields: BTreeMap<String, Delta>,
}

impl StructDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the change of one field.
    #[must_use]
    pub fn with(mut self, field: &str, delta: Delta) -> Self {
        self.fields.insert(field.to_string(), delta);
        self
    }

    /// Returns true if no field changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Number of changed fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Change of one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Delta> {
        self.fields.get(field)
    }
}

impl Fields for StructDelta {
    fn leaf(&self, name: &str) -> Option<&serde_json::Value> {
        match self.fields.get(name)? {
            Delta::Addition {
                value: ProxyValue::Leaf(value),
            }
            | Delta::Update {
                value: DeltaValue::Leaf(value),
                ..
            } => Some(value),
            _ => None,
        }
    }
}

/// Changes of one standalone entity, addressed by identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatablockDelta {
    pub uuid: Identifier,
    pub collection: String,
    pub fields: StructDelta,
}

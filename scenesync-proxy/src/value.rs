//! Snapshot value of one field.

use crate::context::Context;
use crate::delta::{Delta, DeltaValue};
use crate::elements::StructCollectionProxy;
use crate::error::{ProxyError, ProxyResult};
use crate::host::{FieldWrite, LiveValue};
use crate::reference::{self, RefCollectionProxy, RefProxy};
use crate::struct_proxy::StructProxy;
use scenesync_types::LivePath;
use serde::{Deserialize, Serialize};

/// Snapshot of one field of a live struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ProxyValue {
    /// Opaque scalar or flat array.
    Leaf(serde_json::Value),
    /// Nested struct.
    Struct(StructProxy),
    /// Pointer to a standalone entity, `None` for a null pointer.
    Reference(Option<RefProxy>),
    /// Membership list of entities owned elsewhere.
    References(RefCollectionProxy),
    /// Keyed collection of nested structs.
    Elements(StructCollectionProxy),
}

impl ProxyValue {
    /// Leaf value, if this is a leaf.
    #[must_use]
    pub fn as_leaf(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Leaf(value) => Some(value),
            _ => None,
        }
    }

    /// Nested struct, if this is one.
    #[must_use]
    pub fn as_struct(&self) -> Option<&StructProxy> {
        match self {
            Self::Struct(value) => Some(value),
            _ => None,
        }
    }

    /// Reference collection, if this is one.
    #[must_use]
    pub fn as_references(&self) -> Option<&RefCollectionProxy> {
        match self {
            Self::References(value) => Some(value),
            _ => None,
        }
    }

    /// Struct collection, if this is one.
    #[must_use]
    pub fn as_elements(&self) -> Option<&StructCollectionProxy> {
        match self {
            Self::Elements(value) => Some(value),
            _ => None,
        }
    }

    /// Snapshots the field `name` of the struct at `at`.
    pub(crate) fn load(
        ctx: &mut Context<'_>,
        at: &LivePath,
        name: &str,
        live: LiveValue,
    ) -> ProxyResult<Self> {
        Ok(match live {
            LiveValue::Leaf(value) => Self::Leaf(value),
            LiveValue::Struct => Self::Struct(StructProxy::load(ctx, &at.field(name))?),
            LiveValue::Reference(None) => Self::Reference(None),
            LiveValue::Reference(Some(target)) => {
                Self::Reference(Some(RefProxy::from_live(ctx, target)?))
            }
            LiveValue::References(members) => {
                Self::References(RefCollectionProxy::load(ctx, at, name, &members)?)
            }
            LiveValue::Elements(keys) => {
                Self::Elements(StructCollectionProxy::load(ctx, at, name, &keys)?)
            }
        })
    }

    /// Writes this value into the field `name` of the struct at `at`.
    pub(crate) fn save(&self, ctx: &mut Context<'_>, at: &LivePath, name: &str) -> ProxyResult<()> {
        match self {
            Self::Leaf(value) => ctx.graph.set_field(at, name, FieldWrite::Leaf(value.clone()))?,
            Self::Struct(value) => value.save(ctx, &at.field(name)),
            Self::Reference(value) => reference::write_reference(ctx, at, name, value.as_ref())?,
            Self::References(value) => value.save(ctx, at, name)?,
            Self::Elements(value) => value.save(ctx, at, name)?,
        }
        Ok(())
    }

    /// Compares this value with the live field `name` of the struct at `at`.
    ///
    /// A live field whose shape changed is reported as an addition that
    /// replaces the whole value.
    pub(crate) fn diff(
        &self,
        ctx: &mut Context<'_>,
        at: &LivePath,
        name: &str,
        live: LiveValue,
    ) -> ProxyResult<Option<Delta>> {
        let delta = match (self, live) {
            (Self::Leaf(old), LiveValue::Leaf(new)) => (*old != new).then(|| Delta::Update {
                value: DeltaValue::Leaf(new),
                previous: Some(Box::new(self.clone())),
            }),
            (Self::Struct(old), LiveValue::Struct) => old
                .diff(ctx, &at.field(name))?
                .map(|d| Delta::update(DeltaValue::Struct(d))),
            (Self::Reference(old), LiveValue::Reference(target)) => {
                let new = target.map(|t| RefProxy::from_live(ctx, t)).transpose()?;
                let changed = old.as_ref().map(RefProxy::uuid) != new.as_ref().map(RefProxy::uuid);
                changed.then(|| Delta::Update {
                    value: DeltaValue::Reference(new),
                    previous: Some(Box::new(self.clone())),
                })
            }
            (Self::References(old), LiveValue::References(members)) => old
                .diff(ctx, &members)?
                .map(|d| Delta::update(DeltaValue::References(d))),
            (Self::Elements(old), LiveValue::Elements(keys)) => old
                .diff(ctx, at, name, &keys)?
                .map(|d| Delta::update(DeltaValue::Elements(d))),
            (_, live) => Some(Delta::Addition {
                value: Self::load(ctx, at, name, live)?,
            }),
        };
        Ok(delta)
    }

    /// Applies an in-place update to this value and, when `at` is given, to
    /// the live field `name` of the struct at `at`.
    pub(crate) fn apply(
        &mut self,
        ctx: &mut Context<'_>,
        at: Option<&LivePath>,
        name: &str,
        delta: &DeltaValue,
    ) -> ProxyResult<()> {
        match (self, delta) {
            (Self::Leaf(current), DeltaValue::Leaf(value)) => {
                *current = value.clone();
                if let Some(at) = at {
                    ctx.graph.set_field(at, name, FieldWrite::Leaf(value.clone()))?;
                }
            }
            (Self::Struct(current), DeltaValue::Struct(delta)) => {
                let path = at.map(|at| at.field(name));
                current.apply(ctx, path.as_ref(), delta);
            }
            (Self::Reference(current), DeltaValue::Reference(value)) => {
                current.clone_from(value);
                if let Some(at) = at {
                    reference::write_reference(ctx, at, name, value.as_ref())?;
                }
            }
            (Self::References(current), DeltaValue::References(members)) => {
                current.apply(ctx, at, name, members);
            }
            (Self::Elements(current), DeltaValue::Elements(elements)) => {
                current.apply(ctx, at, name, elements)?;
            }
            _ => return Err(ProxyError::DeltaMismatch(name.to_string())),
        }
        Ok(())
    }
}

impl From<serde_json::Value> for ProxyValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Leaf(value)
    }
}

impl From<StructProxy> for ProxyValue {
    fn from(value: StructProxy) -> Self {
        Self::Struct(value)
    }
}

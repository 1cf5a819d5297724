//! Snapshot of a struct's field set.

use crate::context::Context;
use crate::delta::{Delta, StructDelta};
use crate::error::ProxyResult;
use crate::value::ProxyValue;
use scenesync_types::LivePath;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Read access to named leaves, shared by snapshots and incoming deltas.
///
/// Construction strategies use it to inspect the fields about to be written
/// without caring whether they come from a full snapshot or from an update.
pub trait Fields {
    /// Leaf value of a field, if the field is a leaf.
    fn leaf(&self, name: &str) -> Option<&serde_json::Value>;
}

/// Last synchronized state of one live struct, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructProxy {
    fields: BTreeMap<String, ProxyValue>,
}

impl StructProxy {
    /// Creates an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field value.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<ProxyValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ProxyValue> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ProxyValue> {
        self.fields.get_mut(name)
    }

    /// Sets a field value, returning the previous one.
    pub fn insert(&mut self, name: &str, value: ProxyValue) -> Option<ProxyValue> {
        self.fields.insert(name.to_string(), value)
    }

    pub fn remove(&mut self, name: &str) -> Option<ProxyValue> {
        self.fields.remove(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterates fields in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProxyValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Snapshots the struct at `path`, recursively.
    ///
    /// A path with no struct behind it yields an empty snapshot.
    pub fn load(ctx: &mut Context<'_>, path: &LivePath) -> ProxyResult<Self> {
        Self::read(ctx, path, None)
    }

    /// Snapshots the struct at `path`. When `collection` is given, its
    /// top-level fields go through the filter policy.
    pub(crate) fn read(
        ctx: &mut Context<'_>,
        path: &LivePath,
        collection: Option<&str>,
    ) -> ProxyResult<Self> {
        ctx.check_depth(path)?;
        let mut proxy = Self::default();
        let Some(live_fields) = ctx.graph.fields(path) else {
            return Ok(proxy);
        };
        let filter = ctx.filter;
        for (name, live) in live_fields {
            if collection.is_some_and(|c| !filter.is_synchronized_field(c, &name)) {
                continue;
            }
            let value = ProxyValue::load(ctx, path, &name, live)?;
            proxy.fields.insert(name, value);
        }
        Ok(proxy)
    }

    /// Writes every field into the struct at `path`.
    ///
    /// Fields the host refuses are logged and skipped.
    pub fn save(&self, ctx: &mut Context<'_>, path: &LivePath) {
        self.save_except(ctx, path, &[]);
    }

    pub(crate) fn save_except(&self, ctx: &mut Context<'_>, path: &LivePath, skip: &[&str]) {
        for (name, value) in &self.fields {
            if skip.contains(&name.as_str()) {
                continue;
            }
            if let Err(e) = value.save(ctx, path, name) {
                warn!("save {path}.{name}: {e}");
            }
        }
    }

    /// Compares this snapshot with the struct at `path`.
    ///
    /// Returns `None` when nothing changed.
    pub fn diff(&self, ctx: &mut Context<'_>, path: &LivePath) -> ProxyResult<Option<StructDelta>> {
        self.diff_scoped(ctx, path, None)
    }

    pub(crate) fn diff_scoped(
        &self,
        ctx: &mut Context<'_>,
        path: &LivePath,
        collection: Option<&str>,
    ) -> ProxyResult<Option<StructDelta>> {
        ctx.check_depth(path)?;
        let live_fields = ctx.graph.fields(path).unwrap_or_default();
        let filter = ctx.filter;
        let mut delta = StructDelta::new();
        let mut seen = BTreeSet::new();

        for (name, live) in live_fields {
            if collection.is_some_and(|c| !filter.is_synchronized_field(c, &name)) {
                continue;
            }
            let change = match self.fields.get(&name) {
                Some(value) => value.diff(ctx, path, &name, live)?,
                None => Some(Delta::Addition {
                    value: ProxyValue::load(ctx, path, &name, live)?,
                }),
            };
            if let Some(change) = change {
                delta.fields.insert(name.clone(), change);
            }
            seen.insert(name);
        }

        for (name, value) in &self.fields {
            if !seen.contains(name) {
                delta.fields.insert(
                    name.clone(),
                    Delta::Deletion {
                        value: value.clone(),
                    },
                );
            }
        }

        Ok((!delta.is_empty()).then_some(delta))
    }

    /// Applies `delta` to this snapshot and, when `path` is given, to the
    /// live struct at `path`.
    ///
    /// A field that fails to apply is logged and skipped.
    pub fn apply(&mut self, ctx: &mut Context<'_>, path: Option<&LivePath>, delta: &StructDelta) {
        for (name, change) in &delta.fields {
            let result = match change {
                Delta::Addition { value } => {
                    self.fields.insert(name.clone(), value.clone());
                    path.map_or(Ok(()), |path| {
                        ctx.state.cancel_field(path, name);
                        value.save(ctx, path, name)
                    })
                }
                Delta::Deletion { .. } => {
                    self.fields.remove(name);
                    if let Some(path) = path {
                        ctx.state.cancel_field(path, name);
                    }
                    Ok(())
                }
                Delta::Update { value, .. } => match self.fields.get_mut(name) {
                    Some(current) => current.apply(ctx, path, name, value),
                    None => {
                        warn!("update of unknown field {name}, skipped");
                        Ok(())
                    }
                },
            };
            if let Err(e) = result {
                warn!("apply {name}: {e}");
            }
        }
    }
}

impl Fields for StructProxy {
    fn leaf(&self, name: &str) -> Option<&serde_json::Value> {
        self.fields.get(name)?.as_leaf()
    }
}

//! Keyed collections of nested structs (modifiers, vertices, ...).

use crate::context::Context;
use crate::delta::{Delta, DeltaValue};
use crate::error::{HostResult, ProxyError, ProxyResult};
use crate::host::LiveValue;
use crate::strategy::TruncatePolicy;
use crate::struct_proxy::StructProxy;
use crate::value::ProxyValue;
use scenesync_types::LivePath;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Snapshot of a keyed struct collection, in live order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructCollectionProxy {
    elements: Vec<(String, StructProxy)>,
}

impl StructCollectionProxy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an element.
    #[must_use]
    pub fn with(mut self, key: &str, element: StructProxy) -> Self {
        self.elements.push((key.to_string(), element));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&StructProxy> {
        self.elements
            .iter()
            .find_map(|(k, element)| (k == key).then_some(element))
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut StructProxy> {
        self.elements
            .iter_mut()
            .find_map(|(k, element)| (k == key).then_some(element))
    }

    /// Element keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.elements.iter().map(|(key, _)| key.as_str())
    }

    fn upsert(&mut self, key: &str, element: StructProxy) {
        match self.get_mut(key) {
            Some(current) => *current = element,
            None => self.elements.push((key.to_string(), element)),
        }
    }

    pub(crate) fn load(
        ctx: &mut Context<'_>,
        at: &LivePath,
        name: &str,
        keys: &[String],
    ) -> ProxyResult<Self> {
        let path = at.field(name);
        let mut proxy = Self::default();
        for key in keys {
            let element = StructProxy::load(ctx, &path.key(key))?;
            proxy.elements.push((key.clone(), element));
        }
        Ok(proxy)
    }

    /// Writes the collection into `at.name`, truncating the live collection
    /// first according to the field's policy.
    pub(crate) fn save(&self, ctx: &mut Context<'_>, at: &LivePath, name: &str) -> HostResult<()> {
        if ctx.graph.fields(at).is_none() {
            return Ok(());
        }
        let live_keys = match ctx.graph.field(at, name) {
            Some(LiveValue::Elements(keys)) => keys,
            _ => Vec::new(),
        };
        let wanted: HashSet<&str> = self.keys().collect();

        let policy = ctx.strategies.truncation(name);
        match policy {
            TruncatePolicy::ClearAndRebuild => {
                if !live_keys.is_empty() {
                    ctx.graph.clear(at, name)?;
                }
                for (key, _) in &self.elements {
                    ctx.graph.add_element(at, name, key)?;
                }
            }
            TruncatePolicy::Resize | TruncatePolicy::KeyDifference => {
                let mut surplus: Vec<&String> = live_keys
                    .iter()
                    .filter(|key| !wanted.contains(key.as_str()))
                    .collect();
                if policy == TruncatePolicy::Resize {
                    surplus.reverse();
                }
                for key in surplus {
                    ctx.graph.remove_element(at, name, key)?;
                }
                for (key, _) in &self.elements {
                    if !live_keys.contains(key) {
                        ctx.graph.add_element(at, name, key)?;
                    }
                }
            }
        }

        let path = at.field(name);
        for (key, element) in &self.elements {
            element.save(ctx, &path.key(key));
        }
        Ok(())
    }

    /// Key-set difference against the live keys, with nested updates for
    /// keys present on both sides.
    pub(crate) fn diff(
        &self,
        ctx: &mut Context<'_>,
        at: &LivePath,
        name: &str,
        keys: &[String],
    ) -> ProxyResult<Option<Vec<(String, Delta)>>> {
        let path = at.field(name);
        let mut changes = Vec::new();
        for key in keys {
            let element_path = path.key(key);
            match self.get(key) {
                Some(element) => {
                    if let Some(delta) = element.diff(ctx, &element_path)? {
                        changes.push((key.clone(), Delta::update(DeltaValue::Struct(delta))));
                    }
                }
                None => {
                    let value = ProxyValue::Struct(StructProxy::load(ctx, &element_path)?);
                    changes.push((key.clone(), Delta::Addition { value }));
                }
            }
        }
        for (key, element) in &self.elements {
            if !keys.contains(key) {
                changes.push((
                    key.clone(),
                    Delta::Deletion {
                        value: ProxyValue::Struct(element.clone()),
                    },
                ));
            }
        }
        Ok((!changes.is_empty()).then_some(changes))
    }

    /// Applies per-key changes to this snapshot and, when `at` is given, to
    /// the live collection `at.name`.
    pub(crate) fn apply(
        &mut self,
        ctx: &mut Context<'_>,
        at: Option<&LivePath>,
        name: &str,
        changes: &[(String, Delta)],
    ) -> ProxyResult<()> {
        let path = at.map(|at| at.field(name));
        for (key, change) in changes {
            let element_path = path.as_ref().map(|path| path.key(key));
            match change {
                Delta::Addition {
                    value: ProxyValue::Struct(element),
                } => {
                    if let (Some(at), Some(element_path)) = (at, &element_path) {
                        let exists = matches!(
                            ctx.graph.field(at, name),
                            Some(LiveValue::Elements(keys)) if keys.contains(key)
                        );
                        if !exists {
                            ctx.graph.add_element(at, name, key)?;
                        }
                        element.save(ctx, element_path);
                    }
                    self.upsert(key, element.clone());
                }
                Delta::Deletion { .. } => {
                    if self.get(key).is_none() {
                        debug!("{name}[{key:?}] already absent");
                        continue;
                    }
                    self.elements.retain(|(k, _)| k != key);
                    if let Some(at) = at
                        && let Err(e) = ctx.graph.remove_element(at, name, key)
                    {
                        warn!("cannot remove {at}.{name}[{key:?}]: {e}");
                    }
                }
                Delta::Update {
                    value: DeltaValue::Struct(delta),
                    ..
                } => match self.get_mut(key) {
                    Some(element) => element.apply(ctx, element_path.as_ref(), delta),
                    None => warn!("update of unknown element {name}[{key:?}], skipped"),
                },
                _ => return Err(ProxyError::DeltaMismatch(format!("{name}[{key:?}]"))),
            }
        }
        Ok(())
    }
}

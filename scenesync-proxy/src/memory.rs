//! In-memory live graph.
//!
//! A complete [`LiveGraph`] used by tests and by embedders without a host.
//! It behaves like a scene host where it matters to synchronization:
//! names are unique per collection and collisions are disambiguated with
//! `.001`-style suffixes, removing an entity may cascade to its dependents,
//! and changing an entity's kind replaces it under a new handle.
//!
//! Writes create missing nested structs and collection fields on the fly.

use crate::error::{HostError, HostResult};
use crate::host::{FieldWrite, LiveGraph, LiveValue};
use scenesync_types::{Identifier, LiveHandle, LivePath, Segment};
use serde_json::{Map, Value, json};
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Which entity gets a suffix when a rename collides with an existing name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenameCollision {
    /// The renamed entity gets the suffixed name.
    #[default]
    SuffixRenamed,
    /// The renamed entity takes the name, the previous holder is pushed
    /// aside to a suffixed name.
    SuffixExisting,
}

#[derive(Debug, Clone, PartialEq)]
enum MemoryField {
    Leaf(Value),
    Struct(MemoryStruct),
    Reference(Option<LiveHandle>),
    References(Vec<Option<LiveHandle>>),
    Elements(Vec<(String, MemoryStruct)>),
}

#[derive(Debug, Clone, Default, PartialEq)]
struct MemoryStruct {
    fields: Vec<(String, MemoryField)>,
}

impl MemoryStruct {
    fn slot(&self, name: &str) -> Option<&MemoryField> {
        self.fields
            .iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut MemoryField> {
        self.fields
            .iter_mut()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    fn slot_or_insert(&mut self, name: &str, default: impl FnOnce() -> MemoryField) -> &mut MemoryField {
        let index = match self.fields.iter().position(|(field, _)| field == name) {
            Some(index) => index,
            None => {
                self.fields.push((name.to_string(), default()));
                self.fields.len() - 1
            }
        };
        &mut self.fields[index].1
    }

    fn set(&mut self, name: &str, value: MemoryField) {
        *self.slot_or_insert(name, || MemoryField::Leaf(Value::Null)) = value;
    }

    fn descend(&self, segments: &[Segment]) -> Option<&MemoryStruct> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        let Segment::Field(name) = first else {
            return None;
        };
        if let Some((Segment::Key(key), rest)) = rest.split_first() {
            let MemoryField::Elements(elements) = self.slot(name)? else {
                return None;
            };
            let (_, element) = elements.iter().find(|(k, _)| k == key)?;
            return element.descend(rest);
        }
        match self.slot(name)? {
            MemoryField::Struct(inner) => inner.descend(rest),
            _ => None,
        }
    }

    fn descend_mut(&mut self, segments: &[Segment], create: bool) -> Option<&mut MemoryStruct> {
        let Some((first, rest)) = segments.split_first() else {
            return Some(self);
        };
        let Segment::Field(name) = first else {
            return None;
        };
        if let Some((Segment::Key(key), rest)) = rest.split_first() {
            let MemoryField::Elements(elements) = self.slot_mut(name)? else {
                return None;
            };
            let (_, element) = elements.iter_mut().find(|(k, _)| k == key)?;
            return element.descend_mut(rest, create);
        }
        let field = if create {
            self.slot_or_insert(name, || MemoryField::Struct(MemoryStruct::default()))
        } else {
            self.slot_mut(name)?
        };
        match field {
            MemoryField::Struct(inner) => inner.descend_mut(rest, create),
            _ => None,
        }
    }

    fn live_values(&self) -> Vec<(String, LiveValue)> {
        self.fields
            .iter()
            .map(|(name, field)| {
                let value = match field {
                    MemoryField::Leaf(value) => LiveValue::Leaf(value.clone()),
                    MemoryField::Struct(_) => LiveValue::Struct,
                    MemoryField::Reference(target) => LiveValue::Reference(*target),
                    MemoryField::References(members) => LiveValue::References(members.clone()),
                    MemoryField::Elements(elements) => {
                        LiveValue::Elements(elements.iter().map(|(key, _)| key.clone()).collect())
                    }
                };
                (name.clone(), value)
            })
            .collect()
    }

    /// Rewrites every pointer to `from`; `None` nulls references and drops
    /// collection members.
    fn repoint(&mut self, from: LiveHandle, to: Option<LiveHandle>) {
        for (_, field) in &mut self.fields {
            match field {
                MemoryField::Leaf(_) => {}
                MemoryField::Struct(inner) => inner.repoint(from, to),
                MemoryField::Reference(target) => {
                    if *target == Some(from) {
                        *target = to;
                    }
                }
                MemoryField::References(members) => match to {
                    Some(to) => {
                        for member in members.iter_mut() {
                            if *member == Some(from) {
                                *member = Some(to);
                            }
                        }
                    }
                    None => members.retain(|member| *member != Some(from)),
                },
                MemoryField::Elements(elements) => {
                    for (_, element) in elements.iter_mut() {
                        element.repoint(from, to);
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Entity {
    collection: String,
    name: String,
    kind: Option<String>,
    identifier: Option<Identifier>,
    root: MemoryStruct,
}

/// In-memory scene host.
#[derive(Debug, Clone, Default)]
pub struct MemoryGraph {
    collections: BTreeMap<String, Vec<LiveHandle>>,
    entities: BTreeMap<LiveHandle, Entity>,
    next: u64,
    collision: RenameCollision,
    /// `(collection, field)`: removing an entity also removes the entities
    /// of `collection` whose `field` points at it.
    cascades: Vec<(String, String)>,
}

impl MemoryGraph {
    /// Creates a graph without any collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph with empty collections.
    #[must_use]
    pub fn with_collections(names: &[&str]) -> Self {
        let mut graph = Self::new();
        for name in names {
            graph.add_collection(name);
        }
        graph
    }

    /// Sets how rename collisions are disambiguated.
    #[must_use]
    pub fn with_rename_collision(mut self, mode: RenameCollision) -> Self {
        self.collision = mode;
        self
    }

    /// Removing an entity also removes the entities of `collection` whose
    /// top-level reference `field` points at it.
    #[must_use]
    pub fn with_cascade(mut self, collection: &str, field: &str) -> Self {
        self.cascades
            .push((collection.to_string(), field.to_string()));
        self
    }

    /// Adds an empty collection if missing.
    pub fn add_collection(&mut self, name: &str) {
        self.collections.entry(name.to_string()).or_default();
    }

    /// Number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Names of a collection's entities in order.
    #[must_use]
    pub fn names(&self, collection: &str) -> Vec<String> {
        self.items(collection)
            .unwrap_or_default()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// Appends a null slot to a reference collection, as hosts sometimes
    /// report.
    pub fn push_null(&mut self, at: &LivePath, name: &str) -> HostResult<()> {
        match self.slot_for_write(at, name, || MemoryField::References(Vec::new()))? {
            MemoryField::References(members) => {
                members.push(None);
                Ok(())
            }
            _ => Err(HostError::Rejected(format!("{at}.{name} is not a reference collection"))),
        }
    }

    /// Host-independent description of an entity: fields as JSON, with
    /// references replaced by the target names and identifiers left out.
    #[must_use]
    pub fn describe(&self, handle: LiveHandle) -> Option<Value> {
        let entity = self.entities.get(&handle)?;
        let mut out = Map::new();
        out.insert("name".to_string(), Value::from(entity.name.clone()));
        if let Some(kind) = &entity.kind {
            out.insert("kind".to_string(), Value::from(kind.clone()));
        }
        out.insert("fields".to_string(), self.describe_struct(&entity.root));
        Some(Value::Object(out))
    }

    fn describe_struct(&self, value: &MemoryStruct) -> Value {
        let mut out = Map::new();
        for (name, field) in &value.fields {
            let described = match field {
                MemoryField::Leaf(value) => value.clone(),
                MemoryField::Struct(inner) => self.describe_struct(inner),
                MemoryField::Reference(target) => self.describe_target(*target),
                MemoryField::References(members) => {
                    let mut names: Vec<Value> =
                        members.iter().map(|m| self.describe_target(*m)).collect();
                    names.sort_by_key(ToString::to_string);
                    Value::Array(names)
                }
                MemoryField::Elements(elements) => Value::Array(
                    elements
                        .iter()
                        .map(|(key, element)| json!([key, self.describe_struct(element)]))
                        .collect(),
                ),
            };
            out.insert(name.clone(), described);
        }
        Value::Object(out)
    }

    fn describe_target(&self, target: Option<LiveHandle>) -> Value {
        target
            .and_then(|t| self.entities.get(&t))
            .map_or(Value::Null, |e| Value::from(format!("{}/{}", e.collection, e.name)))
    }

    fn entity(&self, handle: LiveHandle) -> HostResult<&Entity> {
        self.entities.get(&handle).ok_or(HostError::Dangling(handle))
    }

    fn entity_mut(&mut self, handle: LiveHandle) -> HostResult<&mut Entity> {
        self.entities
            .get_mut(&handle)
            .ok_or(HostError::Dangling(handle))
    }

    fn struct_mut(&mut self, at: &LivePath) -> HostResult<&mut MemoryStruct> {
        self.entity_mut(at.root())?
            .root
            .descend_mut(at.segments(), true)
            .ok_or_else(|| HostError::NotFound(at.to_string()))
    }

    fn slot_for_write(
        &mut self,
        at: &LivePath,
        name: &str,
        default: impl FnOnce() -> MemoryField,
    ) -> HostResult<&mut MemoryField> {
        Ok(self.struct_mut(at)?.slot_or_insert(name, default))
    }

    fn holder(&self, collection: &str, name: &str, except: LiveHandle) -> Option<LiveHandle> {
        self.collections
            .get(collection)?
            .iter()
            .copied()
            .find(|h| *h != except && self.entities.get(h).is_some_and(|e| e.name == name))
    }

    /// First free name for `base` in `collection`, ignoring `except`.
    fn unique_name(&self, collection: &str, base: &str, except: LiveHandle) -> String {
        if self.holder(collection, base, except).is_none() {
            return base.to_string();
        }
        let stem = strip_suffix(base);
        (1..)
            .map(|n| format!("{stem}.{n:03}"))
            .find(|candidate| self.holder(collection, candidate, except).is_none())
            .unwrap_or_else(|| base.to_string())
    }

    fn set_name(&mut self, handle: LiveHandle, name: String) {
        if let Some(entity) = self.entities.get_mut(&handle) {
            entity.name = name;
        }
    }

    fn check_target(&self, target: LiveHandle) -> HostResult<()> {
        if self.entities.contains_key(&target) {
            Ok(())
        } else {
            Err(HostError::Dangling(target))
        }
    }

    /// Entities removed along with `handle` by the cascade rules.
    fn dependents(&self, handle: LiveHandle) -> Vec<LiveHandle> {
        let mut out = Vec::new();
        for (collection, field) in &self.cascades {
            for (h, entity) in &self.entities {
                if entity.collection == *collection
                    && matches!(entity.root.slot(field), Some(MemoryField::Reference(Some(t))) if *t == handle)
                {
                    out.push(*h);
                }
            }
        }
        out
    }
}

/// `Cube.002` -> `Cube`; other names are returned unchanged.
fn strip_suffix(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, digits))
            if !stem.is_empty() && digits.len() == 3 && digits.bytes().all(|b| b.is_ascii_digit()) =>
        {
            stem
        }
        _ => name,
    }
}

impl LiveGraph for MemoryGraph {
    fn items(&self, collection: &str) -> Option<Vec<(String, LiveHandle)>> {
        let handles = self.collections.get(collection)?;
        Some(
            handles
                .iter()
                .filter_map(|h| self.entities.get(h).map(|e| (e.name.clone(), *h)))
                .collect(),
        )
    }

    fn get(&self, collection: &str, name: &str) -> Option<LiveHandle> {
        self.collections
            .get(collection)?
            .iter()
            .copied()
            .find(|h| self.entities.get(h).is_some_and(|e| e.name == name))
    }

    fn contains(&self, handle: LiveHandle) -> bool {
        self.entities.contains_key(&handle)
    }

    fn kind(&self, handle: LiveHandle) -> Option<String> {
        self.entities.get(&handle)?.kind.clone()
    }

    fn name(&self, handle: LiveHandle) -> Option<String> {
        self.entities.get(&handle).map(|e| e.name.clone())
    }

    fn rename(&mut self, handle: LiveHandle, name: &str) -> HostResult<String> {
        let entity = self.entity(handle)?;
        if entity.name == name {
            return Ok(name.to_string());
        }
        let collection = entity.collection.clone();
        let Some(other) = self.holder(&collection, name, handle) else {
            self.set_name(handle, name.to_string());
            return Ok(name.to_string());
        };
        match self.collision {
            RenameCollision::SuffixRenamed => {
                let unique = self.unique_name(&collection, name, handle);
                self.set_name(handle, unique.clone());
                Ok(unique)
            }
            RenameCollision::SuffixExisting => {
                self.set_name(handle, name.to_string());
                let pushed = self.unique_name(&collection, name, other);
                debug!("{collection}[{name}] pushed aside to {pushed}");
                self.set_name(other, pushed);
                Ok(name.to_string())
            }
        }
    }

    fn identifier(&self, handle: LiveHandle) -> Option<Identifier> {
        self.entities.get(&handle)?.identifier
    }

    fn set_identifier(&mut self, handle: LiveHandle, id: Option<Identifier>) -> HostResult<()> {
        self.entity_mut(handle)?.identifier = id;
        Ok(())
    }

    fn fields(&self, at: &LivePath) -> Option<Vec<(String, LiveValue)>> {
        let entity = self.entities.get(&at.root())?;
        let value = entity.root.descend(at.segments())?;
        let mut fields = value.live_values();
        if at.is_entity() {
            fields.insert(0, ("name".to_string(), LiveValue::Leaf(Value::from(entity.name.clone()))));
        }
        Some(fields)
    }

    fn set_field(&mut self, at: &LivePath, name: &str, value: FieldWrite) -> HostResult<()> {
        if at.is_entity() && name == "name" {
            let FieldWrite::Leaf(Value::String(new_name)) = value else {
                return Err(HostError::Rejected("name must be a string".to_string()));
            };
            return self.rename(at.root(), &new_name).map(|_| ());
        }
        let field = match value {
            FieldWrite::Leaf(value) => MemoryField::Leaf(value),
            FieldWrite::Reference(target) => {
                if let Some(target) = target {
                    self.check_target(target)?;
                }
                MemoryField::Reference(target)
            }
        };
        self.struct_mut(at)?.set(name, field);
        Ok(())
    }

    fn link(&mut self, at: &LivePath, name: &str, target: LiveHandle) -> HostResult<()> {
        self.check_target(target)?;
        match self.slot_for_write(at, name, || MemoryField::References(Vec::new()))? {
            MemoryField::References(members) => {
                if !members.contains(&Some(target)) {
                    members.push(Some(target));
                }
                Ok(())
            }
            _ => Err(HostError::Rejected(format!("{at}.{name} is not a reference collection"))),
        }
    }

    fn append(&mut self, at: &LivePath, name: &str, target: LiveHandle) -> HostResult<()> {
        self.check_target(target)?;
        match self.slot_for_write(at, name, || MemoryField::References(Vec::new()))? {
            MemoryField::References(members) => {
                members.push(Some(target));
                Ok(())
            }
            _ => Err(HostError::Rejected(format!("{at}.{name} is not a reference collection"))),
        }
    }

    fn unlink(&mut self, at: &LivePath, name: &str, target: LiveHandle) -> HostResult<()> {
        let value = self
            .entity_mut(at.root())?
            .root
            .descend_mut(at.segments(), false)
            .and_then(|s| s.slot_mut(name));
        match value {
            Some(MemoryField::References(members)) if members.contains(&Some(target)) => {
                members.retain(|member| *member != Some(target));
                Ok(())
            }
            _ => Err(HostError::NotFound(format!("{target} in {at}.{name}"))),
        }
    }

    fn add_element(&mut self, at: &LivePath, name: &str, key: &str) -> HostResult<()> {
        match self.slot_for_write(at, name, || MemoryField::Elements(Vec::new()))? {
            MemoryField::Elements(elements) => {
                if elements.iter().any(|(k, _)| k == key) {
                    return Err(HostError::Rejected(format!("{at}.{name}[{key:?}] exists")));
                }
                elements.push((key.to_string(), MemoryStruct::default()));
                Ok(())
            }
            _ => Err(HostError::Rejected(format!("{at}.{name} is not a struct collection"))),
        }
    }

    fn remove_element(&mut self, at: &LivePath, name: &str, key: &str) -> HostResult<()> {
        let value = self
            .entity_mut(at.root())?
            .root
            .descend_mut(at.segments(), false)
            .and_then(|s| s.slot_mut(name));
        match value {
            Some(MemoryField::Elements(elements)) if elements.iter().any(|(k, _)| k == key) => {
                elements.retain(|(k, _)| k != key);
                Ok(())
            }
            _ => Err(HostError::NotFound(format!("{at}.{name}[{key:?}]"))),
        }
    }

    fn clear(&mut self, at: &LivePath, name: &str) -> HostResult<()> {
        let value = self
            .entity_mut(at.root())?
            .root
            .descend_mut(at.segments(), false)
            .and_then(|s| s.slot_mut(name));
        if let Some(MemoryField::Elements(elements)) = value {
            elements.clear();
        }
        Ok(())
    }

    fn create(&mut self, collection: &str, name: &str, kind: Option<&str>) -> HostResult<LiveHandle> {
        if !self.collections.contains_key(collection) {
            return Err(HostError::NotFound(collection.to_string()));
        }
        self.next += 1;
        let handle = LiveHandle::from_raw(self.next);
        let unique = self.unique_name(collection, name, handle);
        self.entities.insert(
            handle,
            Entity {
                collection: collection.to_string(),
                name: unique,
                kind: kind.map(str::to_string),
                identifier: None,
                root: MemoryStruct::default(),
            },
        );
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(handle);
        Ok(handle)
    }

    fn remove(&mut self, handle: LiveHandle) -> HostResult<()> {
        self.check_target(handle)?;
        let mut pending = vec![handle];
        let mut removed = HashSet::new();
        while let Some(current) = pending.pop() {
            if !removed.insert(current) {
                continue;
            }
            pending.extend(self.dependents(current));
        }
        for current in &removed {
            if let Some(entity) = self.entities.remove(current)
                && let Some(handles) = self.collections.get_mut(&entity.collection)
            {
                handles.retain(|h| h != current);
            }
        }
        for current in &removed {
            for entity in self.entities.values_mut() {
                entity.root.repoint(*current, None);
            }
        }
        if removed.len() > 1 {
            debug!("removing {handle} also removed {} dependent(s)", removed.len() - 1);
        }
        Ok(())
    }

    fn set_kind(&mut self, handle: LiveHandle, kind: &str) -> HostResult<LiveHandle> {
        let mut entity = self
            .entities
            .remove(&handle)
            .ok_or(HostError::Dangling(handle))?;
        self.next += 1;
        let morphed = LiveHandle::from_raw(self.next);
        entity.kind = Some(kind.to_string());
        if let Some(handles) = self.collections.get_mut(&entity.collection) {
            for h in handles.iter_mut() {
                if *h == handle {
                    *h = morphed;
                }
            }
        }
        self.entities.insert(morphed, entity);
        for entity in self.entities.values_mut() {
            entity.root.repoint(handle, Some(morphed));
        }
        Ok(morphed)
    }
}

//! Boundary with the host application's live graph.
//!
//! The engine never owns live entities. It addresses them through
//! [`LiveHandle`]s and [`LivePath`]s and reads or mutates them only through
//! this trait, so any host (or the in-memory [`MemoryGraph`](crate::MemoryGraph))
//! can be plugged in.

use crate::error::HostResult;
use scenesync_types::{Identifier, LiveHandle, LivePath};

/// One field of a live struct, as reported by the host.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveValue {
    /// A scalar or flat array, opaque to the engine.
    Leaf(serde_json::Value),
    /// A nested struct, read by extending the path with the field name.
    Struct,
    /// A pointer to a standalone entity, `None` for a null pointer.
    Reference(Option<LiveHandle>),
    /// A collection of pointers to entities owned elsewhere.
    ///
    /// This is the result of iterating the values, holes included as `None`.
    /// Hosts may report a different length when asked directly; the engine
    /// only relies on this sequence.
    References(Vec<Option<LiveHandle>>),
    /// A keyed collection of nested structs, read by extending the path with
    /// each key.
    Elements(Vec<String>),
}

/// A value written into a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    Leaf(serde_json::Value),
    Reference(Option<LiveHandle>),
}

/// Accessor to the live, externally-owned graph.
///
/// All calls are synchronous and in-process. Implementations report
/// structural absence with `None` and failures with a
/// [`HostError`](crate::HostError); they never panic on stale handles.
pub trait LiveGraph {
    /// Lists `(name, handle)` for every entity of a top-level collection.
    /// Returns `None` if the host has no such collection.
    fn items(&self, collection: &str) -> Option<Vec<(String, LiveHandle)>>;

    /// Looks up an entity of a top-level collection by name.
    fn get(&self, collection: &str, name: &str) -> Option<LiveHandle>;

    /// Returns true if the handle designates an entity that still exists.
    fn contains(&self, handle: LiveHandle) -> bool;

    /// Host type of the entity (e.g. a light sub-type).
    fn kind(&self, handle: LiveHandle) -> Option<String>;

    /// Current name of the entity.
    fn name(&self, handle: LiveHandle) -> Option<String>;

    /// Renames the entity and returns the name the host actually assigned.
    ///
    /// Hosts that enforce name uniqueness may disambiguate this entity's name,
    /// or another entity's, as a side effect.
    fn rename(&mut self, handle: LiveHandle, name: &str) -> HostResult<String>;

    /// Reads the stable identifier field of the entity.
    fn identifier(&self, handle: LiveHandle) -> Option<Identifier>;

    /// Writes (or clears) the stable identifier field of the entity.
    fn set_identifier(&mut self, handle: LiveHandle, id: Option<Identifier>) -> HostResult<()>;

    /// Lists the fields of the struct at `at`, or `None` if there is no
    /// struct there.
    fn fields(&self, at: &LivePath) -> Option<Vec<(String, LiveValue)>>;

    /// Reads one field of the struct at `at`.
    fn field(&self, at: &LivePath, name: &str) -> Option<LiveValue> {
        self.fields(at)?
            .into_iter()
            .find_map(|(field, value)| (field == name).then_some(value))
    }

    /// Writes a leaf or single reference field of the struct at `at`.
    fn set_field(&mut self, at: &LivePath, name: &str, value: FieldWrite) -> HostResult<()>;

    /// Inserts a member into a set-like reference collection.
    fn link(&mut self, at: &LivePath, name: &str, target: LiveHandle) -> HostResult<()>;

    /// Appends a member to a sequence-like reference collection.
    fn append(&mut self, at: &LivePath, name: &str, target: LiveHandle) -> HostResult<()>;

    /// Removes a member from a reference collection.
    fn unlink(&mut self, at: &LivePath, name: &str, target: LiveHandle) -> HostResult<()>;

    /// Adds an empty element to the keyed struct collection at `at.name`.
    fn add_element(&mut self, at: &LivePath, name: &str, key: &str) -> HostResult<()>;

    /// Removes one element of the keyed struct collection at `at.name`.
    fn remove_element(&mut self, at: &LivePath, name: &str, key: &str) -> HostResult<()>;

    /// Removes every element of the keyed struct collection at `at.name`.
    fn clear(&mut self, at: &LivePath, name: &str) -> HostResult<()>;

    /// Creates an entity in a top-level collection.
    ///
    /// The host may assign a disambiguated name.
    fn create(&mut self, collection: &str, name: &str, kind: Option<&str>)
        -> HostResult<LiveHandle>;

    /// Destroys an entity.
    fn remove(&mut self, handle: LiveHandle) -> HostResult<()>;

    /// Changes the host type of an entity. The host may replace the entity,
    /// in which case the returned handle differs from `handle`.
    fn set_kind(&mut self, handle: LiveHandle, kind: &str) -> HostResult<LiveHandle>;
}

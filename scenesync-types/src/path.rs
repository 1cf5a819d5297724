//! Addressing of nested structs inside a live entity.

use crate::LiveHandle;
use std::fmt;

/// One step from a struct to one of its children.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// A named field of a struct.
    Field(String),
    /// A keyed element of a struct collection.
    Key(String),
}

/// Location of a struct inside the host graph: an owning entity plus the
/// field/key steps leading to the struct.
///
/// The empty path designates the entity itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LivePath {
    root: LiveHandle,
    segments: Vec<Segment>,
}

impl LivePath {
    /// The path of an entity's own field set.
    #[must_use]
    pub fn entity(root: LiveHandle) -> Self {
        Self {
            root,
            segments: Vec::new(),
        }
    }

    /// The owning entity.
    #[must_use]
    pub fn root(&self) -> LiveHandle {
        self.root
    }

    /// The steps below the owning entity.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Number of steps below the owning entity.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Returns true if this path designates the entity itself.
    #[must_use]
    pub fn is_entity(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path of a named field below this one.
    #[must_use]
    pub fn field(&self, name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Field(name.to_string()));
        Self {
            root: self.root,
            segments,
        }
    }

    /// Returns the path of a keyed element below this one.
    #[must_use]
    pub fn key(&self, key: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::Key(key.to_string()));
        Self {
            root: self.root,
            segments,
        }
    }

    /// Returns the same path rooted at another entity.
    ///
    /// Used when the host replaced an entity under a new handle.
    #[must_use]
    pub fn rebased(&self, root: LiveHandle) -> Self {
        Self {
            root,
            segments: self.segments.clone(),
        }
    }
}

impl fmt::Display for LivePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        for segment in &self.segments {
            match segment {
                Segment::Field(name) => write!(f, ".{name}")?,
                Segment::Key(key) => write!(f, "[{key:?}]")?,
            }
        }
        Ok(())
    }
}

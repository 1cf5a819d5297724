//! Proxy snapshots of a live entity graph, and their reconciliation.
//!
//! This crate mirrors a host-owned scene graph into serializable proxies and
//! keeps both consistent:
//! - **Local changes**: [`CollectionDiff`] / [`BlendDiff`] find added,
//!   removed and renamed entities, [`DataProxy::update`] turns them into a
//!   [`Changeset`], and [`DatablockProxy::diff`] turns field changes into a
//!   [`DatablockDelta`].
//! - **Remote changes**: [`DatablockCollectionProxy`] creates, updates,
//!   removes and renames live entities from received proxies and deltas.
//!
//! Entities are joined to their proxies only by [`Identifier`]. References
//! between entities are stored as identifiers and resolved through the
//! registry in [`ProxyState`]; a reference whose target has not arrived yet
//! waits in the [`UnresolvedRefs`] table.
//!
//! All host access goes through the [`LiveGraph`] trait. [`MemoryGraph`] is
//! a complete in-memory implementation.
//!
//! [`Identifier`]: scenesync_types::Identifier

mod changeset;
mod collection;
mod config;
mod context;
mod data;
mod datablock;
mod delta;
mod diff;
mod elements;
mod error;
mod filter;
mod host;
mod memory;
mod reference;
mod state;
mod strategy;
mod struct_proxy;
mod value;

pub use changeset::{Changeset, Removal, Rename};
pub use collection::DatablockCollectionProxy;
pub use config::{DEFAULT_MAX_DEPTH, ProxyConfig};
pub use context::Context;
pub use data::DataProxy;
pub use datablock::{DatablockProxy, NAME_FIELD};
pub use delta::{DatablockDelta, Delta, DeltaValue, MemberDelta, StructDelta};
pub use diff::{BlendDiff, CollectionDiff};
pub use elements::StructCollectionProxy;
pub use error::{HostError, HostResult, ProxyError, ProxyResult};
pub use filter::{FilterPolicy, SyncFilter, TrackAll};
pub use host::{FieldWrite, LiveGraph, LiveValue};
pub use memory::{MemoryGraph, RenameCollision};
pub use reference::{RefCollectionProxy, RefProxy};
pub use state::{DeferredLink, ProxyState, UnresolvedRefs};
pub use strategy::{
    ConstructionStrategy, ContainerStrategy, DefaultStrategy, LightStrategy, ReferenceInsertion,
    StrategyTable, TruncatePolicy,
};
pub use struct_proxy::{Fields, StructProxy};
pub use value::ProxyValue;

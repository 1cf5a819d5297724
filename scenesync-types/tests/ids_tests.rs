//! Tests for identifiers, live handles and live paths.

use proptest::prelude::*;
use scenesync_types::{Error, Identifier, LiveHandle, LivePath, Segment};
use std::collections::HashSet;
use std::str::FromStr;

// ── Identifier ────────────────────────────────────────────────────

#[test]
fn identifier_new_is_unique() {
    let a = Identifier::new();
    let b = Identifier::new();
    assert_ne!(a, b);
}

#[test]
fn identifier_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::new_v4();
    let id = Identifier::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn identifier_display_and_parse() {
    let id = Identifier::new();
    let parsed = Identifier::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn identifier_from_str_invalid() {
    assert!(Identifier::from_str("garbage").is_err());
    assert!(Identifier::parse("not-a-uuid").is_err());
}

#[test]
fn identifier_parse_reports_invalid_uuid() {
    assert!(matches!(Identifier::parse("1234"), Err(Error::InvalidUuid(_))));
    assert!(matches!("zz".parse::<Identifier>(), Err(Error::InvalidUuid(_))));
}

#[test]
fn identifier_hash_and_eq() {
    let id = Identifier::new();
    let mut set = HashSet::new();
    set.insert(id);
    set.insert(id);
    assert_eq!(set.len(), 1);
}

#[test]
fn identifier_serializes_as_plain_string() {
    let id = Identifier::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let back: Identifier = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

// ── LiveHandle ────────────────────────────────────────────────────

#[test]
fn live_handle_raw_roundtrip() {
    let handle = LiveHandle::from_raw(42);
    assert_eq!(handle.as_raw(), 42);
    assert_eq!(handle.to_string(), "#42");
}

// ── LivePath ──────────────────────────────────────────────────────

#[test]
fn entity_path_is_empty() {
    let path = LivePath::entity(LiveHandle::from_raw(1));
    assert!(path.is_entity());
    assert_eq!(path.depth(), 0);
    assert_eq!(path.to_string(), "#1");
}

#[test]
fn nested_path_segments() {
    let path = LivePath::entity(LiveHandle::from_raw(3))
        .field("modifiers")
        .key("Subsurf")
        .field("settings");

    assert_eq!(path.depth(), 3);
    assert_eq!(
        path.segments(),
        &[
            Segment::Field("modifiers".into()),
            Segment::Key("Subsurf".into()),
            Segment::Field("settings".into()),
        ]
    );
    assert_eq!(path.to_string(), "#3.modifiers[\"Subsurf\"].settings");
}

#[test]
fn field_does_not_mutate_parent() {
    let parent = LivePath::entity(LiveHandle::from_raw(3));
    let _child = parent.field("dof");
    assert!(parent.is_entity());
}

#[test]
fn rebased_keeps_segments() {
    let path = LivePath::entity(LiveHandle::from_raw(3)).field("dof");
    let moved = path.rebased(LiveHandle::from_raw(9));
    assert_eq!(moved.root(), LiveHandle::from_raw(9));
    assert_eq!(moved.segments(), path.segments());
}

proptest! {
    #[test]
    fn depth_counts_every_step(fields in prop::collection::vec("[a-z]{1,8}", 0..10)) {
        let mut path = LivePath::entity(LiveHandle::from_raw(0));
        for name in &fields {
            path = path.field(name);
        }
        prop_assert_eq!(path.depth(), fields.len());
    }
}

//! Load/save round trips between graphs, field deltas and wire shapes.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scenesync_proxy::{
    Context, DataProxy, DatablockCollectionProxy, DatablockProxy, Delta, DeltaValue, FieldWrite,
    LiveGraph, LiveValue, MemberDelta, MemoryGraph, ProxyConfig, ProxyState, ProxyValue, RefProxy,
    StrategyTable, StructCollectionProxy, StructDelta, StructProxy, TrackAll,
};
use scenesync_types::{Identifier, LiveHandle, LivePath};
use serde_json::json;
use std::collections::BTreeMap;

struct Harness {
    graph: MemoryGraph,
    state: ProxyState,
    strategies: StrategyTable,
    config: ProxyConfig,
}

impl Harness {
    fn new(graph: MemoryGraph) -> Self {
        Self {
            graph,
            state: ProxyState::new(),
            strategies: StrategyTable::with_defaults(),
            config: ProxyConfig::default(),
        }
    }

    fn ctx(&mut self) -> Context<'_> {
        Context::new(
            &mut self.graph,
            &mut self.state,
            &self.strategies,
            &TrackAll,
            &self.config,
        )
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn set(graph: &mut MemoryGraph, at: &LivePath, field: &str, value: serde_json::Value) {
    graph.set_field(at, field, FieldWrite::Leaf(value)).unwrap();
}

fn make_element(graph: &mut MemoryGraph, at: &LivePath, field: &str, key: &str, value: i64) {
    graph.add_element(at, field, key).unwrap();
    set(graph, &at.field(field).key(key), "v", json!(value));
}

fn element_keys(graph: &MemoryGraph, live: LiveHandle, field: &str) -> Vec<String> {
    match graph.field(&LivePath::entity(live), field) {
        Some(LiveValue::Elements(keys)) => keys,
        other => panic!("expected elements at {field}, got {other:?}"),
    }
}

fn load_all(h: &mut Harness, collections: &[&str]) -> DataProxy {
    let collections: Vec<String> = collections.iter().map(|c| c.to_string()).collect();
    let mut ctx = h.ctx();
    DataProxy::load(&mut ctx, &collections)
}

/// Ships `data` through JSON and saves it into an empty graph with the
/// same collections.
fn replicate(data: &DataProxy, collections: &[&str]) -> Harness {
    let wire = serde_json::to_string(data).unwrap();
    let received: DataProxy = serde_json::from_str(&wire).unwrap();
    let mut h = Harness::new(MemoryGraph::with_collections(collections));
    {
        let mut ctx = h.ctx();
        received.save(&mut ctx);
    }
    h
}

// ── Round trips ─────────────────────────────────────────────────

#[test]
fn save_reproduces_references_across_collections() {
    init_tracing();
    let collections = ["meshes", "objects", "scenes"];
    let mut graph = MemoryGraph::with_collections(&collections);
    let mesh = graph.create("meshes", "Mesh", None).unwrap();
    let cube = graph.create("objects", "Cube", None).unwrap();
    let empty = graph.create("objects", "Empty", None).unwrap();
    let scene = graph.create("scenes", "Scene", None).unwrap();
    graph
        .set_field(&LivePath::entity(cube), "data", FieldWrite::Reference(Some(mesh)))
        .unwrap();
    graph
        .set_field(&LivePath::entity(empty), "data", FieldWrite::Reference(None))
        .unwrap();
    for object in [cube, empty] {
        graph.link(&LivePath::entity(scene), "objects", object).unwrap();
    }
    let mut source = Harness::new(graph);
    let data = load_all(&mut source, &collections);

    let target = replicate(&data, &collections);

    assert!(target.state.unresolved().is_empty());
    for (collection, name) in [("meshes", "Mesh"), ("objects", "Cube"), ("objects", "Empty"), ("scenes", "Scene")] {
        let original = source.graph.get(collection, name).unwrap();
        let copy = target.graph.get(collection, name).unwrap();
        assert_eq!(target.graph.describe(copy), source.graph.describe(original));
        assert_eq!(target.graph.identifier(copy), source.graph.identifier(original));
    }
}

#[test]
fn save_clear_and_rebuild_replaces_elements() {
    let mut graph = MemoryGraph::with_collections(&["objects"]);
    let cube = graph.create("objects", "Cube", None).unwrap();
    make_element(&mut graph, &LivePath::entity(cube), "modifiers", "old", 0);
    let mut h = Harness::new(graph);

    let mut collection = DatablockCollectionProxy::new("objects");
    collection.insert(DatablockProxy::new(
        Identifier::new(),
        "objects",
        StructProxy::new().with("name", json!("Cube")).with(
            "modifiers",
            ProxyValue::Elements(
                StructCollectionProxy::new()
                    .with("Subsurf", StructProxy::new().with("levels", json!(2)))
                    .with("Bevel", StructProxy::new()),
            ),
        ),
    ));
    {
        let mut ctx = h.ctx();
        collection.save(&mut ctx);
    }

    assert_eq!(element_keys(&h.graph, cube, "modifiers"), vec!["Subsurf", "Bevel"]);
    assert_eq!(
        h.graph
            .field(&LivePath::entity(cube).field("modifiers").key("Subsurf"), "levels"),
        Some(LiveValue::Leaf(json!(2)))
    );
}

#[test]
fn save_key_difference_keeps_shared_elements() {
    let mut graph = MemoryGraph::with_collections(&["objects"]);
    let cube = graph.create("objects", "Cube", None).unwrap();
    let at = LivePath::entity(cube);
    make_element(&mut graph, &at, "layers", "x", 1);
    make_element(&mut graph, &at, "layers", "a", 2);
    let mut h = Harness::new(graph);

    let mut collection = DatablockCollectionProxy::new("objects");
    collection.insert(DatablockProxy::new(
        Identifier::new(),
        "objects",
        StructProxy::new().with("name", json!("Cube")).with(
            "layers",
            ProxyValue::Elements(
                StructCollectionProxy::new()
                    .with("a", StructProxy::new().with("v", json!(20)))
                    .with("b", StructProxy::new().with("v", json!(30))),
            ),
        ),
    ));
    {
        let mut ctx = h.ctx();
        collection.save(&mut ctx);
    }

    assert_eq!(element_keys(&h.graph, cube, "layers"), vec!["a", "b"]);
    assert_eq!(
        h.graph.field(&at.field("layers").key("a"), "v"),
        Some(LiveValue::Leaf(json!(20)))
    );
}

#[test]
fn save_resize_drops_trailing_elements() {
    let mut graph = MemoryGraph::with_collections(&["meshes"]);
    let grid = graph.create("meshes", "Grid", None).unwrap();
    let at = LivePath::entity(grid);
    for (i, key) in ["0", "1", "2", "3"].iter().enumerate() {
        make_element(&mut graph, &at, "vertices", key, i as i64);
    }
    let mut h = Harness::new(graph);

    let mut collection = DatablockCollectionProxy::new("meshes");
    collection.insert(DatablockProxy::new(
        Identifier::new(),
        "meshes",
        StructProxy::new().with("name", json!("Grid")).with(
            "vertices",
            ProxyValue::Elements(
                StructCollectionProxy::new()
                    .with("0", StructProxy::new().with("v", json!(10)))
                    .with("1", StructProxy::new().with("v", json!(11))),
            ),
        ),
    ));
    {
        let mut ctx = h.ctx();
        collection.save(&mut ctx);
    }

    assert_eq!(element_keys(&h.graph, grid, "vertices"), vec!["0", "1"]);
}

// ── Field deltas ────────────────────────────────────────────────

#[test]
fn diff_entity_brings_snapshot_up_to_date() {
    let mut graph = MemoryGraph::with_collections(&["objects"]);
    let cube = graph.create("objects", "Cube", None).unwrap();
    let other = graph.create("objects", "Other", None).unwrap();
    let at = LivePath::entity(cube);
    set(&mut graph, &at, "hide", json!(false));
    set(&mut graph, &at.field("display"), "wire", json!(false));
    make_element(&mut graph, &at, "layers", "a", 1);
    graph
        .set_field(&at, "parent", FieldWrite::Reference(None))
        .unwrap();
    let mut h = Harness::new(graph);
    let mut data = load_all(&mut h, &["objects"]);
    let uuid = h.graph.identifier(cube).unwrap();

    set(&mut h.graph, &at, "hide", json!(true));
    set(&mut h.graph, &at.field("display"), "wire", json!(true));
    set(&mut h.graph, &at, "color", json!([1, 0, 0]));
    make_element(&mut h.graph, &at, "layers", "b", 2);
    h.graph
        .set_field(&at, "parent", FieldWrite::Reference(Some(other)))
        .unwrap();

    let mut ctx = h.ctx();
    let delta = data.diff_entity(&mut ctx, &uuid).unwrap().unwrap();
    let names: Vec<_> = delta.fields.fields.keys().map(String::as_str).collect();
    assert_eq!(names, vec!["color", "display", "hide", "layers", "parent"]);
    assert!(delta.fields.get("color").unwrap().is_addition());
    assert!(matches!(
        delta.fields.get("hide"),
        Some(Delta::Update { previous: Some(previous), .. }) if **previous == ProxyValue::Leaf(json!(false))
    ));

    let fresh = DatablockProxy::load(&mut ctx, "objects", cube).unwrap();
    assert_eq!(data.find(&*ctx.state, &uuid), Some(&fresh));
    assert_eq!(data.diff_entity(&mut ctx, &uuid).unwrap(), None);
}

#[test]
fn remote_delta_replays_local_changes() {
    let mut graph = MemoryGraph::with_collections(&["cameras"]);
    let camera = graph.create("cameras", "Camera", None).unwrap();
    let at = LivePath::entity(camera);
    set(&mut graph, &at, "lens", json!(50));
    set(&mut graph, &at.field("dof"), "distance", json!(10));
    let mut local = Harness::new(graph);
    let mut local_data = load_all(&mut local, &["cameras"]);
    let mut remote = replicate(&local_data, &["cameras"]);
    let mut remote_data = load_all(&mut remote, &["cameras"]);
    let uuid = local.graph.identifier(camera).unwrap();

    set(&mut local.graph, &at, "lens", json!(85));
    set(&mut local.graph, &at.field("dof"), "distance", json!(3));
    let delta = {
        let mut ctx = local.ctx();
        local_data.diff_entity(&mut ctx, &uuid).unwrap().unwrap()
    };
    let wire = serde_json::to_string(&delta).unwrap();
    let received = serde_json::from_str(&wire).unwrap();
    {
        let mut ctx = remote.ctx();
        remote_data.update_entity(&mut ctx, &received).unwrap();
    }

    let copy = remote.graph.get("cameras", "Camera").unwrap();
    assert_eq!(remote.graph.describe(copy), local.graph.describe(camera));
}

// ── Wire shapes ─────────────────────────────────────────────────

#[test]
fn delta_serializes_with_kind_tag() {
    let addition = Delta::Addition {
        value: ProxyValue::Leaf(json!(1)),
    };
    assert_eq!(
        serde_json::to_value(&addition).unwrap(),
        json!({"kind": "Addition", "value": {"type": "leaf", "data": 1}})
    );

    let update = Delta::update(DeltaValue::Leaf(json!(2)));
    assert_eq!(
        serde_json::to_value(&update).unwrap(),
        json!({"kind": "Update", "value": {"type": "leaf", "data": 2}})
    );
}

#[test]
fn delta_value_rejects_whole_entity_payload() {
    let payload = json!({
        "type": "datablock",
        "data": {"uuid": Identifier::new(), "collection": "objects", "fields": {}},
    });

    assert!(serde_json::from_value::<DeltaValue>(payload).is_err());
}

#[test]
fn member_delta_serializes_reference() {
    let uuid = Identifier::new();
    let member = MemberDelta::Addition(RefProxy::new(uuid, "Cube"));
    let value = serde_json::to_value(&member).unwrap();
    assert_eq!(
        value,
        json!({"kind": "Addition", "value": {"uuid": uuid, "label": "Cube"}})
    );
    let back: MemberDelta = serde_json::from_value(value).unwrap();
    assert_eq!(back, member);
}

#[test]
fn struct_delta_survives_json() {
    let delta = StructDelta::new()
        .with("lens", Delta::update(DeltaValue::Leaf(json!(35))))
        .with(
            "dof",
            Delta::update(DeltaValue::Struct(
                StructDelta::new().with("distance", Delta::update(DeltaValue::Leaf(json!(2.5)))),
            )),
        )
        .with(
            "parent",
            Delta::Deletion {
                value: ProxyValue::Reference(None),
            },
        );
    let wire = serde_json::to_string(&delta).unwrap();
    let back: StructDelta = serde_json::from_str(&wire).unwrap();
    assert_eq!(back, delta);
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;

    proptest! {
        /// Loading an entity and saving it into an empty graph reproduces
        /// it field for field.
        #[test]
        fn load_then_save_reproduces_entity(
            leaves in prop::collection::btree_map("f_[a-z]{1,5}", any::<i64>(), 0..5),
            nested in prop::collection::btree_map("f_[a-z]{1,5}", any::<bool>(), 1..4),
            layers in prop::collection::btree_map("[a-z]{1,4}", any::<i32>(), 0..4),
        ) {
            let mut graph = MemoryGraph::with_collections(&["meshes"]);
            let grid = graph.create("meshes", "Grid", None).unwrap();
            let at = LivePath::entity(grid);
            for (name, value) in &leaves {
                set(&mut graph, &at, name, json!(value));
            }
            for (name, value) in &nested {
                set(&mut graph, &at.field("settings"), name, json!(value));
            }
            for (key, value) in &layers {
                make_element(&mut graph, &at, "layers", key, i64::from(*value));
            }
            let mut source = Harness::new(graph);
            let data = load_all(&mut source, &["meshes"]);

            let target = replicate(&data, &["meshes"]);

            let copy = target.graph.get("meshes", "Grid").unwrap();
            prop_assert_eq!(target.graph.describe(copy), source.graph.describe(grid));
        }

        /// Applying the same field delta twice leaves the snapshot as a
        /// single application does.
        #[test]
        fn apply_is_idempotent(
            values in prop::collection::btree_map("f_[a-z]{1,5}", any::<i64>(), 1..6),
            changes in prop::collection::btree_map("f_[a-z]{1,5}", any::<i64>(), 0..6),
        ) {
            let mut h = Harness::new(MemoryGraph::new());
            let proxy = values
                .iter()
                .fold(StructProxy::new(), |p, (name, value)| p.with(name, json!(value)));
            let delta = changes.iter().fold(StructDelta::new(), |d, (name, value)| {
                let change = if values.contains_key(name) {
                    Delta::update(DeltaValue::Leaf(json!(value)))
                } else {
                    Delta::Addition { value: ProxyValue::Leaf(json!(value)) }
                };
                d.with(name, change)
            });

            let mut once = proxy.clone();
            let mut twice = proxy;
            let mut ctx = h.ctx();
            once.apply(&mut ctx, None, &delta);
            twice.apply(&mut ctx, None, &delta);
            twice.apply(&mut ctx, None, &delta);
            prop_assert_eq!(&once, &twice);

            let expected: BTreeMap<_, _> = values.into_iter().chain(changes).collect();
            prop_assert_eq!(once.len(), expected.len());
            for (name, value) in expected {
                let value = json!(value);
                prop_assert_eq!(once.get(&name).and_then(ProxyValue::as_leaf), Some(&value));
            }
        }
    }
}

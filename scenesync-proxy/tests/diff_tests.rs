//! Tests for the structural diff of live collections against their snapshots.

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use scenesync_proxy::{
    BlendDiff, CollectionDiff, Context, DataProxy, DatablockCollectionProxy, FilterPolicy,
    LiveGraph, MemoryGraph, ProxyConfig, ProxyState, RenameCollision, StrategyTable, SyncFilter,
    TrackAll,
};
use std::collections::BTreeSet;

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

    fn ctx_with<'a>(&'a mut self, filter: &'a dyn FilterPolicy) -> Context<'a> {
        Context::new(
            &mut self.graph,
            &mut self.state,
            &self.strategies,
            filter,
            &self.config,
        )
    }

    fn ctx(&mut self) -> Context<'_> {
        self.ctx_with(&TrackAll)
    }
}

fn make_objects(names: &[&str], mode: RenameCollision) -> Harness {
    let mut graph = MemoryGraph::with_collections(&["objects"]).with_rename_collision(mode);
    for name in names {
        graph.create("objects", name, None).unwrap();
    }
    Harness::new(graph)
}

fn load(h: &mut Harness) -> DatablockCollectionProxy {
    let mut ctx = h.ctx();
    DatablockCollectionProxy::load(&mut ctx, "objects")
}

fn sync(h: &mut Harness, proxy: &mut DatablockCollectionProxy) -> CollectionDiff {
    let mut ctx = h.ctx();
    let diff = CollectionDiff::compute(&mut ctx, proxy);
    proxy.update(&mut ctx, &diff);
    diff
}

/// Every live entity is in the snapshot under its identifier and current
/// name, and nothing else is.
fn assert_mirrors_live(h: &Harness, proxy: &DatablockCollectionProxy) {
    let items = h.graph.items("objects").unwrap();
    assert_eq!(proxy.len(), items.len());
    for (name, live) in items {
        let uuid = h.graph.identifier(live).unwrap();
        assert_eq!(proxy.find(&uuid).and_then(|p| p.name()), Some(name.as_str()));
    }
}

// ── Added / removed / renamed ───────────────────────────────────

#[test]
fn compute_on_unchanged_collection_is_empty() {
    let mut h = make_objects(&["Cube", "Light"], RenameCollision::default());
    let proxy = load(&mut h);
    let mut ctx = h.ctx();
    assert!(CollectionDiff::compute(&mut ctx, &proxy).is_empty());
}

#[test]
fn compute_reports_added_removed_and_renamed() {
    let mut h = make_objects(&["Cube", "Light", "Camera"], RenameCollision::default());
    let proxy = load(&mut h);
    let light = h.graph.get("objects", "Light").unwrap();
    let camera = h.graph.get("objects", "Camera").unwrap();
    let light_id = h.graph.identifier(light).unwrap();
    let camera_id = h.graph.identifier(camera).unwrap();

    h.graph.remove(light).unwrap();
    h.graph.rename(camera, "Eye").unwrap();
    h.graph.create("objects", "Cone", None).unwrap();
    let diff = {
        let mut ctx = h.ctx();
        CollectionDiff::compute(&mut ctx, &proxy)
    };

    assert_eq!(
        diff.items_added.into_iter().collect::<Vec<_>>(),
        vec![("Cone".to_string(), "objects".to_string())]
    );
    assert_eq!(diff.items_removed, vec![light_id]);
    assert_eq!(diff.items_renamed, vec![(camera_id, "Eye".to_string())]);
}

#[test]
fn compute_tags_new_entities() {
    let mut h = make_objects(&[], RenameCollision::default());
    let proxy = load(&mut h);
    let cone = h.graph.create("objects", "Cone", None).unwrap();
    assert_eq!(h.graph.identifier(cone), None);

    {
        let mut ctx = h.ctx();
        CollectionDiff::compute(&mut ctx, &proxy);
    }
    assert!(h.graph.identifier(cone).is_some());
}

#[test]
fn compute_treats_duplicated_entity_as_new() {
    let mut h = make_objects(&["Cube"], RenameCollision::default());
    let mut proxy = load(&mut h);
    let cube = h.graph.get("objects", "Cube").unwrap();
    let cube_id = h.graph.identifier(cube).unwrap();
    let copy = h.graph.create("objects", "Cube", None).unwrap();
    h.graph.set_identifier(copy, Some(cube_id)).unwrap();

    let diff = sync(&mut h, &mut proxy);

    assert_eq!(diff.items_added.len(), 1);
    assert!(diff.items_added.contains_key("Cube.001"));
    assert!(diff.items_renamed.is_empty());
    assert_ne!(h.graph.identifier(copy), Some(cube_id));
    assert_eq!(h.graph.identifier(cube), Some(cube_id));
    assert_mirrors_live(&h, &proxy);
}

#[test]
fn compute_skips_filtered_entities() {
    let mut h = make_objects(&["Cube", "_tmp"], RenameCollision::default());
    let filter = SyncFilter::new().exclude_prefix("_");
    let proxy = {
        let mut ctx = h.ctx_with(&filter);
        DatablockCollectionProxy::load(&mut ctx, "objects")
    };
    assert_eq!(proxy.len(), 1);

    h.graph.create("objects", "_scratch", None).unwrap();
    let mut ctx = h.ctx_with(&filter);
    assert!(CollectionDiff::compute(&mut ctx, &proxy).is_empty());
}

// ── Rename collisions ───────────────────────────────────────────

#[test]
fn rename_onto_taken_name_suffixing_the_renamed_entity() {
    let mut h = make_objects(&["X", "Y"], RenameCollision::SuffixRenamed);
    let mut proxy = load(&mut h);
    let x = h.graph.get("objects", "X").unwrap();
    let x_id = h.graph.identifier(x).unwrap();

    assert_eq!(h.graph.rename(x, "Y").unwrap(), "Y.001");
    let diff = sync(&mut h, &mut proxy);

    assert_eq!(diff.items_renamed, vec![(x_id, "Y.001".to_string())]);
    assert_mirrors_live(&h, &proxy);
}

#[test]
fn rename_onto_taken_name_suffixing_the_previous_holder() {
    let mut h = make_objects(&["X", "Y"], RenameCollision::SuffixExisting);
    let mut proxy = load(&mut h);
    let x = h.graph.get("objects", "X").unwrap();
    let y = h.graph.get("objects", "Y").unwrap();
    let x_id = h.graph.identifier(x).unwrap();
    let y_id = h.graph.identifier(y).unwrap();

    assert_eq!(h.graph.rename(x, "Y").unwrap(), "Y");
    let changeset = {
        let mut ctx = h.ctx();
        let diff = CollectionDiff::compute(&mut ctx, &proxy);
        proxy.update(&mut ctx, &diff)
    };

    let renames: Vec<_> = changeset
        .renames
        .iter()
        .map(|r| (r.uuid, r.old_name.as_str(), r.new_name.as_str()))
        .collect();
    assert_eq!(renames, vec![(x_id, "X", "Y"), (y_id, "Y", "Y.001")]);
    assert_mirrors_live(&h, &proxy);
}

// ── Whole data ──────────────────────────────────────────────────

#[test]
fn blend_diff_keeps_only_changed_collections() {
    let mut graph = MemoryGraph::with_collections(&["objects", "scenes"]);
    graph.create("objects", "Cube", None).unwrap();
    graph.create("scenes", "Scene", None).unwrap();
    let mut h = Harness::new(graph);
    let collections = vec!["objects".to_string(), "scenes".to_string()];
    let data = {
        let mut ctx = h.ctx();
        DataProxy::load(&mut ctx, &collections)
    };

    h.graph.create("objects", "Cone", None).unwrap();
    let mut ctx = h.ctx();
    let diff = BlendDiff::compute(&mut ctx, &data, &collections);
    let names: Vec<_> = diff.collection_deltas.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["objects"]);
}

#[test]
fn data_update_orders_creations_by_rank() {
    let mut h = Harness::new(MemoryGraph::with_collections(&["meshes", "objects", "scenes"]));
    let collections: Vec<String> = ["scenes", "objects", "meshes"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let mut data = {
        let mut ctx = h.ctx();
        DataProxy::load(&mut ctx, &collections)
    };
    h.graph.create("scenes", "Scene", None).unwrap();
    h.graph.create("objects", "Cube", None).unwrap();
    h.graph.create("meshes", "Mesh", None).unwrap();

    let changeset = {
        let mut ctx = h.ctx();
        let diff = BlendDiff::compute(&mut ctx, &data, &collections);
        data.update(&mut ctx, &diff)
    };

    let order: Vec<_> = changeset.creations.iter().map(|p| p.collection()).collect();
    assert_eq!(order, vec!["meshes", "objects", "scenes"]);
}

// ============================================================================
// Properties
// ============================================================================

mod properties {
    use super::*;

    proptest! {
        /// After any mix of removals, renames and additions, one diff and
        /// update pass leaves the snapshot holding exactly the live
        /// identifiers under their live names.
        #[test]
        fn update_converges_to_live_collection(
            initial in prop::collection::btree_set("[a-z]{1,6}", 0..8),
            removed in prop::collection::vec(any::<bool>(), 8),
            renamed in prop::collection::vec(prop::option::of("[a-z]{1,6}"), 8),
            added in prop::collection::vec("[a-z]{1,6}", 0..6),
            suffix_existing in any::<bool>(),
        ) {
            let mode = if suffix_existing {
                RenameCollision::SuffixExisting
            } else {
                RenameCollision::SuffixRenamed
            };
            let names: Vec<&str> = initial.iter().map(String::as_str).collect();
            let mut h = make_objects(&names, mode);
            let mut proxy = load(&mut h);

            let handles: Vec<_> = h.graph.items("objects").unwrap().into_iter().map(|(_, l)| l).collect();
            for (i, live) in handles.into_iter().enumerate() {
                if removed[i] {
                    h.graph.remove(live).unwrap();
                } else if let Some(name) = &renamed[i] {
                    h.graph.rename(live, name).unwrap();
                }
            }
            for name in &added {
                h.graph.create("objects", name, None).unwrap();
            }
            sync(&mut h, &mut proxy);

            let live: BTreeSet<_> = h
                .graph
                .items("objects")
                .unwrap()
                .into_iter()
                .map(|(name, l)| (h.graph.identifier(l).unwrap(), name))
                .collect();
            let mirrored: BTreeSet<_> = proxy
                .iter()
                .map(|p| (p.uuid(), p.name().unwrap_or_default().to_string()))
                .collect();
            prop_assert_eq!(mirrored, live);

            let mut ctx = h.ctx();
            prop_assert!(CollectionDiff::compute(&mut ctx, &proxy).is_empty());
        }
    }
}

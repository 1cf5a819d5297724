//! Tests for session configuration loading.

use pretty_assertions::assert_eq;
use scenesync_proxy::{DEFAULT_MAX_DEPTH, FilterPolicy, ProxyConfig};
use scenesync_sync::{DEFAULT_COLLECTIONS, SyncConfig, SyncError};

#[test]
fn default_synchronizes_scene_graph_collections() {
    let config = SyncConfig::default();

    assert_eq!(config.collections.len(), DEFAULT_COLLECTIONS.len());
    assert_eq!(config.collections.last().map(String::as_str), Some("scenes"));
    assert!(config.is_synchronized("objects"));
    assert!(!config.is_synchronized("texts"));
    assert_eq!(config.proxy, ProxyConfig::default());
}

#[test]
fn from_json_keeps_defaults_for_missing_keys() {
    let config = SyncConfig::from_json(r#"{"peer_name": "studio"}"#).unwrap();

    assert_eq!(config.peer_name, "studio");
    assert_eq!(config.collections, SyncConfig::default().collections);
    assert_eq!(config.proxy.max_depth, DEFAULT_MAX_DEPTH);
}

#[test]
fn from_json_reads_nested_sections() {
    let config = SyncConfig::from_json(
        r#"{
            "collections": ["meshes", "objects"],
            "proxy": {"max_depth": 4, "placeholder_container": null},
            "filter": {"excluded_prefixes": ["_tmp"], "excluded_fields": {"objects": ["matrix_world"]}}
        }"#,
    )
    .unwrap();

    assert_eq!(config.collections, vec!["meshes", "objects"]);
    assert_eq!(config.proxy.max_depth, 4);
    assert_eq!(config.proxy.container_collection, "scenes");
    assert_eq!(config.proxy.placeholder_container, None);
    assert_eq!(config.filter.excluded_prefixes, vec!["_tmp"]);
    assert!(!config.filter.is_synchronized_field("objects", "matrix_world"));
    assert!(config.filter.is_synchronized_field("meshes", "matrix_world"));
}

#[test]
fn from_json_rejects_malformed_document() {
    let result = SyncConfig::from_json(r#"{"collections": "objects"}"#);

    assert!(matches!(result, Err(SyncError::Codec(_))));
}

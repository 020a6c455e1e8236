//! End-to-end scenarios: build a tree from a record stream, then query and
//! mutate it through the public `Tree` surface, checking the invariants of
//! spec.md §8 as observable behaviour rather than internal state.

use arbor::{
    Axis, BuildOptions, Conditions, Engine, EngineConfig, IndexSpec, Op, Order, Source, Tree, TreeBuilder, Value,
};
use serde_json::json;
use std::sync::Arc;

async fn open(name: &str) -> Arc<Engine> {
    Arc::new(Engine::open(EngineConfig::memory(name)).await.unwrap())
}

fn sample_records() -> Vec<serde_json::Value> {
    vec![
        json!({"id": "r", "parent": null, "label": "root"}),
        json!({"id": "a", "parent": "r", "label": "alpha", "tags": ["x", "y"]}),
        json!({"id": "b", "parent": "r", "label": "beta", "tags": ["y"]}),
        json!({"id": "c", "parent": "a", "label": "gamma", "tags": []}),
    ]
}

async fn build_sample(name: &str) -> Tree {
    let engine = open(name).await;
    TreeBuilder::build(engine, name, Source::Records(sample_records()), BuildOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn ingest_then_query_round_trips_records() {
    let tree = build_sample("ingest_then_query").await;

    assert_eq!(tree.size().await.unwrap(), 4);
    assert_eq!(tree.root_id().await.unwrap().as_deref(), Some("r"));

    let root = tree.node("r", &[]).await.unwrap().unwrap();
    assert_eq!(root.get("label"), Some(&Value::Text("root".to_string())));

    let children = tree.children("r", &["id".to_string()]).await.unwrap();
    let mut ids: Vec<_> = children.iter().filter_map(|r| r.get("id").and_then(Value::as_str)).collect();
    ids.sort();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn metadata_sweep_derives_depth_and_leaf_flags() {
    let tree = build_sample("metadata_sweep").await;

    let root_meta = tree.node("r", &["depth".to_string(), "is_root".to_string(), "is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(root_meta.get("depth"), Some(&Value::Integer(0)));
    assert_eq!(root_meta.get("is_root"), Some(&Value::Bool(true)));

    let a_meta = tree.node("a", &["depth".to_string(), "is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(a_meta.get("depth"), Some(&Value::Integer(1)));
    assert_eq!(a_meta.get("is_leaf"), Some(&Value::Bool(false)));

    let c_meta = tree.node("c", &["depth".to_string(), "is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(c_meta.get("depth"), Some(&Value::Integer(2)));
    assert_eq!(c_meta.get("is_leaf"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn add_then_delete_restores_parent_state() {
    let tree = build_sample("add_then_delete").await;

    let before = tree.node("a", &["children".to_string()]).await.unwrap().unwrap();

    let mut record = arbor::Record::default();
    record.set("id", Value::Text("d".to_string()));
    record.set("parent", Value::Text("a".to_string()));
    record.set("label", Value::Text("delta".to_string()));
    tree.add(record).await.unwrap();

    let a_after_add = tree.node("a", &["is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(a_after_add.get("is_leaf"), Some(&Value::Bool(false)));

    tree.delete("d").await.unwrap();

    let after = tree.node("a", &["children".to_string()]).await.unwrap().unwrap();
    assert_eq!(before.get("children"), after.get("children"));
}

#[tokio::test]
async fn delete_restores_leaf_flag_when_parent_becomes_childless() {
    let tree = build_sample("delete_restores_leaf_flag").await;

    let c_before = tree.node("c", &["is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(c_before.get("is_leaf"), Some(&Value::Bool(true)));

    let mut record = arbor::Record::default();
    record.set("id", Value::Text("e".to_string()));
    record.set("parent", Value::Text("c".to_string()));
    record.set("label", Value::Text("epsilon".to_string()));
    tree.add(record).await.unwrap();

    let c_after_add = tree.node("c", &["is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(c_after_add.get("is_leaf"), Some(&Value::Bool(false)));

    tree.delete("e").await.unwrap();

    let c_after_delete = tree.node("c", &["is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(c_after_delete.get("is_leaf"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn single_record_root_is_a_leaf() {
    let name = "single_record_root";
    let engine = open(name).await;
    let records = vec![json!({"id": "r", "parent": null})];
    let tree = TreeBuilder::build(engine, name, Source::Records(records), BuildOptions::default()).await.unwrap();

    let root = tree.node("r", &["is_leaf".to_string()]).await.unwrap().unwrap();
    assert_eq!(root.get("is_leaf"), Some(&Value::Bool(true)));
}

#[tokio::test]
async fn add_refuses_second_root() {
    let tree = build_sample("add_refuses_second_root").await;
    let mut record = arbor::Record::default();
    record.set("id", Value::Text("other_root".to_string()));
    record.set("parent", Value::Null);
    let err = tree.add(record).await.unwrap_err();
    assert!(matches!(err, arbor::TreeError::InvariantViolation(_)));
}

#[tokio::test]
async fn delete_refuses_root() {
    let tree = build_sample("delete_refuses_root").await;
    let err = tree.delete("r").await.unwrap_err();
    assert!(matches!(err, arbor::TreeError::InvariantViolation(_)));
}

#[tokio::test]
async fn compositional_query_matches_and_or_groups() {
    let tree = build_sample("compositional_query").await;

    let conds = Conditions::new()
        .leaf("label", Op::Eq, "alpha")
        .or()
        .leaf("label", Op::Eq, "beta")
        .build();
    let rows = tree.nodes_where(&conds, &["id".to_string()], Some(&Order::new(["id"], Axis::Asc)), None).await.unwrap();
    let ids: Vec<_> = rows.iter().filter_map(|r| r.get("id").and_then(Value::as_str)).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn jsonlist_index_backfills_and_is_queryable() {
    let name = "jsonlist_index";
    let engine = open(name).await;
    let options = BuildOptions {
        indexes: vec![IndexSpec::JsonList { field: "tags".to_string() }],
        ..Default::default()
    };
    let tree = TreeBuilder::build(engine.clone(), name, Source::Records(sample_records()), options).await.unwrap();

    let row = engine
        .scalar_i64(&format!("SELECT COUNT(*) FROM {name}__tags;"), &[])
        .await
        .unwrap();
    // "x","y" for a, "y" for b, none for c: 3 element rows total.
    assert_eq!(row, 3);

    let conds = Conditions::new().leaf("tags", Op::Eq, "x").build();
    let rows = tree.nodes_where(&conds, &["id".to_string()], None, None).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("id"), Some(&Value::Text("a".to_string())));
}

#[tokio::test]
async fn path_between_siblings_passes_through_their_parent() {
    let tree = build_sample("path_between_siblings").await;
    let path = tree.path("a", "b", &["id".to_string()]).await.unwrap();
    let ids: Vec<_> = path.iter().filter_map(|r| r.get("id").and_then(Value::as_str)).collect();
    assert_eq!(ids, vec!["a", "r", "b"]);
}

#[tokio::test]
async fn path_between_parent_and_child_is_direct() {
    let tree = build_sample("path_parent_child").await;
    let path = tree.path("a", "c", &["id".to_string()]).await.unwrap();
    let ids: Vec<_> = path.iter().filter_map(|r| r.get("id").and_then(Value::as_str)).collect();
    assert_eq!(ids, vec!["a", "c"]);
}

/// "c" (depth 2, under "a") and "b" (depth 1, under "r") share "r" as their
/// lowest common ancestor, via the intermediate ancestor "a".
#[tokio::test]
async fn path_between_cousins_passes_through_lowest_common_ancestor() {
    let tree = build_sample("path_between_cousins").await;
    let path = tree.path("c", "b", &["id".to_string()]).await.unwrap();
    let ids: Vec<_> = path.iter().filter_map(|r| r.get("id").and_then(Value::as_str)).collect();
    assert_eq!(ids, vec!["c", "a", "r", "b"]);
}

#[tokio::test]
async fn build_from_json_lines_source() {
    let name = "jsonl_build";
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nodes.jl");
    let lines: Vec<String> = sample_records().iter().map(|r| r.to_string()).collect();
    std::fs::write(&path, lines.join("\n")).unwrap();

    let engine = open(name).await;
    let tree = TreeBuilder::build(engine, name, Source::Path(path), BuildOptions::default()).await.unwrap();
    assert_eq!(tree.size().await.unwrap(), 4);
    assert_eq!(tree.root_id().await.unwrap().as_deref(), Some("r"));
}

#[tokio::test]
async fn batch_boundary_at_exactly_one_batch_size() {
    let name = "batch_boundary";
    let mut records = vec![json!({"id": "r", "parent": null})];
    for i in 0..5 {
        records.push(json!({"id": format!("n{i}"), "parent": "r"}));
    }
    let engine = open(name).await;
    let options = BuildOptions { batch_size: 2, ..Default::default() };
    let tree = TreeBuilder::build(engine, name, Source::Records(records), options).await.unwrap();

    assert_eq!(tree.size().await.unwrap(), 6);
    let children = tree.children("r", &["id".to_string()]).await.unwrap();
    assert_eq!(children.len(), 5);
}

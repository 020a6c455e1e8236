//! Metadata sweep (spec.md §4.5 stage 5): corrects the root's `is_leaf`
//! now that its full set of children is known, then BFS over the
//! already-ingested `children` lists, emitting `(nid, depth, false,
//! is_leaf)` rows layer by layer for everything below it. Grounded on
//! `TreeBuilder._build_metadata`, whose `layers_size` counter exists only
//! to detect a depth transition inside a flat queue; carrying `(id,
//! depth)` pairs through the queue directly gets the same layering
//! without that counter.

use crate::engine::Engine;
use crate::error::{Result, TreeError};
use crate::query::{OnConflict, QueryCompiler};
use crate::schema::TreeSchema;
use crate::value::{FieldKind, Record, Value};
use std::collections::{HashMap, VecDeque};

pub async fn sweep(engine: &Engine, schema: &TreeSchema, root_id: &str, batch_size: usize) -> Result<()> {
    let compiler = QueryCompiler::new(schema);
    let mut kinds = HashMap::new();
    kinds.insert("id".to_string(), FieldKind::Text);
    kinds.insert("children".to_string(), FieldKind::JsonList);

    let root_children = fetch_children(engine, schema, root_id, &kinds).await?;
    set_is_leaf(engine, schema, root_id, root_children.is_empty()).await?;

    let mut queue: VecDeque<(String, i64)> = root_children.into_iter().map(|c| (c, 1)).collect();

    let mut batch: Vec<Record> = Vec::with_capacity(batch_size);
    while let Some((id, depth)) = queue.pop_front() {
        let children = fetch_children(engine, schema, &id, &kinds).await?;
        let is_leaf = children.is_empty();
        for cid in children {
            queue.push_back((cid, depth + 1));
        }

        let meta: Record = [
            ("nid".to_string(), Value::Text(id)),
            ("depth".to_string(), Value::Integer(depth)),
            ("is_root".to_string(), Value::Bool(false)),
            ("is_leaf".to_string(), Value::Bool(is_leaf)),
        ]
        .into_iter()
        .collect();
        batch.push(meta);

        if batch.len() >= batch_size {
            flush(engine, schema, &compiler, &mut batch).await?;
        }
    }
    flush(engine, schema, &compiler, &mut batch).await?;
    Ok(())
}

/// The root's row is written by `ingest::write_root` before its children
/// exist, always with a provisional `is_leaf = false`; this corrects it
/// once the full set of the root's children is known.
async fn set_is_leaf(engine: &Engine, schema: &TreeSchema, id: &str, is_leaf: bool) -> Result<()> {
    let sql = format!("UPDATE {} SET is_leaf = ? WHERE nid = ?;", schema.metadata.name);
    engine.execute(&sql, &[Value::Bool(is_leaf), Value::Text(id.to_string())]).await?;
    Ok(())
}

async fn fetch_children(engine: &Engine, schema: &TreeSchema, id: &str, kinds: &HashMap<String, FieldKind>) -> Result<Vec<String>> {
    let sql = format!("SELECT id, children FROM {} WHERE id = ?;", schema.nodes.name);
    let node = engine
        .fetch_optional(&sql, &[Value::Text(id.to_string())], kinds)
        .await?
        .ok_or_else(|| TreeError::not_found(id))?;
    match node.get("children") {
        Some(Value::JsonList(items)) => items
            .iter()
            .map(|v| v.as_str().map(str::to_owned).ok_or_else(|| TreeError::data_model("children element is not a string")))
            .collect(),
        _ => Ok(Vec::new()),
    }
}

async fn flush(engine: &Engine, schema: &TreeSchema, compiler: &QueryCompiler<'_>, batch: &mut Vec<Record>) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }
    let mut tx = engine.begin().await?;
    for meta in batch.drain(..) {
        let (sql, values) = compiler.compile_insert(&schema.metadata, &meta, OnConflict::None_);
        tx.execute(&sql, &values).await?;
    }
    tx.commit().await?;
    Ok(())
}

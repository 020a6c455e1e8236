//! Streaming batched ingest (spec.md §4.5 stage 4). Grounded on
//! `TreeBuilder.populate_tree`/`_build_nodes`/`_add_remaining_children`: the
//! root is written immediately if seen first; every other record is held in
//! a batch while its `(parent -> [id])` edge is recorded in a deferred map,
//! and the batch is flushed once it reaches `batch_size` or the source is
//! exhausted. A parent's `children` column is always rederived from that
//! edge map at flush time, never taken from the record's own inline value,
//! since in the streaming format children arrive as separate child records
//! declaring their parent.

use crate::engine::Engine;
use crate::error::{Result, TreeError};
use crate::query::{OnConflict, QueryCompiler};
use crate::schema::{Field, SqlTable, TreeSchema};
use crate::value::{FieldKind, Record, Value};
use serde_json::Value as Json;
use std::collections::{HashMap, VecDeque};

pub async fn ingest<I>(engine: &Engine, schema: &TreeSchema, records: I, batch_size: usize) -> Result<()>
where
    I: Iterator<Item = Result<Json>>,
{
    let columns: Vec<Field> = schema.nodes.fields().to_vec();
    let compiler = QueryCompiler::new(schema);
    let mut kinds = HashMap::new();
    kinds.insert("id".to_string(), FieldKind::Text);
    kinds.insert("children".to_string(), FieldKind::JsonList);

    let mut root_written = false;
    let mut batch: VecDeque<(String, Record)> = VecDeque::new();
    let mut pending_children: HashMap<String, Vec<String>> = HashMap::new();

    for record in records {
        let raw = record?;
        let obj = raw.as_object().ok_or_else(|| TreeError::data_model("source record is not an object"))?;
        let id = obj
            .get("id")
            .and_then(Json::as_str)
            .ok_or_else(|| TreeError::data_model("record missing 'id'"))?
            .to_string();
        let parent = match obj.get("parent") {
            Some(Json::String(p)) => Some(p.clone()),
            Some(Json::Null) | None => None,
            _ => return Err(TreeError::data_model("'parent' must be a string or null")),
        };

        if parent.is_none() && !root_written {
            root_written = true;
            let record = build_root_record(&columns, obj, &id)?;
            write_root(engine, schema, &compiler, &id, record).await?;
            continue;
        }

        let Some(pid) = &parent else {
            return Err(TreeError::invariant("a second root cannot be ingested"));
        };
        pending_children.entry(pid.clone()).or_default().push(id.clone());

        let record = build_batch_record(&columns, obj, &id, pid)?;
        batch.push_back((id, record));

        if batch.len() >= batch_size {
            flush_batch(engine, schema, &compiler, &mut batch, &mut pending_children, &kinds).await?;
        }
    }

    flush_batch(engine, schema, &compiler, &mut batch, &mut pending_children, &kinds).await?;
    Ok(())
}

fn build_root_record(columns: &[Field], obj: &serde_json::Map<String, Json>, id: &str) -> Result<Record> {
    let mut record = Record::new();
    for col in columns {
        let value = match col.name.as_str() {
            "id" => Value::Text(id.to_string()),
            "parent" => Value::Null,
            "children" => match obj.get("children") {
                Some(Json::Array(items)) => Value::JsonList(items.clone()),
                Some(Json::Null) | None => Value::JsonList(Vec::new()),
                _ => return Err(TreeError::data_model("'children' must be a list")),
            },
            other => match obj.get(other) {
                Some(raw) => Value::from_json(col.kind, raw),
                None => Value::Null,
            },
        };
        record.push(col.name.clone(), value);
    }
    Ok(record)
}

fn build_batch_record(columns: &[Field], obj: &serde_json::Map<String, Json>, id: &str, parent: &str) -> Result<Record> {
    let mut record = Record::new();
    for col in columns {
        let value = match col.name.as_str() {
            "id" => Value::Text(id.to_string()),
            "parent" => Value::Text(parent.to_string()),
            // Rederived from the deferred edge map at flush time.
            "children" => Value::JsonList(Vec::new()),
            other => match obj.get(other) {
                Some(raw) => Value::from_json(col.kind, raw),
                None => Value::Null,
            },
        };
        record.push(col.name.clone(), value);
    }
    Ok(record)
}

async fn write_root(engine: &Engine, schema: &TreeSchema, compiler: &QueryCompiler<'_>, id: &str, record: Record) -> Result<()> {
    let mut tx = engine.begin().await?;
    let (sql, values) = compiler.compile_insert(&schema.nodes, &record, OnConflict::None_);
    tx.execute(&sql, &values).await?;

    let meta: Record = [
        ("nid".to_string(), Value::Text(id.to_string())),
        ("depth".to_string(), Value::Integer(0)),
        ("is_root".to_string(), Value::Bool(true)),
        ("is_leaf".to_string(), Value::Bool(false)),
    ]
    .into_iter()
    .collect();
    let (sql, values) = compiler.compile_insert(&schema.metadata, &meta, OnConflict::None_);
    tx.execute(&sql, &values).await?;
    tx.commit().await?;
    Ok(())
}

async fn flush_batch(
    engine: &Engine,
    schema: &TreeSchema,
    compiler: &QueryCompiler<'_>,
    batch: &mut VecDeque<(String, Record)>,
    pending_children: &mut HashMap<String, Vec<String>>,
    kinds: &HashMap<String, FieldKind>,
) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let column_names: Vec<String> = schema.nodes.fields().iter().map(|f| f.name.clone()).collect();
    let insert_sql = compiler.compile_insert_many(&schema.nodes, &column_names, OnConflict::None_);

    let mut tx = engine.begin().await?;
    while let Some((id, mut record)) = batch.pop_front() {
        let children = pending_children.remove(&id).unwrap_or_default();
        record.set("children", Value::JsonList(children.into_iter().map(Json::String).collect()));
        let values: Vec<Value> = record.iter().map(|(_, v)| v.clone()).collect();
        tx.execute(&insert_sql, &values).await?;
    }

    if !pending_children.is_empty() {
        let select_sql = format!("SELECT id, children FROM {} WHERE id = ?;", schema.nodes.name);
        let update_sql = format!("UPDATE {} SET children = ? WHERE id = ?;", schema.nodes.name);
        let parent_ids: Vec<String> = pending_children.keys().cloned().collect();

        for pid in parent_ids {
            let Some(new_children) = pending_children.remove(&pid) else { continue };
            let existing = tx.fetch_optional(&select_sql, &[Value::Text(pid.clone())], kinds).await?;
            let Some(existing) = existing else {
                // Parent hasn't been written yet; keep waiting for it in a later batch.
                pending_children.insert(pid, new_children);
                continue;
            };
            let mut children = match existing.get("children") {
                Some(Value::JsonList(items)) => items.clone(),
                _ => Vec::new(),
            };
            children.extend(new_children.into_iter().map(Json::String));
            tx.execute(&update_sql, &[Value::JsonList(children), Value::Text(pid)]).await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

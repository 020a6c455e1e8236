//! Tree builder (spec.md §4.5). Grounded on `weetags/trees/tree_builder.py`'s
//! `TreeBuilder`, restructured the way the teacher turns a one-shot setup
//! sequence into a single async entry point (`ArborStorage::new` running its
//! migrations once at construction): `TreeBuilder::build` resolves the
//! source, infers or accepts a model, emits DDL, ingests in batches, sweeps
//! metadata, and installs indexes, handing back a ready `Tree`.

mod indexes;
mod ingest;
mod metadata;
mod model;

pub use indexes::IndexSpec;
pub use model::{infer_model, TreeModel};

use crate::engine::Engine;
use crate::error::Result;
use crate::loaders::infer_loader;
use crate::schema::{ddl, Field, MetadataTable, NodesTable, SqlTable, TreeSchema};
use crate::tree::{Tree, TreeOptions};
use crate::value::FieldKind;
use serde_json::Value as Json;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Where the builder's input records come from (spec.md §4.5 stage 1).
pub enum Source {
    Records(Vec<Json>),
    Path(PathBuf),
    /// Build an empty tree from an explicit model with no data ingested
    /// (spec.md §3.3: "a tree is created once ... from a record stream or
    /// an explicit model").
    Model(TreeModel),
}

/// Construction parameters for `TreeBuilder::build`.
pub struct BuildOptions {
    /// Drop every `<tree>__*` table before creating the new schema, matching
    /// `build_permanent_tree`'s `replace` flag.
    pub replace: bool,
    /// Ingest batch size (spec.md §4.5 stage 4's "recommended size: 500").
    pub batch_size: usize,
    pub indexes: Vec<IndexSpec>,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            replace: false,
            batch_size: 500,
            indexes: Vec::new(),
        }
    }
}

pub struct TreeBuilder;

impl TreeBuilder {
    pub async fn build(engine: Arc<Engine>, name: &str, source: Source, options: BuildOptions) -> Result<Tree> {
        let (model, records) = Self::resolve_source(source)?;

        if options.replace {
            for table in engine.table_names(name).await? {
                engine.execute_batch(&ddl::drop_table(&table)).await?;
            }
        }

        let user_fields: Vec<Field> = model
            .iter()
            .filter(|(field, _)| !matches!(field.as_str(), "id" | "parent" | "children"))
            .map(|(field, kind)| Field::new(field.clone(), *kind))
            .collect();
        let nodes = NodesTable::synthesize(name, user_fields);
        let metadata = MetadataTable::new(name);
        let mut schema = TreeSchema::new(name, nodes, metadata);

        engine.execute_batch(&schema.nodes.create_table_sql()).await?;
        engine.execute_batch(&schema.metadata.create_table_sql()).await?;

        if let Some(records) = records {
            ingest::ingest(&engine, &schema, records, options.batch_size).await?;
            if let Some(root_id) = Self::find_root(&engine, &schema).await? {
                metadata::sweep(&engine, &schema, &root_id, options.batch_size).await?;
            }
        }

        for spec in &options.indexes {
            indexes::install(&engine, &mut schema, spec).await?;
        }

        Ok(Tree::new(engine, schema, TreeOptions::default()))
    }

    fn resolve_source(source: Source) -> Result<(TreeModel, Option<Box<dyn Iterator<Item = Result<Json>>>>)> {
        match source {
            Source::Records(records) => {
                let model = model::infer_model(records.clone().into_iter().map(Ok))?;
                let records: Box<dyn Iterator<Item = Result<Json>>> = Box::new(records.into_iter().map(Ok));
                Ok((model, Some(records)))
            }
            Source::Path(path) => {
                let loader = infer_loader(&path);
                let model = model::infer_model(loader.records()?)?;
                Ok((model, Some(loader.records()?)))
            }
            Source::Model(model) => Ok((model, None)),
        }
    }

    async fn find_root(engine: &Engine, schema: &TreeSchema) -> Result<Option<String>> {
        let sql = format!("SELECT nid FROM {} WHERE is_root = 1 LIMIT 1;", schema.metadata.name);
        let mut kinds = HashMap::new();
        kinds.insert("nid".to_string(), FieldKind::Text);
        let row = engine.fetch_optional(&sql, &[], &kinds).await?;
        Ok(row.and_then(|r| r.get("nid").and_then(|v| v.as_str().map(str::to_owned))))
    }
}

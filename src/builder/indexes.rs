//! Index/trigger installation (spec.md §4.5 stage 6 / `build_indexes`):
//! three branches dispatching on what kind of index was requested.

use crate::engine::Engine;
use crate::error::Result;
use crate::schema::{ddl, IndexTable, SqlTable, TreeSchema};
use crate::value::FieldKind;

/// One requested secondary index, the three forms of spec.md §4.1/§4.5.
#[derive(Debug, Clone)]
pub enum IndexSpec {
    /// A plain B-tree index on a scalar nodes column.
    Scalar { field: String },
    /// A JSONLIST field indexed via `<tree>__<field>` plus its three triggers.
    JsonList { field: String },
    /// A dotted JSON path on a JSON field, backed by a generated column.
    JsonPath { field: String, path: String },
}

pub async fn install(engine: &Engine, schema: &mut TreeSchema, spec: &IndexSpec) -> Result<()> {
    match spec {
        IndexSpec::Scalar { field } => {
            engine.execute_batch(&ddl::create_index(&schema.nodes.name, field)).await?;
        }
        IndexSpec::JsonList { field } => {
            let element_kind = schema.nodes.field(field).map(|f| f.kind).unwrap_or(FieldKind::Text);
            let index_table = IndexTable::new(&schema.tree_name, field, element_kind);
            engine.execute_batch(&index_table.create_table_sql()).await?;
            engine
                .execute_batch(&ddl::backfill_jsonlist_index(&schema.tree_name, &schema.nodes.name, field))
                .await?;
            engine
                .execute_batch(&ddl::create_jsonlist_insert_trigger(&schema.tree_name, &schema.nodes.name, field))
                .await?;
            engine
                .execute_batch(&ddl::create_jsonlist_update_trigger(&schema.tree_name, &schema.nodes.name, field))
                .await?;
            engine
                .execute_batch(&ddl::create_jsonlist_delete_trigger(&schema.tree_name, &schema.nodes.name, field))
                .await?;
            schema.add_index_table(index_table);
        }
        IndexSpec::JsonPath { field, path } => {
            engine.execute_batch(&ddl::add_json_extract_column(&schema.nodes.name, field, path)).await?;
            let column = ddl::generated_column_name(field, path);
            engine.execute_batch(&ddl::create_index(&schema.nodes.name, &column)).await?;
        }
    }
    Ok(())
}

//! Schema model: the `Field`/`Table`/`Namespace` value types and the DDL
//! they emit (spec.md §3, §4.1). Grounded on `weetags/engine/schema.py` and
//! `weetags/database/namespace.py`.

pub mod ddl;
pub mod field;
pub mod namespace;
pub mod table;

pub use field::{Field, ForeignKey};
pub use namespace::Namespace;
pub use table::{IndexTable, MetadataTable, NodesTable, SqlTable};

use crate::value::FieldKind;
use std::collections::HashMap;

/// The full compiled schema of one tree: its three table archetypes plus
/// the namespace map the query compiler consults. Built once, at open or
/// build time, and handed to every `Tree`/`QueryCompiler` call after that
/// (spec.md §4.2: "the query compiler consults it to decide select/join/where
/// forms").
#[derive(Debug, Clone)]
pub struct TreeSchema {
    pub tree_name: String,
    pub nodes: NodesTable,
    pub metadata: MetadataTable,
    pub indexes: HashMap<String, IndexTable>,
    pub namespaces: HashMap<String, Namespace>,
}

impl TreeSchema {
    pub fn new(tree_name: impl Into<String>, nodes: NodesTable, metadata: MetadataTable) -> Self {
        let tree_name = tree_name.into();
        let mut schema = Self {
            tree_name,
            nodes,
            metadata,
            indexes: HashMap::new(),
            namespaces: HashMap::new(),
        };
        schema.rebuild_namespaces();
        schema
    }

    /// Recompute the namespace map from the current tables. Called once at
    /// construction and again every time an index table is installed.
    pub fn rebuild_namespaces(&mut self) {
        self.namespaces.clear();
        for field in self.nodes.fields() {
            self.namespaces.insert(
                field.name.clone(),
                Namespace::new(&field.name, &self.nodes.name, &self.nodes.name, field.kind),
            );
        }
        // `nid` is registered alongside the rest of the metadata fields
        // (rather than skipped as a raw primary key) so `Tree`'s internal
        // `WHERE nid = ?` conditions go through the same namespace-driven
        // compiler path as every other field.
        for field in self.metadata.fields() {
            self.namespaces.insert(
                field.name.clone(),
                Namespace::new(&field.name, &self.metadata.name, &self.metadata.name, field.kind),
            );
        }
        for index in self.indexes.values() {
            if let Some(field) = index.field(&index.field_name) {
                self.namespaces.insert(
                    index.field_name.clone(),
                    Namespace::new(&index.field_name, &self.nodes.name, &index.name, field.kind),
                );
            }
        }
    }

    pub fn add_index_table(&mut self, index: IndexTable) {
        self.indexes.insert(index.field_name.clone(), index);
        self.rebuild_namespaces();
    }

    pub fn namespace(&self, field: &str) -> Option<&Namespace> {
        self.namespaces.get(field)
    }

    pub fn user_field_kinds(&self) -> HashMap<String, FieldKind> {
        self.nodes
            .fields()
            .iter()
            .filter(|f| !matches!(f.name.as_str(), "id" | "parent" | "children"))
            .map(|f| (f.name.clone(), f.kind))
            .collect()
    }
}

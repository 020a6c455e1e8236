use crate::value::FieldKind;

/// Compile-time descriptor mapping a field name to the table that stores it
/// and the table the query compiler must join to read it (spec.md §3.1,
/// §GLOSSARY). Built once per tree from the synthesized schema and reused
/// for every query compiled against that tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Namespace {
    pub field: String,
    pub owning_table: String,
    pub index_table: String,
    pub kind: FieldKind,
}

impl Namespace {
    pub fn new(
        field: impl Into<String>,
        owning_table: impl Into<String>,
        index_table: impl Into<String>,
        kind: FieldKind,
    ) -> Self {
        Self {
            field: field.into(),
            owning_table: owning_table.into(),
            index_table: index_table.into(),
            kind,
        }
    }

    /// A namespace whose field lives directly on the nodes table needs no
    /// join; anything backed by a metadata or secondary index table does.
    pub fn is_joinable(&self) -> bool {
        !self.index_table.ends_with("__nodes")
    }

    pub fn is_metadata(&self) -> bool {
        self.owning_table.ends_with("__metadata")
    }

    /// Qualified column reference for a SELECT/ORDER BY list.
    pub fn select_sql(&self) -> String {
        format!("{}.{}", self.owning_table, self.field)
    }

    /// `JOIN <index_table> ON <nodes>.id = <index_table>.nid`.
    pub fn join_sql(&self, nodes_table: &str) -> String {
        format!("JOIN {} ON {nodes_table}.id = {}.nid", self.index_table, self.index_table)
    }

    /// Qualified column reference for a WHERE leaf, against the table this
    /// field is actually indexed/stored in.
    pub fn where_column(&self) -> String {
        format!("{}.{}", self.index_table, self.field)
    }
}

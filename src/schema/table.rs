use super::field::Field;
use crate::value::FieldKind;

/// Shared behaviour of the three table archetypes of spec.md §4.1.
pub trait SqlTable {
    fn name(&self) -> &str;
    fn fields(&self) -> &[Field];

    /// `CREATE TABLE IF NOT EXISTS <name> (<cols>, PRIMARY KEY (...), <fks>);`
    fn create_table_sql(&self) -> String {
        let mut parts: Vec<String> = self.fields().iter().map(Field::to_sql).collect();

        let pk: Vec<&str> = self
            .fields()
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name.as_str())
            .collect();
        if !pk.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", pk.join(", ")));
        }

        for f in self.fields().iter().filter(|f| f.foreign_key.is_some()) {
            let fk = f.foreign_key.as_ref().unwrap();
            parts.push(fk.to_sql(&f.name));
        }

        format!("CREATE TABLE IF NOT EXISTS {} ({});", self.name(), parts.join(", "))
    }

    fn field(&self, name: &str) -> Option<&Field> {
        self.fields().iter().find(|f| f.name == name)
    }
}

/// `<tree>__nodes`: `id`, `parent`, `children`, plus synthesized user columns.
#[derive(Debug, Clone)]
pub struct NodesTable {
    pub name: String,
    pub fields: Vec<Field>,
}

impl NodesTable {
    pub fn synthesize(tree_name: &str, user_fields: Vec<Field>) -> Self {
        let mut fields = vec![
            Field::new("id", FieldKind::Text).primary_key(),
            Field::new("parent", FieldKind::Text),
            Field::new("children", FieldKind::JsonList).not_null(),
        ];
        fields.extend(user_fields);
        Self {
            name: format!("{tree_name}__nodes"),
            fields,
        }
    }
}

impl SqlTable for NodesTable {
    fn name(&self) -> &str {
        &self.name
    }
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// `<tree>__metadata`: `nid`, `depth`, `is_root`, `is_leaf`.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    pub name: String,
    pub fields: Vec<Field>,
}

impl MetadataTable {
    pub fn new(tree_name: &str) -> Self {
        let nodes_table = format!("{tree_name}__nodes");
        Self {
            name: format!("{tree_name}__metadata"),
            fields: vec![
                Field::new("nid", FieldKind::Text)
                    .primary_key()
                    .references(nodes_table, "id"),
                Field::new("depth", FieldKind::Integer).not_null(),
                Field::new("is_root", FieldKind::Bool).not_null(),
                Field::new("is_leaf", FieldKind::Bool).not_null(),
            ],
        }
    }
}

impl SqlTable for MetadataTable {
    fn name(&self) -> &str {
        &self.name
    }
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// `<tree>__<field>`: one row per `(nid, elm_idx, value)` for a JSONLIST
/// field chosen for indexing.
#[derive(Debug, Clone)]
pub struct IndexTable {
    pub name: String,
    pub fields: Vec<Field>,
    pub field_name: String,
}

impl IndexTable {
    pub fn new(tree_name: &str, field_name: &str, element_kind: FieldKind) -> Self {
        let nodes_table = format!("{tree_name}__nodes");
        Self {
            name: format!("{tree_name}__{field_name}"),
            field_name: field_name.to_string(),
            fields: vec![
                Field::new("nid", FieldKind::Text)
                    .primary_key()
                    .references(nodes_table, "id"),
                Field::new(field_name, element_kind),
                Field::new("elm_idx", FieldKind::Integer).primary_key(),
            ],
        }
    }
}

impl SqlTable for IndexTable {
    fn name(&self) -> &str {
        &self.name
    }
    fn fields(&self) -> &[Field] {
        &self.fields
    }
}

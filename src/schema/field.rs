use crate::value::FieldKind;

/// A foreign key reference, always installed with `ON DELETE CASCADE`
/// (spec.md §4.1: metadata/index rows are removed when their node is).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

impl ForeignKey {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn to_sql(&self, local_column: &str) -> String {
        format!(
            "FOREIGN KEY ({local_column}) REFERENCES {}({}) ON DELETE CASCADE",
            self.table, self.column
        )
    }
}

/// One column of a synthesized table.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub kind: FieldKind,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    pub foreign_key: Option<ForeignKey>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            nullable: true,
            unique: false,
            foreign_key: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = Some(ForeignKey::new(table, column));
        self
    }

    /// One column-definition fragment, e.g. `"depth INTEGER NOT NULL"`.
    pub fn to_sql(&self) -> String {
        let mut parts = vec![self.name.clone(), self.kind.sql_type().to_string()];
        if !self.nullable {
            parts.push("NOT NULL".to_string());
        }
        if self.unique {
            parts.push("UNIQUE".to_string());
        }
        parts.join(" ")
    }
}

//! The tagged dtype variant used throughout the crate (spec.md §9: "replace
//! runtime type checking with a tagged variant ... both validators and the
//! compiler branch on this tag").

use serde_json::Value as Json;
use std::fmt;

/// Declared column dtype for a field of the synthesized schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Integer,
    Real,
    Bool,
    Json,
    JsonList,
}

impl FieldKind {
    /// The declared SQLite column type. SQLite only truly distinguishes
    /// storage classes by affinity, but a declared type lets the engine
    /// adapter know whether a TEXT column needs JSON decoding on the way out.
    pub fn sql_type(self) -> &'static str {
        match self {
            FieldKind::Text => "TEXT",
            FieldKind::Integer => "INTEGER",
            FieldKind::Real => "REAL",
            FieldKind::Bool => "BOOL",
            FieldKind::Json => "JSON",
            FieldKind::JsonList => "JSONLIST",
        }
    }

    /// Infer a dtype from a JSON value the way the builder's model inference
    /// does (spec.md §4.5 stage 2): bool, int, str, float, list, object/other,
    /// with `None` left as a provisional absence of dtype.
    pub fn infer(value: &Json) -> Option<FieldKind> {
        match value {
            Json::Null => None,
            Json::Bool(_) => Some(FieldKind::Bool),
            Json::Number(n) if n.is_i64() || n.is_u64() => Some(FieldKind::Integer),
            Json::Number(_) => Some(FieldKind::Real),
            Json::String(_) => Some(FieldKind::Text),
            Json::Array(_) => Some(FieldKind::JsonList),
            Json::Object(_) => Some(FieldKind::Json),
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_type())
    }
}

/// A single bound/returned value, tagged by its runtime dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Bool(bool),
    Json(Json),
    JsonList(Vec<Json>),
}

impl Value {
    pub fn kind(&self) -> Option<FieldKind> {
        match self {
            Value::Null => None,
            Value::Text(_) => Some(FieldKind::Text),
            Value::Integer(_) => Some(FieldKind::Integer),
            Value::Real(_) => Some(FieldKind::Real),
            Value::Bool(_) => Some(FieldKind::Bool),
            Value::Json(_) => Some(FieldKind::Json),
            Value::JsonList(_) => Some(FieldKind::JsonList),
        }
    }

    /// Build a typed `Value` from a raw JSON value and the column's declared
    /// dtype. Used both when ingesting records and when binding a literal
    /// into a query.
    pub fn from_json(kind: FieldKind, raw: &Json) -> Value {
        if raw.is_null() {
            return Value::Null;
        }
        match kind {
            FieldKind::Text => Value::Text(raw.as_str().map(str::to_owned).unwrap_or_else(|| raw.to_string())),
            FieldKind::Integer => Value::Integer(raw.as_i64().unwrap_or_default()),
            FieldKind::Real => Value::Real(raw.as_f64().unwrap_or_default()),
            FieldKind::Bool => Value::Bool(raw.as_bool().unwrap_or_default()),
            FieldKind::Json => Value::Json(raw.clone()),
            FieldKind::JsonList => Value::JsonList(raw.as_array().cloned().unwrap_or_default()),
        }
    }

    /// The inverse of `from_json`: render back to a plain `serde_json::Value`
    /// for callers (the library "does not consume framework-specific types",
    /// spec.md §6, so JSON is the lingua franca at the edge).
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Text(s) => Json::String(s.clone()),
            Value::Integer(i) => Json::from(*i),
            Value::Real(r) => Json::from(*r),
            Value::Bool(b) => Json::from(*b),
            Value::Json(j) => j.clone(),
            Value::JsonList(list) => Json::Array(list.clone()),
        }
    }

    pub fn as_list(&self) -> Option<&[Json]> {
        match self {
            Value::JsonList(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// An ordered row: the "row-dict" of spec.md §4.2, preserved as a vector of
/// pairs rather than a `HashMap` so field order from the `SELECT` list
/// survives into the result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Vec<(String, Value)>);

impl Record {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, field: impl Into<String>, value: Value) {
        self.0.push((field.into(), value));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.iter().find(|(f, _)| f == field).map(|(_, v)| v)
    }

    /// Replace the value of an existing field, or append it if absent.
    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        let field = field.into();
        match self.0.iter_mut().find(|(f, _)| *f == field) {
            Some(entry) => entry.1 = value,
            None => self.0.push((field, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Value)> {
        self.0.iter()
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(f, _)| f.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as a plain JSON object, in field order.
    pub fn to_json(&self) -> Json {
        let mut map = serde_json::Map::new();
        for (field, value) in &self.0 {
            map.insert(field.clone(), value.to_json());
        }
        Json::Object(map)
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

//! Row-to-`Record` decoding. A column whose name is in the caller-supplied
//! `FieldKind` map is decoded according to that declared type; anything
//! else (synthesized columns such as a `COUNT(*)` alias, or a generated
//! JSON-path column) is decoded by trying progressively looser SQLite
//! storage classes, mirroring `_record_factory`'s duck-typed row walk in
//! `weetags/engine/engine.py`.

use crate::error::Result;
use crate::value::{FieldKind, Record, Value};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row};
use std::collections::HashMap;

pub fn decode_row(row: &SqliteRow, kinds: &HashMap<String, FieldKind>) -> Result<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let value = match kinds.get(&name) {
            Some(kind) => decode_typed(row, idx, *kind)?,
            None => decode_dynamic(row, idx),
        };
        record.push(name, value);
    }
    Ok(record)
}

fn decode_typed(row: &SqliteRow, idx: usize, kind: FieldKind) -> Result<Value> {
    Ok(match kind {
        FieldKind::Text => match row.try_get::<Option<String>, _>(idx).unwrap_or(None) {
            Some(s) => Value::Text(s),
            None => Value::Null,
        },
        FieldKind::Integer => match row.try_get::<Option<i64>, _>(idx).unwrap_or(None) {
            Some(i) => Value::Integer(i),
            None => Value::Null,
        },
        FieldKind::Real => match row.try_get::<Option<f64>, _>(idx).unwrap_or(None) {
            Some(r) => Value::Real(r),
            None => Value::Null,
        },
        FieldKind::Bool => match row.try_get::<Option<i64>, _>(idx).unwrap_or(None) {
            Some(i) => Value::Bool(i != 0),
            None => Value::Null,
        },
        FieldKind::Json => match row.try_get::<Option<String>, _>(idx).unwrap_or(None) {
            Some(raw) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| crate::error::TreeError::data_model(e.to_string()))?;
                Value::from_json(FieldKind::Json, &parsed)
            }
            None => Value::Null,
        },
        FieldKind::JsonList => match row.try_get::<Option<String>, _>(idx).unwrap_or(None) {
            Some(raw) => {
                let parsed: serde_json::Value =
                    serde_json::from_str(&raw).map_err(|e| crate::error::TreeError::data_model(e.to_string()))?;
                Value::from_json(FieldKind::JsonList, &parsed)
            }
            None => Value::Null,
        },
    })
}

/// Try each storage class in turn, from narrowest to widest, settling on
/// the first that decodes cleanly.
fn decode_dynamic(row: &SqliteRow, idx: usize) -> Value {
    if let Ok(Some(i)) = row.try_get::<Option<i64>, _>(idx) {
        return Value::Integer(i);
    }
    if let Ok(Some(r)) = row.try_get::<Option<f64>, _>(idx) {
        return Value::Real(r);
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(idx) {
        return Value::Text(s);
    }
    Value::Null
}

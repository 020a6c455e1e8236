//! Model inference (spec.md §4.5 stage 2). Grounded on
//! `TreeBuilder._infer_model`'s dtype-reconciliation state machine: a `NULL`
//! observation stays provisional until a concrete dtype arrives for that
//! field; two different concrete dtypes for the same field abort the build.

use crate::error::{Result, TreeError};
use crate::value::FieldKind;
use serde_json::Value as Json;
use std::collections::HashMap;

/// A resolved per-field dtype map, either inferred from a record stream or
/// supplied directly via `Source::Model`.
pub type TreeModel = HashMap<String, FieldKind>;

pub fn infer_model<I>(records: I) -> Result<TreeModel>
where
    I: Iterator<Item = Result<Json>>,
{
    let mut model: HashMap<String, Option<FieldKind>> = HashMap::new();

    for record in records {
        let record = record?;
        let obj = record.as_object().ok_or_else(|| TreeError::data_model("source record is not an object"))?;
        for (field, value) in obj {
            let observed = FieldKind::infer(value);
            match model.get_mut(field) {
                None => {
                    model.insert(field.clone(), observed);
                }
                Some(current) => match (*current, observed) {
                    (None, Some(obs)) => *current = Some(obs),
                    (Some(_), None) | (None, None) => {}
                    (Some(a), Some(b)) if a == b => {}
                    (Some(a), Some(b)) => {
                        return Err(TreeError::data_model(format!(
                            "field '{field}' has conflicting dtypes: {a} vs {b}"
                        )));
                    }
                },
            }
        }
    }

    let mut resolved: TreeModel = model.into_iter().filter_map(|(k, v)| v.map(|kind| (k, kind))).collect();

    let id_kind = resolved.get("id").copied().ok_or_else(|| TreeError::data_model("source has no 'id' field"))?;
    if id_kind != FieldKind::Text {
        return Err(TreeError::data_model("'id' field must be TEXT"));
    }
    resolved.insert("parent".to_string(), id_kind);
    resolved.insert("children".to_string(), FieldKind::JsonList);
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reconciles_provisional_null_with_later_concrete_value() {
        let records = vec![Ok(json!({"id": "a", "label": null})), Ok(json!({"id": "b", "label": "x"}))];
        let model = infer_model(records.into_iter()).unwrap();
        assert_eq!(model.get("label"), Some(&FieldKind::Text));
    }

    #[test]
    fn conflicting_concrete_dtypes_abort() {
        let records = vec![Ok(json!({"id": "a", "n": 1})), Ok(json!({"id": "b", "n": "one"}))];
        let err = infer_model(records.into_iter()).unwrap_err();
        assert!(matches!(err, TreeError::DataModel(_)));
    }

    #[test]
    fn missing_id_is_rejected() {
        let records = vec![Ok(json!({"label": "x"}))];
        let err = infer_model(records.into_iter()).unwrap_err();
        assert!(matches!(err, TreeError::DataModel(_)));
    }

    #[test]
    fn parent_and_children_are_forced() {
        let records = vec![Ok(json!({"id": "a"}))];
        let model = infer_model(records.into_iter()).unwrap();
        assert_eq!(model.get("parent"), Some(&FieldKind::Text));
        assert_eq!(model.get("children"), Some(&FieldKind::JsonList));
    }
}

use super::RecordSource;
use crate::error::{Result, TreeError};
use serde_json::Value as Json;
use std::fs;
use std::path::PathBuf;

/// Reads the whole file and parses one JSON array, yielding its elements one
/// by one (spec.md §4.6: "reads the file fully, yields records one by one").
pub struct JsonArrayLoader {
    path: PathBuf,
}

impl JsonArrayLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl RecordSource for JsonArrayLoader {
    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<Json>>>> {
        let raw = fs::read_to_string(&self.path)?;
        let parsed: Json = serde_json::from_str(&raw).map_err(|e| TreeError::data_model(e.to_string()))?;
        let items = parsed
            .as_array()
            .ok_or_else(|| TreeError::data_model("source file is not a JSON array"))?
            .clone();
        Ok(Box::new(items.into_iter().map(Ok)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_array_elements_in_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id":"a"}},{{"id":"b"}}]"#).unwrap();
        let loader = JsonArrayLoader::new(file.path());
        let records: Vec<Json> = loader.records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["id"], "a");
        assert_eq!(records[1]["id"], "b");
    }

    #[test]
    fn two_calls_yield_independent_iterators() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"id":"a"}}]"#).unwrap();
        let loader = JsonArrayLoader::new(file.path());
        let first: Vec<_> = loader.records().unwrap().collect();
        let second: Vec<_> = loader.records().unwrap().collect();
        assert_eq!(first.len(), second.len());
    }
}

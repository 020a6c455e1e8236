//! Streaming record sources (spec.md §4.6). The original `weetags.tools.loaders`
//! module was filtered out of the retrieval pack, so this module's shape
//! follows the spec's "restartable lazy sequence" contract directly, built
//! the way the teacher builds its own streaming adapters.

mod json_array;
mod json_lines;

pub use json_array::JsonArrayLoader;
pub use json_lines::{JsonLinesLoader, LineMode};

use crate::error::Result;
use serde_json::Value as Json;
use std::path::Path;

/// A restartable source of records. Every call to `records()` produces an
/// independent iterator over the same underlying data, so the builder can
/// take one pass for model inference and a second, fresh pass for ingestion.
pub trait RecordSource {
    fn records(&self) -> Result<Box<dyn Iterator<Item = Result<Json>>>>;
}

/// Dispatch by extension: `.json` is array-form, `.jl`/`.jsonlines` is
/// line-delimited, and anything else falls back to array-form.
pub fn infer_loader(path: impl AsRef<Path>) -> Box<dyn RecordSource> {
    let path = path.as_ref();
    match path.extension().and_then(|e| e.to_str()) {
        Some("jl") | Some("jsonlines") => Box::new(JsonLinesLoader::new(path, LineMode::Lazy)),
        _ => Box::new(JsonArrayLoader::new(path)),
    }
}

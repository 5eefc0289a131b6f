//! Data-standard inference for assets that predate `dataStandard`.
//!
//! Older upload clients never declared a standard, so it is guessed from
//! the encoding format and the path. Everything here goes away together
//! with the `legacy-standard-inference` feature.

use serde_json::{Map, Value};
use tracing::debug;

use crate::vocab::{Standards, VocabularyTerm};

pub(crate) fn infer_standards(asset: &Map<String, Value>) -> Vec<VocabularyTerm> {
    let mut standards = Vec::new();

    let encoding = asset
        .get("encodingFormat")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if encoding.contains("nwb") {
        standards.push(Standards::nwb());
    }

    if let Some(path) = asset.get("path").and_then(Value::as_str) {
        let name = path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        if name == "dataset_description.json" {
            standards.push(Standards::bids());
        }
        if suffixes(name) == [".ome", ".zarr"] {
            standards.push(Standards::ome_ngff());
        }
    }

    if !standards.is_empty() {
        debug!(
            "Inferred data standard for asset without dataStandard: {}",
            standards
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }
    standards
}

/// Dotted suffixes of a file name: `a.ome.zarr` has `.ome` and `.zarr`.
///
/// Leading dots belong to the stem and a name ending in `.` has none.
fn suffixes(name: &str) -> Vec<&str> {
    if name.ends_with('.') {
        return Vec::new();
    }
    let stem_start = name.len() - name.trim_start_matches('.').len();
    name.match_indices('.')
        .map(|(i, _)| i)
        .filter(|&i| i > stem_start)
        .map(|i| &name[i..])
        .map(|rest| rest[1..].find('.').map_or(rest, |end| &rest[..=end]))
        .collect()
}

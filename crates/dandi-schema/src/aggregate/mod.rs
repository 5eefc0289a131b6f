//! Streaming aggregation of asset records into an [`AssetsSummary`].
//!
//! Assets are consumed one at a time, so a lazy producer never has to hold
//! the whole dataset in memory. A malformed sub-field of an asset is logged
//! and skipped; only a failing producer aborts aggregation.

#[cfg(feature = "legacy-standard-inference")]
mod legacy;
mod summary;

pub use summary::{AssetsSummary, TermSet};

use std::borrow::Borrow;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::LimitsConfig;
use crate::error::{Result, SchemaError};
use crate::utils::sanitize_value;
use crate::vocab::{Standards, VocabularyTerm};

/// Sample types counted as samples; `cell` is counted separately.
const SAMPLE_TYPES: &[&str] = &["tissuesample", "slice"];
const CELL_TYPE: &str = "cell";

/// Folds assets into a summary one record at a time.
#[derive(Debug, Clone, Default)]
pub struct SummaryBuilder {
    summary: AssetsSummary,
}

impl SummaryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of assets folded in so far.
    pub fn assets_seen(&self) -> u64 {
        self.summary.number_of_files
    }

    pub fn add_asset(&mut self, asset: &Value) {
        self.summary.number_of_files = self.summary.number_of_files.saturating_add(1);
        let Some(asset) = asset.as_object() else {
            warn!("Asset record is not an object; counting it as an empty file");
            return;
        };

        match asset.get("contentSize") {
            None | Some(Value::Null) => {}
            Some(size) => match size.as_u64() {
                Some(bytes) => self.add_bytes(bytes),
                None => warn!("Skipping malformed contentSize {}", size),
            },
        }

        self.add_terms(asset, "approach", "ApproachType");
        self.add_terms(asset, "measurementTechnique", "MeasurementTechniqueType");
        self.add_variables(asset);
        self.add_participants(asset);
        self.add_samples(asset);
        self.add_path_entities(asset);
        self.add_standards(asset);
    }

    /// Byte totals saturate at `u64::MAX` so any grouping of assets agrees.
    fn add_bytes(&mut self, bytes: u64) {
        match self.summary.number_of_bytes.checked_add(bytes) {
            Some(total) => self.summary.number_of_bytes = total,
            None => {
                warn!("Byte total overflows u64; clamping at {}", u64::MAX);
                self.summary.number_of_bytes = u64::MAX;
            }
        }
    }

    /// Fold a builder fed from another part of the same dataset.
    pub fn merge(&mut self, other: SummaryBuilder) {
        self.summary.merge(other.summary);
    }

    pub fn finish(self) -> AssetsSummary {
        debug!(
            "Aggregated {} assets, {} bytes",
            self.summary.number_of_files, self.summary.number_of_bytes
        );
        self.summary
    }

    fn add_terms(&mut self, asset: &Map<String, Value>, field: &str, schema_key: &str) {
        let target = match field {
            "approach" => &mut self.summary.approach,
            "measurementTechnique" => &mut self.summary.measurement_technique,
            _ => &mut self.summary.data_standard,
        };
        for entry in list(asset, field) {
            match VocabularyTerm::from_value(entry, schema_key) {
                Some(term) => target.insert(term),
                None => warn!("Skipping malformed {} entry {}", field, entry),
            }
        }
    }

    fn add_variables(&mut self, asset: &Map<String, Value>) {
        for entry in list(asset, "variableMeasured") {
            let value = match entry {
                Value::String(s) => Some(s.as_str()),
                Value::Object(obj) => obj.get("value").and_then(Value::as_str),
                _ => None,
            };
            match value {
                Some(v) => {
                    self.summary.variable_measured.insert(v.to_string());
                }
                None => warn!("Skipping malformed variableMeasured entry {}", entry),
            }
        }
    }

    fn add_participants(&mut self, asset: &Map<String, Value>) {
        for entry in list(asset, "wasAttributedTo") {
            let Some(participant) = entry.as_object() else {
                warn!("Skipping malformed wasAttributedTo entry {}", entry);
                continue;
            };
            if participant.get("schemaKey").and_then(Value::as_str) != Some("Participant") {
                continue;
            }
            if let Some(species) = participant.get("species") {
                match VocabularyTerm::from_value(species, "SpeciesType") {
                    Some(term) => self.summary.species.insert(term),
                    None => warn!("Skipping malformed species {}", species),
                }
            }
            if let Some(id) = participant.get("identifier").and_then(Value::as_str) {
                if !id.is_empty() {
                    self.summary.subjects.insert(sanitize_value(id, "-"));
                }
            }
        }
    }

    /// Walk the `wasDerivedFrom` chain, following the first BioSample at
    /// each level.
    fn add_samples(&mut self, asset: &Map<String, Value>) {
        let mut level = first_biosample(asset);
        let mut depth = 0;
        while let Some(sample) = level {
            if depth >= LimitsConfig::MAX_NESTING_DEPTH {
                warn!("Sample chain deeper than {} levels; ignoring the rest", depth);
                break;
            }
            let sample_type = sample
                .get("sampleType")
                .and_then(|t| t.get("name"))
                .and_then(Value::as_str);
            let identifier = sample.get("identifier").and_then(Value::as_str);
            if let (Some(sample_type), Some(identifier)) = (sample_type, identifier) {
                let id = sanitize_value(identifier, "-");
                if SAMPLE_TYPES.contains(&sample_type) {
                    self.summary.samples.insert(id);
                } else if sample_type == CELL_TYPE {
                    self.summary.cells.insert(id);
                }
            }
            level = first_biosample(sample);
            depth += 1;
        }
    }

    /// BIDS-style `sub-<label>` and `sample-<label>` entities in the file name.
    fn add_path_entities(&mut self, asset: &Map<String, Value>) {
        let Some(path) = asset.get("path").and_then(Value::as_str) else {
            return;
        };
        let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or_default();
        let stem = name.split('.').next().unwrap_or_default();
        for entity in stem.split('_') {
            if let Some(subject) = entity.strip_prefix("sub-").filter(|s| !s.is_empty()) {
                self.summary.subjects.insert(subject.to_string());
            }
            if let Some(sample) = entity.strip_prefix("sample-").filter(|s| !s.is_empty()) {
                self.summary.samples.insert(sample.to_string());
            }
        }
    }

    fn add_standards(&mut self, asset: &Map<String, Value>) {
        match asset.get("dataStandard") {
            None | Some(Value::Null) => {
                for term in infer_standards(asset) {
                    self.summary.data_standard.insert(term);
                }
            }
            Some(_) => self.add_terms(asset, "dataStandard", Standards::SCHEMA_KEY),
        }
    }
}

/// Entries of a list field; absent, null and non-list values yield nothing.
fn list<'a>(asset: &'a Map<String, Value>, field: &str) -> &'a [Value] {
    match asset.get(field) {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => &[],
        Some(other) => {
            warn!("Skipping {}: expected a list, found {}", field, other);
            &[]
        }
    }
}

fn first_biosample(record: &Map<String, Value>) -> Option<&Map<String, Value>> {
    list(record, "wasDerivedFrom")
        .iter()
        .filter_map(Value::as_object)
        .find(|e| e.get("schemaKey").and_then(Value::as_str) == Some("BioSample"))
}

#[cfg(feature = "legacy-standard-inference")]
fn infer_standards(asset: &Map<String, Value>) -> Vec<VocabularyTerm> {
    legacy::infer_standards(asset)
}

#[cfg(not(feature = "legacy-standard-inference"))]
fn infer_standards(_asset: &Map<String, Value>) -> Vec<VocabularyTerm> {
    Vec::new()
}

/// Summarize a sequence of asset records.
///
/// Never fails: an empty sequence yields an all-zero summary and malformed
/// sub-fields are skipped.
pub fn aggregate_assets_summary<I>(assets: I) -> AssetsSummary
where
    I: IntoIterator,
    I::Item: Borrow<Value>,
{
    let mut builder = SummaryBuilder::new();
    for asset in assets {
        builder.add_asset(asset.borrow());
    }
    builder.finish()
}

/// Summarize assets from a producer that can fail.
///
/// The first producer error stops aggregation and is returned as
/// [`SchemaError::Aggregation`] with the failing item's index.
pub fn try_aggregate_assets_summary<I, T, E>(assets: I) -> Result<AssetsSummary>
where
    I: IntoIterator<Item = std::result::Result<T, E>>,
    T: Borrow<Value>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let mut builder = SummaryBuilder::new();
    for (index, asset) in assets.into_iter().enumerate() {
        let asset = asset.map_err(|e| SchemaError::Aggregation {
            index,
            source: e.into(),
        })?;
        builder.add_asset(asset.borrow());
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn nwb_asset(bytes: u64, path: &str) -> Value {
        json!({
            "schemaKey": "Asset",
            "contentSize": bytes,
            "encodingFormat": "application/x-nwb",
            "path": path,
            "dataStandard": [Standards::nwb().to_value()]
        })
    }

    #[test]
    fn test_empty_input() {
        let summary = aggregate_assets_summary(Vec::<Value>::new());
        assert_eq!(summary, AssetsSummary::default());
        assert_eq!(summary.number_of_bytes, 0);
        assert!(summary.data_standard.is_empty());
    }

    #[test]
    fn test_nwb_standard_deduplicated() {
        let assets = [nwb_asset(10, "sub-1/a.nwb"), nwb_asset(5, "sub-1/b.nwb")];
        let summary = aggregate_assets_summary(&assets);
        assert_eq!(summary.number_of_bytes, 15);
        assert_eq!(summary.number_of_files, 2);
        assert_eq!(summary.data_standard.len(), 1);
        assert!(summary
            .data_standard
            .contains(Standards::SCHEMA_KEY, "Neurodata Without Borders (NWB)"));
    }

    #[test]
    fn test_subjects_and_species_from_participants() {
        let asset = json!({
            "contentSize": 1,
            "path": "sub-mouse.01/sub-mouse.01_ses-1_ecephys.nwb",
            "wasAttributedTo": [
                {
                    "schemaKey": "Participant",
                    "identifier": "mouse_01",
                    "species": {"name": "Mus musculus - House mouse"}
                },
                {"schemaKey": "Person", "identifier": "not-a-subject"},
                "garbage"
            ]
        });
        let summary = aggregate_assets_summary([asset]);
        assert_eq!(
            summary.subjects.iter().collect::<Vec<_>>(),
            vec!["mouse", "mouse-01"]
        );
        assert!(summary.species.contains("SpeciesType", "Mus musculus - House mouse"));
    }

    #[test]
    fn test_sample_chain() {
        let asset = json!({
            "path": "sub-1/sub-1_sample-s9_slice.tiff",
            "wasDerivedFrom": [{
                "schemaKey": "BioSample",
                "identifier": "cell_7",
                "sampleType": {"name": "cell"},
                "wasDerivedFrom": [
                    {"schemaKey": "Participant", "identifier": "skip"},
                    {
                        "schemaKey": "BioSample",
                        "identifier": "slice.3",
                        "sampleType": {"name": "slice"},
                        "wasDerivedFrom": [{
                            "schemaKey": "BioSample",
                            "identifier": "block",
                            "sampleType": {"name": "tissuesample"}
                        }]
                    }
                ]
            }]
        });
        let summary = aggregate_assets_summary([asset]);
        assert_eq!(summary.cells.iter().collect::<Vec<_>>(), vec!["cell-7"]);
        assert_eq!(
            summary.samples.iter().collect::<Vec<_>>(),
            vec!["block", "s9", "slice-3"]
        );
    }

    #[test]
    fn test_malformed_fields_are_skipped() {
        let asset = json!({
            "contentSize": "large",
            "approach": "electrophysiology",
            "measurementTechnique": [{"name": "spike sorting technique"}, 3],
            "variableMeasured": [{"value": "Units"}, {"unitText": "V"}],
            "path": 17
        });
        let summary = aggregate_assets_summary([asset, json!("not an asset")]);
        assert_eq!(summary.number_of_files, 2);
        assert_eq!(summary.number_of_bytes, 0);
        assert!(summary.approach.is_empty());
        assert_eq!(summary.measurement_technique.len(), 1);
        assert_eq!(summary.variable_measured.len(), 1);
    }

    #[test]
    fn test_terms_keyed_for_another_field_are_skipped() {
        let asset = json!({
            "approach": [
                {"schemaKey": "MeasurementTechniqueType", "name": "spike sorting technique"},
                {"schemaKey": "ApproachType", "name": "electrophysiological approach"}
            ],
            "measurementTechnique": [{"schemaKey": "ApproachType", "name": "behavioral approach"}],
            "dataStandard": [{"schemaKey": "SpeciesType", "name": "Rattus norvegicus"}],
            "wasAttributedTo": [{
                "schemaKey": "Participant",
                "identifier": "r1",
                "species": {"schemaKey": "StrainType", "name": "Long Evans"}
            }]
        });
        let summary = aggregate_assets_summary([asset]);
        assert_eq!(summary.approach.len(), 1);
        assert!(summary
            .approach
            .contains("ApproachType", "electrophysiological approach"));
        assert!(summary.measurement_technique.is_empty());
        assert!(summary.data_standard.is_empty());
        assert!(summary.species.is_empty());
        assert_eq!(summary.number_of_subjects(), 1);
    }

    #[test]
    fn test_byte_total_saturates() {
        let half = u64::MAX / 2 + 1;
        let assets = [nwb_asset(half, "a.nwb"), nwb_asset(half, "b.nwb"), nwb_asset(7, "c.nwb")];
        let summary = aggregate_assets_summary(&assets);
        assert_eq!(summary.number_of_bytes, u64::MAX);
        assert_eq!(summary.number_of_files, 3);

        let mut merged = aggregate_assets_summary(&assets[..1]);
        merged.merge(aggregate_assets_summary(&assets[1..]));
        assert_eq!(merged, summary);
    }

    #[test]
    fn test_declared_standard_suppresses_inference() {
        let asset = json!({
            "encodingFormat": "application/x-nwb",
            "path": "a.nwb",
            "dataStandard": [Standards::bids().to_value()]
        });
        let summary = aggregate_assets_summary([asset]);
        assert_eq!(summary.data_standard.len(), 1);
        assert!(summary
            .data_standard
            .contains(Standards::SCHEMA_KEY, "Brain Imaging Data Structure (BIDS)"));
    }

    #[cfg(feature = "legacy-standard-inference")]
    #[test]
    fn test_standard_inferred_without_declaration() {
        let asset = json!({"encodingFormat": "application/x-nwb", "path": "a.nwb"});
        let summary = aggregate_assets_summary([asset]);
        assert!(summary
            .data_standard
            .contains(Standards::SCHEMA_KEY, "Neurodata Without Borders (NWB)"));
    }

    #[test]
    fn test_producer_failure_propagates() {
        let items: Vec<std::result::Result<Value, std::io::Error>> = vec![
            Ok(nwb_asset(1, "a.nwb")),
            Err(std::io::Error::new(std::io::ErrorKind::Other, "stream reset")),
            Ok(nwb_asset(2, "b.nwb")),
        ];
        let err = try_aggregate_assets_summary(items).unwrap_err();
        match err {
            SchemaError::Aggregation { index, source } => {
                assert_eq!(index, 1);
                assert_eq!(source.to_string(), "stream reset");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_builders_merge() {
        let assets: Vec<_> = (1..=4).map(|i| nwb_asset(i, &format!("sub-{i}/f.nwb"))).collect();
        let mut left = SummaryBuilder::new();
        let mut right = SummaryBuilder::new();
        for (i, asset) in assets.iter().enumerate() {
            if i % 2 == 0 {
                left.add_asset(asset);
            } else {
                right.add_asset(asset);
            }
        }
        left.merge(right);
        assert_eq!(left.assets_seen(), 4);
        assert_eq!(left.finish(), aggregate_assets_summary(&assets));
    }
}

//! The rolled-up summary of a dataset's assets.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::vocab::VocabularyTerm;

/// Vocabulary terms deduplicated by `(schemaKey, name)`.
///
/// When the same term arrives with different identifiers, a present
/// identifier beats an absent one and the smallest identifier wins among
/// present ones, so the result does not depend on insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TermSet {
    terms: BTreeMap<(String, String), Option<String>>,
}

impl TermSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, term: VocabularyTerm) {
        let VocabularyTerm {
            schema_key,
            name,
            identifier,
        } = term;
        let slot = self.terms.entry((schema_key, name)).or_insert(None);
        *slot = match (slot.take(), identifier) {
            (Some(kept), Some(new)) => Some(kept.min(new)),
            (kept, new) => kept.or(new),
        };
    }

    pub fn union(&mut self, other: TermSet) {
        for term in other.into_iter() {
            self.insert(term);
        }
    }

    pub fn contains(&self, schema_key: &str, name: &str) -> bool {
        self.terms
            .contains_key(&(schema_key.to_string(), name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Terms ordered by `(schemaKey, name)`.
    pub fn iter(&self) -> impl Iterator<Item = VocabularyTerm> + '_ {
        self.terms.iter().map(|((schema_key, name), identifier)| VocabularyTerm {
            schema_key: schema_key.clone(),
            name: name.clone(),
            identifier: identifier.clone(),
        })
    }

    fn to_value(&self) -> Value {
        Value::Array(self.iter().map(|t| t.to_value()).collect())
    }
}

impl IntoIterator for TermSet {
    type Item = VocabularyTerm;
    type IntoIter = std::iter::Map<
        std::collections::btree_map::IntoIter<(String, String), Option<String>>,
        fn(((String, String), Option<String>)) -> VocabularyTerm,
    >;

    fn into_iter(self) -> Self::IntoIter {
        fn to_term(((schema_key, name), identifier): ((String, String), Option<String>)) -> VocabularyTerm {
            VocabularyTerm {
                schema_key,
                name,
                identifier,
            }
        }
        self.terms.into_iter().map(to_term as fn(_) -> _)
    }
}

impl FromIterator<VocabularyTerm> for TermSet {
    fn from_iter<I: IntoIterator<Item = VocabularyTerm>>(iter: I) -> Self {
        let mut set = TermSet::new();
        for term in iter {
            set.insert(term);
        }
        set
    }
}

/// Aggregate statistics over every asset of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetsSummary {
    pub number_of_bytes: u64,
    pub number_of_files: u64,
    pub data_standard: TermSet,
    pub approach: TermSet,
    pub measurement_technique: TermSet,
    pub species: TermSet,
    pub variable_measured: BTreeSet<String>,
    pub subjects: BTreeSet<String>,
    /// Tissue samples and slices.
    pub samples: BTreeSet<String>,
    pub cells: BTreeSet<String>,
}

impl AssetsSummary {
    pub fn number_of_subjects(&self) -> usize {
        self.subjects.len()
    }

    pub fn number_of_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    /// Fold another summary into this one.
    pub fn merge(&mut self, other: AssetsSummary) {
        self.number_of_bytes = self.number_of_bytes.saturating_add(other.number_of_bytes);
        self.number_of_files = self.number_of_files.saturating_add(other.number_of_files);
        self.data_standard.union(other.data_standard);
        self.approach.union(other.approach);
        self.measurement_technique.union(other.measurement_technique);
        self.species.union(other.species);
        self.variable_measured.extend(other.variable_measured);
        self.subjects.extend(other.subjects);
        self.samples.extend(other.samples);
        self.cells.extend(other.cells);
    }

    /// The `AssetsSummary` record embedded in a dataset.
    ///
    /// Counts of subjects, samples and cells appear only when non-zero,
    /// and term lists only when non-empty.
    pub fn to_record(&self) -> Value {
        let mut record = Map::new();
        record.insert("schemaKey".into(), json!("AssetsSummary"));
        record.insert("numberOfBytes".into(), json!(self.number_of_bytes));
        record.insert("numberOfFiles".into(), json!(self.number_of_files));

        let counts = [
            ("numberOfSubjects", self.number_of_subjects()),
            ("numberOfSamples", self.number_of_samples()),
            ("numberOfCells", self.number_of_cells()),
        ];
        for (field, count) in counts {
            if count > 0 {
                record.insert(field.into(), json!(count));
            }
        }

        for (field, terms) in [
            ("dataStandard", &self.data_standard),
            ("approach", &self.approach),
            ("measurementTechnique", &self.measurement_technique),
        ] {
            if !terms.is_empty() {
                record.insert(field.into(), terms.to_value());
            }
        }
        if !self.variable_measured.is_empty() {
            record.insert("variableMeasured".into(), json!(self.variable_measured));
        }
        if !self.species.is_empty() {
            record.insert("species".into(), self.species.to_value());
        }
        Value::Object(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_term_set_identifier_choice_is_order_free() {
        let bare = VocabularyTerm::new("SpeciesType", "Mus musculus");
        let a = bare.clone().with_identifier("NCBITaxon:10090");
        let b = bare.clone().with_identifier("NCBITaxon:10091");

        let forward: TermSet = [bare.clone(), b.clone(), a.clone()].into_iter().collect();
        let backward: TermSet = [a.clone(), b, bare].into_iter().collect();
        assert_eq!(forward, backward);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward.iter().next(), Some(a));
    }

    #[test]
    fn test_empty_summary_record() {
        assert_eq!(
            AssetsSummary::default().to_record(),
            json!({"schemaKey": "AssetsSummary", "numberOfBytes": 0, "numberOfFiles": 0})
        );
    }

    #[test]
    fn test_record_field_order_and_contents() {
        let mut summary = AssetsSummary {
            number_of_bytes: 42,
            number_of_files: 2,
            ..Default::default()
        };
        summary.subjects.insert("01".into());
        summary.species.insert(
            VocabularyTerm::new("SpeciesType", "Mus musculus - House mouse")
                .with_identifier("http://purl.obolibrary.org/obo/NCBITaxon_10090"),
        );
        summary.variable_measured.insert("ElectricalSeries".into());

        let record = summary.to_record();
        let keys: Vec<_> = record.as_object().unwrap().keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                "schemaKey",
                "numberOfBytes",
                "numberOfFiles",
                "numberOfSubjects",
                "variableMeasured",
                "species"
            ]
        );
        assert_eq!(record["numberOfSubjects"], 1);
        assert_eq!(record["species"][0]["schemaKey"], "SpeciesType");
        assert!(record.get("numberOfCells").is_none());
    }

    #[test]
    fn test_merge_sums_and_unions() {
        let mut left = AssetsSummary {
            number_of_bytes: 10,
            number_of_files: 1,
            ..Default::default()
        };
        left.subjects.insert("a".into());
        let mut right = AssetsSummary {
            number_of_bytes: 5,
            number_of_files: 1,
            ..Default::default()
        };
        right.subjects.insert("a".into());
        right.cells.insert("c1".into());

        left.merge(right);
        assert_eq!(left.number_of_bytes, 15);
        assert_eq!(left.number_of_files, 2);
        assert_eq!(left.number_of_subjects(), 1);
        assert_eq!(left.number_of_cells(), 1);
    }
}

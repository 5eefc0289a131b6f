//! Record validation.
//!
//! Two passes run over every record and their faults are pooled:
//! - structural: the record against the registry's shape for its kind and
//!   version
//! - semantic: cross-field rules no shape can express
//!
//! A record with any error-severity fault fails with
//! [`SchemaError::Validation`] carrying the full report.

mod report;
mod semantic;
mod structural;

pub use report::{Fault, FaultKind, Severity, ValidationPass, ValidationReport};
pub use semantic::normalized_identifier;

pub(crate) use structural::json_type_name;

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError, VersionRole};
use crate::registry::{SchemaKind, SchemaRegistry};
use crate::version::SchemaVersion;

/// Validation knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Report missing required fields as warnings instead of errors.
    ///
    /// Meant for records still being filled in.
    pub missing_ok: bool,
}

impl ValidateOptions {
    pub fn permissive() -> Self {
        Self { missing_ok: true }
    }
}

/// Checks records against the shapes held by a [`SchemaRegistry`].
#[derive(Debug, Clone)]
pub struct Validator {
    registry: Arc<SchemaRegistry>,
}

impl Validator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Validate a record as `kind` at `version` in strict mode.
    pub fn validate(
        &self,
        record: &Value,
        version: &SchemaVersion,
        kind: SchemaKind,
    ) -> Result<ValidationReport> {
        self.validate_with(record, version, kind, ValidateOptions::default())
    }

    pub fn validate_with(
        &self,
        record: &Value,
        version: &SchemaVersion,
        kind: SchemaKind,
        options: ValidateOptions,
    ) -> Result<ValidationReport> {
        self.registry.ensure_known(version, VersionRole::Target)?;
        let shape = self.registry.get_schema_shape(kind, version)?;

        let mut faults = structural::check(&shape, record, options.missing_ok);
        faults.extend(semantic::check(record, kind));

        let report = ValidationReport::new(kind, version.clone(), faults);
        debug!("Validated {}", report);
        if report.is_valid() {
            Ok(report)
        } else {
            Err(SchemaError::Validation(report))
        }
    }

    /// Validate a record against the kind and version it declares.
    ///
    /// The kind comes from `schemaKey`; the version from `schemaVersion`,
    /// or the registry's current version when the record has none.
    pub fn validate_record(
        &self,
        record: &Value,
        options: ValidateOptions,
    ) -> Result<ValidationReport> {
        let kind = record_kind(record)?;
        let version = match record.get("schemaVersion") {
            None | Some(Value::Null) => self.registry.current_version().clone(),
            Some(Value::String(raw)) => SchemaVersion::parse(raw)?,
            Some(other) => {
                return Err(SchemaError::InvalidVersion {
                    version: other.to_string(),
                    message: format!("schemaVersion must be a string, found {}", json_type_name(other)),
                })
            }
        };
        self.validate_with(record, &version, kind, options)
    }

    /// Validate a record against the current version and seal it.
    ///
    /// The record must already declare the current `schemaVersion`;
    /// migrate older records first.
    pub fn certify(&self, record: Value, kind: SchemaKind) -> Result<ValidatedRecord> {
        let current = self.registry.current_version().clone();
        let declared = record.get("schemaVersion").and_then(Value::as_str);
        if declared != Some(current.to_string().as_str()) {
            return Err(SchemaError::UnsupportedVersion {
                version: declared.unwrap_or("(none)").to_string(),
                role: VersionRole::Source,
                allowed: vec![current.to_string()],
            });
        }
        let report = self.validate(&record, &current, kind)?;
        Ok(ValidatedRecord {
            record,
            kind,
            version: current,
            report,
        })
    }
}

fn record_kind(record: &Value) -> Result<SchemaKind> {
    let key = record.get("schemaKey").and_then(Value::as_str);
    key.and_then(SchemaKind::from_schema_key)
        .ok_or_else(|| SchemaError::UnknownRecordKind {
            schema_key: key.map(str::to_string),
        })
}

/// A record that passed validation at the current schema version.
///
/// Only [`Validator::certify`] creates one; it is what gets handed to
/// publication and DOI registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    record: Value,
    kind: SchemaKind,
    version: SchemaVersion,
    report: ValidationReport,
}

impl ValidatedRecord {
    pub fn record(&self) -> &Value {
        &self.record
    }

    pub fn kind(&self) -> SchemaKind {
        self.kind
    }

    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }

    /// Warnings, if any, left over from validation.
    pub fn report(&self) -> &ValidationReport {
        &self.report
    }

    pub fn into_inner(self) -> Value {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use serde_json::json;

    fn validator() -> Validator {
        Validator::new(Arc::new(
            SchemaRegistry::new(InstanceConfig::default()).unwrap(),
        ))
    }

    fn bare_asset() -> Value {
        json!({
            "schemaKey": "Asset",
            "schemaVersion": "0.6.0",
            "contentSize": 1024,
            "encodingFormat": "application/x-nwb",
            "digest": {"dandi:dandi-etag": "0123456789abcdef0123456789abcdef-1"},
            "path": "sub-01/sub-01_ecephys.nwb"
        })
    }

    fn full_asset() -> Value {
        let mut asset = bare_asset();
        let fields = asset.as_object_mut().unwrap();
        fields.insert("id".into(), json!("dandiasset:0b0a1a4a-4fd5-4e0b-a4a4-7e0c1c2b5f11"));
        fields.insert("identifier".into(), json!("0b0a1a4a-4fd5-4e0b-a4a4-7e0c1c2b5f11"));
        fields.insert(
            "contentUrl".into(),
            json!(["https://api.dandiarchive.org/api/assets/0b0a1a4a-4fd5-4e0b-a4a4-7e0c1c2b5f11/download/"]),
        );
        asset
    }

    #[test]
    fn test_valid_bare_asset() {
        let report = validator()
            .validate(&bare_asset(), &SchemaVersion::new(0, 6, 0), SchemaKind::BareAsset)
            .unwrap();
        assert!(report.is_valid());
    }

    #[test]
    fn test_faults_from_both_passes_are_pooled() {
        let mut asset = bare_asset();
        asset["contentSize"] = json!("big");
        asset["digest"] = json!({"dandi:dandi-etag": "nope"});

        let err = validator()
            .validate(&asset, &SchemaVersion::new(0, 6, 0), SchemaKind::BareAsset)
            .unwrap_err();
        let report = err.report().unwrap();
        assert!(report.errors_in(ValidationPass::Structural).count() >= 1);
        assert!(report.errors_in(ValidationPass::Semantic).count() >= 1);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_unsupported_version_fails_before_checking() {
        let err = validator()
            .validate(&json!({}), &SchemaVersion::new(0, 9, 9), SchemaKind::Dandiset)
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_permissive_mode_downgrades_missing_fields() {
        let mut asset = bare_asset();
        asset.as_object_mut().unwrap().remove("path");
        let version = SchemaVersion::new(0, 6, 0);

        let strict = validator().validate(&asset, &version, SchemaKind::BareAsset);
        assert!(strict.is_err());

        let report = validator()
            .validate_with(&asset, &version, SchemaKind::BareAsset, ValidateOptions::permissive())
            .unwrap();
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.at("path")[0].kind, FaultKind::Missing);
    }

    #[test]
    fn test_validate_record_infers_kind_and_version() {
        let v = validator();
        let report = v.validate_record(&full_asset(), ValidateOptions::default()).unwrap();
        assert_eq!(report.kind, SchemaKind::Asset);
        assert_eq!(report.version, SchemaVersion::new(0, 6, 0));

        // schemaKey "Asset" means the full asset, which a bare record falls short of
        let err = v
            .validate_record(&bare_asset(), ValidateOptions::default())
            .unwrap_err();
        let mut missing: Vec<&str> = err
            .report()
            .unwrap()
            .errors()
            .map(|f| {
                assert_eq!(f.kind, FaultKind::Missing);
                f.path.as_str()
            })
            .collect();
        missing.sort_unstable();
        assert_eq!(missing, vec!["contentUrl", "id", "identifier"]);

        let err = v
            .validate_record(&json!({"schemaVersion": "0.6.0"}), ValidateOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRecordKind { schema_key: None }));

        let err = v
            .validate_record(&json!({"schemaKey": "Asset", "schemaVersion": 6}), ValidateOptions::default())
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVersion { .. }));
    }

    #[test]
    fn test_certify_requires_current_version() {
        let v = validator();
        let mut asset = bare_asset();
        asset["schemaVersion"] = json!("0.5.2");
        let err = v.certify(asset, SchemaKind::BareAsset).unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsupportedVersion {
                role: VersionRole::Source,
                ..
            }
        ));

        let sealed = v.certify(bare_asset(), SchemaKind::BareAsset).unwrap();
        assert_eq!(sealed.kind(), SchemaKind::BareAsset);
        assert_eq!(sealed.version(), &SchemaVersion::new(0, 6, 0));
        assert_eq!(sealed.into_inner()["path"], "sub-01/sub-01_ecephys.nwb");
    }
}

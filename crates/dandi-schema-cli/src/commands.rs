//! Subcommand implementations.
//!
//! Each command writes its JSON result to `out` so tests can capture it.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use dandi_schema::{
    try_aggregate_assets_summary, MetadataPipeline, SchemaError, SchemaKind, SchemaVersion,
    ValidateOptions,
};
use serde_json::Value;
use tracing::{info, warn};

use crate::input::{asset_stream, read_record};

fn write_json(out: &mut impl Write, value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

pub fn migrate(
    pipeline: &MetadataPipeline,
    file: &Path,
    to: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let record = read_record(file)?;
    let to = to.map(SchemaVersion::parse).transpose()?;
    let migrated = pipeline
        .migrate(&record, to.as_ref())
        .with_context(|| format!("Failed to migrate {}", file.display()))?;
    let version = migrated
        .get("schemaVersion")
        .and_then(Value::as_str)
        .unwrap_or("?");
    info!("Migrated {} to {}", file.display(), version);
    write_json(out, &migrated)
}

/// Overrides for what a record is validated as.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateRequest<'a> {
    pub kind: Option<&'a str>,
    pub schema_version: Option<&'a str>,
    pub missing_ok: bool,
}

/// Validate a record and print its report.
///
/// Returns whether the record is valid. A report with errors is printed
/// like any other; only failures to validate at all are errors.
pub fn validate(
    pipeline: &MetadataPipeline,
    file: &Path,
    request: ValidateRequest<'_>,
    out: &mut impl Write,
) -> Result<bool> {
    let record = read_record(file)?;
    let options = ValidateOptions {
        missing_ok: request.missing_ok,
    };

    let outcome = if request.kind.is_none() && request.schema_version.is_none() {
        pipeline.validator().validate_record(&record, options)
    } else {
        let kind = match request.kind {
            Some(kind) => kind.parse::<SchemaKind>()?,
            None => record
                .get("schemaKey")
                .and_then(Value::as_str)
                .and_then(SchemaKind::from_schema_key)
                .ok_or_else(|| SchemaError::UnknownRecordKind {
                    schema_key: record
                        .get("schemaKey")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })?,
        };
        let version = match request.schema_version {
            Some(raw) => SchemaVersion::parse(raw)?,
            None => match record.get("schemaVersion").and_then(Value::as_str) {
                Some(raw) => SchemaVersion::parse(raw)?,
                None => pipeline.registry().current_version().clone(),
            },
        };
        pipeline.validate(&record, &version, kind, options)
    };

    match outcome {
        Ok(report) => {
            for fault in report.warnings() {
                warn!("{}", fault);
            }
            write_json(out, &report)?;
            Ok(true)
        }
        Err(SchemaError::Validation(report)) => {
            info!("{}", report);
            write_json(out, &report)?;
            Ok(false)
        }
        Err(err) => Err(err.into()),
    }
}

pub fn aggregate(files: &[PathBuf], out: &mut impl Write) -> Result<()> {
    let summary = try_aggregate_assets_summary(asset_stream(files)?)?;
    info!(
        "Summarized {} assets from {} file(s)",
        summary.number_of_files,
        files.len()
    );
    write_json(out, &summary.to_record())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dandi_schema::InstanceConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn pipeline() -> MetadataPipeline {
        MetadataPipeline::new(InstanceConfig::default()).unwrap()
    }

    fn write(temp: &TempDir, name: &str, value: &Value) -> PathBuf {
        let path = temp.path().join(name);
        std::fs::write(&path, serde_json::to_string(value).unwrap()).unwrap();
        path
    }

    fn asset(size: u64) -> Value {
        json!({
            "schemaKey": "Asset",
            "schemaVersion": "0.6.0",
            "contentSize": size,
            "encodingFormat": "application/x-nwb",
            "digest": {"dandi:dandi-etag": "0123456789abcdef0123456789abcdef-1"},
            "path": "sub-01/sub-01_ecephys.nwb"
        })
    }

    #[test]
    fn test_validate_prints_report() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "asset.json", &asset(10));
        let mut out = Vec::new();

        let valid = validate(
            &pipeline(),
            &file,
            ValidateRequest {
                kind: Some("BareAsset"),
                ..Default::default()
            },
            &mut out,
        )
        .unwrap();
        assert!(valid);
        let report: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["kind"], "BareAsset");
        assert_eq!(report["faults"], json!([]));
    }

    #[test]
    fn test_validate_reports_faults_without_failing() {
        let temp = TempDir::new().unwrap();
        let mut record = asset(10);
        record["contentSize"] = json!(-1);
        let file = write(&temp, "asset.json", &record);
        let mut out = Vec::new();

        let valid = validate(
            &pipeline(),
            &file,
            ValidateRequest {
                kind: Some("BareAsset"),
                ..Default::default()
            },
            &mut out,
        )
        .unwrap();
        assert!(!valid);
        let report: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(report["faults"][0]["path"], "contentSize");
    }

    #[test]
    fn test_validate_unknown_version_is_an_error() {
        let temp = TempDir::new().unwrap();
        let file = write(&temp, "asset.json", &asset(10));
        let err = validate(
            &pipeline(),
            &file,
            ValidateRequest {
                schema_version: Some("0.9.9"),
                ..Default::default()
            },
            &mut Vec::new(),
        )
        .unwrap_err();
        assert_eq!(err.downcast_ref::<SchemaError>().unwrap().exit_code(), 2);
    }

    #[test]
    fn test_migrate_defaults_to_current() {
        let temp = TempDir::new().unwrap();
        let file = write(
            &temp,
            "dandiset.json",
            &json!({"schemaVersion": "0.5.2", "schemaKey": "Dandiset", "name": "x"}),
        );
        let mut out = Vec::new();
        migrate(&pipeline(), &file, None, &mut out).unwrap();
        let migrated: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(migrated["schemaVersion"], "0.6.0");
    }

    #[test]
    fn test_aggregate_prints_summary_record() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.json", &asset(10));
        let b = write(&temp, "b.json", &json!([asset(5)]));
        let mut out = Vec::new();

        aggregate(&[a, b], &mut out).unwrap();
        let summary: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(summary["numberOfBytes"], 15);
        assert_eq!(summary["numberOfFiles"], 2);
        assert_eq!(summary["numberOfSubjects"], 1);
    }

    #[test]
    fn test_aggregate_stream_error_is_an_aggregation_failure() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("broken.jsonl");
        std::fs::write(&path, "{\"contentSize\": 1}\n{oops\n").unwrap();

        let err = aggregate(&[path], &mut Vec::new()).unwrap_err();
        assert_eq!(err.downcast_ref::<SchemaError>().unwrap().exit_code(), 3);
    }
}

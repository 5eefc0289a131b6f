//! Integration tests for preparing a dataset record for publication.

mod common;

use common::{load_assets, load_fixture, registry};
use dandi_schema::{
    FaultKind, InstanceConfig, MetadataPipeline, SchemaError, SchemaKind, ValidationPass,
};
use serde_json::{json, Value};

fn pipeline() -> MetadataPipeline {
    MetadataPipeline::with_registry(registry())
}

#[test]
fn test_prepare_legacy_dandiset() {
    let pipeline = pipeline();
    let record = load_fixture("dandiset-0.3.0.json");

    let ready = pipeline.prepare_dandiset(&record, load_assets().iter()).unwrap();
    assert_eq!(ready.kind(), SchemaKind::Dandiset);
    assert_eq!(ready.version(), pipeline.registry().current_version());
    assert!(ready.report().is_valid());

    let published = ready.into_inner();
    assert_eq!(published["schemaVersion"], "0.6.0");
    assert_eq!(published["assetsSummary"]["schemaKey"], "AssetsSummary");
    assert_eq!(published["assetsSummary"]["numberOfFiles"], 4);
    assert_eq!(published["assetsSummary"]["numberOfBytes"], 2375);
    assert_eq!(published["about"][0]["schemaKey"], "Anatomy");
}

#[test]
fn test_prepare_replaces_stale_summary() {
    let pipeline = pipeline();
    let mut record = load_fixture("dandiset-0.6.0.json");
    record["assetsSummary"] = json!({
        "schemaKey": "AssetsSummary",
        "numberOfBytes": 1,
        "numberOfFiles": 1
    });

    let ready = pipeline.prepare_dandiset(&record, load_assets().iter()).unwrap();
    let summary = &ready.record()["assetsSummary"];
    assert_eq!(summary["numberOfBytes"], 2375);
    assert_eq!(summary["numberOfSubjects"], 2);
}

#[test]
fn test_prepare_without_assets() {
    let pipeline = pipeline();
    let ready = pipeline
        .prepare_dandiset(&load_fixture("dandiset-0.5.2.json"), Vec::<Value>::new())
        .unwrap();
    assert_eq!(ready.record()["assetsSummary"]["numberOfFiles"], 0);
}

#[test]
fn test_prepare_skips_terms_keyed_for_another_field() {
    let pipeline = pipeline();
    let mut assets = load_assets();
    assets[0]["approach"] = json!([
        {"schemaKey": "MeasurementTechniqueType", "name": "spike sorting technique"}
    ]);
    assets[1]["wasAttributedTo"][0]["species"] =
        json!({"schemaKey": "ApproachType", "name": "Rattus norvegicus - Norway rat"});

    let ready = pipeline
        .prepare_dandiset(&load_fixture("dandiset-0.6.0.json"), assets.iter())
        .unwrap();
    let summary = &ready.record()["assetsSummary"];
    assert_eq!(summary["approach"][0]["schemaKey"], "ApproachType");
    assert_eq!(summary["approach"].as_array().unwrap().len(), 1);
    assert_eq!(summary["species"][0]["schemaKey"], "SpeciesType");
}

#[test]
fn test_prepare_reports_every_fault() {
    let pipeline = pipeline();
    let mut record = load_fixture("dandiset-0.6.0.json");
    record["name"] = json!("  ");
    record["license"] = json!(["spdx:NOT-A-LICENSE"]);

    let err = pipeline
        .prepare_dandiset(&record, load_assets().iter())
        .unwrap_err();
    let report = match err {
        SchemaError::Validation(report) => report,
        other => panic!("expected validation faults, got {other}"),
    };
    assert!(report
        .errors_in(ValidationPass::Structural)
        .any(|f| f.path == "license[0]" && f.kind == FaultKind::Enum));
    assert!(report
        .errors_in(ValidationPass::Semantic)
        .any(|f| f.path == "name" && f.kind == FaultKind::EmptyName));
}

#[test]
fn test_prepare_rejects_unknown_source_version() {
    let mut record = load_fixture("dandiset-0.6.0.json");
    record["schemaVersion"] = json!("0.9.9");

    let err = pipeline()
        .prepare_dandiset(&record, load_assets().iter())
        .unwrap_err();
    assert_eq!(err.exit_code(), 2);
}

#[test]
fn test_pipeline_from_config() {
    let pipeline = MetadataPipeline::new(InstanceConfig::default()).unwrap();
    let migrated = pipeline
        .migrate(&load_fixture("dandiset-0.4.4.json"), None)
        .unwrap();
    assert_eq!(migrated["schemaVersion"], "0.6.0");

    let current = pipeline.registry().current_version().clone();
    let report = pipeline
        .validate(&migrated, &current, SchemaKind::Dandiset, Default::default())
        .unwrap();
    assert!(report.is_valid());
}

//! Shared fixture helpers for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use dandi_schema::{InstanceConfig, SchemaRegistry, SchemaVersion};
use serde_json::Value;

/// Dataset fixtures, one per historical version family.
pub const DANDISET_FIXTURES: &[&str] = &[
    "dandiset-0.3.0.json",
    "dandiset-0.4.4.json",
    "dandiset-0.5.2.json",
    "dandiset-0.6.0.json",
];

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load_fixture(name: &str) -> Value {
    let content = std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", name, e));
    serde_json::from_str(&content).unwrap_or_else(|e| panic!("Invalid fixture {}: {}", name, e))
}

pub fn load_assets() -> Vec<Value> {
    match load_fixture("assets.json") {
        Value::Array(items) => items,
        other => panic!("assets fixture must be an array, found {}", other),
    }
}

pub fn registry() -> Arc<SchemaRegistry> {
    Arc::new(SchemaRegistry::new(InstanceConfig::default()).expect("default registry"))
}

pub fn version(raw: &str) -> SchemaVersion {
    SchemaVersion::parse(raw).expect("valid version")
}

pub fn record_version(record: &Value) -> SchemaVersion {
    version(record["schemaVersion"].as_str().expect("fixture has schemaVersion"))
}

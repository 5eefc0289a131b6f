//! The publication pipeline: migrate, aggregate, validate.

use std::borrow::Borrow;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::aggregate::{aggregate_assets_summary, AssetsSummary};
use crate::config::InstanceConfig;
use crate::error::Result;
use crate::migrate::{MigrateOptions, Migrator};
use crate::registry::{SchemaKind, SchemaRegistry};
use crate::validate::{ValidateOptions, ValidatedRecord, ValidationReport, Validator};
use crate::version::SchemaVersion;

/// One registry shared by a [`Migrator`] and a [`Validator`].
///
/// # Example
///
/// ```rust,ignore
/// use dandi_schema::{InstanceConfig, MetadataPipeline};
///
/// let pipeline = MetadataPipeline::new(InstanceConfig::from_env()?)?;
/// let ready = pipeline.prepare_dandiset(&dandiset, assets.iter())?;
/// publish(ready.into_inner());
/// ```
#[derive(Debug, Clone)]
pub struct MetadataPipeline {
    registry: Arc<SchemaRegistry>,
    migrator: Migrator,
    validator: Validator,
}

impl MetadataPipeline {
    /// Pipeline over the built-in registry for `config`.
    pub fn new(config: InstanceConfig) -> Result<Self> {
        Ok(Self::with_registry(Arc::new(SchemaRegistry::new(config)?)))
    }

    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            migrator: Migrator::new(Arc::clone(&registry)),
            validator: Validator::new(Arc::clone(&registry)),
            registry,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Migrate a dataset record; `None` targets the current version.
    pub fn migrate(&self, record: &Value, to: Option<&SchemaVersion>) -> Result<Value> {
        let to = to.unwrap_or_else(|| self.registry.current_version());
        self.migrator.migrate_with(record, to, MigrateOptions::default())
    }

    pub fn validate(
        &self,
        record: &Value,
        version: &SchemaVersion,
        kind: SchemaKind,
        options: ValidateOptions,
    ) -> Result<ValidationReport> {
        self.validator.validate_with(record, version, kind, options)
    }

    pub fn aggregate<I>(&self, assets: I) -> AssetsSummary
    where
        I: IntoIterator,
        I::Item: Borrow<Value>,
    {
        aggregate_assets_summary(assets)
    }

    /// Bring a dataset record to publication shape.
    ///
    /// The record is migrated to the current version, its `assetsSummary`
    /// is replaced by one aggregated from `assets`, and the result is
    /// validated as a `Dandiset`.
    pub fn prepare_dandiset<I>(&self, record: &Value, assets: I) -> Result<ValidatedRecord>
    where
        I: IntoIterator,
        I::Item: Borrow<Value>,
    {
        let mut migrated = self.migrate(record, None)?;
        let summary = self.aggregate(assets);
        if let Some(fields) = migrated.as_object_mut() {
            fields.insert("assetsSummary".to_string(), summary.to_record());
        }

        let ready = self.validator.certify(migrated, SchemaKind::Dandiset)?;
        let identifier = ready
            .record()
            .get("identifier")
            .and_then(Value::as_str)
            .unwrap_or("dataset");
        info!(
            "Prepared {} for publication ({} files, {} bytes)",
            identifier,
            summary.number_of_files,
            summary.number_of_bytes
        );
        Ok(ready)
    }
}

//! DANDI Schema - Versioned metadata pipeline for a neuroscience data archive.
//!
//! This crate migrates dataset metadata records between schema versions,
//! validates dataset and asset records against versioned shapes, and folds
//! asset records into the summary a dataset carries at publication.
//!
//! Records are plain [`serde_json::Value`]s. Which shapes and vocabularies
//! are valid comes from a [`SchemaRegistry`], built once from an
//! [`InstanceConfig`] and shared by the [`Migrator`] and [`Validator`].
//!
//! # Example
//!
//! ```rust,ignore
//! use dandi_schema::{InstanceConfig, MetadataPipeline, SchemaKind, ValidateOptions};
//!
//! fn main() -> dandi_schema::Result<()> {
//!     let pipeline = MetadataPipeline::new(InstanceConfig::from_env()?)?;
//!
//!     // Upgrade an old record
//!     let current = pipeline.migrate(&old_record, None)?;
//!
//!     // Check it, collecting every fault
//!     let version = pipeline.registry().current_version().clone();
//!     let report = pipeline.validate(&current, &version, SchemaKind::Dandiset, ValidateOptions::default())?;
//!     println!("{}", report);
//!
//!     // Roll up the assets
//!     let summary = pipeline.aggregate(assets.iter());
//!     println!("{} files, {} bytes", summary.number_of_files, summary.number_of_bytes);
//!     Ok(())
//! }
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod migrate;
pub mod registry;
pub mod utils;
pub mod validate;
pub mod vocab;

mod pipeline;
mod version;

// Re-export commonly used types
pub use aggregate::{
    aggregate_assets_summary, try_aggregate_assets_summary, AssetsSummary, SummaryBuilder, TermSet,
};
pub use config::{InstanceConfig, InstanceConfigBuilder};
pub use error::{Result, SchemaError, VersionRole};
pub use migrate::{MigrateOptions, Migrator};
pub use pipeline::MetadataPipeline;
pub use registry::{
    BuiltinShapes, DirectoryShapes, SchemaKind, SchemaRegistry, SchemaRegistryBuilder,
    SchemaShape, ShapeSource,
};
pub use utils::sanitize_value;
pub use validate::{
    Fault, FaultKind, Severity, ValidateOptions, ValidatedRecord, ValidationPass,
    ValidationReport, Validator,
};
pub use version::SchemaVersion;
pub use vocab::{Standards, VocabularyTerm};

//! Schema registry.
//!
//! The registry answers three questions for the rest of the crate:
//! - which shape does a `(kind, version)` pair have
//! - which versions may a record be migrated from and to
//! - which version is current
//!
//! Shapes come from a [`ShapeSource`] (the built-in table by default, or
//! JSON files on disk) and are cached process-wide after the first
//! successful fetch. Fetch failures are returned as
//! [`SchemaError::RegistryFetch`] and never cached.

mod builtin;
mod directory;
mod kind;
pub mod shape;

pub use builtin::{
    BuiltinShapes, ASSET_ID_PATTERN, NAME_PATTERN, ORCID_PATTERN, ROR_PATTERN, UBERON_PATTERN,
};
pub use directory::DirectoryShapes;
pub use kind::SchemaKind;
pub use shape::{FieldSpec, ObjectShape, Pattern, SchemaShape, Shape, StringFormat};

use std::sync::Arc;

use mini_moka::sync::Cache;
use tracing::debug;

use crate::config::{InstanceConfig, RegistryConfig, VersionConfig};
use crate::error::{Result, SchemaError, VersionRole};
use crate::version::SchemaVersion;

/// Where schema shapes come from.
pub trait ShapeSource: Send + Sync {
    fn fetch(&self, kind: SchemaKind, version: &SchemaVersion) -> Result<SchemaShape>;
}

type ShapeKey = (SchemaKind, SchemaVersion);

/// Versioned shape lookup with a fetch-once cache.
pub struct SchemaRegistry {
    config: InstanceConfig,
    source: Box<dyn ShapeSource>,
    known: Vec<SchemaVersion>,
    inputs: Vec<SchemaVersion>,
    targets: Vec<SchemaVersion>,
    current: SchemaVersion,
    cache: Cache<ShapeKey, Arc<SchemaShape>>,
}

impl std::fmt::Debug for SchemaRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaRegistry")
            .field("config", &self.config)
            .field("known", &self.known)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl SchemaRegistry {
    /// Registry over the built-in shapes for every known version.
    pub fn new(config: InstanceConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: InstanceConfig) -> SchemaRegistryBuilder {
        SchemaRegistryBuilder::new(config)
    }

    pub fn config(&self) -> &InstanceConfig {
        &self.config
    }

    pub fn current_version(&self) -> &SchemaVersion {
        &self.current
    }

    /// Every version the registry holds shapes for, oldest first.
    pub fn list_allowed_versions(&self) -> &[SchemaVersion] {
        &self.known
    }

    /// Versions a record may be migrated from.
    pub fn allowed_input_versions(&self) -> &[SchemaVersion] {
        &self.inputs
    }

    /// Versions a record may be migrated to.
    pub fn allowed_target_versions(&self) -> &[SchemaVersion] {
        &self.targets
    }

    pub fn ensure_known(&self, version: &SchemaVersion, role: VersionRole) -> Result<()> {
        ensure_listed(&self.known, version, role)
    }

    pub fn ensure_input(&self, version: &SchemaVersion) -> Result<()> {
        ensure_listed(&self.inputs, version, VersionRole::Source)
    }

    pub fn ensure_target(&self, version: &SchemaVersion) -> Result<()> {
        ensure_listed(&self.targets, version, VersionRole::Target)
    }

    /// Shape for a record kind at a version.
    pub fn get_schema_shape(
        &self,
        kind: SchemaKind,
        version: &SchemaVersion,
    ) -> Result<Arc<SchemaShape>> {
        self.ensure_known(version, VersionRole::Target)?;

        let key = (kind, version.clone());
        if let Some(shape) = self.cache.get(&key) {
            debug!("Schema shape cache hit: {} {}", kind, version);
            return Ok(shape);
        }

        debug!("Fetching schema shape: {} {}", kind, version);
        let shape = self.source.fetch(kind, version)?;
        if shape.kind != kind || shape.version != *version {
            return Err(SchemaError::RegistryFetch {
                kind: kind.to_string(),
                version: version.to_string(),
                message: format!("source returned {} instead", shape),
                source: None,
            });
        }
        let shape = Arc::new(shape);
        self.cache.insert(key, Arc::clone(&shape));
        Ok(shape)
    }

    /// Whether a shape has already been fetched and retained.
    pub fn is_cached(&self, kind: SchemaKind, version: &SchemaVersion) -> bool {
        self.cache.contains_key(&(kind, version.clone()))
    }
}

fn ensure_listed(allowed: &[SchemaVersion], version: &SchemaVersion, role: VersionRole) -> Result<()> {
    if allowed.contains(version) {
        Ok(())
    } else {
        Err(SchemaError::UnsupportedVersion {
            version: version.to_string(),
            role,
            allowed: allowed.iter().map(ToString::to_string).collect(),
        })
    }
}

/// Builder for [`SchemaRegistry`].
///
/// # Example
///
/// ```rust,ignore
/// use dandi_schema::{DirectoryShapes, InstanceConfig, SchemaRegistry};
///
/// let dir = DirectoryShapes::new("/srv/dandi/shapes");
/// let registry = SchemaRegistry::builder(InstanceConfig::from_env()?)
///     .known_versions(dir.versions()?)
///     .source(dir)
///     .build()?;
/// ```
pub struct SchemaRegistryBuilder {
    config: InstanceConfig,
    source: Option<Box<dyn ShapeSource>>,
    known: Option<Vec<SchemaVersion>>,
    inputs: Option<Vec<SchemaVersion>>,
    targets: Option<Vec<SchemaVersion>>,
    current: Option<SchemaVersion>,
}

impl SchemaRegistryBuilder {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            config,
            source: None,
            known: None,
            inputs: None,
            targets: None,
            current: None,
        }
    }

    /// Where shapes are fetched from.
    ///
    /// Default: [`BuiltinShapes`] over the registry's config
    pub fn source(mut self, source: impl ShapeSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Versions the source can describe.
    ///
    /// Default: every built-in version
    pub fn known_versions(mut self, versions: impl IntoIterator<Item = SchemaVersion>) -> Self {
        self.known = Some(versions.into_iter().collect());
        self
    }

    /// Versions accepted as migration input.
    ///
    /// Default: all known versions
    pub fn allowed_inputs(mut self, versions: impl IntoIterator<Item = SchemaVersion>) -> Self {
        self.inputs = Some(versions.into_iter().collect());
        self
    }

    /// Versions accepted as migration target.
    ///
    /// Default: all known versions
    pub fn allowed_targets(mut self, versions: impl IntoIterator<Item = SchemaVersion>) -> Self {
        self.targets = Some(versions.into_iter().collect());
        self
    }

    /// Default: the newest known version
    pub fn current(mut self, version: SchemaVersion) -> Self {
        self.current = Some(version);
        self
    }

    pub fn build(self) -> Result<SchemaRegistry> {
        let mut known = match self.known {
            Some(known) => known,
            None => VersionConfig::KNOWN
                .iter()
                .map(|v| SchemaVersion::parse(v))
                .collect::<Result<Vec<_>>>()?,
        };
        known.sort();
        known.dedup();

        let current = match self.current {
            Some(current) => current,
            None => known.last().cloned().ok_or_else(|| SchemaError::Config {
                message: "schema registry needs at least one version".to_string(),
            })?,
        };

        let subset = |list: Option<Vec<SchemaVersion>>, what: &str| -> Result<Vec<SchemaVersion>> {
            let mut list = list.unwrap_or_else(|| known.clone());
            list.sort();
            list.dedup();
            if let Some(stray) = list.iter().find(|v| !known.contains(v)) {
                return Err(SchemaError::Config {
                    message: format!("{} version {} has no registered shape", what, stray),
                });
            }
            Ok(list)
        };
        let inputs = subset(self.inputs, "input")?;
        let targets = subset(self.targets, "target")?;
        if !targets.contains(&current) {
            return Err(SchemaError::Config {
                message: format!("current version {} is not an allowed target", current),
            });
        }

        let source = self
            .source
            .unwrap_or_else(|| Box::new(BuiltinShapes::new(self.config.clone())));

        Ok(SchemaRegistry {
            config: self.config,
            source,
            known,
            inputs,
            targets,
            current,
            cache: Cache::builder()
                .max_capacity(RegistryConfig::CACHE_CAPACITY)
                .build(),
        })
    }
}

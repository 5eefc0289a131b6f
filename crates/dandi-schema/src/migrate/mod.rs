//! Forward-only migration of dataset records between schema versions.
//!
//! A migration from `source` to `target` visits every activation version in
//! `(source, target]` in ascending order. At each one it runs the steps that
//! activate there, then fills the required fields introduced there. Finally
//! `schemaVersion` is set to the target. The input record is never mutated.
//!
//! Asset records and nested substructures introduced in later versions are
//! left as they are.

mod steps;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::registry::{SchemaKind, SchemaRegistry};
use crate::validate::{json_type_name, Validator};
use crate::version::SchemaVersion;

use steps::{fill_introduced, Triple, FIELDS_INTRODUCED_AT, STEPS};

/// Migration knobs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrateOptions {
    /// Validate the record at its own version before migrating it.
    pub validate_source: bool,
}

/// Upgrades dataset records to newer schema versions.
#[derive(Debug, Clone)]
pub struct Migrator {
    registry: Arc<SchemaRegistry>,
}

impl Migrator {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Migrate a record to `to_version` with default options.
    pub fn migrate(&self, record: &Value, to_version: &SchemaVersion) -> Result<Value> {
        self.migrate_with(record, to_version, MigrateOptions::default())
    }

    pub fn migrate_with(
        &self,
        record: &Value,
        to_version: &SchemaVersion,
        options: MigrateOptions,
    ) -> Result<Value> {
        let source = source_version(record)?;
        self.registry.ensure_input(&source)?;
        self.registry.ensure_target(to_version)?;
        if source > *to_version {
            return Err(SchemaError::InvalidVersion {
                version: to_version.to_string(),
                message: format!("cannot migrate down from {}", source),
            });
        }

        let Value::Object(fields) = record else {
            return Err(SchemaError::migration(
                "",
                record,
                format!("expected an object, found {}", json_type_name(record)),
            ));
        };
        match fields.get("schemaKey") {
            None | Some(Value::Null) => {}
            Some(Value::String(key)) if key == SchemaKind::Dandiset.schema_key() => {}
            Some(other) => {
                return Err(SchemaError::migration(
                    "schemaKey",
                    other,
                    "only Dandiset records can be migrated",
                ))
            }
        }

        if options.validate_source {
            Validator::new(Arc::clone(&self.registry)).validate(
                record,
                &source,
                SchemaKind::Dandiset,
            )?;
        }

        if source == *to_version {
            debug!("Record already at {}; nothing to migrate", source);
            return Ok(record.clone());
        }

        let mut migrated = fields.clone();
        for activation in activations(&source, to_version) {
            for step in STEPS.iter().filter(|s| s.activates == activation) {
                debug!(
                    "Applying migration step for {}.{}.{}: {}",
                    activation.0, activation.1, activation.2, step.description
                );
                (step.apply)(&mut migrated, self.registry.config())?;
            }
            let filled = fill_introduced(&mut migrated, activation);
            if !filled.is_empty() {
                debug!(
                    "Filled fields introduced in {}.{}.{}: {}",
                    activation.0,
                    activation.1,
                    activation.2,
                    filled.join(", ")
                );
            }
        }
        migrated.insert(
            "schemaVersion".to_string(),
            Value::String(to_version.to_string()),
        );

        debug!("Migrated record from {} to {}", source, to_version);
        Ok(Value::Object(migrated))
    }
}

fn source_version(record: &Value) -> Result<SchemaVersion> {
    match record.get("schemaVersion") {
        Some(Value::String(raw)) => SchemaVersion::parse(raw),
        None | Some(Value::Null) => Err(SchemaError::InvalidVersion {
            version: String::new(),
            message: "record has no schemaVersion".to_string(),
        }),
        Some(other) => Err(SchemaError::InvalidVersion {
            version: other.to_string(),
            message: format!("schemaVersion must be a string, found {}", json_type_name(other)),
        }),
    }
}

/// Activation versions crossed when moving from `source` to `target`.
fn activations(source: &SchemaVersion, target: &SchemaVersion) -> BTreeSet<Triple> {
    let (from, to) = (source.as_triple(), target.as_triple());
    STEPS
        .iter()
        .map(|s| s.activates)
        .chain(FIELDS_INTRODUCED_AT.iter().copied())
        .filter(|v| from < *v && *v <= to)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InstanceConfig;
    use serde_json::json;

    fn migrator() -> Migrator {
        Migrator::new(Arc::new(
            SchemaRegistry::new(InstanceConfig::default()).unwrap(),
        ))
    }

    fn v(s: &str) -> SchemaVersion {
        SchemaVersion::parse(s).unwrap()
    }

    #[test]
    fn test_activations_window() {
        let crossed: Vec<_> = activations(&v("0.3.0"), &v("0.6.0")).into_iter().collect();
        assert_eq!(crossed, vec![(0, 4, 0), (0, 5, 0), (0, 6, 0)]);
        assert!(activations(&v("0.4.0"), &v("0.4.4")).is_empty());
        assert_eq!(activations(&v("0.4.4"), &v("0.5.1")).len(), 1);
    }

    #[test]
    fn test_identity_returns_copy() {
        let record = json!({"schemaVersion": "0.5.1", "name": "x"});
        assert_eq!(migrator().migrate(&record, &v("0.5.1")).unwrap(), record);
    }

    #[test]
    fn test_missing_or_malformed_source_version() {
        let m = migrator();
        let err = m.migrate(&json!({"name": "x"}), &v("0.6.0")).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVersion { .. }));

        let err = m
            .migrate(&json!({"schemaVersion": "0.6"}), &v("0.6.0"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVersion { .. }));
    }

    #[test]
    fn test_downgrade_rejected() {
        let err = migrator()
            .migrate(&json!({"schemaVersion": "0.6.0"}), &v("0.4.0"))
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidVersion { .. }));
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_assets_are_not_migrated() {
        let err = migrator()
            .migrate(
                &json!({"schemaVersion": "0.4.0", "schemaKey": "Asset"}),
                &v("0.6.0"),
            )
            .unwrap_err();
        assert!(matches!(err, SchemaError::Migration { ref path, .. } if path == "schemaKey"));
    }

    #[test]
    fn test_input_not_mutated_and_version_set() {
        let record = json!({
            "schemaVersion": "0.4.4",
            "schemaKey": "Dandiset",
            "studyTarget": "memory",
            "access": [{"status": "dandi:OpenAccess"}]
        });
        let before = record.clone();
        let migrated = migrator().migrate(&record, &v("0.6.0")).unwrap();
        assert_eq!(record, before);
        assert_eq!(migrated["schemaVersion"], "0.6.0");
        assert_eq!(migrated["studyTarget"], json!(["memory"]));
        assert_eq!(migrated["keywords"], json!([]));
        assert_eq!(migrated["access"][0]["schemaKey"], "AccessRequirements");
    }

    #[test]
    fn test_restricted_inputs() {
        let registry = SchemaRegistry::builder(InstanceConfig::default())
            .allowed_inputs([v("0.6.0")])
            .build()
            .unwrap();
        let err = Migrator::new(Arc::new(registry))
            .migrate(&json!({"schemaVersion": "0.5.0"}), &v("0.6.0"))
            .unwrap_err();
        assert!(matches!(
            err,
            SchemaError::UnsupportedVersion {
                role: crate::error::VersionRole::Source,
                ..
            }
        ));
    }
}

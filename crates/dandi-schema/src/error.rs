//! Error types for the metadata pipeline.
//!
//! Every fallible operation in this crate returns [`SchemaError`]. The
//! variants mirror the failure modes callers need to tell apart: version
//! problems, records a migration step cannot transform, validation faults,
//! producer failures during aggregation, and registry fetch failures.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::validate::ValidationReport;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Which side of a migration a version argument came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionRole {
    /// The `schemaVersion` carried by the input record.
    Source,
    /// The version a caller asked to migrate or validate against.
    Target,
}

impl fmt::Display for VersionRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionRole::Source => write!(f, "source"),
            VersionRole::Target => write!(f, "target"),
        }
    }
}

/// Main error type for the dandi-schema library.
#[derive(Debug, Error)]
pub enum SchemaError {
    // Version errors
    #[error("Unsupported {role} schema version {version} (allowed: {})", .allowed.join(", "))]
    UnsupportedVersion {
        version: String,
        role: VersionRole,
        allowed: Vec<String>,
    },

    #[error("Invalid schema version {version:?}: {message}")]
    InvalidVersion { version: String, message: String },

    // Migration errors
    #[error("Cannot migrate field {path}: {message} (found {value})")]
    Migration {
        path: String,
        value: serde_json::Value,
        message: String,
    },

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(ValidationReport),

    #[error("Cannot tell what kind of record this is (schemaKey: {schema_key:?})")]
    UnknownRecordKind { schema_key: Option<String> },

    // Aggregation errors
    #[error("Failed to read asset #{index} while aggregating: {source}")]
    Aggregation {
        index: usize,
        #[source]
        source: BoxedSource,
    },

    // Registry errors
    #[error("Failed to fetch {kind} schema shape for version {version}: {message}")]
    RegistryFetch {
        kind: String,
        version: String,
        message: String,
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("Invalid schema shape: {message}")]
    InvalidShape { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },
}

/// Result type alias for dandi-schema operations.
pub type Result<T> = std::result::Result<T, SchemaError>;

impl From<std::io::Error> for SchemaError {
    fn from(err: std::io::Error) -> Self {
        SchemaError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for SchemaError {
    fn from(err: serde_json::Error) -> Self {
        SchemaError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl SchemaError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        SchemaError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    pub(crate) fn migration(
        path: impl Into<String>,
        value: &serde_json::Value,
        message: impl Into<String>,
    ) -> Self {
        SchemaError::Migration {
            path: path.into(),
            value: value.clone(),
            message: message.into(),
        }
    }

    /// The validation report carried by a [`SchemaError::Validation`].
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            SchemaError::Validation(report) => Some(report),
            _ => None,
        }
    }

    /// Process exit code used by command-line wrappers.
    ///
    /// - 1: validation faults found
    /// - 2: unsupported or malformed version, or a downgrade request
    /// - 3: migration or aggregation could not produce a result
    /// - 4: registry, configuration, IO and serialization failures
    pub fn exit_code(&self) -> i32 {
        match self {
            SchemaError::Validation(_) | SchemaError::UnknownRecordKind { .. } => 1,
            SchemaError::UnsupportedVersion { .. } | SchemaError::InvalidVersion { .. } => 2,
            SchemaError::Migration { .. } | SchemaError::Aggregation { .. } => 3,
            SchemaError::RegistryFetch { .. }
            | SchemaError::InvalidShape { .. }
            | SchemaError::Config { .. }
            | SchemaError::Io { .. }
            | SchemaError::Json { .. } => 4,
        }
    }

    /// Check if a caller could reasonably retry the operation.
    ///
    /// Migration, validation and aggregation are deterministic; only
    /// failures reaching outside the process may succeed on a second try.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchemaError::RegistryFetch { .. } | SchemaError::Io { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SchemaError::UnsupportedVersion {
            version: "0.9.9".into(),
            role: VersionRole::Source,
            allowed: vec!["0.4.0".into(), "0.6.0".into()],
        };
        assert_eq!(
            err.to_string(),
            "Unsupported source schema version 0.9.9 (allowed: 0.4.0, 0.6.0)"
        );

        let err = SchemaError::migration(
            "about[0].schemaKey",
            &serde_json::json!({"name": "x"}),
            "cannot infer schemaKey",
        );
        assert!(err.to_string().starts_with("Cannot migrate field about[0].schemaKey"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            SchemaError::InvalidVersion {
                version: "1.0".into(),
                message: "not a version".into()
            }
            .exit_code(),
            2
        );
        assert_eq!(
            SchemaError::Config {
                message: "bad".into()
            }
            .exit_code(),
            4
        );
    }

    #[test]
    fn test_retryable_errors() {
        let fetch = SchemaError::RegistryFetch {
            kind: "Dandiset".into(),
            version: "0.6.0".into(),
            message: "unreachable".into(),
            source: None,
        };
        assert!(fetch.is_retryable());
        assert!(!SchemaError::InvalidVersion {
            version: "x".into(),
            message: "bad".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_aggregation_preserves_source() {
        use std::error::Error as _;

        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "stream closed");
        let err = SchemaError::Aggregation {
            index: 3,
            source: Box::new(io),
        };
        assert!(err.to_string().contains("asset #3"));
        assert_eq!(err.source().map(|s| s.to_string()), Some("stream closed".into()));
    }
}

//! Schema version strings.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SchemaError};

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)\.(\d+)\.(\d+)$").expect("schema version regex must compile")
});

/// A `major.minor.patch` schema version.
///
/// Unlike general semver, pre-release and build suffixes are rejected.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SchemaVersion(semver::Version);

impl SchemaVersion {
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let caps = VERSION_RE
            .captures(raw)
            .ok_or_else(|| SchemaError::InvalidVersion {
                version: raw.to_string(),
                message: "expected a version of the form MAJOR.MINOR.PATCH".to_string(),
            })?;
        let component = |i: usize| -> Result<u64> {
            caps[i].parse::<u64>().map_err(|e| SchemaError::InvalidVersion {
                version: raw.to_string(),
                message: format!("version component out of range: {}", e),
            })
        };
        Ok(Self::new(component(1)?, component(2)?, component(3)?))
    }

    pub fn as_triple(&self) -> (u64, u64, u64) {
        (self.0.major, self.0.minor, self.0.patch)
    }
}

impl FromStr for SchemaVersion {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0.major, self.0.minor, self.0.patch)
    }
}

impl Serialize for SchemaVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SchemaVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

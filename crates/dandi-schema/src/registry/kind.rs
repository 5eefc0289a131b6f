//! Record kinds known to the registry.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;

/// Which shape a record is checked against.
///
/// Dataset records carry `schemaKey: "Dandiset"` and asset records carry
/// `schemaKey: "Asset"` whether or not they are published, so the kind is
/// chosen by the caller rather than read from the record alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SchemaKind {
    Dandiset,
    PublishedDandiset,
    /// Asset as stored by the archive, with server-assigned identifiers.
    Asset,
    /// Asset as produced by an upload client, before the server assigns ids.
    BareAsset,
    PublishedAsset,
}

impl SchemaKind {
    pub const ALL: [SchemaKind; 5] = [
        SchemaKind::Dandiset,
        SchemaKind::PublishedDandiset,
        SchemaKind::Asset,
        SchemaKind::BareAsset,
        SchemaKind::PublishedAsset,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaKind::Dandiset => "Dandiset",
            SchemaKind::PublishedDandiset => "PublishedDandiset",
            SchemaKind::Asset => "Asset",
            SchemaKind::BareAsset => "BareAsset",
            SchemaKind::PublishedAsset => "PublishedAsset",
        }
    }

    /// The `schemaKey` value records of this kind carry.
    pub fn schema_key(&self) -> &'static str {
        if self.is_dandiset() {
            "Dandiset"
        } else {
            "Asset"
        }
    }

    pub fn is_dandiset(&self) -> bool {
        matches!(self, SchemaKind::Dandiset | SchemaKind::PublishedDandiset)
    }

    pub fn is_published(&self) -> bool {
        matches!(self, SchemaKind::PublishedDandiset | SchemaKind::PublishedAsset)
    }

    /// Default kind for a record's `schemaKey`.
    pub fn from_schema_key(key: &str) -> Option<Self> {
        match key {
            "Dandiset" => Some(SchemaKind::Dandiset),
            "Asset" => Some(SchemaKind::Asset),
            _ => None,
        }
    }
}

impl FromStr for SchemaKind {
    type Err = SchemaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SchemaKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| SchemaError::Config {
                message: format!(
                    "unknown record kind {:?}; expected one of {}",
                    s,
                    SchemaKind::ALL.map(|k| k.as_str()).join(", ")
                ),
            })
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

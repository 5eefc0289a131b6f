//! Controlled vocabularies and vocabulary terms.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Contributor roles, without their namespace prefix.
pub const ROLES: &[&str] = &[
    "Author",
    "Conceptualization",
    "ContactPerson",
    "DataCollector",
    "DataCurator",
    "DataManager",
    "FormalAnalysis",
    "FundingAcquisition",
    "Investigation",
    "Maintainer",
    "Methodology",
    "Producer",
    "ProjectLeader",
    "ProjectManager",
    "ProjectMember",
    "ProjectAdministration",
    "Researcher",
    "Resources",
    "Software",
    "Supervision",
    "Validation",
    "Visualization",
    "Funder",
    "Sponsor",
    "StudyParticipant",
    "Affiliation",
    "EthicsApproval",
    "Other",
];

/// Relations between a dataset and a related resource, without prefix.
pub const RELATIONS: &[&str] = &[
    "IsCitedBy",
    "Cites",
    "IsSupplementTo",
    "IsSupplementedBy",
    "IsContinuedBy",
    "Continues",
    "Describes",
    "IsDescribedBy",
    "HasMetadata",
    "IsMetadataFor",
    "HasVersion",
    "IsVersionOf",
    "IsNewVersionOf",
    "IsPreviousVersionOf",
    "IsPartOf",
    "HasPart",
    "IsReferencedBy",
    "References",
    "IsDocumentedBy",
    "Documents",
    "IsCompiledBy",
    "Compiles",
    "IsVariantFormOf",
    "IsOriginalFormOf",
    "IsIdenticalTo",
    "IsReviewedBy",
    "Reviews",
    "IsDerivedFrom",
    "IsSourceOf",
    "IsRequiredBy",
    "Requires",
    "Obsoletes",
    "IsObsoletedBy",
];

/// Namespace of role and relation terms before schema 0.4.0.
pub const LEGACY_NAMESPACE: &str = "dandi:";
/// Namespace of role and relation terms from schema 0.4.0 on.
pub const CITE_NAMESPACE: &str = "dcite:";

pub const OPEN_ACCESS: &str = "dandi:OpenAccess";
pub const EMBARGOED_ACCESS: &str = "dandi:EmbargoedAccess";

pub const DIGEST_MD5: &str = "dandi:md5";
pub const DIGEST_SHA1: &str = "dandi:sha1";
pub const DIGEST_SHA2_256: &str = "dandi:sha2-256";
pub const DIGEST_SHA3_256: &str = "dandi:sha3-256";
pub const DIGEST_BLAKE2B_256: &str = "dandi:blake2b-256";
pub const DIGEST_BLAKE3: &str = "dandi:blake3";
pub const DIGEST_ETAG: &str = "dandi:dandi-etag";
pub const DIGEST_ZARR: &str = "dandi:dandi-zarr-checksum";

pub const DIGEST_TYPES: &[&str] = &[
    DIGEST_MD5,
    DIGEST_SHA1,
    DIGEST_SHA2_256,
    DIGEST_SHA3_256,
    DIGEST_BLAKE2B_256,
    DIGEST_BLAKE3,
    DIGEST_ETAG,
    DIGEST_ZARR,
];

pub const ZARR_MEDIA_TYPE: &str = "application/x-zarr";

pub fn roles(namespace: &str) -> Vec<String> {
    ROLES.iter().map(|r| format!("{namespace}{r}")).collect()
}

pub fn relations(namespace: &str) -> Vec<String> {
    RELATIONS.iter().map(|r| format!("{namespace}{r}")).collect()
}

/// A value drawn from a controlled list, e.g. a species or a data standard.
///
/// Two terms are the same term when their `(schemaKey, name)` pair matches;
/// the identifier does not take part in identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyTerm {
    pub schema_key: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl VocabularyTerm {
    pub fn new(schema_key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema_key: schema_key.into(),
            name: name.into(),
            identifier: None,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Read a `schema_key` term out of a record entry.
    ///
    /// An entry may omit `schemaKey`; one that names a different key, or
    /// has no string `name`, is not a term of this kind.
    pub fn from_value(value: &Value, schema_key: &str) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name")?.as_str()?;
        match obj.get("schemaKey") {
            None | Some(Value::Null) => {}
            Some(Value::String(key)) if key == schema_key => {}
            Some(_) => return None,
        }
        let identifier = match obj.get("identifier") {
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        };
        Some(Self {
            schema_key: schema_key.to_string(),
            name: name.to_string(),
            identifier,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        obj.insert("schemaKey".into(), json!(self.schema_key));
        if let Some(id) = &self.identifier {
            obj.insert("identifier".into(), json!(id));
        }
        obj.insert("name".into(), json!(self.name));
        Value::Object(obj)
    }
}

/// Data standards recognised by the archive.
pub struct Standards;

impl Standards {
    pub const SCHEMA_KEY: &'static str = "StandardsType";

    pub fn nwb() -> VocabularyTerm {
        VocabularyTerm::new(Self::SCHEMA_KEY, "Neurodata Without Borders (NWB)")
            .with_identifier("RRID:SCR_015242")
    }

    pub fn bids() -> VocabularyTerm {
        VocabularyTerm::new(Self::SCHEMA_KEY, "Brain Imaging Data Structure (BIDS)")
            .with_identifier("RRID:SCR_016124")
    }

    pub fn ome_ngff() -> VocabularyTerm {
        VocabularyTerm::new(Self::SCHEMA_KEY, "OME/NGFF Standard")
            .with_identifier("DOI:10.25504/FAIRsharing.9af712")
    }
}

//! Built-in shapes for every known schema version.
//!
//! One builder covers the whole version history; each field knows the
//! version range in which it exists or is required:
//!
//! - before 0.4.0: `dandi:` roles and relations, unprefixed identifiers,
//!   string affiliations, scalar `studyTarget` / `protocol`, and no
//!   required `schemaKey`, `access`, `assetsSummary` or `manifestLocation`
//! - 0.4.0: `dcite:` vocabularies, prefixed identifiers, the fields above
//!   become required
//! - 0.5.0: `keywords` and `studyTarget` are required lists
//! - 0.6.0: nested `about`, `access`, `relatedResource` and `assetsSummary`
//!   entries carry their `schemaKey`; assets declare `dataStandard`

use std::collections::BTreeMap;

use crate::config::{InstanceConfig, LimitsConfig, VersionConfig};
use crate::error::{Result, SchemaError};
use crate::registry::shape::{FieldSpec, ObjectShape, SchemaShape, Shape, StringFormat};
use crate::registry::{SchemaKind, ShapeSource};
use crate::version::SchemaVersion;
use crate::vocab::{self, CITE_NAMESPACE, LEGACY_NAMESPACE};

pub const NAME_PATTERN: &str = r"^([\w\s\-\.']+),\s+([\w\s\-\.']+)$";
pub const ORCID_PATTERN: &str = r"^\d{4}-\d{4}-\d{4}-(\d{3}X|\d{4})$";
pub const ROR_PATTERN: &str = r"^https://ror.org/[a-z0-9]+$";
pub const UBERON_PATTERN: &str = r"UBERON";
pub const ASSET_ID_PATTERN: &str =
    r"^dandiasset:[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$";
const VERSION_NUM: &str = r"\d+\.\d+\.\d+";

/// Shape source backed by the compiled-in version table.
#[derive(Debug, Clone, Default)]
pub struct BuiltinShapes {
    config: InstanceConfig,
}

impl BuiltinShapes {
    pub fn new(config: InstanceConfig) -> Self {
        Self { config }
    }
}

impl ShapeSource for BuiltinShapes {
    fn fetch(&self, kind: SchemaKind, version: &SchemaVersion) -> Result<SchemaShape> {
        let known = VersionConfig::KNOWN
            .iter()
            .any(|v| *v == version.to_string());
        if !known {
            return Err(SchemaError::RegistryFetch {
                kind: kind.to_string(),
                version: version.to_string(),
                message: "no built-in shape for this version".to_string(),
                source: None,
            });
        }
        ShapeBuilder::new(&self.config, version).build(kind)
    }
}

struct ShapeBuilder<'a> {
    config: &'a InstanceConfig,
    version: SchemaVersion,
    /// Before 0.4.0.
    legacy: bool,
    /// From 0.5.0.
    listed_keywords: bool,
    /// From 0.6.0.
    tagged: bool,
}

impl<'a> ShapeBuilder<'a> {
    fn new(config: &'a InstanceConfig, version: &SchemaVersion) -> Self {
        let v = version.as_triple();
        Self {
            config,
            version: version.clone(),
            legacy: v < (0, 4, 0),
            listed_keywords: v >= (0, 5, 0),
            tagged: v >= (0, 6, 0),
        }
    }

    fn build(&self, kind: SchemaKind) -> Result<SchemaShape> {
        let root = match kind {
            SchemaKind::Dandiset => self.dandiset()?,
            SchemaKind::PublishedDandiset => self.published_dandiset()?,
            SchemaKind::BareAsset => self.bare_asset()?,
            SchemaKind::Asset => self.asset()?,
            SchemaKind::PublishedAsset => self.published_asset()?,
        };
        let definitions = BTreeMap::from([("BioSample".to_string(), self.biosample().into())]);
        let shape = SchemaShape {
            kind,
            version: self.version.clone(),
            root,
            definitions,
        };
        shape.check()?;
        Ok(shape)
    }

    fn namespace(&self) -> &'static str {
        if self.legacy {
            LEGACY_NAMESPACE
        } else {
            CITE_NAMESPACE
        }
    }

    // Instance-specific patterns

    fn instance_names(&self) -> (String, String) {
        let name = self.config.instance_name();
        (regex::escape(name), regex::escape(&name.to_lowercase()))
    }

    fn dandiset_id_pattern(&self) -> String {
        let (upper, lower) = self.instance_names();
        if self.legacy {
            format!(r"^(?:(?:{upper}|{lower}):)?\d{{6}}/(?:draft|{VERSION_NUM})$")
        } else {
            format!(r"^(?:{upper}|{lower}):\d{{6}}/(?:draft|{VERSION_NUM})$")
        }
    }

    fn published_id_pattern(&self) -> String {
        let (upper, lower) = self.instance_names();
        format!(r"^(?:{upper}|{lower}):\d{{6}}/{VERSION_NUM}$")
    }

    fn identifier_pattern(&self) -> String {
        let (upper, _) = self.instance_names();
        if self.legacy {
            format!(r"^(?:{upper}:)?\d{{6}}$")
        } else {
            format!(r"^{upper}:\d{{6}}$")
        }
    }

    fn doi_pattern(&self) -> String {
        let (_, lower) = self.instance_names();
        let prefix = match self.config.doi_prefix() {
            Some(prefix) => regex::escape(prefix),
            None => r"10\.\d{4,}".to_string(),
        };
        format!(r"^{prefix}/{lower}\.\d{{6}}/{VERSION_NUM}$")
    }

    fn published_url_pattern(&self) -> String {
        let base = match self.config.instance_url() {
            Some(url) => regex::escape(url),
            None => r"https?://\S+".to_string(),
        };
        format!(r"^{base}/dandiset/\d{{6}}/{VERSION_NUM}$")
    }

    // Dataset records

    fn dandiset(&self) -> Result<ObjectShape> {
        let uri = || Shape::format(StringFormat::Uri);
        let strings = || Shape::array(Shape::string());

        let study_target = if self.listed_keywords {
            FieldSpec::required("studyTarget", strings())
        } else {
            FieldSpec::optional("studyTarget", Shape::any_of(vec![Shape::string(), strings()]))
        };
        let protocol = if self.listed_keywords {
            FieldSpec::optional("protocol", strings())
        } else {
            FieldSpec::optional("protocol", Shape::any_of(vec![Shape::string(), strings()]))
        };

        Ok(ObjectShape::new(vec![
            FieldSpec::optional("@context", Shape::string()),
            FieldSpec::required("id", Shape::pattern(self.dandiset_id_pattern())?),
            FieldSpec::required("identifier", Shape::pattern(self.identifier_pattern())?),
            FieldSpec::when(!self.legacy, "schemaKey", Shape::constant("Dandiset")),
            FieldSpec::required("schemaVersion", Shape::string()),
            FieldSpec::required("name", Shape::bounded_string(LimitsConfig::NAME_MAX_LENGTH)),
            FieldSpec::required(
                "description",
                Shape::bounded_string(LimitsConfig::DESCRIPTION_MAX_LENGTH),
            ),
            FieldSpec::required(
                "contributor",
                Shape::array_bounded(self.contributor()?, Some(1), None),
            ),
            FieldSpec::optional("about", Shape::array(self.about()?)),
            study_target,
            FieldSpec::when(self.listed_keywords, "keywords", strings()),
            FieldSpec::required(
                "license",
                Shape::array_bounded(Shape::enumeration(self.config.licenses()), Some(1), None),
            ),
            protocol,
            FieldSpec::optional("ethicsApproval", Shape::array(self.ethics_approval().into())),
            FieldSpec::optional("acknowledgement", Shape::string()),
            FieldSpec::when(
                !self.legacy,
                "access",
                Shape::array_bounded(self.access_requirements().into(), Some(1), None),
            ),
            FieldSpec::optional("url", uri()),
            FieldSpec::optional("repository", uri()),
            FieldSpec::optional("relatedResource", Shape::array(self.resource().into())),
            FieldSpec::optional("wasGeneratedBy", Shape::array(activity(&["Project"], false).into())),
            FieldSpec::optional("citation", Shape::string()),
            FieldSpec::when(!self.legacy, "assetsSummary", self.assets_summary().into()),
            FieldSpec::when(!self.legacy, "manifestLocation", Shape::array(uri())),
            FieldSpec::required("version", Shape::string()),
            FieldSpec::optional("doi", Shape::pattern(self.doi_pattern())?),
            FieldSpec::optional("dateCreated", Shape::format(StringFormat::DateTime)),
            FieldSpec::optional("dateModified", Shape::format(StringFormat::DateTime)),
            FieldSpec::optional("sameAs", strings()),
        ]))
    }

    fn published_dandiset(&self) -> Result<ObjectShape> {
        Ok(self
            .dandiset()?
            .with(FieldSpec::required("id", Shape::pattern(self.published_id_pattern())?))
            .with(FieldSpec::required("url", Shape::pattern(self.published_url_pattern())?))
            .with(FieldSpec::required("doi", Shape::pattern(self.doi_pattern())?))
            .with(FieldSpec::required("publishedBy", publisher()))
            .with(FieldSpec::required(
                "datePublished",
                Shape::format(StringFormat::DateTime),
            )))
    }

    fn contributor(&self) -> Result<Shape> {
        Ok(Shape::tagged(vec![self.person()?, self.organization()?]))
    }

    fn person(&self) -> Result<ObjectShape> {
        Ok(ObjectShape::new(vec![
            FieldSpec::required("schemaKey", Shape::constant("Person")),
            FieldSpec::required("name", Shape::pattern(NAME_PATTERN)?),
            FieldSpec::optional("identifier", Shape::pattern(ORCID_PATTERN)?),
            FieldSpec::optional("email", Shape::format(StringFormat::Email)),
            FieldSpec::optional("url", Shape::format(StringFormat::Uri)),
            FieldSpec::optional("roleName", Shape::array(self.roles())),
            FieldSpec::optional("includeInCitation", Shape::Boolean),
            FieldSpec::optional("awardNumber", Shape::string()),
            FieldSpec::optional("affiliation", Shape::array(self.affiliation()?)),
        ]))
    }

    fn organization(&self) -> Result<ObjectShape> {
        Ok(ObjectShape::new(vec![
            FieldSpec::required("schemaKey", Shape::constant("Organization")),
            FieldSpec::optional("name", Shape::string()),
            FieldSpec::optional("identifier", Shape::pattern(ROR_PATTERN)?),
            FieldSpec::optional("email", Shape::format(StringFormat::Email)),
            FieldSpec::optional("url", Shape::format(StringFormat::Uri)),
            FieldSpec::optional("roleName", Shape::array(self.roles())),
            FieldSpec::optional("includeInCitation", Shape::Boolean),
            FieldSpec::optional("awardNumber", Shape::string()),
            FieldSpec::optional("contactPoint", Shape::array(contact_point().into())),
        ]))
    }

    fn roles(&self) -> Shape {
        Shape::enumeration(vocab::roles(self.namespace()))
    }

    fn affiliation(&self) -> Result<Shape> {
        let object = ObjectShape::new(vec![
            FieldSpec::when(!self.legacy, "schemaKey", Shape::constant("Affiliation")),
            FieldSpec::optional("identifier", Shape::pattern(ROR_PATTERN)?),
            FieldSpec::required("name", Shape::string()),
        ]);
        Ok(if self.legacy {
            Shape::any_of(vec![Shape::string(), object.into()])
        } else {
            object.into()
        })
    }

    fn about(&self) -> Result<Shape> {
        let variants = Shape::tagged(vec![
            tagged_term("Disorder").with(FieldSpec::optional(
                "dxdate",
                Shape::array(Shape::format(StringFormat::DateTime)),
            )),
            tagged_term("Anatomy"),
            tagged_term("GenericType"),
        ]);
        if self.tagged {
            return Ok(variants);
        }
        // Untagged anatomy terms were accepted until schemaKey became mandatory.
        let untagged_anatomy = ObjectShape::new(vec![
            FieldSpec::required("identifier", Shape::pattern(UBERON_PATTERN)?),
            FieldSpec::optional("name", Shape::string()),
        ])
        .closed();
        Ok(Shape::any_of(vec![variants, untagged_anatomy.into()]))
    }

    fn access_requirements(&self) -> ObjectShape {
        let statuses = if self.legacy {
            vec![vocab::OPEN_ACCESS]
        } else {
            vec![vocab::OPEN_ACCESS, vocab::EMBARGOED_ACCESS]
        };
        ObjectShape::new(vec![
            FieldSpec::when(self.tagged, "schemaKey", Shape::constant("AccessRequirements")),
            FieldSpec::when(!self.legacy, "status", Shape::enumeration(statuses)),
            FieldSpec::optional("contactPoint", contact_point().into()),
            FieldSpec::optional("description", Shape::string()),
            FieldSpec::optional("embargoedUntil", Shape::format(StringFormat::Date)),
        ])
    }

    fn resource(&self) -> ObjectShape {
        ObjectShape::new(vec![
            FieldSpec::when(self.tagged, "schemaKey", Shape::constant("Resource")),
            FieldSpec::optional("identifier", Shape::string()),
            FieldSpec::optional("name", Shape::string()),
            FieldSpec::optional("url", Shape::format(StringFormat::Uri)),
            FieldSpec::optional("repository", Shape::string()),
            FieldSpec::required(
                "relation",
                Shape::enumeration(vocab::relations(self.namespace())),
            ),
            FieldSpec::optional("resourceType", Shape::string()),
        ])
    }

    fn assets_summary(&self) -> ObjectShape {
        let terms = |key: &str| Shape::array(term(key).into());
        ObjectShape::new(vec![
            FieldSpec::when(self.tagged, "schemaKey", Shape::constant("AssetsSummary")),
            FieldSpec::required("numberOfBytes", Shape::non_negative_integer()),
            FieldSpec::required("numberOfFiles", Shape::non_negative_integer()),
            FieldSpec::optional("numberOfSubjects", Shape::non_negative_integer()),
            FieldSpec::optional("numberOfSamples", Shape::non_negative_integer()),
            FieldSpec::optional("numberOfCells", Shape::non_negative_integer()),
            FieldSpec::optional("dataStandard", terms(vocab::Standards::SCHEMA_KEY)),
            FieldSpec::optional("approach", terms("ApproachType")),
            FieldSpec::optional("measurementTechnique", terms("MeasurementTechniqueType")),
            FieldSpec::optional("variableMeasured", Shape::array(Shape::string())),
            FieldSpec::optional("species", terms("SpeciesType")),
        ])
    }

    fn ethics_approval(&self) -> ObjectShape {
        ObjectShape::new(vec![
            FieldSpec::optional("schemaKey", Shape::constant("EthicsApproval")),
            FieldSpec::required("identifier", Shape::string()),
            FieldSpec::optional("contactPoint", contact_point().into()),
        ])
    }

    // Asset records

    fn bare_asset(&self) -> Result<ObjectShape> {
        let terms = |key: &str| Shape::array(term(key).into());
        let mut shape = ObjectShape::new(vec![
            FieldSpec::optional("@context", Shape::string()),
            FieldSpec::required("schemaKey", Shape::constant("Asset")),
            FieldSpec::required("schemaVersion", Shape::string()),
            FieldSpec::required("contentSize", Shape::non_negative_integer()),
            FieldSpec::required("encodingFormat", Shape::string()),
            FieldSpec::required(
                "digest",
                Shape::Map {
                    keys: Some(vocab::DIGEST_TYPES.iter().map(|d| d.to_string()).collect()),
                    values: Box::new(Shape::string()),
                },
            ),
            FieldSpec::required("path", Shape::string()),
            FieldSpec::optional(
                "access",
                Shape::array_bounded(self.access_requirements().into(), None, Some(1)),
            ),
            FieldSpec::optional("dateModified", Shape::format(StringFormat::DateTime)),
            FieldSpec::optional("blobDateModified", Shape::format(StringFormat::DateTime)),
            FieldSpec::optional("approach", terms("ApproachType")),
            FieldSpec::optional("measurementTechnique", terms("MeasurementTechniqueType")),
            FieldSpec::optional("variableMeasured", Shape::array(property_value().into())),
            FieldSpec::optional("wasDerivedFrom", Shape::array(Shape::reference("BioSample"))),
            FieldSpec::optional("wasAttributedTo", Shape::array(participant().into())),
            FieldSpec::optional(
                "wasGeneratedBy",
                Shape::array(activity(&["Activity", "Session", "Project"], false).into()),
            ),
            FieldSpec::optional("sameAs", Shape::array(Shape::string())),
            FieldSpec::optional("keywords", Shape::array(Shape::string())),
            FieldSpec::optional("contributor", Shape::array(self.contributor()?)),
            FieldSpec::optional(
                "license",
                Shape::array(Shape::enumeration(self.config.licenses())),
            ),
        ]);
        if self.tagged {
            shape = shape.with(FieldSpec::optional(
                "dataStandard",
                terms(vocab::Standards::SCHEMA_KEY),
            ));
        }
        Ok(shape)
    }

    fn asset(&self) -> Result<ObjectShape> {
        Ok(self
            .bare_asset()?
            .with(FieldSpec::required("id", Shape::string()))
            .with(FieldSpec::required("identifier", Shape::format(StringFormat::Uuid)))
            .with(FieldSpec::required(
                "contentUrl",
                Shape::array(Shape::format(StringFormat::Uri)),
            )))
    }

    fn published_asset(&self) -> Result<ObjectShape> {
        Ok(self
            .asset()?
            .with(FieldSpec::required("id", Shape::pattern(ASSET_ID_PATTERN)?))
            .with(FieldSpec::required("publishedBy", publisher()))
            .with(FieldSpec::required(
                "datePublished",
                Shape::format(StringFormat::DateTime),
            )))
    }

    fn biosample(&self) -> ObjectShape {
        ObjectShape::new(vec![
            FieldSpec::required("schemaKey", Shape::constant("BioSample")),
            FieldSpec::required("identifier", Shape::string()),
            FieldSpec::required("sampleType", term("SampleType").into()),
            FieldSpec::optional("assayType", Shape::array(term("AssayType").into())),
            FieldSpec::optional("anatomy", Shape::array(term("Anatomy").into())),
            FieldSpec::optional("wasDerivedFrom", Shape::array(Shape::reference("BioSample"))),
            FieldSpec::optional("wasAttributedTo", Shape::array(participant().into())),
        ])
    }
}

/// A vocabulary term whose `schemaKey` may be omitted.
fn term(schema_key: &str) -> ObjectShape {
    ObjectShape::new(vec![
        FieldSpec::optional("schemaKey", Shape::constant(schema_key)),
        FieldSpec::optional("identifier", Shape::string()),
        FieldSpec::optional("name", Shape::string()),
    ])
}

fn tagged_term(schema_key: &str) -> ObjectShape {
    term(schema_key).with(FieldSpec::required("schemaKey", Shape::constant(schema_key)))
}

fn contact_point() -> ObjectShape {
    ObjectShape::new(vec![
        FieldSpec::optional("schemaKey", Shape::constant("ContactPoint")),
        FieldSpec::optional("email", Shape::format(StringFormat::Email)),
        FieldSpec::optional("url", Shape::format(StringFormat::Uri)),
    ])
}

fn activity(schema_keys: &[&str], key_required: bool) -> ObjectShape {
    ObjectShape::new(vec![
        FieldSpec::when(key_required, "schemaKey", Shape::enumeration(schema_keys.iter().copied())),
        FieldSpec::required("name", Shape::string()),
        FieldSpec::optional("identifier", Shape::string()),
        FieldSpec::optional("description", Shape::string()),
        FieldSpec::optional("startDate", Shape::format(StringFormat::DateTime)),
        FieldSpec::optional("endDate", Shape::format(StringFormat::DateTime)),
        FieldSpec::optional("wasAssociatedWith", Shape::array(Shape::Any)),
    ])
}

/// A publishing agent: either a URL or a `PublishActivity`.
fn publisher() -> Shape {
    Shape::any_of(vec![
        Shape::format(StringFormat::Uri),
        activity(&["PublishActivity"], true).into(),
    ])
}

fn participant() -> ObjectShape {
    ObjectShape::new(vec![
        FieldSpec::required("schemaKey", Shape::constant("Participant")),
        FieldSpec::required("identifier", Shape::string()),
        FieldSpec::optional("species", term("SpeciesType").into()),
        FieldSpec::optional("sex", term("SexType").into()),
        FieldSpec::optional("strain", term("StrainType").into()),
        FieldSpec::optional("age", property_value().into()),
        FieldSpec::optional("genotype", Shape::Any),
    ])
}

fn property_value() -> ObjectShape {
    ObjectShape::new(vec![
        FieldSpec::optional("schemaKey", Shape::constant("PropertyValue")),
        FieldSpec::optional("value", Shape::Any),
        FieldSpec::optional("unitText", Shape::string()),
        FieldSpec::optional("name", Shape::string()),
        FieldSpec::optional("propertyID", Shape::Any),
    ])
}

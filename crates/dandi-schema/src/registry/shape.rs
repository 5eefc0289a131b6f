//! Tagged-variant description of record shapes.
//!
//! A [`SchemaShape`] is what the registry hands out for a `(kind, version)`
//! pair: a root [`ObjectShape`] plus a table of named definitions that
//! [`Shape::Ref`] points into. Recursive structures (a BioSample derived from
//! other BioSamples) are expressed through `Ref`, so the tree itself is
//! finite and the validator bounds how deep it follows references.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{Result, SchemaError};
use crate::registry::SchemaKind;
use crate::version::SchemaVersion;

/// A compiled regular expression that serializes as its source text.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let regex = Regex::new(&source).map_err(|e| SchemaError::InvalidShape {
            message: format!("pattern {:?} does not compile: {}", source, e),
        })?;
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Unanchored search, as JSON Schema `pattern` is defined.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex.is_match(value)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for Pattern {
    type Error = SchemaError;

    fn try_from(source: String) -> Result<Self> {
        Pattern::new(source)
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

/// Well-known string formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StringFormat {
    Uri,
    Email,
    Date,
    DateTime,
    Uuid,
}

impl StringFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StringFormat::Uri => "uri",
            StringFormat::Email => "email",
            StringFormat::Date => "date",
            StringFormat::DateTime => "date-time",
            StringFormat::Uuid => "uuid",
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            StringFormat::Uri => Url::parse(value).is_ok(),
            StringFormat::Email => {
                let mut parts = value.splitn(2, '@');
                match (parts.next(), parts.next()) {
                    (Some(local), Some(domain)) => {
                        !local.is_empty()
                            && !local.contains(char::is_whitespace)
                            && domain.contains('.')
                            && !domain.starts_with('.')
                            && !domain.ends_with('.')
                            && !domain.contains(|c: char| c == '@' || c.is_whitespace())
                    }
                    _ => false,
                }
            }
            StringFormat::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok(),
            StringFormat::DateTime => {
                DateTime::parse_from_rfc3339(value).is_ok()
                    || NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
            }
            StringFormat::Uuid => is_uuid(value),
        }
    }
}

/// Hyphenated form only; `Uuid::try_parse` also takes simple and braced forms.
fn is_uuid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}

/// The allowed shape of a single JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Shape {
    /// Any JSON value, not inspected.
    Any,
    String {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<Pattern>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_length: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<StringFormat>,
    },
    Integer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
    },
    Number,
    Boolean,
    /// A single allowed string.
    Const { value: String },
    Enum { values: Vec<String> },
    Array {
        items: Box<Shape>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    Object(ObjectShape),
    /// An object used as a dictionary with uniform values.
    Map {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        keys: Option<Vec<String>>,
        values: Box<Shape>,
    },
    /// Objects told apart by a constant-valued discriminator field.
    OneOf {
        discriminator: String,
        variants: Vec<ObjectShape>,
    },
    /// The value must match at least one option.
    AnyOf { options: Vec<Shape> },
    /// Reference into [`SchemaShape::definitions`].
    Ref { name: String },
}

impl Shape {
    pub fn string() -> Self {
        Shape::String {
            pattern: None,
            max_length: None,
            format: None,
        }
    }

    pub fn pattern(source: impl Into<String>) -> Result<Self> {
        Ok(Shape::String {
            pattern: Some(Pattern::new(source)?),
            max_length: None,
            format: None,
        })
    }

    pub fn bounded_string(max_length: usize) -> Self {
        Shape::String {
            pattern: None,
            max_length: Some(max_length),
            format: None,
        }
    }

    pub fn format(format: StringFormat) -> Self {
        Shape::String {
            pattern: None,
            max_length: None,
            format: Some(format),
        }
    }

    pub fn non_negative_integer() -> Self {
        Shape::Integer { minimum: Some(0) }
    }

    pub fn constant(value: impl Into<String>) -> Self {
        Shape::Const {
            value: value.into(),
        }
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Shape::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn array(items: Shape) -> Self {
        Shape::Array {
            items: Box::new(items),
            min_items: None,
            max_items: None,
        }
    }

    pub fn array_bounded(items: Shape, min_items: Option<usize>, max_items: Option<usize>) -> Self {
        Shape::Array {
            items: Box::new(items),
            min_items,
            max_items,
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Shape::Ref { name: name.into() }
    }

    pub fn any_of(options: Vec<Shape>) -> Self {
        Shape::AnyOf { options }
    }

    pub fn tagged(variants: Vec<ObjectShape>) -> Self {
        Shape::OneOf {
            discriminator: "schemaKey".to_string(),
            variants,
        }
    }

    /// Short name used in fault messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Shape::Any => "any",
            Shape::String { .. } | Shape::Const { .. } | Shape::Enum { .. } => "string",
            Shape::Integer { .. } => "integer",
            Shape::Number => "number",
            Shape::Boolean => "boolean",
            Shape::Array { .. } => "array",
            Shape::Object(_) | Shape::Map { .. } | Shape::OneOf { .. } => "object",
            Shape::AnyOf { .. } => "any of",
            Shape::Ref { .. } => "reference",
        }
    }

    fn collect_refs<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Shape::Ref { name } => {
                out.insert(name.as_str());
            }
            Shape::Array { items, .. } => items.collect_refs(out),
            Shape::Map { values, .. } => values.collect_refs(out),
            Shape::Object(object) => object.collect_refs(out),
            Shape::OneOf { variants, .. } => variants.iter().for_each(|v| v.collect_refs(out)),
            Shape::AnyOf { options } => options.iter().for_each(|o| o.collect_refs(out)),
            _ => {}
        }
    }
}

/// One named field of an object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub shape: Shape,
    #[serde(default)]
    pub required: bool,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required: false,
        }
    }

    /// Required when `required` holds, optional otherwise.
    pub fn when(required: bool, name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            required,
        }
    }
}

fn default_additional() -> bool {
    true
}

/// An object with an ordered list of known fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectShape {
    pub fields: Vec<FieldSpec>,
    /// Whether fields not listed are tolerated.
    #[serde(default = "default_additional")]
    pub additional: bool,
}

impl ObjectShape {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self {
            fields,
            additional: true,
        }
    }

    pub fn closed(mut self) -> Self {
        self.additional = false;
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Replace a field of the same name, or append it.
    pub fn with(mut self, field: FieldSpec) -> Self {
        match self.fields.iter_mut().find(|f| f.name == field.name) {
            Some(existing) => *existing = field,
            None => self.fields.push(field),
        }
        self
    }

    /// The constant value a field is pinned to, if any.
    pub fn const_of(&self, name: &str) -> Option<&str> {
        match self.field(name).map(|f| &f.shape) {
            Some(Shape::Const { value }) => Some(value),
            _ => None,
        }
    }

    fn collect_refs<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        for field in &self.fields {
            field.shape.collect_refs(out);
        }
    }
}

impl From<ObjectShape> for Shape {
    fn from(object: ObjectShape) -> Self {
        Shape::Object(object)
    }
}

/// Everything the validator needs to check one kind at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaShape {
    pub kind: SchemaKind,
    pub version: SchemaVersion,
    pub root: ObjectShape,
    #[serde(default)]
    pub definitions: BTreeMap<String, Shape>,
}

impl SchemaShape {
    /// Ordered top-level field names.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.root.fields.iter().map(|f| f.name.as_str())
    }

    pub fn definition(&self, name: &str) -> Option<&Shape> {
        self.definitions.get(name)
    }

    /// Reject shapes whose references point nowhere, and variants that do
    /// not pin their discriminator.
    pub fn check(&self) -> Result<()> {
        let mut refs = BTreeSet::new();
        self.root.collect_refs(&mut refs);
        for shape in self.definitions.values() {
            shape.collect_refs(&mut refs);
        }
        if let Some(missing) = refs.iter().find(|r| !self.definitions.contains_key(**r)) {
            return Err(SchemaError::InvalidShape {
                message: format!("{} {}: undefined reference {:?}", self.kind, self.version, missing),
            });
        }
        check_discriminators(&Shape::Object(self.root.clone()))
            .and_then(|_| self.definitions.values().try_for_each(check_discriminators))
    }
}

fn check_discriminators(shape: &Shape) -> Result<()> {
    match shape {
        Shape::OneOf {
            discriminator,
            variants,
        } => {
            for variant in variants {
                if variant.const_of(discriminator).is_none() {
                    return Err(SchemaError::InvalidShape {
                        message: format!("oneOf variant does not pin {:?} to a constant", discriminator),
                    });
                }
                variant.fields.iter().try_for_each(|f| check_discriminators(&f.shape))?;
            }
            Ok(())
        }
        Shape::Object(object) => object.fields.iter().try_for_each(|f| check_discriminators(&f.shape)),
        Shape::Array { items, .. } => check_discriminators(items),
        Shape::Map { values, .. } => check_discriminators(values),
        Shape::AnyOf { options } => options.iter().try_for_each(check_discriminators),
        _ => Ok(()),
    }
}

impl fmt::Display for SchemaShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} schema {}", self.kind, self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_shape() -> SchemaShape {
        SchemaShape {
            kind: SchemaKind::Asset,
            version: SchemaVersion::new(0, 6, 0),
            root: ObjectShape::new(vec![
                FieldSpec::required("path", Shape::string()),
                FieldSpec::optional("wasDerivedFrom", Shape::array(Shape::reference("BioSample"))),
            ]),
            definitions: BTreeMap::from([(
                "BioSample".to_string(),
                Shape::Object(ObjectShape::new(vec![
                    FieldSpec::required("schemaKey", Shape::constant("BioSample")),
                    FieldSpec::optional("wasDerivedFrom", Shape::array(Shape::reference("BioSample"))),
                ])),
            )]),
        }
    }

    #[test]
    fn test_shape_json_roundtrip_keeps_patterns() {
        let shape = Shape::pattern(r"^DANDI:\d{6}$").unwrap();
        let json = serde_json::to_value(&shape).unwrap();
        assert_eq!(json["type"], "string");
        assert_eq!(json["pattern"], r"^DANDI:\d{6}$");

        let back: Shape = serde_json::from_value(json).unwrap();
        match back {
            Shape::String {
                pattern: Some(p), ..
            } => assert!(p.is_match("DANDI:000027")),
            other => panic!("unexpected shape {other:?}"),
        }
    }

    #[test]
    fn test_invalid_pattern_rejected_on_load() {
        let raw = serde_json::json!({"type": "string", "pattern": "(unclosed"});
        assert!(serde_json::from_value::<Shape>(raw).is_err());
        assert!(matches!(
            Pattern::new("["),
            Err(SchemaError::InvalidShape { .. })
        ));
    }

    #[test]
    fn test_check_finds_dangling_refs() {
        let mut shape = sample_shape();
        assert!(shape.check().is_ok());

        shape.definitions.clear();
        let err = shape.check().unwrap_err();
        assert!(err.to_string().contains("BioSample"));
    }

    #[test]
    fn test_check_requires_pinned_discriminator() {
        let mut shape = sample_shape();
        shape.root = shape.root.with(FieldSpec::optional(
            "contributor",
            Shape::array(Shape::tagged(vec![ObjectShape::new(vec![FieldSpec::required(
                "name",
                Shape::string(),
            )])])),
        ));
        assert!(shape.check().is_err());
    }

    #[test]
    fn test_with_replaces_existing_field() {
        let object = ObjectShape::new(vec![FieldSpec::optional("path", Shape::string())])
            .with(FieldSpec::required("path", Shape::string()));
        assert_eq!(object.fields.len(), 1);
        assert!(object.fields[0].required);
    }

    #[test]
    fn test_string_formats() {
        assert!(StringFormat::Uri.accepts("https://dandiarchive.org"));
        assert!(!StringFormat::Uri.accepts("not a url"));
        assert!(StringFormat::Email.accepts("nemo@example.com"));
        assert!(!StringFormat::Email.accepts("nemo@localhost"));
        assert!(StringFormat::Date.accepts("2024-02-29"));
        assert!(!StringFormat::Date.accepts("2023-02-29"));
        assert!(StringFormat::DateTime.accepts("2021-03-04T05:06:07.123456-04:00"));
        assert!(StringFormat::DateTime.accepts("2021-03-04T05:06:07"));
        assert!(StringFormat::Uuid.accepts("0b5e8a4c-4d3f-4f2b-9e1c-2f3d4c5b6a79"));
        assert!(!StringFormat::Uuid.accepts("0b5e8a4c4d3f4f2b9e1c2f3d4c5b6a79"));
    }
}

//! Version-gated migration steps and the fields-introduced table.
//!
//! A step is keyed by the version at which it activates: it runs when a
//! record moves from below that version to at or above it. Steps only touch
//! the top-level dataset record and the nested entries it owns directly.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Map, Value};

use crate::config::InstanceConfig;
use crate::error::{Result, SchemaError};
use crate::registry::UBERON_PATTERN;
use crate::validate::json_type_name;
use crate::vocab::{self, CITE_NAMESPACE, LEGACY_NAMESPACE};

pub(crate) type Record = Map<String, Value>;
pub(crate) type Triple = (u64, u64, u64);

static UBERON_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(UBERON_PATTERN).expect("UBERON regex must compile"));

/// One transformation applied when crossing `activates`.
pub(crate) struct MigrationStep {
    pub activates: Triple,
    pub description: &'static str,
    pub apply: fn(&mut Record, &InstanceConfig) -> Result<()>,
}

pub(crate) const STEPS: &[MigrationStep] = &[
    MigrationStep {
        activates: (0, 4, 0),
        description: "prefix identifiers with the instance name",
        apply: prefix_identifiers,
    },
    MigrationStep {
        activates: (0, 4, 0),
        description: "move roles and relations to the dcite namespace",
        apply: cite_namespace,
    },
    MigrationStep {
        activates: (0, 4, 0),
        description: "turn affiliations into Affiliation objects",
        apply: affiliation_objects,
    },
    MigrationStep {
        activates: (0, 4, 0),
        description: "default missing access status to open",
        apply: access_status,
    },
    MigrationStep {
        activates: (0, 5, 0),
        description: "wrap scalar studyTarget and protocol in lists",
        apply: listify_keywords,
    },
    MigrationStep {
        activates: (0, 6, 0),
        description: "tag about entries with their schemaKey",
        apply: tag_about,
    },
    MigrationStep {
        activates: (0, 6, 0),
        description: "tag access, relatedResource and assetsSummary entries",
        apply: tag_nested_records,
    },
];

/// Versions at which dataset records gained required top-level fields.
pub(crate) const FIELDS_INTRODUCED_AT: &[Triple] = &[(0, 4, 0), (0, 5, 0)];

/// Required top-level fields introduced at `version`, with their defaults.
pub(crate) fn fields_introduced(version: Triple) -> Vec<(&'static str, Value)> {
    match version {
        (0, 4, 0) => vec![
            ("schemaKey", json!("Dandiset")),
            (
                "access",
                json!([{"schemaKey": "AccessRequirements", "status": vocab::OPEN_ACCESS}]),
            ),
            (
                "assetsSummary",
                json!({"schemaKey": "AssetsSummary", "numberOfBytes": 0, "numberOfFiles": 0}),
            ),
            ("manifestLocation", json!([])),
        ],
        (0, 5, 0) => vec![("keywords", json!([])), ("studyTarget", json!([]))],
        _ => Vec::new(),
    }
}

/// Fill fields introduced at `version` that the record lacks.
pub(crate) fn fill_introduced(record: &mut Record, version: Triple) -> Vec<&'static str> {
    let mut filled = Vec::new();
    for (field, default) in fields_introduced(version) {
        if matches!(record.get(field), None | Some(Value::Null)) {
            record.insert(field.to_string(), default);
            filled.push(field);
        }
    }
    filled
}

// Helpers

fn mismatch(path: &str, value: &Value, expected: &str) -> SchemaError {
    SchemaError::migration(
        path,
        value,
        format!("expected {}, found {}", expected, json_type_name(value)),
    )
}

/// The array at `field`, or `None` when the field is absent or null.
fn array_mut<'r>(record: &'r mut Record, field: &str) -> Result<Option<&'r mut Vec<Value>>> {
    match record.get_mut(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => Ok(Some(items)),
        Some(other) => Err(mismatch(field, other, "an array")),
    }
}

/// Object entries of the array at `field`, with their paths.
fn entries_mut<'r>(
    record: &'r mut Record,
    field: &str,
) -> Result<Vec<(String, &'r mut Record)>> {
    let Some(items) = array_mut(record, field)? else {
        return Ok(Vec::new());
    };
    items
        .iter_mut()
        .enumerate()
        .map(|(i, item)| {
            let path = format!("{}[{}]", field, i);
            match item {
                Value::Object(obj) => Ok((path, obj)),
                other => Err(mismatch(&path, other, "an object")),
            }
        })
        .collect()
}

fn tag(entry: &mut Record, schema_key: &str) {
    if matches!(entry.get("schemaKey"), None | Some(Value::Null)) {
        entry.insert("schemaKey".to_string(), json!(schema_key));
    }
}

// 0.4.0

fn prefix_identifiers(record: &mut Record, config: &InstanceConfig) -> Result<()> {
    for field in ["id", "identifier"] {
        match record.get_mut(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(value)) => {
                if !value.contains(':') {
                    *value = format!("{}:{}", config.instance_name(), value);
                }
            }
            Some(other) => return Err(mismatch(field, other, "a string")),
        }
    }
    Ok(())
}

fn to_cite(term: &str, known: &[&str]) -> Option<String> {
    let bare = term.strip_prefix(LEGACY_NAMESPACE)?;
    known
        .contains(&bare)
        .then(|| format!("{}{}", CITE_NAMESPACE, bare))
}

fn cite_namespace(record: &mut Record, _config: &InstanceConfig) -> Result<()> {
    for (path, contributor) in entries_mut(record, "contributor")? {
        let Some(roles) = array_mut(contributor, "roleName")
            .map_err(|e| prefixed(e, &path))?
        else {
            continue;
        };
        for role in roles.iter_mut() {
            if let Some(cited) = role.as_str().and_then(|r| to_cite(r, vocab::ROLES)) {
                *role = Value::String(cited);
            }
        }
    }

    for (_, resource) in entries_mut(record, "relatedResource")? {
        if let Some(relation) = resource.get_mut("relation") {
            if let Some(cited) = relation.as_str().and_then(|r| to_cite(r, vocab::RELATIONS)) {
                *relation = Value::String(cited);
            }
        }
    }
    Ok(())
}

fn affiliation_objects(record: &mut Record, _config: &InstanceConfig) -> Result<()> {
    for (path, contributor) in entries_mut(record, "contributor")? {
        let Some(affiliations) = array_mut(contributor, "affiliation")
            .map_err(|e| prefixed(e, &path))?
        else {
            continue;
        };
        for (i, affiliation) in affiliations.iter_mut().enumerate() {
            match affiliation {
                Value::String(name) => {
                    *affiliation = json!({"schemaKey": "Affiliation", "name": name});
                }
                Value::Object(obj) => tag(obj, "Affiliation"),
                other => {
                    return Err(mismatch(
                        &format!("{}.affiliation[{}]", path, i),
                        other,
                        "a string or an object",
                    ))
                }
            }
        }
    }
    Ok(())
}

fn access_status(record: &mut Record, _config: &InstanceConfig) -> Result<()> {
    for (_, access) in entries_mut(record, "access")? {
        if matches!(access.get("status"), None | Some(Value::Null)) {
            access.insert("status".to_string(), json!(vocab::OPEN_ACCESS));
        }
    }
    Ok(())
}

// 0.5.0

fn listify_keywords(record: &mut Record, _config: &InstanceConfig) -> Result<()> {
    for field in ["studyTarget", "protocol"] {
        match record.get_mut(field) {
            None | Some(Value::Null) | Some(Value::Array(_)) => {}
            Some(value) if value.is_string() => {
                let scalar = value.take();
                *value = Value::Array(vec![scalar]);
            }
            Some(other) => return Err(mismatch(field, other, "a string or an array")),
        }
    }
    Ok(())
}

// 0.6.0

fn tag_about(record: &mut Record, _config: &InstanceConfig) -> Result<()> {
    for (path, about) in entries_mut(record, "about")? {
        if !matches!(about.get("schemaKey"), None | Some(Value::Null)) {
            continue;
        }
        let anatomy = about
            .get("identifier")
            .and_then(Value::as_str)
            .map(|id| UBERON_RE.is_match(id))
            .unwrap_or(false);
        if !anatomy {
            return Err(SchemaError::migration(
                format!("{}.schemaKey", path),
                &Value::Object(about.clone()),
                "cannot infer schemaKey for an untagged about entry",
            ));
        }
        about.insert("schemaKey".to_string(), json!("Anatomy"));
    }
    Ok(())
}

fn tag_nested_records(record: &mut Record, _config: &InstanceConfig) -> Result<()> {
    for (_, access) in entries_mut(record, "access")? {
        tag(access, "AccessRequirements");
    }
    for (_, resource) in entries_mut(record, "relatedResource")? {
        tag(resource, "Resource");
    }
    match record.get_mut("assetsSummary") {
        None | Some(Value::Null) => {}
        Some(Value::Object(summary)) => tag(summary, "AssetsSummary"),
        Some(other) => return Err(mismatch("assetsSummary", other, "an object")),
    }
    Ok(())
}

/// Re-root a migration error raised inside a nested entry.
fn prefixed(err: SchemaError, parent: &str) -> SchemaError {
    match err {
        SchemaError::Migration {
            path,
            value,
            message,
        } => SchemaError::Migration {
            path: format!("{}.{}", parent, path),
            value,
            message,
        },
        other => other,
    }
}

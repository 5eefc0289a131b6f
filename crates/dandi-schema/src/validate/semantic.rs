//! Semantic pass: cross-field rules a shape cannot express.
//!
//! Each rule reads only the sub-tree it needs and silently skips a sub-tree
//! that is not shaped well enough to evaluate; the structural pass already
//! reports those.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use url::Url;

use crate::registry::SchemaKind;
use crate::validate::report::{Fault, FaultKind};
use crate::validate::structural::{field_path, index_path};
use crate::vocab::{self, DIGEST_ETAG, DIGEST_SHA2_256, DIGEST_ZARR};

static ETAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{32}-\d{1,5}$").expect("etag regex must compile"));

static ZARR_CHECKSUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{32}-(\d+)--(\d+)$").expect("zarr checksum regex must compile")
});

static SHA256_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("sha256 regex must compile"));

pub(crate) fn check(record: &Value, kind: SchemaKind) -> Vec<Fault> {
    let mut faults = Vec::new();
    let Some(root) = record.as_object() else {
        return faults;
    };

    if kind.is_dandiset() {
        check_dataset_name(root, &mut faults);
        check_contributors(root, true, &mut faults);
        check_related_resources(root, &mut faults);
        if kind.is_published() {
            check_published_summary(root, &mut faults);
        }
    } else {
        check_contributors(root, false, &mut faults);
        check_digest(root, kind.is_published(), &mut faults);
    }
    check_access(root, &mut faults);
    faults
}

fn entries<'v>(root: &'v Map<String, Value>, field: &str) -> impl Iterator<Item = (usize, &'v Map<String, Value>)> {
    root.get(field)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(i, v)| v.as_object().map(|o| (i, o)))
}

fn is_blank(obj: &Map<String, Value>, field: &str) -> bool {
    matches!(obj.get(field), Some(Value::String(s)) if s.trim().is_empty())
}

fn has_text(obj: &Map<String, Value>, field: &str) -> bool {
    matches!(obj.get(field), Some(Value::String(s)) if !s.trim().is_empty())
}

fn check_dataset_name(root: &Map<String, Value>, faults: &mut Vec<Fault>) {
    if is_blank(root, "name") {
        faults.push(Fault::error("name", FaultKind::EmptyName, "dataset name must not be blank"));
    }
}

fn is_contact(contributor: &Map<String, Value>) -> bool {
    contributor
        .get("roleName")
        .and_then(Value::as_array)
        .map(|roles| {
            roles
                .iter()
                .filter_map(Value::as_str)
                .any(|r| r.ends_with(":ContactPerson"))
        })
        .unwrap_or(false)
}

fn check_contributors(root: &Map<String, Value>, require_contact: bool, faults: &mut Vec<Fault>) {
    let Some(list) = root.get("contributor").and_then(Value::as_array) else {
        return;
    };

    let mut contacts = 0;
    for (i, contributor) in entries(root, "contributor") {
        let path = index_path("contributor", i);
        if is_blank(contributor, "name") {
            faults.push(Fault::error(
                field_path(&path, "name"),
                FaultKind::EmptyName,
                "contributor name must not be blank",
            ));
        }
        if is_contact(contributor) {
            contacts += 1;
            if !has_text(contributor, "email") {
                let who = contributor
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("contributor");
                faults.push(Fault::error(
                    field_path(&path, "email"),
                    FaultKind::ContactEmail,
                    format!("{} is a contact person and must have an email", who),
                ));
            }
        }
        for (j, affiliation) in entries(contributor, "affiliation") {
            if is_blank(affiliation, "name") {
                faults.push(Fault::error(
                    field_path(&index_path(&field_path(&path, "affiliation"), j), "name"),
                    FaultKind::EmptyName,
                    "affiliation name must not be blank",
                ));
            }
        }
    }

    if require_contact && !list.is_empty() && contacts == 0 {
        faults.push(Fault::error(
            "contributor",
            FaultKind::ContactPerson,
            "at least one contributor must have the ContactPerson role",
        ));
    }
}

/// Canonical identifier for a URL pointing at a well-known resolver.
///
/// `https://doi.org/10.1/x` becomes `doi:10.1/x`; identifiers.org and
/// scicrunch resolver URLs yield the compact identifier they resolve.
pub fn normalized_identifier(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let path = parsed.path().trim_start_matches('/');
    if path.is_empty() {
        return None;
    }
    match host.as_str() {
        "doi.org" | "dx.doi.org" | "www.doi.org" => Some(format!("doi:{}", path)),
        "identifiers.org" => Some(path.to_string()),
        "scicrunch.org" => path
            .strip_prefix("resolver/")
            .filter(|id| id.starts_with("RRID:"))
            .map(str::to_string),
        _ => None,
    }
}

fn check_related_resources(root: &Map<String, Value>, faults: &mut Vec<Fault>) {
    for (i, resource) in entries(root, "relatedResource") {
        let path = index_path("relatedResource", i);
        if is_blank(resource, "name") {
            faults.push(Fault::error(
                field_path(&path, "name"),
                FaultKind::EmptyName,
                "resource name must not be blank",
            ));
        }

        let identifier = resource.get("identifier").and_then(Value::as_str);
        let url = resource.get("url").and_then(Value::as_str);
        match (identifier, url) {
            (None, None) => faults.push(Fault::error(
                path,
                FaultKind::ResourceLocator,
                "a related resource needs an identifier or a url",
            )),
            (Some(identifier), Some(url)) => {
                if let Some(expected) = normalized_identifier(url) {
                    if !identifier.eq_ignore_ascii_case(&expected) {
                        faults.push(Fault::error(
                            field_path(&path, "identifier"),
                            FaultKind::ResourceIdentifier,
                            format!(
                                "identifier {:?} does not match url {}; expected {:?}",
                                identifier, url, expected
                            ),
                        ));
                    }
                }
            }
            _ => {}
        }
    }
}

fn check_access(root: &Map<String, Value>, faults: &mut Vec<Fault>) {
    for (i, access) in entries(root, "access") {
        let embargoed = access.get("status").and_then(Value::as_str) == Some(vocab::EMBARGOED_ACCESS);
        let has_date = matches!(access.get("embargoedUntil"), Some(v) if !v.is_null());
        if embargoed && !has_date {
            faults.push(Fault::error(
                field_path(&index_path("access", i), "embargoedUntil"),
                FaultKind::EmbargoDate,
                "embargoed access must state when the embargo ends",
            ));
        }
    }
}

fn check_digest(root: &Map<String, Value>, published: bool, faults: &mut Vec<Fault>) {
    let (Some(digest), Some(encoding)) = (
        root.get("digest").and_then(Value::as_object),
        root.get("encodingFormat").and_then(Value::as_str),
    ) else {
        return;
    };
    let is_zarr = encoding == vocab::ZARR_MEDIA_TYPE;
    let etag = digest.get(DIGEST_ETAG).and_then(Value::as_str);
    let zarr = digest.get(DIGEST_ZARR).and_then(Value::as_str);

    if etag.is_some() && zarr.is_some() {
        faults.push(Fault::error(
            "digest",
            FaultKind::AssetDigest,
            format!("an asset cannot carry both {} and {}", DIGEST_ETAG, DIGEST_ZARR),
        ));
    }

    if is_zarr {
        match zarr {
            None => faults.push(Fault::error(
                "digest",
                FaultKind::AssetDigest,
                format!("a zarr asset must carry {}", DIGEST_ZARR),
            )),
            Some(checksum) => check_zarr_checksum(root, checksum, faults),
        }
    } else {
        match etag {
            None => faults.push(Fault::error(
                "digest",
                FaultKind::AssetDigest,
                format!("a non-zarr asset must carry {}", DIGEST_ETAG),
            )),
            Some(etag) if !ETAG_RE.is_match(etag) => faults.push(Fault::error(
                field_path("digest", DIGEST_ETAG),
                FaultKind::AssetDigest,
                format!("{:?} is not an etag of the form <md5>-<parts>", etag),
            )),
            Some(_) => {}
        }

        if published {
            let sha = digest.get(DIGEST_SHA2_256).and_then(Value::as_str);
            if !sha.map(|s| SHA256_RE.is_match(s)).unwrap_or(false) {
                faults.push(Fault::error(
                    field_path("digest", DIGEST_SHA2_256),
                    FaultKind::PublishedDigest,
                    "a published non-zarr asset must carry a 64-digit hex sha2-256",
                ));
            }
        }
    }
}

fn check_zarr_checksum(root: &Map<String, Value>, checksum: &str, faults: &mut Vec<Fault>) {
    let path = field_path("digest", DIGEST_ZARR);
    let Some(caps) = ZARR_CHECKSUM_RE.captures(checksum) else {
        faults.push(Fault::error(
            path,
            FaultKind::AssetDigest,
            format!("{:?} is not a zarr checksum of the form <md5>-<files>--<size>", checksum),
        ));
        return;
    };
    let declared_size = caps[2].parse::<u64>().ok();
    let content_size = root.get("contentSize").and_then(Value::as_u64);
    if let (Some(declared), Some(actual)) = (declared_size, content_size) {
        if declared != actual {
            faults.push(Fault::error(
                path,
                FaultKind::AssetDigest,
                format!(
                    "zarr checksum declares {} bytes but contentSize is {}",
                    declared, actual
                ),
            ));
        }
    }
}

fn check_published_summary(root: &Map<String, Value>, faults: &mut Vec<Fault>) {
    let Some(summary) = root.get("assetsSummary").and_then(Value::as_object) else {
        return;
    };
    for field in ["numberOfBytes", "numberOfFiles"] {
        if summary.get(field).and_then(Value::as_u64) == Some(0) {
            faults.push(Fault::error(
                field_path("assetsSummary", field),
                FaultKind::PublishedSummary,
                "a published dataset must contain at least one non-empty asset",
            ));
        }
    }
}

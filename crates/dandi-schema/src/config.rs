//! Centralized configuration for the metadata pipeline.
//!
//! Two kinds of configuration live here:
//! - associated-constant structs for fixed values (schema versions, limits)
//! - [`InstanceConfig`], the per-deployment vocabulary that the schema
//!   registry bakes into its shapes (instance name, DOI prefix, licenses)
//!
//! `InstanceConfig` is built once at process start and handed to the
//! registry. Library code never reads the process environment itself;
//! [`InstanceConfig::from_env`] exists for binaries.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{Result, SchemaError};

/// Schema version bookkeeping.
pub struct VersionConfig;

impl VersionConfig {
    pub const CURRENT: &'static str = "0.6.0";
    /// Every version the built-in registry can describe, oldest first.
    pub const KNOWN: &'static [&'static str] = &[
        "0.3.0", "0.3.1", "0.4.0", "0.4.1", "0.4.2", "0.4.3", "0.4.4", "0.5.0", "0.5.1", "0.5.2",
        "0.6.0",
    ];
}

/// Limits applied while walking untrusted records.
pub struct LimitsConfig;

impl LimitsConfig {
    /// Maximum nesting of objects, arrays and shape references.
    pub const MAX_NESTING_DEPTH: usize = 32;
    pub const NAME_MAX_LENGTH: usize = 150;
    pub const DESCRIPTION_MAX_LENGTH: usize = 3000;
}

/// Schema shape cache sizing.
pub struct RegistryConfig;

impl RegistryConfig {
    /// Large enough to hold every kind at every known version.
    pub const CACHE_CAPACITY: u64 = 256;
}

/// Environment variables read by [`InstanceConfig::from_env`].
pub struct EnvConfig;

impl EnvConfig {
    pub const INSTANCE_NAME: &'static str = "DANDI_INSTANCE_NAME";
    pub const DOI_PREFIX: &'static str = "DANDI_DOI_PREFIX";
    pub const LICENSES: &'static str = "DANDI_LICENSES";
    pub const INSTANCE_URL: &'static str = "DANDI_INSTANCE_URL";
}

static INSTANCE_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][-A-Z]*$").expect("instance name regex must compile")
});

static DOI_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^10\.\d{4,}$").expect("DOI prefix regex must compile"));

pub const DEFAULT_INSTANCE_NAME: &str = "DANDI-ADHOC";
pub const DEFAULT_LICENSES: &[&str] = &["spdx:CC0-1.0", "spdx:CC-BY-4.0"];

/// Deployment-specific vocabulary for an archive instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceConfig {
    instance_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    doi_prefix: Option<String>,
    licenses: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    instance_url: Option<String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            doi_prefix: None,
            licenses: DEFAULT_LICENSES.iter().map(|l| l.to_string()).collect(),
            instance_url: None,
        }
    }
}

impl InstanceConfig {
    pub fn builder() -> InstanceConfigBuilder {
        InstanceConfigBuilder::default()
    }

    /// Build a config from `DANDI_*` environment variables.
    ///
    /// Unset variables keep their defaults; set but invalid values fail.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(name) = lookup(EnvConfig::INSTANCE_NAME) {
            builder = builder.instance_name(name);
        }
        if let Some(prefix) = lookup(EnvConfig::DOI_PREFIX) {
            builder = builder.doi_prefix(prefix);
        }
        if let Some(raw) = lookup(EnvConfig::LICENSES) {
            builder = builder.licenses(parse_license_list(&raw)?);
        }
        if let Some(url) = lookup(EnvConfig::INSTANCE_URL) {
            builder = builder.instance_url(url);
        }
        let config = builder.build()?;
        debug!(
            "Instance configuration: name={}, doi_prefix={:?}, {} licenses",
            config.instance_name,
            config.doi_prefix,
            config.licenses.len()
        );
        Ok(config)
    }

    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    pub fn doi_prefix(&self) -> Option<&str> {
        self.doi_prefix.as_deref()
    }

    pub fn licenses(&self) -> impl Iterator<Item = &str> {
        self.licenses.iter().map(String::as_str)
    }

    pub fn instance_url(&self) -> Option<&str> {
        self.instance_url.as_deref()
    }
}

/// Accepts a JSON array (`["spdx:CC0-1.0"]`) or a comma-separated list.
fn parse_license_list(raw: &str) -> Result<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        let parsed: Vec<String> = serde_json::from_str(trimmed).map_err(|e| SchemaError::Config {
            message: format!("{} is not a JSON array of strings: {}", EnvConfig::LICENSES, e),
        })?;
        return Ok(parsed);
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

/// Validating builder for [`InstanceConfig`].
#[derive(Debug, Default)]
pub struct InstanceConfigBuilder {
    instance_name: Option<String>,
    doi_prefix: Option<String>,
    licenses: Option<Vec<String>>,
    instance_url: Option<String>,
}

impl InstanceConfigBuilder {
    /// Upper-case archive name used as the identifier prefix.
    ///
    /// Default: `DANDI-ADHOC`
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// DOI registrant prefix, e.g. `10.48324`.
    pub fn doi_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.doi_prefix = Some(prefix.into());
        self
    }

    /// Licenses a dataset may declare.
    ///
    /// Default: `spdx:CC0-1.0`, `spdx:CC-BY-4.0`
    pub fn licenses<I, S>(mut self, licenses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.licenses = Some(licenses.into_iter().map(Into::into).collect());
        self
    }

    /// Base URL of the archive web application.
    pub fn instance_url(mut self, url: impl Into<String>) -> Self {
        self.instance_url = Some(url.into());
        self
    }

    pub fn build(self) -> Result<InstanceConfig> {
        let defaults = InstanceConfig::default();

        let instance_name = self.instance_name.unwrap_or(defaults.instance_name);
        if !INSTANCE_NAME_RE.is_match(&instance_name) {
            return Err(SchemaError::Config {
                message: format!(
                    "instance name {:?} must be upper-case letters and dashes, starting with a letter",
                    instance_name
                ),
            });
        }

        if let Some(prefix) = &self.doi_prefix {
            if !DOI_PREFIX_RE.is_match(prefix) {
                return Err(SchemaError::Config {
                    message: format!("DOI prefix {:?} must look like 10.NNNN", prefix),
                });
            }
        }

        let licenses = match self.licenses {
            Some(list) => list.into_iter().collect::<BTreeSet<_>>(),
            None => defaults.licenses,
        };
        if licenses.is_empty() {
            return Err(SchemaError::Config {
                message: "at least one license must be allowed".to_string(),
            });
        }
        if let Some(blank) = licenses.iter().find(|l| l.trim().is_empty()) {
            return Err(SchemaError::Config {
                message: format!("license identifier {:?} is blank", blank),
            });
        }

        let instance_url = match self.instance_url {
            Some(raw) => Some(normalize_instance_url(&raw)?),
            None => None,
        };

        Ok(InstanceConfig {
            instance_name,
            doi_prefix: self.doi_prefix,
            licenses,
            instance_url,
        })
    }
}

fn normalize_instance_url(raw: &str) -> Result<String> {
    let parsed = Url::parse(raw).map_err(|e| SchemaError::Config {
        message: format!("instance URL {:?} is not a valid URL: {}", raw, e),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(SchemaError::Config {
            message: format!("instance URL {:?} must use http or https", raw),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

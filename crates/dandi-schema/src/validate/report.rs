//! Validation faults and reports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::registry::SchemaKind;
use crate::version::SchemaVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    /// Reported but does not fail validation.
    Warning,
}

/// Which pass produced a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPass {
    /// Shape checks: presence, types, enumerations, patterns.
    Structural,
    /// Cross-field business rules.
    Semantic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultKind {
    // Structural
    Missing,
    Type,
    Const,
    Enum,
    Pattern,
    Format,
    Length,
    Range,
    Items,
    UnknownField,
    UnknownKey,
    Discriminator,
    NoMatch,
    Depth,
    Reference,

    // Semantic
    ContactEmail,
    ContactPerson,
    EmptyName,
    ResourceLocator,
    ResourceIdentifier,
    EmbargoDate,
    AssetDigest,
    PublishedDigest,
    PublishedSummary,
}

impl FaultKind {
    pub fn pass(&self) -> ValidationPass {
        match self {
            FaultKind::ContactEmail
            | FaultKind::ContactPerson
            | FaultKind::EmptyName
            | FaultKind::ResourceLocator
            | FaultKind::ResourceIdentifier
            | FaultKind::EmbargoDate
            | FaultKind::AssetDigest
            | FaultKind::PublishedDigest
            | FaultKind::PublishedSummary => ValidationPass::Semantic,
            _ => ValidationPass::Structural,
        }
    }
}

/// One problem found in a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fault {
    /// Location such as `contributor[2].roleName`; empty for the record root.
    pub path: String,
    pub message: String,
    pub kind: FaultKind,
    pub severity: Severity,
    pub pass: ValidationPass,
}

impl Fault {
    pub fn error(path: impl Into<String>, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
            severity: Severity::Error,
            pass: kind.pass(),
        }
    }

    pub fn warning(path: impl Into<String>, kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(path, kind, message)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "(root)" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

/// Every fault found in one record, errors first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub kind: SchemaKind,
    pub version: SchemaVersion,
    pub faults: Vec<Fault>,
}

impl ValidationReport {
    pub fn new(kind: SchemaKind, version: SchemaVersion, mut faults: Vec<Fault>) -> Self {
        faults.sort_by(|a, b| {
            (a.severity, a.pass, &a.path, a.kind, &a.message)
                .cmp(&(b.severity, b.pass, &b.path, b.kind, &b.message))
        });
        faults.dedup();
        Self {
            kind,
            version,
            faults,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Fault> {
        self.faults.iter().filter(|f| !f.is_error())
    }

    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Errors from one pass.
    pub fn errors_in(&self, pass: ValidationPass) -> impl Iterator<Item = &Fault> {
        self.errors().filter(move |f| f.pass == pass)
    }

    /// Faults at a path, mainly for tests and diagnostics.
    pub fn at(&self, path: &str) -> Vec<&Fault> {
        self.faults.iter().filter(|f| f.path == path).collect()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors = self.errors().count();
        let warnings = self.faults.len() - errors;
        write!(
            f,
            "{} {}: {} error(s), {} warning(s)",
            self.kind, self.version, errors, warnings
        )?;
        if let Some(first) = self.errors().next() {
            write!(f, "; first: {}", first)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_orders_errors_first() {
        let report = ValidationReport::new(
            SchemaKind::Dandiset,
            SchemaVersion::new(0, 6, 0),
            vec![
                Fault::warning("access", FaultKind::Missing, "missing required field"),
                Fault::error("name", FaultKind::EmptyName, "name is blank"),
                Fault::error("contributor[0].roleName[1]", FaultKind::Enum, "bad role"),
            ],
        );
        let paths: Vec<_> = report.faults.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["contributor[0].roleName[1]", "name", "access"]);
        assert!(!report.is_valid());
        assert_eq!(report.warnings().count(), 1);
        assert_eq!(report.errors_in(ValidationPass::Semantic).count(), 1);
    }

    #[test]
    fn test_fault_serializes_camel_case() {
        let fault = Fault::error("", FaultKind::UnknownField, "unexpected field 'x'");
        let json = serde_json::to_value(&fault).unwrap();
        assert_eq!(json["kind"], "unknown-field");
        assert_eq!(json["severity"], "error");
        assert_eq!(json["pass"], "structural");
        assert_eq!(fault.to_string(), "(root): unexpected field 'x'");
    }

    #[test]
    fn test_display_summarizes() {
        let report = ValidationReport::new(
            SchemaKind::Asset,
            SchemaVersion::new(0, 6, 0),
            vec![Fault::error("digest", FaultKind::AssetDigest, "needs an etag")],
        );
        assert_eq!(
            report.to_string(),
            "Asset 0.6.0: 1 error(s), 0 warning(s); first: digest: needs an etag"
        );
    }
}

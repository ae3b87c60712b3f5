//! Core types shared between the document model, client and issue mapper.

use serde::{Deserialize, Serialize};

/// Canonical URL of the extension carrying an issue's source line.
pub const ISSUE_LINE_EXTENSION: &str =
    "http://hl7.org/fhir/StructureDefinition/operationoutcome-issue-line";

/// Serialization format of a submitted document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Json,
    Xml,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Json => "json",
            ContentKind::Xml => "xml",
        }
    }

    /// The `Content-Type` sent to `/validate` for this kind.
    pub fn media_type(&self) -> &'static str {
        match self {
            ContentKind::Json => "application/fhir+json",
            ContentKind::Xml => "application/fhir+xml",
        }
    }
}

impl std::fmt::Display for ContentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of an OperationOutcome issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Fatal,
    Error,
    Warning,
    Information,
    /// Any code outside the four FHIR severities.
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Fatal => "fatal",
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Information => "information",
            Severity::Unknown => "unknown",
        }
    }
}

/// How the validator numbers the lines it reports.
///
/// The line extension is opaque: some validator builds count from zero,
/// others from one. `ZeroBased` shifts reported values up by one for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineBase {
    #[default]
    AsReported,
    ZeroBased,
}

impl LineBase {
    /// Convert a reported line value to a 1-based display line.
    pub fn display_line(&self, reported: i64) -> i64 {
        match self {
            LineBase::AsReported => reported,
            LineBase::ZeroBased => reported + 1,
        }
    }
}

/// An `OperationOutcome` returned by the validator's `/validate` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    #[serde(default)]
    pub issue: Vec<OutcomeIssue>,
}

/// A single entry of `OperationOutcome.issue`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeIssue {
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<CodeableConcept>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub expression: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub location: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extension: Vec<Extension>,
}

impl OutcomeIssue {
    /// The reported line, if the issue carries the line extension.
    pub fn reported_line(&self) -> Option<i64> {
        self.extension
            .iter()
            .find(|e| e.url == ISSUE_LINE_EXTENSION)
            .and_then(|e| e.value_integer)
    }

    /// The issue's location, preferring FHIRPath `expression` over `location`.
    pub fn location_text(&self) -> String {
        if self.expression.is_empty() {
            self.location.join(", ")
        } else {
            self.expression.join(", ")
        }
    }

    pub fn details_text(&self) -> &str {
        self.details
            .as_ref()
            .and_then(|d| d.text.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CodeableConcept {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Extension {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_integer: Option<i64>,
}

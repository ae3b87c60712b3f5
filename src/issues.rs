//! Issue mapping: OperationOutcome issues -> line-annotated display issues.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::client::ValidationResult;
use crate::types::{ContentKind, LineBase, OutcomeIssue, Severity};

/// Line value for issues without a line extension.
pub const UNKNOWN_LINE: i64 = -1;

/// One problem to display: a 1-based line (or [`UNKNOWN_LINE`]) and text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    pub line: i64,
    pub text: String,
}

impl Issue {
    fn from_outcome_issue(issue: &OutcomeIssue, line_base: LineBase) -> Self {
        Issue {
            line: issue
                .reported_line()
                .map(|line| line_base.display_line(line))
                .unwrap_or(UNKNOWN_LINE),
            text: format!("{}: {}", issue.location_text(), issue.details_text()),
        }
    }

    pub fn has_line(&self) -> bool {
        self.line != UNKNOWN_LINE
    }
}

impl std::fmt::Display for Issue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.has_line() {
            write!(f, "{} on line {}", self.text, self.line)
        } else {
            f.write_str(&self.text)
        }
    }
}

/// Issues of exactly one severity, in outcome order, with lines as reported.
pub fn issues_by_severity(issues: &[OutcomeIssue], severity: Severity) -> Vec<Issue> {
    issues_by_severity_with_base(issues, severity, LineBase::AsReported)
}

/// [`issues_by_severity`] with an explicit line numbering convention.
pub fn issues_by_severity_with_base(
    issues: &[OutcomeIssue],
    severity: Severity,
    line_base: LineBase,
) -> Vec<Issue> {
    issues
        .iter()
        .filter(|i| i.severity == severity)
        .map(|i| Issue::from_outcome_issue(i, line_base))
        .collect()
}

/// Stable sort by ascending line number.
pub fn sort_by_line(issues: &mut [Issue]) {
    issues.sort_by_key(|i| i.line);
}

/// Display buckets. Fatal issues are folded into `errors`, ahead of errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IssueBuckets {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub information: Vec<Issue>,
}

impl IssueBuckets {
    /// Bucket an outcome's issues, each bucket sorted by line.
    pub fn from_issues(issues: &[OutcomeIssue], line_base: LineBase) -> Self {
        let mut errors = issues_by_severity_with_base(issues, Severity::Fatal, line_base);
        errors.extend(issues_by_severity_with_base(issues, Severity::Error, line_base));
        let mut warnings = issues_by_severity_with_base(issues, Severity::Warning, line_base);
        let mut information =
            issues_by_severity_with_base(issues, Severity::Information, line_base);

        sort_by_line(&mut errors);
        sort_by_line(&mut warnings);
        sort_by_line(&mut information);

        IssueBuckets {
            errors,
            warnings,
            information,
        }
    }

    /// Lines to highlight in the document view: those with errors.
    pub fn highlighted_lines(&self) -> BTreeSet<i64> {
        self.errors
            .iter()
            .filter(|i| i.has_line())
            .map(|i| i.line)
            .collect()
    }

    pub fn total(&self) -> usize {
        self.errors.len() + self.warnings.len() + self.information.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Results page model handed to the display stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub profile_urls: Vec<String>,
    pub content_kind: ContentKind,
    pub resource_text: String,
    pub issues: IssueBuckets,
}

impl ValidationReport {
    pub fn new(result: &ValidationResult, line_base: LineBase) -> Self {
        ValidationReport {
            profile_urls: result.profile_urls.clone(),
            content_kind: result.content_kind,
            resource_text: result.resource_text.clone(),
            issues: IssueBuckets::from_issues(&result.outcome.issue, line_base),
        }
    }

    /// Which StructureDefinitions the resource was validated against.
    pub fn summary(&self) -> String {
        match self.profile_urls.as_slice() {
            [] => "Validated the uploaded resource".to_string(),
            [single] => format!(
                "Validated the uploaded resource against the {} StructureDefinition",
                single
            ),
            many => format!(
                "Validated the uploaded resource against the following StructureDefinitions: {}",
                many.join(", ")
            ),
        }
    }

    /// Heading for one bucket, e.g. "Validation errors:" or
    /// "No validation warning issues found".
    pub fn heading(severity: Severity, count: usize) -> String {
        let name = match severity {
            Severity::Fatal | Severity::Error => "error",
            other => other.as_str(),
        };
        if count == 0 {
            format!("No validation {} issues found", name)
        } else if severity == Severity::Information || count == 1 {
            format!("Validation {}:", name)
        } else {
            format!("Validation {}s:", name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OperationOutcome, ISSUE_LINE_EXTENSION};
    use serde_json::json;

    fn outcome_issue(severity: &str, line: Option<i64>, text: &str) -> OutcomeIssue {
        let mut value = json!({
            "severity": severity,
            "details": { "text": text },
            "expression": ["Patient"]
        });
        if let Some(line) = line {
            value["extension"] = json!([{ "url": ISSUE_LINE_EXTENSION, "valueInteger": line }]);
        }
        serde_json::from_value(value).unwrap()
    }

    fn mixed() -> Vec<OutcomeIssue> {
        vec![
            outcome_issue("error", Some(9), "e1"),
            outcome_issue("fatal", Some(12), "f1"),
            outcome_issue("warning", Some(3), "w1"),
            outcome_issue("error", Some(2), "e2"),
            outcome_issue("fatal", None, "f2"),
            outcome_issue("information", Some(1), "i1"),
        ]
    }

    #[test]
    fn filters_by_exact_severity() {
        let issues = mixed();
        let errors = issues_by_severity(&issues, Severity::Error);
        let fatals = issues_by_severity(&issues, Severity::Fatal);

        assert_eq!(errors.len(), 2);
        assert_eq!(fatals.len(), 2);
        assert!(errors.iter().all(|i| i.text.starts_with("Patient: e")));
        assert!(fatals.iter().all(|i| i.text.starts_with("Patient: f")));
    }

    #[test]
    fn issue_text_and_line() {
        let issues = issues_by_severity(&mixed(), Severity::Warning);
        assert_eq!(
            issues,
            vec![Issue {
                line: 3,
                text: "Patient: w1".into()
            }]
        );
    }

    #[test]
    fn missing_line_is_unknown() {
        let fatals = issues_by_severity(&mixed(), Severity::Fatal);
        assert_eq!(fatals[1].line, UNKNOWN_LINE);
        assert!(!fatals[1].has_line());
    }

    #[test]
    fn missing_details_gives_empty_text() {
        let issue: OutcomeIssue =
            serde_json::from_value(json!({ "severity": "error", "location": ["Line 1"] }))
                .unwrap();
        let mapped = issues_by_severity(&[issue], Severity::Error);
        assert_eq!(mapped[0].text, "Line 1: ");
    }

    #[test]
    fn zero_based_lines_shift_for_display() {
        let mapped =
            issues_by_severity_with_base(&mixed(), Severity::Warning, LineBase::ZeroBased);
        assert_eq!(mapped[0].line, 4);

        // Unknown stays unknown regardless of base
        let mapped = issues_by_severity_with_base(&mixed(), Severity::Fatal, LineBase::ZeroBased);
        assert_eq!(mapped[1].line, UNKNOWN_LINE);
    }

    #[test]
    fn buckets_merge_fatal_and_error() {
        let issues = mixed();
        let buckets = IssueBuckets::from_issues(&issues, LineBase::AsReported);

        let fatal_count = issues_by_severity(&issues, Severity::Fatal).len();
        let error_count = issues_by_severity(&issues, Severity::Error).len();
        assert_eq!(buckets.errors.len(), fatal_count + error_count);
        assert_eq!(buckets.warnings.len(), 1);
        assert_eq!(buckets.information.len(), 1);
        assert_eq!(buckets.total(), 6);
    }

    #[test]
    fn buckets_sorted_by_line() {
        let buckets = IssueBuckets::from_issues(&mixed(), LineBase::AsReported);
        let lines: Vec<i64> = buckets.errors.iter().map(|i| i.line).collect();
        assert_eq!(lines, vec![-1, 2, 9, 12]);
    }

    #[test]
    fn sort_is_stable() {
        let mut issues = vec![
            Issue { line: 5, text: "a".into() },
            Issue { line: 1, text: "b".into() },
            Issue { line: 5, text: "c".into() },
        ];
        sort_by_line(&mut issues);
        let texts: Vec<&str> = issues.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["b", "a", "c"]);
    }

    #[test]
    fn highlighted_lines_are_error_lines() {
        let buckets = IssueBuckets::from_issues(&mixed(), LineBase::AsReported);
        let lines: Vec<i64> = buckets.highlighted_lines().into_iter().collect();
        assert_eq!(lines, vec![2, 9, 12]);
    }

    #[test]
    fn report_summary() {
        let result = ValidationResult {
            outcome: OperationOutcome {
                resource_type: "OperationOutcome".into(),
                issue: mixed(),
            },
            profile_urls: vec!["http://hl7.org/fhir/StructureDefinition/Patient".into()],
            resource_text: "{}".into(),
            content_kind: ContentKind::Json,
        };
        let report = ValidationReport::new(&result, LineBase::AsReported);
        assert_eq!(
            report.summary(),
            "Validated the uploaded resource against the http://hl7.org/fhir/StructureDefinition/Patient StructureDefinition"
        );
        assert!(report.issues.has_errors());
    }

    #[test]
    fn headings() {
        assert_eq!(
            ValidationReport::heading(Severity::Error, 0),
            "No validation error issues found"
        );
        assert_eq!(ValidationReport::heading(Severity::Error, 1), "Validation error:");
        assert_eq!(ValidationReport::heading(Severity::Warning, 3), "Validation warnings:");
        assert_eq!(
            ValidationReport::heading(Severity::Information, 3),
            "Validation information:"
        );
    }

    #[test]
    fn issue_display() {
        let issue = Issue { line: 4, text: "Patient.name: missing".into() };
        assert_eq!(issue.to_string(), "Patient.name: missing on line 4");
        let issue = Issue { line: UNKNOWN_LINE, text: "x: y".into() };
        assert_eq!(issue.to_string(), "x: y");
    }
}

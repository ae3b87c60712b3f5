//! FHIR Validator Form
//!
//! Client-side core of a FHIR resource validation form: two input slots
//! (resource and profile) that hold pasted text or an uploaded file, a
//! submission pipeline that talks to an external validator over HTTP, and an
//! issue mapper that turns the returned OperationOutcome into line-annotated,
//! severity-bucketed issues.
//!
//! # Example
//!
//! ```
//! use fhir_validator_form::{FormAction, SlotName, ValidatorForm};
//!
//! let mut form = ValidatorForm::new();
//! assert!(!form.can_submit());
//!
//! form.change_text(SlotName::Resource, r#"{ "resourceType": "Patient" }"#);
//! assert!(form.can_submit());
//! assert_eq!(form.detected_resource_type().as_deref(), Some("Patient"));
//!
//! // Picking another guide always clears the selected profile
//! form.dispatch(FormAction::SetProfileSelection(Some("http://example.org/p".into())));
//! form.dispatch(FormAction::SetImplementationGuide(Some("hl7.fhir.us.core".into())));
//! assert!(form.state().profile_selection.is_none());
//! ```
//!
//! # Validator endpoints
//!
//! | Call | Request | Response |
//! |------|---------|----------|
//! | `validate_with` | `POST /validate?profile=a,b` | OperationOutcome |
//! | `add_profile` | `POST /profiles` | any 2xx |
//! | `get_implementation_guides` | `GET /igs` | `{ id: locator }` |
//! | `load_implementation_guide` | `PUT /igs/{id}` | `{ id, version, profiles }` |
//! | `load_package_file` | `POST /igs` (gzip) | `{ id, version, profiles }` |
//! | `get_profiles_by_ig` | `GET /profiles-by-ig` | `{ id: [url] }` |
//! | `get_version` | `GET /version` | text or `{ name: version }` |

mod catalog;
mod client;
mod config;
mod error;
mod form;
mod issues;
mod resource;
mod shape;
mod slot;
mod types;

pub use catalog::{catalog_key, locator_version, GuideProfiles, ProfileCatalog};
pub use client::{dedup_profile_urls, ValidationResult, ValidatorClient, PLAIN_VERSION_KEY};
pub use config::{ClientConfig, DEFAULT_TIMEOUT, DEFAULT_VALIDATOR_URL, VALIDATOR_URL_ENV};
pub use error::{ClientError, DocumentError, SubmitError, NOT_AN_OUTCOME, UNPARSABLE_RESPONSE};
pub use form::{
    FormAction, FormHistory, FormState, SlotName, Submission, SubmissionResult, SubmitStatus,
    ValidatorForm,
};
pub use issues::{
    issues_by_severity, issues_by_severity_with_base, sort_by_line, Issue, IssueBuckets,
    ValidationReport, UNKNOWN_LINE,
};
pub use resource::{
    describe_document, extract_profile_url, parse_document, validate, validate_optional, Document,
    DocumentBody, DocumentDescription, XmlElement, BASE_PROFILE_PREFIX, FHIR_NAMESPACE,
    PROFILE_RESOURCE_TYPE,
};
pub use shape::{check_against_schema, ResponseShape, ShapeViolation};
pub use slot::{
    CompletedRead, FileRef, FileSource, InputSlot, MemorySource, PathSource, PendingRead,
    ReadPhase, SlotAction, SlotState, SlotStatus, Validator, FILE_READ_ERROR,
};
pub use types::{
    CodeableConcept, ContentKind, Extension, LineBase, OperationOutcome, OutcomeIssue, Severity,
    ISSUE_LINE_EXTENSION,
};

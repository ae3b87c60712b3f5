//! Error types for document parsing and validator communication.

use std::path::PathBuf;
use thiserror::Error;

/// Local parse/shape errors for a submitted document.
///
/// The `Display` text of each variant is what the form shows underneath the
/// offending input, so it is kept short and user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Invalid JSON/XML")]
    InvalidSyntax,

    #[error("XML is missing namespace xmlns=\"http://hl7.org/fhir\"")]
    MissingNamespace,

    #[error("JSON is missing \"resourceType\" field")]
    MissingResourceType,

    #[error("Profile was not a StructureDefinition")]
    NotAProfile,

    #[error("No profile url found in StructureDefinition")]
    MissingProfileUrl,
}

impl DocumentError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        2
    }
}

/// Errors talking to the external validation service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Non-2xx response. The message is the status reason phrase.
    #[error("{reason}")]
    UploadFailed { status: u16, reason: String },

    #[error("{source}")]
    Network {
        #[source]
        source: reqwest::Error,
    },

    #[error("{message}")]
    InvalidResponse { message: String },

    #[error("invalid validator URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    #[error("cannot read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Body of a 2xx response that isn't JSON.
pub const UNPARSABLE_RESPONSE: &str = "The response from the server could not be parsed.";

/// Body of a `/validate` response that isn't an OperationOutcome.
pub const NOT_AN_OUTCOME: &str = "The response from the server was not an OperationOutcome.";

impl ClientError {
    pub(crate) fn unparsable() -> Self {
        ClientError::InvalidResponse {
            message: UNPARSABLE_RESPONSE.to_string(),
        }
    }

    pub(crate) fn not_an_outcome() -> Self {
        ClientError::InvalidResponse {
            message: NOT_AN_OUTCOME.to_string(),
        }
    }

    pub(crate) fn upload_failed(status: reqwest::StatusCode) -> Self {
        ClientError::UploadFailed {
            status: status.as_u16(),
            reason: status
                .canonical_reason()
                .unwrap_or("Unknown Status")
                .to_string(),
        }
    }

    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Document(e) => e.exit_code(),
            ClientError::InvalidUrl { .. } => 2,
            _ => 3,
        }
    }
}

/// Why a form submission stopped. The message is shown as the form's
/// dismissable error banner.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Resource is invalid")]
    InvalidResource,

    #[error("Failed to upload profile: {0}")]
    ProfileUpload(#[source] ClientError),

    #[error("Failed to validate resource: {0}")]
    Validation(#[source] ClientError),
}

impl SubmitError {
    /// Returns the exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            SubmitError::InvalidResource => 2,
            SubmitError::ProfileUpload(e) | SubmitError::Validation(e) => e.exit_code(),
        }
    }
}

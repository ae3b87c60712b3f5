//! Shape checks for validator responses.
//!
//! Each endpoint's JSON body is checked against a small JSON Schema before
//! it is deserialized, so a 2xx response carrying something unexpected is
//! reported as an invalid response rather than a confusing serde error.

use serde::Serialize;
use serde_json::{json, Value};

/// Single shape violation with path context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShapeViolation {
    /// JSON Pointer (RFC 6901) to the offending value.
    pub path: String,
    pub message: String,
}

impl std::fmt::Display for ShapeViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Expected body of each validator endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// `POST /validate`
    OperationOutcome,
    /// `GET /igs`
    GuideLocators,
    /// `PUT /igs/{id}` and `POST /igs`
    GuideProfiles,
    /// `GET /profiles-by-ig`
    ProfilesByGuide,
    /// `GET /version` when it answers with JSON
    VersionMap,
}

impl ResponseShape {
    pub fn schema(&self) -> Value {
        match self {
            ResponseShape::OperationOutcome => json!({
                "type": "object",
                "required": ["resourceType", "issue"],
                "properties": {
                    "resourceType": { "const": "OperationOutcome" },
                    "issue": {
                        "type": "array",
                        "items": {
                            "type": "object",
                            "required": ["severity"],
                            "properties": {
                                "severity": { "type": "string" },
                                "expression": { "type": "array", "items": { "type": "string" } },
                                "location": { "type": "array", "items": { "type": "string" } },
                                "extension": { "type": "array", "items": { "type": "object" } }
                            }
                        }
                    }
                }
            }),
            ResponseShape::GuideLocators => json!({
                "type": "object",
                "additionalProperties": { "type": "string" }
            }),
            ResponseShape::GuideProfiles => json!({
                "type": "object",
                "required": ["id", "version", "profiles"],
                "properties": {
                    "id": { "type": "string" },
                    "version": { "type": "string" },
                    "profiles": { "type": "array", "items": { "type": "string" } }
                }
            }),
            ResponseShape::ProfilesByGuide => json!({
                "type": "object",
                "additionalProperties": { "type": "array", "items": { "type": "string" } }
            }),
            ResponseShape::VersionMap => json!({
                "type": "object",
                "additionalProperties": { "type": "string" }
            }),
        }
    }

    /// Check a response body against this shape.
    pub fn check(&self, body: &Value) -> Result<(), Vec<ShapeViolation>> {
        check_against_schema(&self.schema(), body)
    }
}

/// Check a JSON value against a JSON Schema, collecting every violation.
pub fn check_against_schema(schema: &Value, body: &Value) -> Result<(), Vec<ShapeViolation>> {
    let validator = jsonschema::validator_for(schema).map_err(|e| {
        vec![ShapeViolation {
            path: String::new(),
            message: format!("invalid schema: {}", e),
        }]
    })?;

    let violations: Vec<ShapeViolation> = validator
        .iter_errors(body)
        .map(|e| ShapeViolation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(violations)
    }
}

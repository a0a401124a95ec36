//! Typed error handling for the refract framework
//!
//! The error taxonomy mirrors the HTTP surface: schema violations and
//! foreign-key constraint failures render as 422 with a structured
//! `errors` array, missing targets render as 404, and configuration
//! problems are fatal at startup and never served.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt;

use crate::core::source::SourceError;

/// The main error type for the refract framework
#[derive(Debug)]
pub enum Error {
    /// Input payload failed schema validation, or a referential-integrity
    /// failure was reported by the source. Always a 422.
    Validation(Vec<ValidationFailure>),

    /// The target of a read or delete does not exist. 404.
    NotFound,

    /// The framework was assembled incorrectly (e.g. secure mode without
    /// an auth provider). Fatal at startup, never served.
    Configuration(String),

    /// Storage backend failure surfaced through the `Source` boundary.
    Storage(String),

    /// Internal framework errors (should not happen in normal operation)
    Internal(String),
}

/// A single field-level validation error, serialized into the `errors`
/// array of a 422 response body.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationFailure {
    /// Human-readable description of the failure
    pub message: String,

    /// JSON pointer to the offending value within the payload
    #[serde(rename = "dataPath")]
    pub data_path: String,

    /// JSON pointer to the schema rule that was violated
    #[serde(rename = "schemaPath")]
    pub schema_path: String,

    /// Rule-specific parameters (e.g. the name of a missing property)
    pub params: Value,
}

impl ValidationFailure {
    /// Failure entry for a missing required property.
    pub fn missing_property(name: &str) -> Self {
        ValidationFailure {
            message: format!("should have required property '{}'", name),
            data_path: String::new(),
            schema_path: "#/required".to_string(),
            params: json!({ "missingProperty": name }),
        }
    }

    /// Failure entry for a value of the wrong type.
    pub fn wrong_type(field_path: &str, expected: &str) -> Self {
        ValidationFailure {
            message: format!("should be {}", expected),
            data_path: field_path.to_string(),
            schema_path: format!("#/properties{}/type", field_path),
            params: json!({ "type": expected }),
        }
    }

    /// Failure entry for a foreign key that references a nonexistent row.
    pub fn constraint_violation(field: &str) -> Self {
        ValidationFailure {
            message: "referenced resource does not exist".to_string(),
            data_path: format!("/{}", field),
            schema_path: format!("#/properties/{}", field),
            params: json!({ "field": field }),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(failures) => {
                write!(f, "schema validation failed ({} error(s))", failures.len())
            }
            Error::NotFound => write!(f, "the requested resource does not exist"),
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::Storage(msg) => write!(f, "storage error: {}", msg),
            Error::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Error response body, matching the structured JSON shape that clients
/// are expected to parse: `statusCode`, `error`, `message` and, for
/// validation failures, an `errors` array.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "statusCode")]
    pub status_code: u16,

    /// HTTP reason phrase
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ValidationFailure>>,
}

impl Error {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to a serializable response body
    pub fn to_body(&self) -> ErrorBody {
        let status = self.status_code();

        ErrorBody {
            status_code: status.as_u16(),
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: self.to_string(),
            errors: match self {
                Error::Validation(failures) => Some(failures.clone()),
                _ => None,
            },
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_body());
        (status, body).into_response()
    }
}

/// Translate structured source errors into the user-facing taxonomy.
/// Constraint violations become the same 422 shape as schema failures,
/// scoped to the offending field.
impl From<SourceError> for Error {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound => Error::NotFound,
            SourceError::ConstraintViolation { field } => {
                Error::Validation(vec![ValidationFailure::constraint_violation(&field)])
            }
            SourceError::Backend(msg) => Error::Storage(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_status_and_body() {
        let err = Error::Validation(vec![ValidationFailure::missing_property("title")]);
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = err.to_body();
        assert_eq!(body.status_code, 422);
        assert_eq!(body.error, "Unprocessable Entity");

        let errors = body.errors.expect("validation body carries errors");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].data_path, "");
        assert_eq!(errors[0].params["missingProperty"], "title");
    }

    #[test]
    fn test_not_found_has_no_errors_array() {
        let body = Error::NotFound.to_body();
        assert_eq!(body.status_code, 404);
        assert_eq!(body.error, "Not Found");
        assert!(body.errors.is_none());
    }

    #[test]
    fn test_constraint_violation_maps_to_422() {
        let err: Error = SourceError::ConstraintViolation {
            field: "owner".to_string(),
        }
        .into();

        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        match err {
            Error::Validation(failures) => {
                assert_eq!(failures[0].data_path, "/owner");
                assert_eq!(failures[0].params["field"], "owner");
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_source_not_found_maps_to_404() {
        let err: Error = SourceError::NotFound.into();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }
}

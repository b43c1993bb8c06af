//! Standardized API payloads (RFC 7807 problem details for errors).

use serde::{Deserialize, Serialize};

use quarry_core::{OrmError, ValidationErrors};

/// Successful API response wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

/// RFC 7807 Problem Details.
///
/// See: https://datatracker.ietf.org/doc/html/rfc7807
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "type")]
    pub error_type: String,

    pub title: String,

    pub status: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Machine-readable error code, e.g. `MODEL_NOT_FOUND`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    /// Per-attribute validation messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<ValidationErrors>,
}

impl ErrorResponse {
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            error_type: "about:blank".to_string(),
            title: title.into(),
            status,
            detail: None,
            instance: None,
            code: None,
            errors: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, "Bad Request").with_detail(detail)
    }

    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, "Not Found").with_detail(detail)
    }

    pub fn conflict(detail: impl Into<String>) -> Self {
        Self::new(409, "Conflict").with_detail(detail)
    }

    pub fn validation(errors: ValidationErrors) -> Self {
        let mut response = Self::new(422, "Validation Failed").with_detail(errors.to_string());
        response.errors = Some(errors);
        response
    }

    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error")
    }
}

impl From<&OrmError> for ErrorResponse {
    fn from(err: &OrmError) -> Self {
        let response = match err {
            OrmError::Validation(errors) => ErrorResponse::validation(errors.clone()),
            OrmError::ModelNotFound { .. } => ErrorResponse::not_found(err.to_string()),
            OrmError::InvalidQuery(_)
            | OrmError::InvalidFilter(_)
            | OrmError::InvalidRelation(_)
            | OrmError::MassAssignment { .. } => ErrorResponse::bad_request(err.to_string()),
            OrmError::Constraint(_) | OrmError::Deadlock(_) | OrmError::Halted { .. } => {
                ErrorResponse::conflict(err.to_string())
            }
            _ => {
                // Internal details stay in the logs.
                tracing::error!(code = err.code(), error = %err, "Internal ORM error");
                ErrorResponse::internal_error()
            }
        };
        response.with_code(err.code())
    }
}

impl From<OrmError> for ErrorResponse {
    fn from(err: OrmError) -> Self {
        Self::from(&err)
    }
}

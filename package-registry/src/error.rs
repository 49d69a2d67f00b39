//! # Error Handling and Response Types
//!
//! Request handlers return [`AppResult`]. Every [`AppError`] maps to an
//! [`ErrorCode`], which fixes both the HTTP status and the machine-readable code
//! in the JSON body:
//!
//! ```json
//! {
//!   "error": "invalid 'experimental' query param: 'foo'",
//!   "code": "invalid_parameter",
//!   "details": {"param": "experimental", "value": "foo"},
//!   "timestamp": "2024-01-01T12:00:00Z"
//! }
//! ```
//!
//! - **Invalid parameter / version** (400): malformed client input
//! - **Package not found** (404): well-formed identity without a record
//! - **Internal** (500): everything else; the body never carries the cause,
//!   which is only logged

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};

use crate::query::QueryError;
use crate::version::VersionError;

/// Message returned for every internal error.
const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Standardized error response structure for consistent API error handling
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub timestamp: String,
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidParameter,
    InvalidVersion,
    PackageNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidParameter => "invalid_parameter",
            ErrorCode::InvalidVersion => "invalid_version",
            ErrorCode::PackageNotFound => "package_not_found",
            ErrorCode::InternalError => "internal_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter | ErrorCode::InvalidVersion => StatusCode::BAD_REQUEST,
            ErrorCode::PackageNotFound => StatusCode::NOT_FOUND,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    InvalidParameter(#[from] QueryError),

    #[error("invalid package version '{input}'")]
    InvalidVersion {
        input: String,
        #[source]
        source: VersionError,
    },

    #[error("package {name} version {version} not found")]
    PackageNotFound { name: String, version: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::InvalidParameter(_) => ErrorCode::InvalidParameter,
            AppError::InvalidVersion { .. } => ErrorCode::InvalidVersion,
            AppError::PackageNotFound { .. } => ErrorCode::PackageNotFound,
            AppError::Io(_) | AppError::Json(_) | AppError::Anyhow(_) => ErrorCode::InternalError,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            AppError::InvalidParameter(QueryError::InvalidParameter { name, value }) => {
                Some(json!({"param": name, "value": value}))
            }
            AppError::InvalidVersion { input, source } => {
                Some(json!({"version": input, "reason": source.to_string()}))
            }
            _ => None,
        }
    }

    pub fn to_error_response(&self) -> ApiErrorResponse {
        let code = self.error_code();
        let error = match code {
            ErrorCode::InternalError => INTERNAL_ERROR_MESSAGE.to_string(),
            _ => self.to_string(),
        };
        ApiErrorResponse {
            error,
            code: code.as_str().to_string(),
            details: self.details(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::InternalError {
            tracing::error!(error = %self, source = ?std::error::Error::source(&self), "Request failed");
        } else {
            tracing::debug!(error = %self, status = %status, code = code.as_str(), "Rejected request");
        }

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

/// Convenient result type for request handlers.
pub type AppResult<T> = Result<T, AppError>;

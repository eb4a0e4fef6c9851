// ABOUTME: Unified application error type with stable codes and HTTP response formatting
// ABOUTME: Route handlers convert domain errors into AppError so clients see a consistent JSON shape
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # Unified Error Handling
//!
//! Defines the application-level error type the route layer returns to
//! clients. Domain errors (`OAuthError`, `HmrcError`) convert into
//! [`AppError`] at the handler boundary; the raw upstream payload never
//! reaches a response body, only the sanitized message and stable code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Standard error codes used throughout the application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Authentication & Authorization
    #[serde(rename = "AUTH_REQUIRED")]
    AuthRequired,
    #[serde(rename = "SESSION_EXPIRED")]
    SessionExpired,
    #[serde(rename = "INVALID_STATE")]
    InvalidState,

    // Validation
    #[serde(rename = "INVALID_INPUT")]
    InvalidInput,
    #[serde(rename = "MISSING_REQUIRED_FIELD")]
    MissingRequiredField,

    // Resources
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,

    // Upstream (HMRC)
    #[serde(rename = "HMRC_RATE_LIMITED")]
    HmrcRateLimited,
    #[serde(rename = "HMRC_UNAVAILABLE")]
    HmrcUnavailable,
    #[serde(rename = "HMRC_ERROR")]
    HmrcError,
    #[serde(rename = "INCOMPLETE_FRAUD_HEADERS")]
    IncompleteFraudHeaders,

    // Internal
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> StatusCode {
        match self {
            Self::AuthRequired | Self::SessionExpired => StatusCode::UNAUTHORIZED,
            Self::InvalidState => StatusCode::FORBIDDEN,
            Self::InvalidInput | Self::MissingRequiredField => StatusCode::BAD_REQUEST,
            Self::ResourceNotFound => StatusCode::NOT_FOUND,
            Self::HmrcRateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::HmrcUnavailable => StatusCode::BAD_GATEWAY,
            Self::HmrcError
            | Self::IncompleteFraudHeaders
            | Self::ConfigError
            | Self::DatabaseError
            | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get a user-safe description of this error
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AuthRequired => "Authentication is required to access this resource",
            Self::SessionExpired => "Your HMRC connection has expired. Please reconnect",
            Self::InvalidState => "The authorization request could not be verified",
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing from the request",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::HmrcRateLimited => "HMRC is throttling requests. Please try again shortly",
            Self::HmrcUnavailable => "HMRC is temporarily unavailable. Please try again later",
            Self::HmrcError => "HMRC reported an error processing the request",
            Self::IncompleteFraudHeaders => {
                "The request could not be prepared with the required compliance headers"
            }
            Self::ConfigError => "Configuration error encountered",
            Self::DatabaseError => "Storage operation failed",
            Self::InternalError => "An internal server error occurred",
        }
    }
}

/// Additional context attached to errors for tracing and diagnostics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Request ID for tracing
    pub request_id: Option<String>,
    /// User ID if available
    pub user_id: Option<Uuid>,
    /// Additional key-value context (never shown to clients verbatim)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Stable error code
    pub code: ErrorCode,
    /// Human-readable, user-safe message
    pub message: String,
    /// Additional context
    pub context: ErrorContext,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: ErrorContext::default(),
            source: None,
        }
    }

    /// Attach a user ID to the error context
    #[must_use]
    pub fn with_user_id(mut self, user_id: Uuid) -> Self {
        self.context.user_id = Some(user_id);
        self
    }

    /// Attach diagnostic details (kept out of the client response body)
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.context.details = Some(details);
        self
    }

    /// Attach a source error for chaining
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Get the HTTP status for this error
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        self.code.http_status()
    }

    /// Session expired / reconnect required
    #[must_use]
    pub fn session_expired() -> Self {
        Self::new(ErrorCode::SessionExpired, ErrorCode::SessionExpired.description())
    }

    /// Invalid input from the caller
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Storage failure
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Configuration failure
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for route handlers
pub type AppResult<T> = Result<T, AppError>;

/// JSON error body returned to clients: `{"error": {"code", "message", ...}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorResponseDetails,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponseDetails {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        Self {
            error: ErrorResponseDetails {
                code: error.code,
                message: error.message,
                request_id: error.context.request_id,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        if status.is_server_error() {
            tracing::error!(
                error.code = ?self.code,
                error.message = %self.message,
                error.source = ?self.source,
                "request failed"
            );
        }
        (status, Json(ErrorResponse::from(self))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::internal(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::SessionExpired.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::InvalidInput.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::HmrcRateLimited.http_status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorCode::HmrcUnavailable.http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::InternalError.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_error_response_serialization() {
        let error = AppError::invalid_input("periodFrom must not be after periodTo");
        let response = ErrorResponse::from(error);

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("INVALID_INPUT"));
        assert!(json.contains("periodFrom"));
    }

    #[test]
    fn test_details_never_serialized_into_response() {
        let error = AppError::internal("boom").with_details(serde_json::json!({
            "raw": "secret upstream payload"
        }));
        let json = serde_json::to_string(&ErrorResponse::from(error)).unwrap();
        assert!(!json.contains("secret upstream payload"));
    }
}

// ABOUTME: Closed error taxonomy for HMRC API failures with retryability and user-safe messages
// ABOUTME: Pure classification from HTTP status plus the government error body - no I/O
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # HMRC Error Translation
//!
//! HMRC reports errors as an HTTP status plus a `{code, message}` body
//! (optionally with a nested `errors` array for multi-field validation
//! failures). This module maps that surface - plus transport failures -
//! into a closed taxonomy the rest of the system branches on.
//!
//! Unrecognized codes land in [`HmrcError::Unknown`] with the raw payload
//! preserved for diagnostics; the user-facing message stays generic.

use serde::Deserialize;
use thiserror::Error;

use crate::errors::{AppError, ErrorCode};

/// HMRC error body shape: `{"code": "...", "message": "...", "errors": [...]}`
#[derive(Debug, Clone, Deserialize)]
pub struct HmrcErrorBody {
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub errors: Option<Vec<HmrcErrorBody>>,
}

/// Closed taxonomy of HMRC failure kinds.
///
/// The variants are exhaustive over *categories*, not over every upstream
/// code; each carries the raw `code`/`message` for logging.
#[derive(Debug, Clone, Error)]
pub enum HmrcError {
    /// Token missing/invalid/expired at the HTTP layer
    #[error("HMRC authorization failed ({code})")]
    Unauthorized { code: String, message: String },

    /// Resource does not exist - includes "no business found for this
    /// identity", which callers must treat as an empty result
    #[error("HMRC resource not found ({code})")]
    ResourceNotFound { code: String, message: String },

    /// Malformed request payload - a caller bug, never retried
    #[error("HMRC rejected the request ({code}): {message}")]
    Validation { code: String, message: String },

    /// Upstream throttling - retryable with backoff
    #[error("HMRC rate limit exceeded ({code})")]
    RateLimited { code: String, message: String },

    /// 5xx or transport failure - retryable with backoff, bounded attempts
    #[error("HMRC unavailable ({code}): {message}")]
    UpstreamUnavailable { code: String, message: String },

    /// Anything not otherwise classified; raw payload preserved
    #[error("unrecognized HMRC error ({code})")]
    Unknown {
        code: String,
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl HmrcError {
    /// The upstream (or synthesized) error code
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Unauthorized { code, .. }
            | Self::ResourceNotFound { code, .. }
            | Self::Validation { code, .. }
            | Self::RateLimited { code, .. }
            | Self::UpstreamUnavailable { code, .. }
            | Self::Unknown { code, .. } => code,
        }
    }

    /// Retryable kinds are exactly `RateLimited` and `UpstreamUnavailable`
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::UpstreamUnavailable { .. })
    }

    /// A message always safe to show a user - no raw upstream internals
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthorized { .. } => {
                "Your HMRC connection is no longer authorized. Please reconnect.".into()
            }
            Self::ResourceNotFound { .. } => "The requested record was not found at HMRC.".into(),
            Self::Validation { message, .. } => {
                // Validation messages are HMRC's own field-level guidance,
                // written for end users
                format!("HMRC rejected the submission: {message}")
            }
            Self::RateLimited { .. } => {
                "HMRC is limiting requests right now. Please try again in a few minutes.".into()
            }
            Self::UpstreamUnavailable { .. } => {
                "HMRC is temporarily unavailable. Please try again later.".into()
            }
            Self::Unknown { .. } => {
                "Something went wrong talking to HMRC. Our team has been notified.".into()
            }
        }
    }

    /// Synthesize the transport-failure case (DNS, reset, timeout)
    #[must_use]
    pub fn from_transport(error: &reqwest::Error) -> Self {
        let code = if error.is_timeout() { "TIMEOUT" } else { "NETWORK" };
        Self::UpstreamUnavailable {
            code: code.into(),
            message: error.to_string(),
        }
    }
}

/// Classify an HMRC response into the closed taxonomy.
///
/// Pure function: status code plus raw body in, taxonomy out. The body is
/// parsed leniently - an unparseable body falls back to status-only
/// classification with a synthesized `HTTP_<status>` code.
#[must_use]
pub fn classify(status: u16, body: &str) -> HmrcError {
    let parsed: Option<HmrcErrorBody> = serde_json::from_str(body).ok();
    let (code, message) = parsed.as_ref().map_or_else(
        || (format!("HTTP_{status}"), String::new()),
        |b| (b.code.clone(), b.message.clone()),
    );

    match status {
        401 | 403 => match code.as_str() {
            "INVALID_CREDENTIALS" | "UNAUTHORIZED" | "CLIENT_OR_AGENT_NOT_AUTHORISED"
            | "MISSING_CREDENTIALS" => HmrcError::Unauthorized { code, message },
            _ if status == 401 => HmrcError::Unauthorized { code, message },
            _ => HmrcError::Unknown {
                code,
                message,
                details: serde_json::from_str(body).ok(),
            },
        },
        404 => HmrcError::ResourceNotFound { code, message },
        400 | 422 => HmrcError::Validation {
            code,
            message: validation_message(parsed.as_ref(), &message),
        },
        429 => HmrcError::RateLimited { code, message },
        500..=599 => HmrcError::UpstreamUnavailable { code, message },
        _ => match code.as_str() {
            "MATCHING_RESOURCE_NOT_FOUND" | "NOT_FOUND" => {
                HmrcError::ResourceNotFound { code, message }
            }
            "MESSAGE_THROTTLED_OUT" => HmrcError::RateLimited { code, message },
            "SERVER_ERROR" | "SERVICE_UNAVAILABLE" | "GATEWAY_TIMEOUT" => {
                HmrcError::UpstreamUnavailable { code, message }
            }
            c if c.starts_with("FORMAT_") || c.starts_with("RULE_") || c == "INVALID_REQUEST" => {
                HmrcError::Validation { code, message }
            }
            _ => HmrcError::Unknown {
                code,
                message,
                details: serde_json::from_str(body).ok(),
            },
        },
    }
}

/// Flatten a multi-error validation body into one user-presentable message
fn validation_message(parsed: Option<&HmrcErrorBody>, fallback: &str) -> String {
    parsed
        .and_then(|body| body.errors.as_ref())
        .map_or_else(
            || fallback.into(),
            |errors| {
                errors
                    .iter()
                    .map(|e| e.message.as_str())
                    .filter(|m| !m.is_empty())
                    .collect::<Vec<_>>()
                    .join("; ")
            },
        )
}

impl From<HmrcError> for AppError {
    fn from(error: HmrcError) -> Self {
        let message = error.user_message();
        let code = match &error {
            HmrcError::Unauthorized { .. } => ErrorCode::SessionExpired,
            HmrcError::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            HmrcError::Validation { .. } => ErrorCode::InvalidInput,
            HmrcError::RateLimited { .. } => ErrorCode::HmrcRateLimited,
            HmrcError::UpstreamUnavailable { .. } => ErrorCode::HmrcUnavailable,
            HmrcError::Unknown { .. } => ErrorCode::HmrcError,
        };
        Self::new(code, message).with_source(error)
    }
}

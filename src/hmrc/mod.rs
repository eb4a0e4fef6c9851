// ABOUTME: HMRC API module organizing the error taxonomy, wire models, and orchestrating client
// ABOUTME: The MtdApiService here is the single entry point route handlers use
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # HMRC Making Tax Digital API
//!
//! Typed operations against HMRC's MTD endpoints, composed from the OAuth
//! refresh coordinator, the fraud header builder, the audit logger, and the
//! error translator. Every outbound call follows the same sequence: ensure
//! fresh token, build fraud headers, issue the request, log the settled
//! outcome, classify failures.

pub mod client;
pub mod errors;
pub mod models;

pub use client::{MtdApiService, RequestContext, RetryConfig};
pub use errors::{classify, HmrcError};

use thiserror::Error;

use crate::errors::{AppError, ErrorCode};
use crate::fraud::IncompleteFraudHeaders;
use crate::oauth::OAuthError;

/// Failure surface of the API service: auth, header compliance, or upstream.
#[derive(Debug, Error)]
pub enum MtdServiceError {
    #[error(transparent)]
    Auth(#[from] OAuthError),

    #[error(transparent)]
    FraudHeaders(#[from] IncompleteFraudHeaders),

    #[error(transparent)]
    Hmrc(#[from] HmrcError),
}

impl From<MtdServiceError> for AppError {
    fn from(error: MtdServiceError) -> Self {
        match error {
            MtdServiceError::Auth(e) => e.into(),
            MtdServiceError::FraudHeaders(e) => Self::new(
                ErrorCode::IncompleteFraudHeaders,
                ErrorCode::IncompleteFraudHeaders.description(),
            )
            .with_source(e),
            MtdServiceError::Hmrc(e) => e.into(),
        }
    }
}

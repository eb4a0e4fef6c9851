// ABOUTME: OAuth module organizing HMRC authentication and token lifecycle management
// ABOUTME: Centralizes the authorization flow, token exchange, and refresh coordination
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # OAuth Management Module
//!
//! HMRC authorization-code flow handling: authorization URL generation with
//! CSRF state protection, code-for-token exchange, and proactive refresh
//! with per-user single-flight coordination.

pub mod client;
pub mod manager;

pub use client::HmrcOAuthClient;
pub use manager::OAuthManager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, ErrorCode};
use crate::models::MtdTokenRecord;

/// A token grant returned by the HMRC token endpoint, not yet bound to a user.
///
/// Persistence is the caller's job - the client stays side-effect-free
/// beyond the network call itself.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: String,
    /// Absolute expiry instant, computed from the grant's `expires_in`
    pub expires_at: DateTime<Utc>,
}

impl TokenGrant {
    /// Bind this grant to a user as a fresh token record
    #[must_use]
    pub fn into_record(self, user_id: Uuid) -> MtdTokenRecord {
        let now = Utc::now();
        MtdTokenRecord {
            user_id,
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            token_type: self.token_type,
            scope: self.scope,
            expires_at: self.expires_at,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Response to an authorization request: where to send the user
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationResponse {
    pub authorization_url: String,
    pub state: String,
    pub expires_in_minutes: i64,
}

/// Response to a completed OAuth callback
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackResponse {
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub scope: String,
    pub message: String,
}

/// OAuth error types
#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    /// No stored connection, or the refresh token was rejected - the caller
    /// must route the user to re-authorization, never a retry loop.
    #[error("HMRC connection expired or missing")]
    SessionExpired,

    /// State mismatch, replay, or expiry - the flow fails closed
    #[error("invalid or expired state parameter")]
    InvalidState,

    /// Token endpoint rejected the exchange
    #[error("token exchange failed: {code}: {description}")]
    ExchangeFailed { code: String, description: String },

    /// HMRC reported the refresh token as no longer valid (rotated or revoked)
    #[error("refresh token no longer valid")]
    RefreshInvalid,

    /// Transport-level failure reaching the token endpoint
    #[error("network error during token exchange: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed authorization endpoint URL: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("token store error: {0}")]
    Storage(String),
}

impl From<OAuthError> for AppError {
    fn from(error: OAuthError) -> Self {
        match error {
            OAuthError::SessionExpired | OAuthError::RefreshInvalid => Self::session_expired(),
            OAuthError::InvalidState => Self::new(
                ErrorCode::InvalidState,
                ErrorCode::InvalidState.description(),
            ),
            OAuthError::ExchangeFailed { ref code, .. } => Self::new(
                ErrorCode::HmrcError,
                format!("HMRC rejected the authorization ({code})"),
            )
            .with_source(error),
            OAuthError::Network(_) | OAuthError::InvalidEndpoint(_) => Self::new(
                ErrorCode::HmrcUnavailable,
                ErrorCode::HmrcUnavailable.description(),
            )
            .with_source(error),
            OAuthError::Storage(message) => Self::database(message),
        }
    }
}

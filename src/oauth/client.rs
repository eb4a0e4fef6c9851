// ABOUTME: OAuth2 client for the HMRC authorization and token endpoints
// ABOUTME: Authorization URL construction, code exchange, and refresh-token exchange
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{OAuthError, TokenGrant};
use crate::config::HmrcConfig;

/// OAuth2 client for HMRC's authorization-code grant.
///
/// Endpoints are derived from the configured base URL so the same client
/// works against sandbox, production, or a test stub.
pub struct HmrcOAuthClient {
    config: HmrcConfig,
    client: Client,
}

/// Success body of the HMRC token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    expires_in: u64,
    refresh_token: String,
    scope: Option<String>,
}

/// Error body of the HMRC token endpoint
#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl HmrcOAuthClient {
    /// Create a client using the given HTTP client (shared, pooled)
    #[must_use]
    pub fn new(config: HmrcConfig, client: Client) -> Self {
        Self { config, client }
    }

    /// Build the authorization redirect URL.
    ///
    /// Deterministic construction, no network call, no side effects.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured authorization endpoint is malformed.
    pub fn authorization_url(&self, state: &str, scopes: &[&str]) -> Result<String, OAuthError> {
        let mut url = Url::parse(&self.config.authorize_url())?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &scopes.join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// Exchange an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::ExchangeFailed`] with the upstream error code on
    /// a non-2xx response, or a network error if the endpoint is unreachable.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenGrant, OAuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        self.token_request(&params, false).await
    }

    /// Exchange a refresh token for a new token pair.
    ///
    /// HMRC rotates refresh tokens: the returned grant carries a new one and
    /// the old one is dead. An `invalid_grant` response means the refresh
    /// token was already used or revoked and yields
    /// [`OAuthError::RefreshInvalid`] so callers force re-authorization
    /// instead of looping.
    ///
    /// # Errors
    ///
    /// See [`OAuthError`].
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant, OAuthError> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        self.token_request(&params, true).await
    }

    async fn token_request(
        &self,
        params: &[(&str, &str)],
        is_refresh: bool,
    ) -> Result<TokenGrant, OAuthError> {
        let response = self
            .client
            .post(self.config.token_url())
            .form(params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: TokenErrorResponse =
                serde_json::from_str(&body).unwrap_or_else(|_| TokenErrorResponse {
                    error: format!("http_{}", status.as_u16()),
                    error_description: None,
                });

            if is_refresh && parsed.error == "invalid_grant" {
                return Err(OAuthError::RefreshInvalid);
            }
            return Err(OAuthError::ExchangeFailed {
                code: parsed.error,
                description: parsed.error_description.unwrap_or_default(),
            });
        }

        let token: TokenResponse = response.json().await?;
        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            token_type: token.token_type,
            scope: token.scope.unwrap_or_default(),
            expires_at: Utc::now()
                + Duration::seconds(i64::try_from(token.expires_in).unwrap_or(3600)),
        })
    }
}

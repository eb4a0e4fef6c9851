// ABOUTME: MtdApiService orchestrator issuing authenticated, fraud-header-compliant HMRC calls
// ABOUTME: Wraps every operation with token refresh, audit logging, error translation, and bounded retry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # MTD API Service
//!
//! The facade route handlers use. Each operation runs the same state
//! machine per outbound call:
//!
//! `Pending -> { Success | RetryableFailure -> (backoff) -> Pending | TerminalFailure }`
//!
//! Retryable kinds are exactly `RateLimited` and `UpstreamUnavailable`;
//! everything else is terminal on first occurrence. A 401 despite a
//! fresh-looking token triggers exactly one forced refresh before the call
//! is declared unauthorized - never a retry loop with the same token.
//!
//! The audit entry is written only after the call settles (success or
//! terminal failure), so a cancelled operation leaves no partial entry.

use chrono::Utc;
use http::header::HeaderMap;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::{classify, HmrcError};
use super::models::{
    BusinessListResponse, CumulativePeriodRequest, ObligationsFilter, ObligationsResponse,
};
use super::MtdServiceError;
use crate::audit::ApiLogger;
use crate::config::HmrcConfig;
use crate::constants::{hmrc, retry};
use crate::fraud::FraudHeaderBuilder;
use crate::models::{
    ApiLogEntry, Business, Calculation, Obligation, PeriodSubmission, SubmissionReceipt,
};
use crate::oauth::OAuthManager;

/// Retry behavior for outbound calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum attempts per logical call (first try plus retries)
    pub max_attempts: u32,
    /// Initial backoff delay, doubled after each retryable failure
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: retry::MAX_ATTEMPTS,
            initial_backoff_ms: retry::INITIAL_BACKOFF_MS,
        }
    }
}

/// Per-request caller context: who is calling, and the forwarded evidence
/// the fraud header builder needs.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub user_id: Uuid,
    /// Inbound request headers, carrying any forwarded `Gov-Client-*` evidence
    pub client_headers: HeaderMap,
    /// Originating public IP as observed by the server
    pub peer_ip: Option<IpAddr>,
}

impl RequestContext {
    /// Context with no forwarded evidence, for server-initiated calls
    #[must_use]
    pub fn server_side(user_id: Uuid, peer_ip: Option<IpAddr>) -> Self {
        Self {
            user_id,
            client_headers: HeaderMap::new(),
            peer_ip,
        }
    }
}

/// Settled successful response of one outbound call
struct ApiSuccess {
    status: u16,
    body: String,
    correlation_id: Option<String>,
}

/// The single entry point for MTD business operations
pub struct MtdApiService {
    config: HmrcConfig,
    http: Client,
    oauth: Arc<OAuthManager>,
    fraud: FraudHeaderBuilder,
    logger: Arc<ApiLogger>,
    retry: RetryConfig,
}

impl MtdApiService {
    #[must_use]
    pub fn new(
        config: HmrcConfig,
        http: Client,
        oauth: Arc<OAuthManager>,
        logger: Arc<ApiLogger>,
        retry: RetryConfig,
    ) -> Self {
        Self {
            config,
            http,
            oauth,
            fraud: FraudHeaderBuilder::new(),
            logger,
            retry,
        }
    }

    /// List the businesses registered for a taxpayer.
    ///
    /// "No business found" is a legitimate state for many users, so a
    /// not-found classification becomes an empty list; every other error
    /// kind propagates unchanged.
    ///
    /// # Errors
    ///
    /// See [`MtdServiceError`].
    pub async fn list_businesses(
        &self,
        ctx: &RequestContext,
        nino: &str,
    ) -> Result<Vec<Business>, MtdServiceError> {
        let path = format!("/individuals/business/details/{nino}/list");
        let result = self
            .execute(
                ctx,
                Method::GET,
                &path,
                &[],
                hmrc::BUSINESS_DETAILS_VERSION,
                None,
            )
            .await;

        match result {
            Ok(outcome) => {
                let response: BusinessListResponse = parse_body(&outcome)?;
                Ok(response
                    .list_of_businesses
                    .into_iter()
                    .map(Business::from)
                    .collect())
            }
            Err(MtdServiceError::Hmrc(HmrcError::ResourceNotFound { code, .. })) => {
                debug!(nino.suffix = %nino_suffix(nino), %code, "no businesses found, returning empty list");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Get the taxpayer's submission obligations, flattened across businesses.
    ///
    /// # Errors
    ///
    /// See [`MtdServiceError`].
    pub async fn get_obligations(
        &self,
        ctx: &RequestContext,
        nino: &str,
        filter: Option<&ObligationsFilter>,
    ) -> Result<Vec<Obligation>, MtdServiceError> {
        let path = format!("/obligations/details/{nino}/income-and-expenditure");
        let query = filter.map(ObligationsFilter::query_params).unwrap_or_default();
        let outcome = self
            .execute(
                ctx,
                Method::GET,
                &path,
                &query,
                hmrc::OBLIGATIONS_VERSION,
                None,
            )
            .await?;

        let response: ObligationsResponse = parse_body(&outcome)?;
        Ok(response.flatten())
    }

    /// Submit a cumulative quarterly period update.
    ///
    /// Resubmitting the same `(business_id, tax_year, period)` tuple replaces
    /// the cumulative figures upstream - the natural key is the URL. The
    /// upstream-issued correlation id is returned and written to the audit
    /// log for support trace-back.
    ///
    /// # Errors
    ///
    /// Local payload inconsistencies surface as a `Validation` error before
    /// any network call; everything else per [`MtdServiceError`].
    pub async fn submit_period(
        &self,
        ctx: &RequestContext,
        nino: &str,
        submission: &PeriodSubmission,
    ) -> Result<SubmissionReceipt, MtdServiceError> {
        if let Err(message) = submission.validate() {
            return Err(MtdServiceError::Hmrc(HmrcError::Validation {
                code: "INVALID_REQUEST".into(),
                message,
            }));
        }

        let path = format!(
            "/individuals/business/self-employment/{nino}/{}/cumulative/{}",
            submission.business_id, submission.tax_year
        );
        let body = serde_json::to_value(CumulativePeriodRequest::from(submission))
            .map_err(|e| HmrcError::Unknown {
                code: "SERIALIZATION".into(),
                message: e.to_string(),
                details: None,
            })?;

        let outcome = self
            .execute(
                ctx,
                Method::PUT,
                &path,
                &[],
                hmrc::SELF_EMPLOYMENT_VERSION,
                Some(&body),
            )
            .await?;

        let correlation_id = outcome.correlation_id.unwrap_or_else(|| {
            warn!(endpoint = %path, "HMRC accepted a submission without a correlation id");
            String::new()
        });

        Ok(SubmissionReceipt { correlation_id })
    }

    /// Retrieve a self-assessment calculation. Read-only, no idempotence
    /// concerns.
    ///
    /// # Errors
    ///
    /// See [`MtdServiceError`].
    pub async fn get_calculation(
        &self,
        ctx: &RequestContext,
        nino: &str,
        tax_year: &str,
        calculation_id: &str,
    ) -> Result<Calculation, MtdServiceError> {
        let path = format!(
            "/individuals/calculations/{nino}/self-assessment/{tax_year}/{calculation_id}"
        );
        let outcome = self
            .execute(
                ctx,
                Method::GET,
                &path,
                &[],
                hmrc::CALCULATIONS_VERSION,
                None,
            )
            .await?;

        parse_body(&outcome)
    }

    /// Run one logical call through the retry state machine.
    ///
    /// Strictly sequential per attempt: token, then headers reflecting that
    /// token, then the request. The audit entry is written exactly once,
    /// after the outcome settles.
    async fn execute(
        &self,
        ctx: &RequestContext,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        api_version: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiSuccess, MtdServiceError> {
        let started = Instant::now();
        let result = self
            .execute_inner(ctx, &method, path, query, api_version, body)
            .await;
        let duration_ms = started.elapsed().as_millis() as u64;

        // Logging happens after the call settles and never fails the caller.
        let entry = match &result {
            Ok(outcome) => ApiLogEntry {
                user_id: ctx.user_id,
                timestamp: Utc::now(),
                method: method.to_string(),
                endpoint: path.into(),
                request_body: body.map(serde_json::Value::to_string),
                response_status: outcome.status,
                response_body: Some(outcome.body.clone()),
                error_code: None,
                error_message: None,
                duration_ms,
                correlation_id: outcome.correlation_id.clone(),
            },
            Err(error) => ApiLogEntry {
                user_id: ctx.user_id,
                timestamp: Utc::now(),
                method: method.to_string(),
                endpoint: path.into(),
                request_body: body.map(serde_json::Value::to_string),
                response_status: error_status(error),
                response_body: None,
                error_code: Some(error_code(error)),
                error_message: Some(error.to_string()),
                duration_ms,
                correlation_id: None,
            },
        };
        self.logger.log_api_call(entry).await;

        result
    }

    async fn execute_inner(
        &self,
        ctx: &RequestContext,
        method: &Method,
        path: &str,
        query: &[(&str, String)],
        api_version: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiSuccess, MtdServiceError> {
        let mut token = self.oauth.ensure_fresh_token(ctx.user_id).await?;
        let mut refreshed_after_unauthorized = false;
        let mut attempt: u32 = 0;

        loop {
            // Headers are rebuilt per attempt so capture timestamps stay
            // honest and always reflect the token actually used.
            let fraud_headers = self
                .fraud
                .build(&ctx.client_headers, ctx.user_id, ctx.peer_ip)?;

            let url = format!("{}{path}", self.config.base_url);
            let mut request = self
                .http
                .request(method.clone(), &url)
                .query(query)
                .bearer_auth(&token.access_token)
                .header("accept", format!("application/vnd.hmrc.{api_version}+json"))
                .headers(fraud_headers.to_header_map());
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(transport) => {
                    let error = HmrcError::from_transport(&transport);
                    if self.should_retry(&error, &mut attempt).await {
                        continue;
                    }
                    return Err(error.into());
                }
            };

            let status = response.status();
            let correlation_id = response
                .headers()
                .get(hmrc::CORRELATION_ID_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let body_text = response.text().await.unwrap_or_default();

            if status.is_success() {
                return Ok(ApiSuccess {
                    status: status.as_u16(),
                    body: body_text,
                    correlation_id,
                });
            }

            let error = classify(status.as_u16(), &body_text);

            // An unauthorized response is never retried with the same token:
            // exactly one forced refresh, then the failure is terminal.
            if matches!(error, HmrcError::Unauthorized { .. })
                && status == StatusCode::UNAUTHORIZED
                && !refreshed_after_unauthorized
            {
                debug!(user.id = %ctx.user_id, "401 with current token, forcing one refresh");
                token = self.oauth.force_refresh(ctx.user_id).await?;
                refreshed_after_unauthorized = true;
                continue;
            }

            if self.should_retry(&error, &mut attempt).await {
                continue;
            }
            return Err(error.into());
        }
    }

    /// Decide whether to retry, sleeping the backoff when so.
    ///
    /// Backoff sleeps are task-local; one user's backoff never stalls
    /// another user's call.
    async fn should_retry(&self, error: &HmrcError, attempt: &mut u32) -> bool {
        if !error.is_retryable() {
            return false;
        }
        *attempt += 1;
        if *attempt >= self.retry.max_attempts {
            warn!(
                error.code = error.code(),
                max_attempts = self.retry.max_attempts,
                "retries exhausted"
            );
            return false;
        }

        let backoff_ms = self.retry.initial_backoff_ms * 2_u64.pow(*attempt - 1);
        debug!(
            error.code = error.code(),
            attempt = *attempt,
            backoff_ms,
            "retryable HMRC failure, backing off"
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        true
    }
}

fn parse_body<T: DeserializeOwned>(outcome: &ApiSuccess) -> Result<T, MtdServiceError> {
    serde_json::from_str(&outcome.body)
        .map_err(|e| {
            MtdServiceError::Hmrc(HmrcError::Unknown {
                code: "MALFORMED_RESPONSE".into(),
                message: e.to_string(),
                details: None,
            })
        })
}

/// HTTP status to record in the audit log for a failed call
fn error_status(error: &MtdServiceError) -> u16 {
    match error {
        MtdServiceError::Hmrc(HmrcError::Unauthorized { .. }) => 401,
        MtdServiceError::Hmrc(HmrcError::ResourceNotFound { .. }) => 404,
        MtdServiceError::Hmrc(HmrcError::Validation { .. }) => 400,
        MtdServiceError::Hmrc(HmrcError::RateLimited { .. }) => 429,
        MtdServiceError::Hmrc(HmrcError::UpstreamUnavailable { .. }) => 503,
        // Settled before (or without) an upstream response
        MtdServiceError::Hmrc(HmrcError::Unknown { .. })
        | MtdServiceError::Auth(_)
        | MtdServiceError::FraudHeaders(_) => 0,
    }
}

/// Error code to record in the audit log
fn error_code(error: &MtdServiceError) -> String {
    match error {
        MtdServiceError::Auth(_) => "SESSION_EXPIRED".into(),
        MtdServiceError::FraudHeaders(_) => "INCOMPLETE_FRAUD_HEADERS".into(),
        MtdServiceError::Hmrc(e) => e.code().into(),
    }
}

/// Last three characters of a NINO, for log lines that must not carry PII
fn nino_suffix(nino: &str) -> String {
    if nino.chars().count() <= 3 {
        "***".into()
    } else {
        let tail: String = nino.chars().rev().take(3).collect::<String>().chars().rev().collect();
        format!("***{tail}")
    }
}

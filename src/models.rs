// ABOUTME: Core domain models for tokens, businesses, obligations, submissions, and audit entries
// ABOUTME: Shared across the store, OAuth, HMRC client, and route layers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! Core data structures shared across the gateway.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted OAuth token record - exactly one active record per user.
///
/// `expires_at` is always an absolute instant so refresh decisions are
/// stateless comparisons, never duration arithmetic against a stored offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtdTokenRecord {
    pub user_id: Uuid,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MtdTokenRecord {
    /// True when the token is within `skew_secs` of expiry at instant `now`.
    #[must_use]
    pub fn expires_within_at(&self, skew_secs: i64, now: DateTime<Utc>) -> bool {
        now >= self.expires_at - chrono::Duration::seconds(skew_secs)
    }

    /// True when the token is within `skew_secs` of expiry right now.
    #[must_use]
    pub fn expires_within(&self, skew_secs: i64) -> bool {
        self.expires_within_at(skew_secs, Utc::now())
    }
}

/// A business registered with HMRC for the authenticated taxpayer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Business {
    pub business_id: String,
    pub type_of_business: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trading_name: Option<String>,
}

/// A single submission obligation, flattened from HMRC's per-business grouping
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Obligation {
    pub business_id: String,
    pub type_of_business: String,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub due_date: NaiveDate,
    pub status: ObligationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub received_date: Option<NaiveDate>,
}

/// Obligation fulfilment status as reported by HMRC
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ObligationStatus {
    Open,
    Fulfilled,
}

/// Income figures for a quarterly period update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodIncome {
    pub turnover: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<f64>,
}

/// Expense figures for a quarterly period update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodExpenses {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_of_goods: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staff_costs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub travel_costs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub premises_running_costs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_costs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other: Option<f64>,
}

/// The business payload for one quarterly update.
///
/// `(business_id, tax_year, period_from, period_to)` identifies the logical
/// period; submitting the same tuple again is a cumulative update of that
/// period, not a new record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodSubmission {
    pub business_id: String,
    /// Tax year in HMRC notation, e.g. `2025-26`
    pub tax_year: String,
    pub period_from: NaiveDate,
    pub period_to: NaiveDate,
    pub incomes: PeriodIncome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expenses: Option<PeriodExpenses>,
}

impl PeriodSubmission {
    /// Validate internal consistency before any network call is made.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        if self.business_id.is_empty() {
            return Err("businessId must not be empty".into());
        }
        if self.period_from > self.period_to {
            return Err("periodFrom must not be after periodTo".into());
        }
        Ok(())
    }
}

/// Receipt for an accepted period submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionReceipt {
    /// Upstream-issued correlation id tying this submission to HMRC's record
    pub correlation_id: String,
}

/// A self-assessment tax calculation retrieved from HMRC
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculation {
    pub calculation_id: String,
    pub tax_year: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_income: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_tax_due: Option<f64>,
    /// Fields outside the known schema, carried opaquely for callers
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Immutable audit record of one outbound HMRC call
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiLogEntry {
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub endpoint: String,
    /// Sanitized before persistence - never stores secrets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_body: Option<String>,
    pub response_status: u16,
    /// Sanitized before persistence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

/// Outcome filter for audit log queries
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    /// HTTP 2xx entries only
    Success,
    /// HTTP >= 400 or entries carrying an error code
    Error,
    #[default]
    All,
}

/// Filter for audit log retrieval; results are always newest-first
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiLogFilter {
    pub user_id: Option<Uuid>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
}

/// Aggregated error statistics over a trailing window
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorSummary {
    pub total_errors: u64,
    /// Buckets keyed by explicit error code, or `HTTP_<status>` when absent
    pub errors_by_code: std::collections::HashMap<String, u64>,
    pub recent_errors: Vec<ApiLogEntry>,
}

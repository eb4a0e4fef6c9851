// ABOUTME: API call audit logger with filtered retrieval, error summaries, and retention pruning
// ABOUTME: Logging failures never propagate into the caller's request path
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # API Audit Logger
//!
//! Durable record of every outbound HMRC call: method, endpoint, sanitized
//! bodies, status, duration, and the upstream correlation id. The log is
//! append-only; the only mutation path is the explicit retention prune.
//!
//! `log_api_call` is fire-and-forget from the caller's perspective - a
//! failing log store must never abort the primary operation - but the write
//! itself is awaited so an entry is either fully persisted or not at all.

pub mod sanitize;

use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::constants::limits;
use crate::models::{ApiLogEntry, ApiLogFilter, ErrorSummary, StatusFilter};
use crate::store::ApiLogStore;

/// Audit logger over an [`ApiLogStore`]
pub struct ApiLogger {
    store: Arc<dyn ApiLogStore>,
}

impl ApiLogger {
    #[must_use]
    pub fn new(store: Arc<dyn ApiLogStore>) -> Self {
        Self { store }
    }

    /// Record one settled outbound call.
    ///
    /// Bodies are sanitized before persistence. Store failures are reported
    /// through `tracing` and swallowed - audit logging must never fail the
    /// operation it documents.
    pub async fn log_api_call(&self, mut entry: ApiLogEntry) {
        entry.request_body = entry
            .request_body
            .as_deref()
            .map(sanitize::sanitize_body);
        entry.response_body = entry
            .response_body
            .as_deref()
            .map(sanitize::sanitize_body);
        entry.error_message = entry
            .error_message
            .as_deref()
            .map(sanitize::redact_text);

        if let Err(e) = self.store.insert(&entry).await {
            error!(
                user.id = %entry.user_id,
                endpoint = %entry.endpoint,
                error = %e,
                "failed to persist api log entry"
            );
        }
    }

    /// Retrieve log entries matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn get_api_logs(&self, filter: &ApiLogFilter) -> anyhow::Result<Vec<ApiLogEntry>> {
        self.store.query(filter).await
    }

    /// Aggregate error statistics for a user over a trailing window of days.
    ///
    /// Buckets are keyed by the entry's explicit error code, falling back to
    /// `HTTP_<status>` when no code was recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub async fn get_error_summary(&self, user_id: Uuid, days: i64) -> anyhow::Result<ErrorSummary> {
        let filter = ApiLogFilter {
            user_id: Some(user_id),
            endpoint: None,
            status: StatusFilter::Error,
            start_date: Some(Utc::now() - Duration::days(days)),
            end_date: None,
            limit: Some(limits::MAX_LOG_QUERY_LIMIT),
        };
        let errors = self.store.query(&filter).await?;

        let mut errors_by_code: HashMap<String, u64> = HashMap::new();
        for entry in &errors {
            let code = entry
                .error_code
                .clone()
                .unwrap_or_else(|| format!("HTTP_{}", entry.response_status));
            *errors_by_code.entry(code).or_insert(0) += 1;
        }

        Ok(ErrorSummary {
            total_errors: errors.len() as u64,
            errors_by_code,
            recent_errors: errors
                .into_iter()
                .take(limits::ERROR_SUMMARY_RECENT)
                .collect(),
        })
    }

    /// Delete entries strictly older than `days_to_keep` days.
    ///
    /// Entries exactly at the boundary are retained.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn clear_old_logs(&self, days_to_keep: i64) -> anyhow::Result<u64> {
        let cutoff = Utc::now() - Duration::days(days_to_keep);
        let deleted = self.store.delete_older_than(cutoff).await?;
        if deleted > 0 {
            tracing::info!(deleted, days_to_keep, "pruned api audit log");
        }
        Ok(deleted)
    }
}

// ABOUTME: Persistence abstraction for token records and API audit logs
// ABOUTME: Async traits keep the backend swappable; SQLite is the shipped implementation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! Persistence layer.
//!
//! The gateway consumes persistence through two narrow traits so the host
//! application can supply its own backing store. Implementations must be
//! safe for concurrent use across independent users; no cross-user locking
//! is required or expected.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{ApiLogEntry, ApiLogFilter, MtdTokenRecord};

pub mod sqlite;

pub use sqlite::SqliteStore;

/// Persists OAuth token records, keyed uniquely by user id.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Get the active token record for a user, if any
    async fn get_token(&self, user_id: Uuid) -> Result<Option<MtdTokenRecord>>;

    /// Insert or replace the token record for `record.user_id`
    async fn upsert_token(&self, record: &MtdTokenRecord) -> Result<()>;

    /// Remove the token record for a user (disconnect)
    async fn delete_token(&self, user_id: Uuid) -> Result<()>;
}

/// Append-only store for API audit log entries.
#[async_trait]
pub trait ApiLogStore: Send + Sync {
    /// Append one entry
    async fn insert(&self, entry: &ApiLogEntry) -> Result<()>;

    /// Retrieve entries matching `filter`, newest first
    async fn query(&self, filter: &ApiLogFilter) -> Result<Vec<ApiLogEntry>>;

    /// Delete entries strictly older than `cutoff`; returns the deleted count
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

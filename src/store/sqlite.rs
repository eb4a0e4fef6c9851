// ABOUTME: SQLite implementation of the token and audit log stores
// ABOUTME: Runtime sqlx queries with an explicit migrate step; in-memory databases supported for tests
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! SQLite persistence backend.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use super::{ApiLogStore, TokenStore};
use crate::constants::limits;
use crate::models::{ApiLogEntry, ApiLogFilter, MtdTokenRecord, StatusFilter};

/// SQLite-backed store implementing both persistence traits
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `database_url`.
    ///
    /// In-memory databases get a single-connection pool so every query sees
    /// the same database instance.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is malformed or the database cannot be opened.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database URL: {database_url}"))?
            .create_if_missing(true);

        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("failed to open SQLite database")?;

        Ok(Self { pool })
    }

    /// Create the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if any DDL statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS mtd_tokens (
                user_id TEXT PRIMARY KEY,
                access_token TEXT NOT NULL,
                refresh_token TEXT NOT NULL,
                token_type TEXT NOT NULL,
                scope TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS api_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                method TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                request_body TEXT,
                response_status INTEGER NOT NULL,
                response_body TEXT,
                error_code TEXT,
                error_message TEXT,
                duration_ms INTEGER NOT NULL,
                correlation_id TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_api_logs_user_time
             ON api_logs (user_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn token_from_row(row: &SqliteRow) -> Result<MtdTokenRecord> {
    let user_id: String = row.try_get("user_id")?;
    Ok(MtdTokenRecord {
        user_id: Uuid::parse_str(&user_id).context("corrupt user_id in mtd_tokens")?,
        access_token: row.try_get("access_token")?,
        refresh_token: row.try_get("refresh_token")?,
        token_type: row.try_get("token_type")?,
        scope: row.try_get("scope")?,
        expires_at: row.try_get("expires_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn log_entry_from_row(row: &SqliteRow) -> Result<ApiLogEntry> {
    let user_id: String = row.try_get("user_id")?;
    let response_status: i64 = row.try_get("response_status")?;
    let duration_ms: i64 = row.try_get("duration_ms")?;
    Ok(ApiLogEntry {
        user_id: Uuid::parse_str(&user_id).context("corrupt user_id in api_logs")?,
        timestamp: row.try_get("timestamp")?,
        method: row.try_get("method")?,
        endpoint: row.try_get("endpoint")?,
        request_body: row.try_get("request_body")?,
        response_status: u16::try_from(response_status).unwrap_or(0),
        response_body: row.try_get("response_body")?,
        error_code: row.try_get("error_code")?,
        error_message: row.try_get("error_message")?,
        duration_ms: u64::try_from(duration_ms).unwrap_or(0),
        correlation_id: row.try_get("correlation_id")?,
    })
}

#[async_trait]
impl TokenStore for SqliteStore {
    async fn get_token(&self, user_id: Uuid) -> Result<Option<MtdTokenRecord>> {
        let row = sqlx::query("SELECT * FROM mtd_tokens WHERE user_id = ?")
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(token_from_row).transpose()
    }

    async fn upsert_token(&self, record: &MtdTokenRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO mtd_tokens
                (user_id, access_token, refresh_token, token_type, scope,
                 expires_at, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (user_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                scope = excluded.scope,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at",
        )
        .bind(record.user_id.to_string())
        .bind(&record.access_token)
        .bind(&record.refresh_token)
        .bind(&record.token_type)
        .bind(&record.scope)
        .bind(record.expires_at)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_token(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM mtd_tokens WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ApiLogStore for SqliteStore {
    async fn insert(&self, entry: &ApiLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO api_logs
                (user_id, timestamp, method, endpoint, request_body,
                 response_status, response_body, error_code, error_message,
                 duration_ms, correlation_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(entry.user_id.to_string())
        .bind(entry.timestamp)
        .bind(&entry.method)
        .bind(&entry.endpoint)
        .bind(&entry.request_body)
        .bind(i64::from(entry.response_status))
        .bind(&entry.response_body)
        .bind(&entry.error_code)
        .bind(&entry.error_message)
        .bind(i64::try_from(entry.duration_ms).unwrap_or(i64::MAX))
        .bind(&entry.correlation_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(&self, filter: &ApiLogFilter) -> Result<Vec<ApiLogEntry>> {
        let mut builder: QueryBuilder<sqlx::Sqlite> =
            QueryBuilder::new("SELECT * FROM api_logs WHERE 1 = 1");

        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ");
            builder.push_bind(user_id.to_string());
        }
        if let Some(endpoint) = &filter.endpoint {
            builder.push(" AND endpoint = ");
            builder.push_bind(endpoint.clone());
        }
        match filter.status {
            StatusFilter::Success => {
                builder.push(" AND response_status BETWEEN 200 AND 299 AND error_code IS NULL");
            }
            StatusFilter::Error => {
                builder.push(" AND (response_status >= 400 OR error_code IS NOT NULL)");
            }
            StatusFilter::All => {}
        }
        if let Some(start) = filter.start_date {
            builder.push(" AND timestamp >= ");
            builder.push_bind(start);
        }
        if let Some(end) = filter.end_date {
            builder.push(" AND timestamp <= ");
            builder.push_bind(end);
        }

        let limit = filter
            .limit
            .unwrap_or(limits::DEFAULT_LOG_QUERY_LIMIT)
            .min(limits::MAX_LOG_QUERY_LIMIT);
        builder.push(" ORDER BY timestamp DESC, id DESC LIMIT ");
        builder.push_bind(i64::from(limit));

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(log_entry_from_row).collect()
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM api_logs WHERE timestamp < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

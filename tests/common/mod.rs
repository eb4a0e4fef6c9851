// ABOUTME: Shared test fixtures - in-memory stores, config builders, and token factories
// ABOUTME: Used across the integration test suite
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

#![allow(dead_code)]

use chrono::{Duration, Utc};
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use uuid::Uuid;

use mtd_gateway::audit::ApiLogger;
use mtd_gateway::config::HmrcConfig;
use mtd_gateway::hmrc::{MtdApiService, RequestContext, RetryConfig};
use mtd_gateway::models::MtdTokenRecord;
use mtd_gateway::oauth::{HmrcOAuthClient, OAuthManager};
use mtd_gateway::store::SqliteStore;

/// Fresh in-memory store with the schema applied
pub async fn memory_store() -> Arc<SqliteStore> {
    let store = SqliteStore::connect("sqlite::memory:")
        .await
        .expect("in-memory sqlite");
    store.migrate().await.expect("migrate");
    Arc::new(store)
}

/// HMRC config pointed at a mock server base URL
pub fn hmrc_config(base_url: &str) -> HmrcConfig {
    HmrcConfig {
        client_id: "test-client-id".into(),
        client_secret: "test-client-secret".into(),
        redirect_uri: "https://app.example.com/oauth/hmrc/callback".into(),
        base_url: base_url.trim_end_matches('/').into(),
        request_timeout: std::time::Duration::from_secs(5),
        connect_timeout: std::time::Duration::from_secs(2),
    }
}

/// Token record expiring `expires_in_secs` from now
pub fn token_record(user_id: Uuid, access_token: &str, expires_in_secs: i64) -> MtdTokenRecord {
    let now = Utc::now();
    MtdTokenRecord {
        user_id,
        access_token: access_token.into(),
        refresh_token: "refresh-token-1".into(),
        token_type: "bearer".into(),
        scope: "read:self-assessment write:self-assessment".into(),
        expires_at: now + Duration::seconds(expires_in_secs),
        created_at: now,
        updated_at: now,
    }
}

/// OAuth manager over the given store, talking to `base_url`
pub fn oauth_manager(store: Arc<SqliteStore>, base_url: &str) -> Arc<OAuthManager> {
    let client = HmrcOAuthClient::new(hmrc_config(base_url), reqwest::Client::new());
    Arc::new(OAuthManager::new(store, client))
}

/// Fully wired API service with fast test backoff
pub fn api_service(
    store: Arc<SqliteStore>,
    oauth: Arc<OAuthManager>,
    base_url: &str,
) -> MtdApiService {
    let logger = Arc::new(ApiLogger::new(store));
    MtdApiService::new(
        hmrc_config(base_url),
        reqwest::Client::new(),
        oauth,
        logger,
        fast_retry(),
    )
}

/// Retry config with millisecond backoff so tests stay fast
pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff_ms: 10,
    }
}

/// Request context with a server-observed peer IP and no forwarded evidence
pub fn request_ctx(user_id: Uuid) -> RequestContext {
    RequestContext::server_side(user_id, Some(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 9))))
}

/// JSON body of a successful token-endpoint response
pub fn token_endpoint_body(access_token: &str, refresh_token: &str) -> serde_json::Value {
    serde_json::json!({
        "access_token": access_token,
        "refresh_token": refresh_token,
        "token_type": "bearer",
        "expires_in": 14400,
        "scope": "read:self-assessment write:self-assessment"
    })
}

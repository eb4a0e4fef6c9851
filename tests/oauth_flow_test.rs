// ABOUTME: Integration tests for the OAuth authorization flow
// ABOUTME: Covers URL construction, state round-trip, fail-closed CSRF behavior, and exchange errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use url::Url;
use uuid::Uuid;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mtd_gateway::oauth::OAuthError;
use mtd_gateway::store::TokenStore;

#[tokio::test]
async fn test_authorization_url_construction() {
    let store = common::memory_store().await;
    let manager = common::oauth_manager(store, "https://test-api.service.hmrc.gov.uk");
    let user_id = Uuid::new_v4();

    let response = manager.begin_authorization(user_id).await.unwrap();

    let url = Url::parse(&response.authorization_url).unwrap();
    assert_eq!(url.path(), "/oauth/authorize");

    let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
    assert_eq!(params.get("client_id").unwrap(), "test-client-id");
    assert_eq!(params.get("response_type").unwrap(), "code");
    assert_eq!(
        params.get("scope").unwrap(),
        "read:self-assessment write:self-assessment"
    );
    assert_eq!(params.get("state").unwrap(), &response.state);

    // Opaque random state with enough entropy
    assert!(response.state.len() >= 32);
    assert_eq!(response.expires_in_minutes, 10);
}

#[tokio::test]
async fn test_states_are_unique_per_flow() {
    let store = common::memory_store().await;
    let manager = common::oauth_manager(store, "https://test-api.service.hmrc.gov.uk");
    let user_id = Uuid::new_v4();

    let first = manager.begin_authorization(user_id).await.unwrap();
    let second = manager.begin_authorization(user_id).await.unwrap();
    assert_ne!(first.state, second.state);
}

#[tokio::test]
async fn test_callback_round_trip_persists_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::token_endpoint_body("access-1", "refresh-1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = common::memory_store().await;
    let manager = common::oauth_manager(store.clone(), &server.uri());
    let user_id = Uuid::new_v4();

    let auth = manager.begin_authorization(user_id).await.unwrap();
    let callback = manager
        .handle_callback("auth-code-1", &auth.state)
        .await
        .unwrap();

    assert_eq!(callback.user_id, user_id);

    let record = store.get_token(user_id).await.unwrap().unwrap();
    assert_eq!(record.access_token, "access-1");
    assert_eq!(record.refresh_token, "refresh-1");
    assert!(record.expires_at > chrono::Utc::now());
}

#[tokio::test]
async fn test_state_is_single_use() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::token_endpoint_body("access-1", "refresh-1")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = common::memory_store().await;
    let manager = common::oauth_manager(store, &server.uri());
    let user_id = Uuid::new_v4();

    let auth = manager.begin_authorization(user_id).await.unwrap();
    manager
        .handle_callback("auth-code-1", &auth.state)
        .await
        .unwrap();

    // Replaying the same state must fail closed with no second exchange
    let replay = manager.handle_callback("auth-code-2", &auth.state).await;
    assert!(matches!(replay, Err(OAuthError::InvalidState)));
    assert_eq!(manager.pending_states().await, 0);
}

#[tokio::test]
async fn test_mismatched_state_fails_closed_without_exchange() {
    let server = MockServer::start().await;
    // The token endpoint must never be called on a state mismatch
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = common::memory_store().await;
    let manager = common::oauth_manager(store.clone(), &server.uri());
    let user_id = Uuid::new_v4();

    let _auth = manager.begin_authorization(user_id).await.unwrap();
    let result = manager
        .handle_callback("auth-code-1", "forged-state-value")
        .await;

    assert!(matches!(result, Err(OAuthError::InvalidState)));
    assert!(store.get_token(user_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_exchange_failure_carries_upstream_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_request",
            "error_description": "authorization code expired"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = common::memory_store().await;
    let manager = common::oauth_manager(store.clone(), &server.uri());
    let user_id = Uuid::new_v4();

    let auth = manager.begin_authorization(user_id).await.unwrap();
    let result = manager.handle_callback("expired-code", &auth.state).await;

    match result {
        Err(OAuthError::ExchangeFailed { code, description }) => {
            assert_eq!(code, "invalid_request");
            assert!(description.contains("expired"));
        }
        other => panic!("expected ExchangeFailed, got {other:?}"),
    }
    assert!(store.get_token(user_id).await.unwrap().is_none());
}

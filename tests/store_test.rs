// ABOUTME: Integration tests for the SQLite store - token CRUD, upsert semantics, file persistence
// ABOUTME: Runs against in-memory databases, plus a tempfile-backed reopen test
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::{Duration, Utc};
use uuid::Uuid;

use mtd_gateway::store::{SqliteStore, TokenStore};

#[tokio::test]
async fn test_get_token_returns_none_for_unknown_user() {
    let store = common::memory_store().await;
    assert!(store.get_token(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_token_round_trip_preserves_fields() {
    let store = common::memory_store().await;
    let user_id = Uuid::new_v4();
    let record = common::token_record(user_id, "access-1", 3600);

    store.upsert_token(&record).await.unwrap();
    let loaded = store.get_token(user_id).await.unwrap().unwrap();

    assert_eq!(loaded.user_id, user_id);
    assert_eq!(loaded.access_token, "access-1");
    assert_eq!(loaded.refresh_token, record.refresh_token);
    assert_eq!(loaded.token_type, "bearer");
    assert_eq!(loaded.scope, record.scope);
    // Absolute instants survive the round trip to second precision or better
    assert!((loaded.expires_at - record.expires_at).num_milliseconds().abs() < 1000);
}

#[tokio::test]
async fn test_upsert_replaces_existing_record() {
    let store = common::memory_store().await;
    let user_id = Uuid::new_v4();

    let original = common::token_record(user_id, "access-old", 60);
    store.upsert_token(&original).await.unwrap();

    let mut replacement = common::token_record(user_id, "access-new", 14400);
    replacement.refresh_token = "refresh-new".into();
    replacement.created_at = original.created_at;
    store.upsert_token(&replacement).await.unwrap();

    // Exactly one active record per user - the new tokens replaced the old
    let loaded = store.get_token(user_id).await.unwrap().unwrap();
    assert_eq!(loaded.access_token, "access-new");
    assert_eq!(loaded.refresh_token, "refresh-new");
    assert!(loaded.expires_at > Utc::now() + Duration::seconds(10_000));
}

#[tokio::test]
async fn test_tokens_isolated_per_user() {
    let store = common::memory_store().await;
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    store
        .upsert_token(&common::token_record(alice, "alice-access", 3600))
        .await
        .unwrap();
    store
        .upsert_token(&common::token_record(bob, "bob-access", 3600))
        .await
        .unwrap();

    store.delete_token(alice).await.unwrap();

    assert!(store.get_token(alice).await.unwrap().is_none());
    assert_eq!(
        store.get_token(bob).await.unwrap().unwrap().access_token,
        "bob-access"
    );
}

#[tokio::test]
async fn test_delete_is_idempotent() {
    let store = common::memory_store().await;
    let user_id = Uuid::new_v4();
    // Deleting a non-existent record is not an error
    store.delete_token(user_id).await.unwrap();
}

#[tokio::test]
async fn test_file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("gateway.db");
    let url = format!("sqlite:{}", db_path.display());
    let user_id = Uuid::new_v4();

    {
        let store = SqliteStore::connect(&url).await.unwrap();
        store.migrate().await.unwrap();
        store
            .upsert_token(&common::token_record(user_id, "durable-access", 3600))
            .await
            .unwrap();
    }

    let reopened = SqliteStore::connect(&url).await.unwrap();
    reopened.migrate().await.unwrap();
    let loaded = reopened.get_token(user_id).await.unwrap().unwrap();
    assert_eq!(loaded.access_token, "durable-access");
}

// ABOUTME: Central OAuth manager for the HMRC connection lifecycle
// ABOUTME: CSRF state storage, callback handling, disconnect, and single-flight token refresh
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # OAuth Manager
//!
//! Owns the complete flow from authorization to token refresh. The refresh
//! coordinator guarantees every outbound API call uses a non-expired access
//! token without the caller thinking about expiry, and collapses concurrent
//! refresh attempts for the same user into one upstream call - HMRC rotates
//! refresh tokens, so a duplicate refresh with an already-used token would
//! be rejected and kill the session.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use super::{AuthorizationResponse, CallbackResponse, HmrcOAuthClient, OAuthError};
use crate::constants::oauth;
use crate::models::MtdTokenRecord;
use crate::store::TokenStore;

/// Authorization state data for CSRF protection
#[derive(Debug, Clone)]
struct StateData {
    user_id: Uuid,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

/// Central OAuth manager
pub struct OAuthManager {
    store: Arc<dyn TokenStore>,
    client: HmrcOAuthClient,
    state_storage: RwLock<HashMap<String, StateData>>,
    refresh_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl OAuthManager {
    /// Create a new OAuth manager
    #[must_use]
    pub fn new(store: Arc<dyn TokenStore>, client: HmrcOAuthClient) -> Self {
        Self {
            store,
            client,
            state_storage: RwLock::new(HashMap::new()),
            refresh_locks: DashMap::new(),
        }
    }

    /// Begin the authorization flow for a user.
    ///
    /// Generates and stores a single-use state nonce (10 minute TTL) and
    /// returns the HMRC redirect URL carrying it.
    ///
    /// # Errors
    ///
    /// Returns an error if the authorization endpoint URL is malformed.
    pub async fn begin_authorization(
        &self,
        user_id: Uuid,
    ) -> Result<AuthorizationResponse, OAuthError> {
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect();

        self.store_state(&state, user_id).await;

        let authorization_url = self.client.authorization_url(&state, oauth::SCOPES)?;

        info!(user.id = %user_id, "generated HMRC authorization URL");
        Ok(AuthorizationResponse {
            authorization_url,
            state,
            expires_in_minutes: oauth::STATE_TTL_MINUTES,
        })
    }

    /// Handle the OAuth callback: validate state, exchange the code, persist.
    ///
    /// The state must exactly match a stored, unexpired nonce; it is consumed
    /// on first use so a replayed callback fails closed with no token
    /// exchange attempted.
    ///
    /// # Errors
    ///
    /// Returns [`OAuthError::InvalidState`] on mismatch/expiry/replay, or the
    /// exchange error otherwise.
    pub async fn handle_callback(
        &self,
        code: &str,
        state: &str,
    ) -> Result<CallbackResponse, OAuthError> {
        let state_data = self.validate_and_consume_state(state).await?;

        let grant = self.client.exchange_code(code).await?;
        let record = grant.into_record(state_data.user_id);

        self.store
            .upsert_token(&record)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;

        info!(user.id = %record.user_id, "HMRC connection established");
        Ok(CallbackResponse {
            user_id: record.user_id,
            expires_at: record.expires_at,
            scope: record.scope,
            message: "HMRC connected successfully".into(),
        })
    }

    /// Disconnect the user's HMRC connection, removing the stored tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails.
    pub async fn disconnect(&self, user_id: Uuid) -> Result<(), OAuthError> {
        self.store
            .delete_token(user_id)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;
        self.refresh_locks.remove(&user_id);

        info!(user.id = %user_id, "HMRC connection removed");
        Ok(())
    }

    /// Get the stored token record without refreshing, for status display.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails.
    pub async fn connection(&self, user_id: Uuid) -> Result<Option<MtdTokenRecord>, OAuthError> {
        self.store
            .get_token(user_id)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))
    }

    /// True when the record needs a proactive refresh: `now >= expires_at - skew`.
    #[must_use]
    pub fn needs_refresh(record: &MtdTokenRecord) -> bool {
        record.expires_within(oauth::REFRESH_SKEW_SECS)
    }

    /// Return a token record guaranteed fresh for at least the skew window.
    ///
    /// No stored token short-circuits to [`OAuthError::SessionExpired`] with
    /// no network call. A stale token triggers a refresh under a per-user
    /// lock: concurrent callers for the same user wait for the in-flight
    /// refresh and then re-read the persisted result rather than issuing a
    /// second upstream call.
    ///
    /// # Errors
    ///
    /// [`OAuthError::SessionExpired`] when there is nothing to refresh or
    /// HMRC rejected the refresh token; transport failures propagate as
    /// [`OAuthError::Network`] so callers can distinguish the two.
    pub async fn ensure_fresh_token(&self, user_id: Uuid) -> Result<MtdTokenRecord, OAuthError> {
        let record = self
            .connection(user_id)
            .await?
            .ok_or(OAuthError::SessionExpired)?;

        if !Self::needs_refresh(&record) {
            return Ok(record);
        }

        let lock = self
            .refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring the lock: a concurrent caller may have
        // already refreshed and persisted while we waited.
        let record = self
            .connection(user_id)
            .await?
            .ok_or(OAuthError::SessionExpired)?;
        if !Self::needs_refresh(&record) {
            return Ok(record);
        }

        self.refresh_and_persist(record).await
    }

    /// Refresh unconditionally, for callers that just saw a 401 despite a
    /// token that looked fresh. One attempt under the same per-user lock;
    /// a second failure is the caller's signal to surface session expiry.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::ensure_fresh_token`].
    pub async fn force_refresh(&self, user_id: Uuid) -> Result<MtdTokenRecord, OAuthError> {
        let lock = self
            .refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let record = self
            .connection(user_id)
            .await?
            .ok_or(OAuthError::SessionExpired)?;

        self.refresh_and_persist(record).await
    }

    /// Refresh the given record and persist the result. Callers must hold
    /// the user's refresh lock.
    async fn refresh_and_persist(
        &self,
        record: MtdTokenRecord,
    ) -> Result<MtdTokenRecord, OAuthError> {
        let user_id = record.user_id;
        info!(user.id = %user_id, expires_at = %record.expires_at, "refreshing HMRC access token");

        let grant = match self.client.refresh_token(&record.refresh_token).await {
            Ok(grant) => grant,
            Err(OAuthError::RefreshInvalid) => {
                warn!(user.id = %user_id, "refresh token rejected, re-authorization required");
                return Err(OAuthError::SessionExpired);
            }
            Err(e) => return Err(e),
        };

        let refreshed = MtdTokenRecord {
            user_id,
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            token_type: grant.token_type,
            // HMRC may omit scope on refresh; the granted scope is unchanged
            scope: if grant.scope.is_empty() {
                record.scope
            } else {
                grant.scope
            },
            expires_at: grant.expires_at,
            created_at: record.created_at,
            updated_at: Utc::now(),
        };

        self.store
            .upsert_token(&refreshed)
            .await
            .map_err(|e| OAuthError::Storage(e.to_string()))?;

        Ok(refreshed)
    }

    /// Store authorization state with TTL, pruning expired entries
    async fn store_state(&self, state: &str, user_id: Uuid) {
        let now = Utc::now();
        let state_data = StateData {
            user_id,
            created_at: now,
            expires_at: now + chrono::Duration::minutes(oauth::STATE_TTL_MINUTES),
        };

        let mut storage = self.state_storage.write().await;
        storage.insert(state.into(), state_data);
        storage.retain(|_, data| data.expires_at > now);
    }

    /// Validate and consume authorization state - single use
    async fn validate_and_consume_state(&self, state: &str) -> Result<StateData, OAuthError> {
        let mut storage = self.state_storage.write().await;

        let state_data = storage.remove(state).ok_or(OAuthError::InvalidState)?;

        let now = Utc::now();
        if state_data.expires_at < now {
            let age = now - state_data.created_at;
            warn!(state.age_secs = age.num_seconds(), "authorization state expired, rejecting callback");
            return Err(OAuthError::InvalidState);
        }

        Ok(state_data)
    }

    /// Number of pending (unconsumed) authorization states, for tests and metrics
    pub async fn pending_states(&self) -> usize {
        self.state_storage.read().await.len()
    }
}

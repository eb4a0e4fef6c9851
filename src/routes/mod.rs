// ABOUTME: HTTP route assembly and shared application state for the gateway
// ABOUTME: Thin axum handlers delegating to the OAuth manager, API service, and audit logger
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # HTTP Routes
//!
//! The route layer is deliberately thin: handlers parse input, call into
//! the core, and translate domain errors into `{message, code}` JSON with
//! the right status. User authentication is the host application's concern;
//! handlers receive the user id the host resolved.

pub mod mtd;
pub mod oauth;

use axum::routing::{delete, get, put};
use axum::{Json, Router};
use std::sync::Arc;

use crate::audit::ApiLogger;
use crate::hmrc::MtdApiService;
use crate::oauth::OAuthManager;

/// Shared state injected into every handler - the dependency graph is
/// assembled once at startup and passed down, never reached for via
/// ambient imports.
#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<OAuthManager>,
    pub service: Arc<MtdApiService>,
    pub logger: Arc<ApiLogger>,
    /// Mark the CSRF cookie `Secure` (true outside development)
    pub secure_cookies: bool,
}

/// Assemble the full router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/oauth/hmrc/connect/:user_id", get(oauth::connect))
        .route("/oauth/hmrc/callback", get(oauth::callback))
        .route("/oauth/hmrc/status/:user_id", get(oauth::status))
        .route("/oauth/hmrc/:user_id", delete(oauth::disconnect))
        .route("/api/mtd/businesses", get(mtd::list_businesses))
        .route("/api/mtd/obligations", get(mtd::get_obligations))
        .route("/api/mtd/periods", put(mtd::submit_period))
        .route(
            "/api/mtd/calculations/:tax_year/:calculation_id",
            get(mtd::get_calculation),
        )
        .route("/api/mtd/logs", get(mtd::get_logs).delete(mtd::prune_logs))
        .route("/api/mtd/logs/summary", get(mtd::error_summary))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

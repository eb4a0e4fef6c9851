// ABOUTME: Server binary wiring configuration, stores, OAuth, and routes into a running gateway
// ABOUTME: The dependency graph is assembled once here and passed down - no ambient globals
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use mtd_gateway::audit::ApiLogger;
use mtd_gateway::config::ServerConfig;
use mtd_gateway::hmrc::{MtdApiService, RetryConfig};
use mtd_gateway::http_client;
use mtd_gateway::logging;
use mtd_gateway::oauth::{HmrcOAuthClient, OAuthManager};
use mtd_gateway::routes::{self, AppState};
use mtd_gateway::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_from_env()?;

    let config = ServerConfig::from_env().context("failed to load configuration")?;
    info!(
        environment = %config.environment,
        hmrc.base_url = %config.hmrc.base_url,
        "configuration loaded"
    );

    http_client::initialize_shared_client(
        config.hmrc.request_timeout,
        config.hmrc.connect_timeout,
    );
    let http = http_client::shared_client().clone();

    let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
    store.migrate().await.context("database migration failed")?;

    let oauth_client = HmrcOAuthClient::new(config.hmrc.clone(), http.clone());
    let oauth = Arc::new(OAuthManager::new(store.clone(), oauth_client));
    let logger = Arc::new(ApiLogger::new(store.clone()));
    let service = Arc::new(MtdApiService::new(
        config.hmrc.clone(),
        http,
        oauth.clone(),
        logger.clone(),
        RetryConfig::default(),
    ));

    let state = AppState {
        oauth,
        service,
        logger,
        secure_cookies: config.environment.is_production(),
    };

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(60)))
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    info!(%addr, "mtd-gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

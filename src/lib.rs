// ABOUTME: Main library entry point for the HMRC Making Tax Digital gateway
// ABOUTME: OAuth2 token lifecycle, fraud prevention headers, audit logging, and typed MTD operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

#![deny(unsafe_code)]

//! # MTD Gateway
//!
//! An OAuth2-backed client for HMRC's Making Tax Digital APIs with the
//! compliance plumbing government tax infrastructure mandates:
//!
//! - **Token lifecycle**: authorization-code flow with CSRF state
//!   protection, absolute-expiry storage, and proactive single-flight
//!   refresh before every call
//! - **Fraud prevention headers**: the versioned `Gov-Client-*` /
//!   `Gov-Vendor-*` evidence set, validated complete before a call is issued
//! - **Typed operations**: list businesses, obligations, cumulative
//!   quarterly period submission with correlation-id trace-back, and
//!   calculation retrieval - with bounded exponential-backoff retry
//! - **Error translation**: the HMRC error-code taxonomy mapped into a
//!   closed set of actionable kinds with user-safe messages
//! - **Audit logging**: every outbound call recorded with sanitized bodies,
//!   queryable with filters, summaries, and retention pruning
//!
//! ## Architecture
//!
//! Components take their stores and HTTP client as constructor parameters;
//! the process-wide wiring is assembled once at startup and passed down.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mtd_gateway::config::ServerConfig;
//! use mtd_gateway::store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let store = Arc::new(SqliteStore::connect(&config.database_url).await?);
//!     store.migrate().await?;
//!     println!("gateway configured for {}", config.hmrc.base_url);
//!     Ok(())
//! }
//! ```

/// API call audit logging with sanitization, summaries, and retention pruning
pub mod audit;

/// Environment-based configuration management
pub mod config;

/// Centralized constants for endpoints, headers, and limits
pub mod constants;

/// Unified application error types and HTTP response formatting
pub mod errors;

/// Fraud prevention header construction and validation
pub mod fraud;

/// HMRC API operations, wire models, and error taxonomy
pub mod hmrc;

/// Shared pooled HTTP client for outbound calls
pub mod http_client;

/// Logging configuration and structured logging setup
pub mod logging;

/// Core domain models
pub mod models;

/// OAuth2 flow, token exchange, and refresh coordination
pub mod oauth;

/// HTTP route handlers and router assembly
pub mod routes;

/// Persistence traits and the SQLite backend
pub mod store;

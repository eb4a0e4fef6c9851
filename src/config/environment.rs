// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Handles environment variables, deployment modes, and runtime configuration parsing
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! Environment-based configuration management for production deployment

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::constants::hmrc;

/// Environment type selecting HMRC sandbox vs production endpoints
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// HMRC application credentials and endpoint selection
#[derive(Debug, Clone)]
pub struct HmrcConfig {
    /// OAuth client id issued by HMRC developer hub
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Redirect URI registered for the application
    pub redirect_uri: String,
    /// API base URL (sandbox or production, or an explicit override)
    pub base_url: String,
    /// Request timeout for outbound HMRC calls
    pub request_timeout: Duration,
    /// Connection timeout for outbound HMRC calls
    pub connect_timeout: Duration,
}

impl HmrcConfig {
    /// Build HMRC configuration from environment variables.
    ///
    /// `HMRC_BASE_URL` overrides the environment-derived default, which keeps
    /// tests and local stubs pointable at a mock server.
    ///
    /// # Errors
    ///
    /// Returns an error when required credentials are missing.
    pub fn from_env(environment: Environment) -> Result<Self> {
        let client_id = env::var("HMRC_CLIENT_ID").context("HMRC_CLIENT_ID not set")?;
        let client_secret = env::var("HMRC_CLIENT_SECRET").context("HMRC_CLIENT_SECRET not set")?;
        let redirect_uri = env::var("HMRC_REDIRECT_URI").context("HMRC_REDIRECT_URI not set")?;

        let base_url = env::var("HMRC_BASE_URL").unwrap_or_else(|_| {
            if environment.is_production() {
                hmrc::PRODUCTION_BASE_URL.into()
            } else {
                hmrc::SANDBOX_BASE_URL.into()
            }
        });

        let request_timeout = env::var("HMRC_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(30), Duration::from_secs);

        let connect_timeout = env::var("HMRC_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(Duration::from_secs(10), Duration::from_secs);

        Ok(Self {
            client_id,
            client_secret,
            redirect_uri,
            base_url,
            request_timeout,
            connect_timeout,
        })
    }

    /// OAuth authorization endpoint
    #[must_use]
    pub fn authorize_url(&self) -> String {
        format!("{}/oauth/authorize", self.base_url)
    }

    /// OAuth token endpoint
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.base_url)
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port the HTTP server binds to
    pub http_port: u16,
    /// Database connection URL (SQLite path or `sqlite::memory:`)
    pub database_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// HMRC credentials and endpoints
    pub hmrc: HmrcConfig,
}

impl ServerConfig {
    /// Load and validate configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error when required variables are missing or malformed.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
        );

        let http_port = env::var("HTTP_PORT")
            .unwrap_or_else(|_| "8080".into())
            .parse()
            .context("HTTP_PORT must be a valid port number")?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:data/mtd-gateway.db".into());

        let hmrc = HmrcConfig::from_env(environment)?;

        let config = Self {
            http_port,
            database_url,
            environment,
            hmrc,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is internally inconsistent.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.hmrc.client_id.is_empty(),
            "HMRC client id must not be empty"
        );
        anyhow::ensure!(
            self.hmrc.base_url.starts_with("http"),
            "HMRC base URL must be an http(s) URL, got {}",
            self.hmrc.base_url
        );
        if self.environment.is_production() {
            anyhow::ensure!(
                self.hmrc.redirect_uri.starts_with("https://"),
                "redirect URI must use https in production"
            );
        }
        Ok(())
    }
}

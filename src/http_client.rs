// ABOUTME: Shared HTTP client with connection pooling for outbound HMRC calls
// ABOUTME: Initialized once at startup with configured timeouts, then passed down
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

use reqwest::{Client, ClientBuilder};
use std::sync::OnceLock;
use std::time::Duration;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Configured timeout values for the shared client
static CLIENT_TIMEOUTS: OnceLock<(Duration, Duration)> = OnceLock::new();

/// Global shared HTTP client with configured timeouts
static SHARED_CLIENT: OnceLock<Client> = OnceLock::new();

/// Initialize the shared HTTP client timeout configuration.
///
/// Must be called once at server startup before the first outbound call.
/// If not called, reasonable defaults are used (30s timeout, 10s connect).
pub fn initialize_shared_client(request_timeout: Duration, connect_timeout: Duration) {
    let _ = CLIENT_TIMEOUTS.set((request_timeout, connect_timeout));
}

/// Get the shared HTTP client for outbound HMRC calls.
///
/// Uses connection pooling and the configured timeouts. Falls back to
/// defaults if `initialize_shared_client()` was not called.
pub fn shared_client() -> &'static Client {
    SHARED_CLIENT.get_or_init(|| {
        let (timeout, connect_timeout) = CLIENT_TIMEOUTS.get().copied().unwrap_or((
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        ));

        ClientBuilder::new()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()
            .unwrap_or_else(|_| Client::new())
    })
}

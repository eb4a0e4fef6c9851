// ABOUTME: Centralized constants for OAuth, HMRC endpoints, fraud headers, and limits
// ABOUTME: Single source of truth so endpoint versions and retention knobs stay in one place
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! Centralized constants used across the gateway.

/// OAuth flow constants
pub mod oauth {
    /// Safety margin subtracted from token expiry when deciding whether to refresh.
    /// Absorbs clock drift and in-flight request latency.
    pub const REFRESH_SKEW_SECS: i64 = 60;

    /// Lifetime of a pending authorization state entry
    pub const STATE_TTL_MINUTES: i64 = 10;

    /// Name of the CSRF state cookie set during the authorize redirect
    pub const STATE_COOKIE: &str = "mtd_oauth_state";

    /// Scopes requested from HMRC for self-assessment access
    pub const SCOPES: &[&str] = &["read:self-assessment", "write:self-assessment"];
}

/// HMRC API base URLs and endpoint version tags
pub mod hmrc {
    /// Production API base URL
    pub const PRODUCTION_BASE_URL: &str = "https://api.service.hmrc.gov.uk";

    /// Sandbox (test) API base URL
    pub const SANDBOX_BASE_URL: &str = "https://test-api.service.hmrc.gov.uk";

    /// Accept-header version for the Business Details API
    pub const BUSINESS_DETAILS_VERSION: &str = "1.0";

    /// Accept-header version for the Obligations API
    pub const OBLIGATIONS_VERSION: &str = "3.0";

    /// Accept-header version for the Self Employment Business API (cumulative summaries)
    pub const SELF_EMPLOYMENT_VERSION: &str = "5.0";

    /// Accept-header version for the Individual Calculations API
    pub const CALCULATIONS_VERSION: &str = "7.0";

    /// Response header carrying the upstream submission identifier
    pub const CORRELATION_ID_HEADER: &str = "x-correlationid";
}

/// Fraud prevention header names (lowercase, as sent on the wire)
pub mod fraud {
    /// How the originating device connects to HMRC
    pub const CONNECTION_METHOD: &str = "gov-client-connection-method";
    /// Connection method value for a web app whose server originates the call
    pub const CONNECTION_METHOD_VALUE: &str = "WEB_APP_VIA_SERVER";

    pub const DEVICE_ID: &str = "gov-client-device-id";
    pub const USER_IDS: &str = "gov-client-user-ids";
    pub const TIMEZONE: &str = "gov-client-timezone";
    pub const LOCAL_IPS: &str = "gov-client-local-ips";
    pub const LOCAL_IPS_TIMESTAMP: &str = "gov-client-local-ips-timestamp";
    pub const PUBLIC_IP: &str = "gov-client-public-ip";
    pub const PUBLIC_IP_TIMESTAMP: &str = "gov-client-public-ip-timestamp";
    pub const SCREENS: &str = "gov-client-screens";
    pub const WINDOW_SIZE: &str = "gov-client-window-size";
    pub const BROWSER_JS_USER_AGENT: &str = "gov-client-browser-js-user-agent";
    pub const BROWSER_PLUGINS: &str = "gov-client-browser-plugins";
    pub const BROWSER_DO_NOT_TRACK: &str = "gov-client-browser-do-not-track";
    pub const MULTI_FACTOR: &str = "gov-client-multi-factor";
    pub const VENDOR_VERSION: &str = "gov-vendor-version";
    pub const VENDOR_PRODUCT_NAME: &str = "gov-vendor-product-name";
    pub const VENDOR_PUBLIC_IP: &str = "gov-vendor-public-ip";
    pub const VENDOR_FORWARDED: &str = "gov-vendor-forwarded";
}

/// Audit log retrieval and retention limits
pub mod limits {
    /// Default cap on log query results when the caller does not specify one
    pub const DEFAULT_LOG_QUERY_LIMIT: u32 = 100;

    /// Hard cap on log query results regardless of what the caller asks for
    pub const MAX_LOG_QUERY_LIMIT: u32 = 1000;

    /// Number of recent errors included in an error summary
    pub const ERROR_SUMMARY_RECENT: usize = 10;
}

/// Retry behavior for outbound HMRC calls
pub mod retry {
    /// Maximum attempts per logical call (first try plus retries)
    pub const MAX_ATTEMPTS: u32 = 3;

    /// Initial backoff delay before the first retry
    pub const INITIAL_BACKOFF_MS: u64 = 1000;
}

/// Service identity reported in logs and vendor headers
pub mod service {
    pub const PRODUCT_NAME: &str = "mtd-gateway";
}

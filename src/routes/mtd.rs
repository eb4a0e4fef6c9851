// ABOUTME: Route handlers for MTD business operations and audit log administration
// ABOUTME: Builds the per-request context (user, forwarded evidence, peer IP) for the API service
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::Json;
use http::header::HeaderMap;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use uuid::Uuid;

use super::AppState;
use crate::errors::{AppError, AppResult};
use crate::hmrc::models::ObligationsFilter;
use crate::hmrc::RequestContext;
use crate::models::{
    ApiLogEntry, ApiLogFilter, Business, Calculation, ErrorSummary, Obligation, PeriodSubmission,
    StatusFilter, SubmissionReceipt,
};

/// Identity parameters every MTD operation needs
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxpayerQuery {
    pub user_id: Uuid,
    pub nino: String,
}

/// Resolve the originating public IP: the first hop of a trusted
/// `x-forwarded-for` when present, else the socket peer.
fn peer_ip(headers: &HeaderMap, connect_info: Option<&ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or_else(|| connect_info.map(|info| info.0.ip()))
}

fn request_context(
    user_id: Uuid,
    headers: &HeaderMap,
    connect_info: Option<&ConnectInfo<SocketAddr>>,
) -> RequestContext {
    RequestContext {
        user_id,
        client_headers: headers.clone(),
        peer_ip: peer_ip(headers, connect_info),
    }
}

/// `GET /api/mtd/businesses?userId&nino`
pub async fn list_businesses(
    State(state): State<AppState>,
    Query(query): Query<TaxpayerQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Business>>> {
    let ctx = request_context(query.user_id, &headers, connect_info.as_ref());
    let businesses = state.service.list_businesses(&ctx, &query.nino).await?;
    Ok(Json(businesses))
}

/// Query parameters for the obligations endpoint
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationsQuery {
    #[serde(flatten)]
    pub taxpayer: TaxpayerQuery,
    #[serde(flatten)]
    pub filter: ObligationsFilter,
}

/// `GET /api/mtd/obligations?userId&nino[&fromDate&toDate&status]`
pub async fn get_obligations(
    State(state): State<AppState>,
    Query(query): Query<ObligationsQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> AppResult<Json<Vec<Obligation>>> {
    let ctx = request_context(query.taxpayer.user_id, &headers, connect_info.as_ref());
    let obligations = state
        .service
        .get_obligations(&ctx, &query.taxpayer.nino, Some(&query.filter))
        .await?;
    Ok(Json(obligations))
}

/// `PUT /api/mtd/periods?userId&nino`
pub async fn submit_period(
    State(state): State<AppState>,
    Query(query): Query<TaxpayerQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(submission): Json<PeriodSubmission>,
) -> AppResult<Json<SubmissionReceipt>> {
    let ctx = request_context(query.user_id, &headers, connect_info.as_ref());
    let receipt = state
        .service
        .submit_period(&ctx, &query.nino, &submission)
        .await?;
    Ok(Json(receipt))
}

/// `GET /api/mtd/calculations/:tax_year/:calculation_id?userId&nino`
pub async fn get_calculation(
    State(state): State<AppState>,
    Path((tax_year, calculation_id)): Path<(String, String)>,
    Query(query): Query<TaxpayerQuery>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> AppResult<Json<Calculation>> {
    let ctx = request_context(query.user_id, &headers, connect_info.as_ref());
    let calculation = state
        .service
        .get_calculation(&ctx, &query.nino, &tax_year, &calculation_id)
        .await?;
    Ok(Json(calculation))
}

/// Query parameters for audit log retrieval
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub user_id: Option<Uuid>,
    pub endpoint: Option<String>,
    #[serde(default)]
    pub status: StatusFilter,
    pub start_date: Option<chrono::DateTime<chrono::Utc>>,
    pub end_date: Option<chrono::DateTime<chrono::Utc>>,
    pub limit: Option<u32>,
}

/// `GET /api/mtd/logs`
pub async fn get_logs(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> AppResult<Json<Vec<ApiLogEntry>>> {
    let filter = ApiLogFilter {
        user_id: query.user_id,
        endpoint: query.endpoint,
        status: query.status,
        start_date: query.start_date,
        end_date: query.end_date,
        limit: query.limit,
    };
    let entries = state
        .logger
        .get_api_logs(&filter)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;
    Ok(Json(entries))
}

/// Query parameters for the error summary
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryQuery {
    pub user_id: Uuid,
    #[serde(default = "default_summary_days")]
    pub days: i64,
}

fn default_summary_days() -> i64 {
    7
}

/// `GET /api/mtd/logs/summary?userId[&days]`
pub async fn error_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> AppResult<Json<ErrorSummary>> {
    let summary = state
        .logger
        .get_error_summary(query.user_id, query.days)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;
    Ok(Json(summary))
}

/// Query parameters for retention pruning
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PruneQuery {
    pub days_to_keep: i64,
}

/// `DELETE /api/mtd/logs?daysToKeep` - the only mutation path for existing entries
pub async fn prune_logs(
    State(state): State<AppState>,
    Query(query): Query<PruneQuery>,
) -> AppResult<Json<serde_json::Value>> {
    if query.days_to_keep < 0 {
        return Err(AppError::invalid_input("daysToKeep must be non-negative"));
    }
    let deleted = state
        .logger
        .clear_old_logs(query.days_to_keep)
        .await
        .map_err(|e| AppError::database(e.to_string()))?;
    Ok(Json(serde_json::json!({ "deletedCount": deleted })))
}

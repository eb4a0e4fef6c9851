// ABOUTME: Integration tests for the MTD API service orchestrator
// ABOUTME: Covers retry behavior, not-found-as-empty, submissions with correlation ids, and audit logging
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use chrono::NaiveDate;
use uuid::Uuid;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mtd_gateway::audit::ApiLogger;
use mtd_gateway::hmrc::{HmrcError, MtdServiceError};
use mtd_gateway::models::{
    ApiLogFilter, PeriodIncome, PeriodSubmission, StatusFilter,
};
use mtd_gateway::oauth::OAuthError;
use mtd_gateway::store::{SqliteStore, TokenStore};

const NINO: &str = "QQ123456C";

struct Harness {
    server: MockServer,
    store: std::sync::Arc<SqliteStore>,
    service: mtd_gateway::hmrc::MtdApiService,
    user_id: Uuid,
}

/// Service wired to a mock HMRC with a valid (non-expiring) token stored
async fn harness() -> Harness {
    let server = MockServer::start().await;
    let store = common::memory_store().await;
    let user_id = Uuid::new_v4();
    store
        .upsert_token(&common::token_record(user_id, "access-token-1", 3600))
        .await
        .unwrap();

    let oauth = common::oauth_manager(store.clone(), &server.uri());
    let service = common::api_service(store.clone(), oauth, &server.uri());

    Harness {
        server,
        store,
        service,
        user_id,
    }
}

fn businesses_body() -> serde_json::Value {
    serde_json::json!({
        "listOfBusinesses": [
            {"businessId": "XAIS12345678910", "typeOfBusiness": "self-employment",
             "tradingName": "Jane's Joinery"},
            {"businessId": "XAIS11111111111", "typeOfBusiness": "uk-property"}
        ]
    })
}

fn sample_period() -> PeriodSubmission {
    PeriodSubmission {
        business_id: "XAIS12345678910".into(),
        tax_year: "2025-26".into(),
        period_from: NaiveDate::from_ymd_opt(2025, 4, 6).unwrap(),
        period_to: NaiveDate::from_ymd_opt(2025, 7, 5).unwrap(),
        incomes: PeriodIncome {
            turnover: 12_500.0,
            other: None,
        },
        expenses: None,
    }
}

#[tokio::test]
async fn test_list_businesses_sends_auth_and_fraud_headers() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("authorization", "Bearer access-token-1"))
        .and(header("accept", "application/vnd.hmrc.1.0+json"))
        .and(header("gov-client-connection-method", "WEB_APP_VIA_SERVER"))
        .and(header(
            "gov-client-user-ids",
            format!("mtd-gateway={}", h.user_id).as_str(),
        ))
        .and(header("gov-client-public-ip", "203.0.113.9"))
        .and(header("gov-vendor-product-name", "mtd-gateway"))
        .respond_with(ResponseTemplate::new(200).set_body_json(businesses_body()))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let businesses = h.service.list_businesses(&ctx, NINO).await.unwrap();

    assert_eq!(businesses.len(), 2);
    assert_eq!(businesses[0].business_id, "XAIS12345678910");
    assert_eq!(businesses[0].trading_name.as_deref(), Some("Jane's Joinery"));
}

#[tokio::test]
async fn test_no_business_found_is_empty_list_not_error() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "code": "MATCHING_RESOURCE_NOT_FOUND",
            "message": "No business found for this NINO"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let businesses = h.service.list_businesses(&ctx, NINO).await.unwrap();
    assert!(businesses.is_empty());
}

#[tokio::test]
async fn test_other_errors_propagate_from_list_businesses() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
            "code": "CLIENT_OR_AGENT_NOT_AUTHORISED",
            "message": "The client or agent is not authorised"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let result = h.service.list_businesses(&ctx, NINO).await;
    assert!(matches!(
        result,
        Err(MtdServiceError::Hmrc(HmrcError::Unauthorized { .. }))
    ));
}

#[tokio::test]
async fn test_rate_limit_retried_then_succeeds() {
    let h = harness().await;
    // First attempt throttled, second succeeds
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
            "code": "MESSAGE_THROTTLED_OUT",
            "message": "The request for the API is throttled"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(200).set_body_json(businesses_body()))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let businesses = h.service.list_businesses(&ctx, NINO).await.unwrap();
    assert_eq!(businesses.len(), 2);
}

#[tokio::test]
async fn test_upstream_unavailable_exhausts_bounded_retries() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "code": "SERVICE_UNAVAILABLE",
            "message": "Service unavailable"
        })))
        .expect(3)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let result = h.service.list_businesses(&ctx, NINO).await;
    assert!(matches!(
        result,
        Err(MtdServiceError::Hmrc(HmrcError::UpstreamUnavailable { .. }))
    ));
}

#[tokio::test]
async fn test_validation_errors_never_retried() {
    let h = harness().await;
    let p = format!(
        "/individuals/business/self-employment/{NINO}/XAIS12345678910/cumulative/2025-26"
    );
    Mock::given(method("PUT"))
        .and(path(p))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "RULE_END_DATE_BEFORE_START_DATE",
            "message": "The End date must be after the Start date"
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let result = h.service.submit_period(&ctx, NINO, &sample_period()).await;
    assert!(matches!(
        result,
        Err(MtdServiceError::Hmrc(HmrcError::Validation { .. }))
    ));
}

#[tokio::test]
async fn test_invalid_period_rejected_before_any_network_call() {
    let h = harness().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let mut submission = sample_period();
    submission.period_from = NaiveDate::from_ymd_opt(2025, 8, 1).unwrap();

    let ctx = common::request_ctx(h.user_id);
    let result = h.service.submit_period(&ctx, NINO, &submission).await;
    match result {
        Err(MtdServiceError::Hmrc(HmrcError::Validation { message, .. })) => {
            assert!(message.contains("periodFrom"));
        }
        other => panic!("expected local Validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_fraud_evidence_blocks_the_call() {
    let h = harness().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    // No peer IP and no forwarded evidence: the mandated public-ip header
    // cannot be synthesized, so the call must not go out
    let ctx = mtd_gateway::hmrc::RequestContext::server_side(h.user_id, None);
    let result = h.service.list_businesses(&ctx, NINO).await;
    assert!(matches!(result, Err(MtdServiceError::FraudHeaders(_))));
}

#[tokio::test]
async fn test_submission_returns_and_logs_correlation_id() {
    let h = harness().await;
    let p = format!(
        "/individuals/business/self-employment/{NINO}/XAIS12345678910/cumulative/2025-26"
    );
    Mock::given(method("PUT"))
        .and(path(p.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-CorrelationId", "5f4b8d3c-0001")
                .set_body_json(serde_json::json!({})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let receipt = h
        .service
        .submit_period(&ctx, NINO, &sample_period())
        .await
        .unwrap();
    assert_eq!(receipt.correlation_id, "5f4b8d3c-0001");

    // The settled call is in the audit log with the correlation id attached
    let logger = ApiLogger::new(h.store.clone());
    let entries = logger
        .get_api_logs(&ApiLogFilter {
            user_id: Some(h.user_id),
            ..ApiLogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].endpoint, p);
    assert_eq!(entries[0].method, "PUT");
    assert_eq!(entries[0].response_status, 200);
    assert_eq!(entries[0].correlation_id.as_deref(), Some("5f4b8d3c-0001"));
}

#[tokio::test]
async fn test_resubmission_is_cumulative_with_distinct_correlation_ids() {
    let h = harness().await;
    let p = format!(
        "/individuals/business/self-employment/{NINO}/XAIS12345678910/cumulative/2025-26"
    );
    // Same logical period twice: same URL, each acceptance issues a fresh id
    Mock::given(method("PUT"))
        .and(path(p.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-CorrelationId", "corr-1")
                .set_body_json(serde_json::json!({})),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("PUT"))
        .and(path(p.clone()))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("X-CorrelationId", "corr-2")
                .set_body_json(serde_json::json!({})),
        )
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let first = h
        .service
        .submit_period(&ctx, NINO, &sample_period())
        .await
        .unwrap();

    let mut amended = sample_period();
    amended.incomes.turnover = 18_000.0;
    let second = h
        .service
        .submit_period(&ctx, NINO, &amended)
        .await
        .unwrap();

    assert_eq!(first.correlation_id, "corr-1");
    assert_eq!(second.correlation_id, "corr-2");
    assert_ne!(first.correlation_id, second.correlation_id);

    // Both submissions hit the same endpoint and both are logged
    let logger = ApiLogger::new(h.store.clone());
    let entries = logger
        .get_api_logs(&ApiLogFilter {
            user_id: Some(h.user_id),
            endpoint: Some(p),
            status: StatusFilter::Success,
            ..ApiLogFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    // Newest first: the amended turnover is in the most recent entry
    assert!(entries[0].request_body.as_deref().unwrap().contains("18000"));
}

#[tokio::test]
async fn test_401_forces_exactly_one_refresh_then_succeeds() {
    let h = harness().await;
    // API rejects the first token despite it looking fresh locally
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("authorization", "Bearer access-token-1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
            "code": "INVALID_CREDENTIALS",
            "message": "Invalid Authentication information provided"
        })))
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::token_endpoint_body("access-token-2", "refresh-2")),
        )
        .expect(1)
        .mount(&h.server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("authorization", "Bearer access-token-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(businesses_body()))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let businesses = h.service.list_businesses(&ctx, NINO).await.unwrap();
    assert_eq!(businesses.len(), 2);

    let persisted = h.store.get_token(h.user_id).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "access-token-2");
}

#[tokio::test]
async fn test_expiring_token_refreshed_before_call_and_new_token_used() {
    let server = MockServer::start().await;
    let store = common::memory_store().await;
    let user_id = Uuid::new_v4();
    // Expires in 30 seconds with a 60 second skew: must refresh first
    store
        .upsert_token(&common::token_record(user_id, "stale-access", 30))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::token_endpoint_body("new-access", "new-refresh")),
        )
        .expect(1)
        .mount(&server)
        .await;
    // The API call must carry the refreshed token, never the stale one
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .and(header("authorization", "Bearer new-access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(businesses_body()))
        .expect(1)
        .mount(&server)
        .await;

    let oauth = common::oauth_manager(store.clone(), &server.uri());
    let service = common::api_service(store.clone(), oauth, &server.uri());

    let ctx = common::request_ctx(user_id);
    let businesses = service.list_businesses(&ctx, NINO).await.unwrap();
    assert_eq!(businesses.len(), 2);

    let persisted = store.get_token(user_id).await.unwrap().unwrap();
    assert_eq!(persisted.access_token, "new-access");
    assert!(persisted.expires_at > chrono::Utc::now() + chrono::Duration::seconds(3600));
}

#[tokio::test]
async fn test_no_connection_surfaces_session_expired_without_api_call() {
    let h = harness().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(Uuid::new_v4());
    let result = h.service.list_businesses(&ctx, NINO).await;
    assert!(matches!(
        result,
        Err(MtdServiceError::Auth(OAuthError::SessionExpired))
    ));
}

#[tokio::test]
async fn test_get_obligations_flattens_business_groups() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/obligations/details/{NINO}/income-and-expenditure"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "obligations": [
                {
                    "businessId": "XAIS12345678910",
                    "typeOfBusiness": "self-employment",
                    "obligationDetails": [
                        {"periodStartDate": "2025-04-06", "periodEndDate": "2025-07-05",
                         "dueDate": "2025-08-05", "status": "Fulfilled",
                         "receivedDate": "2025-07-20"},
                        {"periodStartDate": "2025-07-06", "periodEndDate": "2025-10-05",
                         "dueDate": "2025-11-05", "status": "Open"}
                    ]
                },
                {
                    "businessId": "XAIS11111111111",
                    "typeOfBusiness": "uk-property",
                    "obligationDetails": [
                        {"periodStartDate": "2025-04-06", "periodEndDate": "2025-07-05",
                         "dueDate": "2025-08-05", "status": "Open"}
                    ]
                }
            ]
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let obligations = h.service.get_obligations(&ctx, NINO, None).await.unwrap();

    assert_eq!(obligations.len(), 3);
    assert_eq!(obligations[0].business_id, "XAIS12345678910");
    assert_eq!(obligations[2].business_id, "XAIS11111111111");
}

#[tokio::test]
async fn test_get_calculation_preserves_unknown_fields() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!(
            "/individuals/calculations/{NINO}/self-assessment/2025-26/calc-001"
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "calculationId": "calc-001",
            "taxYear": "2025-26",
            "totalIncome": 42_000.0,
            "totalTaxDue": 6_300.0,
            "intentToSubmitFinalDeclaration": true
        })))
        .expect(1)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let calculation = h
        .service
        .get_calculation(&ctx, NINO, "2025-26", "calc-001")
        .await
        .unwrap();

    assert_eq!(calculation.calculation_id, "calc-001");
    assert_eq!(calculation.total_tax_due, Some(6_300.0));
    // Fields outside the known schema pass through opaquely
    assert_eq!(
        calculation.extra.get("intentToSubmitFinalDeclaration"),
        Some(&serde_json::Value::Bool(true))
    );
}

#[tokio::test]
async fn test_failed_calls_are_logged_with_error_code() {
    let h = harness().await;
    Mock::given(method("GET"))
        .and(path(format!("/individuals/business/details/{NINO}/list")))
        .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
            "code": "SERVICE_UNAVAILABLE",
            "message": "Service unavailable"
        })))
        .expect(3)
        .mount(&h.server)
        .await;

    let ctx = common::request_ctx(h.user_id);
    let _ = h.service.list_businesses(&ctx, NINO).await;

    let logger = ApiLogger::new(h.store.clone());
    let entries = logger
        .get_api_logs(&ApiLogFilter {
            user_id: Some(h.user_id),
            status: StatusFilter::Error,
            ..ApiLogFilter::default()
        })
        .await
        .unwrap();

    // One settled entry for the whole retry sequence
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].error_code.as_deref(), Some("SERVICE_UNAVAILABLE"));
    assert_eq!(entries[0].response_status, 503);
}

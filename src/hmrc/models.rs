// ABOUTME: Typed wire shapes for HMRC API requests and responses
// ABOUTME: Validated at the boundary; unknown fields carried opaquely rather than dropped
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Taxfolio

//! HMRC wire formats.
//!
//! Each documented response shape gets its own struct; conversion into the
//! domain models in [`crate::models`] happens here so the rest of the system
//! never touches raw upstream JSON.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{
    Business, Obligation, ObligationStatus, PeriodExpenses, PeriodIncome, PeriodSubmission,
};

/// `GET /individuals/business/details/{nino}/list` response
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessListResponse {
    #[serde(default)]
    pub list_of_businesses: Vec<BusinessDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDetail {
    pub business_id: String,
    pub type_of_business: String,
    #[serde(default)]
    pub trading_name: Option<String>,
}

impl From<BusinessDetail> for Business {
    fn from(detail: BusinessDetail) -> Self {
        Self {
            business_id: detail.business_id,
            type_of_business: detail.type_of_business,
            trading_name: detail.trading_name,
        }
    }
}

/// `GET /obligations/details/{nino}/income-and-expenditure` response:
/// obligations grouped per business, each carrying its own detail list
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationsResponse {
    #[serde(default)]
    pub obligations: Vec<ObligationGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationGroup {
    pub business_id: String,
    pub type_of_business: String,
    #[serde(default)]
    pub obligation_details: Vec<ObligationDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationDetail {
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
    pub due_date: NaiveDate,
    pub status: ObligationStatus,
    #[serde(default)]
    pub received_date: Option<NaiveDate>,
}

impl ObligationsResponse {
    /// Flatten nested per-business groups into one list for caller convenience
    #[must_use]
    pub fn flatten(self) -> Vec<Obligation> {
        self.obligations
            .into_iter()
            .flat_map(|group| {
                let business_id = group.business_id;
                let type_of_business = group.type_of_business;
                group
                    .obligation_details
                    .into_iter()
                    .map(move |detail| Obligation {
                        business_id: business_id.clone(),
                        type_of_business: type_of_business.clone(),
                        period_start: detail.period_start_date,
                        period_end: detail.period_end_date,
                        due_date: detail.due_date,
                        status: detail.status,
                        received_date: detail.received_date,
                    })
            })
            .collect()
    }
}

/// Optional query filter for the obligations endpoint
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationsFilter {
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    /// `Open` or `Fulfilled`; omitted means both
    pub status: Option<ObligationStatus>,
}

impl ObligationsFilter {
    /// Render as query parameters for the obligations endpoint
    #[must_use]
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if let Some(from) = self.from_date {
            params.push(("fromDate", from.to_string()));
        }
        if let Some(to) = self.to_date {
            params.push(("toDate", to.to_string()));
        }
        if let Some(status) = self.status {
            let value = match status {
                ObligationStatus::Open => "Open",
                ObligationStatus::Fulfilled => "Fulfilled",
            };
            params.push(("status", value.into()));
        }
        params
    }
}

/// `PUT .../cumulative/{taxYear}` request body.
///
/// Each submission for the same period replaces the cumulative figures -
/// this is the idempotence contract the service relies on.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CumulativePeriodRequest {
    pub period_dates: PeriodDates,
    pub period_income: PeriodIncome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period_expenses: Option<PeriodExpenses>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodDates {
    pub period_start_date: NaiveDate,
    pub period_end_date: NaiveDate,
}

impl From<&PeriodSubmission> for CumulativePeriodRequest {
    fn from(submission: &PeriodSubmission) -> Self {
        Self {
            period_dates: PeriodDates {
                period_start_date: submission.period_from,
                period_end_date: submission.period_to,
            },
            period_income: submission.incomes.clone(),
            period_expenses: submission.expenses.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_obligations_flatten() {
        let body = r#"{
            "obligations": [
                {
                    "businessId": "XAIS12345678910",
                    "typeOfBusiness": "self-employment",
                    "obligationDetails": [
                        {"periodStartDate":"2025-04-06","periodEndDate":"2025-07-05",
                         "dueDate":"2025-08-05","status":"Fulfilled","receivedDate":"2025-07-20"},
                        {"periodStartDate":"2025-07-06","periodEndDate":"2025-10-05",
                         "dueDate":"2025-11-05","status":"Open"}
                    ]
                },
                {
                    "businessId": "XAIS99999999999",
                    "typeOfBusiness": "uk-property",
                    "obligationDetails": [
                        {"periodStartDate":"2025-04-06","periodEndDate":"2025-07-05",
                         "dueDate":"2025-08-05","status":"Open"}
                    ]
                }
            ]
        }"#;
        let response: ObligationsResponse = serde_json::from_str(body).unwrap();
        let flat = response.flatten();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].business_id, "XAIS12345678910");
        assert_eq!(flat[0].status, ObligationStatus::Fulfilled);
        assert_eq!(flat[2].type_of_business, "uk-property");
    }

    #[test]
    fn test_cumulative_request_shape() {
        let submission = PeriodSubmission {
            business_id: "XAIS12345678910".into(),
            tax_year: "2025-26".into(),
            period_from: NaiveDate::from_ymd_opt(2025, 4, 6).unwrap(),
            period_to: NaiveDate::from_ymd_opt(2025, 7, 5).unwrap(),
            incomes: PeriodIncome { turnover: 1000.0, other: Some(50.0) },
            expenses: None,
        };
        let request = CumulativePeriodRequest::from(&submission);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["periodDates"]["periodStartDate"], "2025-04-06");
        assert_eq!(json["periodIncome"]["turnover"], 1000.0);
        assert!(json.get("periodExpenses").is_none());
    }

    #[test]
    fn test_business_list_parsing_tolerates_missing_list() {
        let response: BusinessListResponse = serde_json::from_str("{}").unwrap();
        assert!(response.list_of_businesses.is_empty());
    }
}

use crate::flash_offers::dispatcher::DispatchReport;
use crate::flash_offers::errors::DispatchError;
use entities::offers::OfferId;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchRequest {
    pub offer_id: OfferId,
    pub dry_run: bool,
}

#[derive(Deserialize)]
struct RawDispatchRequest {
    #[serde(rename = "offerId", alias = "offer_id")]
    offer_id: Option<String>,
    #[serde(rename = "dryRun", alias = "dry_run")]
    dry_run: Option<bool>,
}

impl DispatchRequest {
    pub fn parse(body: &[u8]) -> Result<Self, DispatchError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(DispatchError::InvalidRequest(
                "request body is required".to_string(),
            ));
        }
        let raw: RawDispatchRequest = serde_json::from_slice(body)
            .map_err(|_| DispatchError::InvalidRequest("malformed JSON body".to_string()))?;

        let offer_id = raw
            .offer_id
            .ok_or_else(|| DispatchError::InvalidRequest("offerId is required".to_string()))?;
        let offer_id = OfferId::from_str(&offer_id)
            .map_err(|_| DispatchError::InvalidRequest("offerId must be a UUID".to_string()))?;

        Ok(Self {
            offer_id,
            dry_run: raw.dry_run.unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryError {
    pub token: String,
    pub error: String,
}

/// Body of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub success: bool,
    pub targeted_user_count: usize,
    pub sent_count: usize,
    pub failed_count: usize,
    pub errors: Vec<DeliveryError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl DispatchOutcome {
    pub fn nothing_sent(dry_run: bool) -> Self {
        Self {
            success: true,
            targeted_user_count: 0,
            sent_count: 0,
            failed_count: 0,
            errors: vec![],
            dry_run: dry_run.then_some(true),
        }
    }

    pub fn from_report(targeted: usize, report: &DispatchReport, dry_run: bool) -> Self {
        Self {
            success: true,
            targeted_user_count: targeted,
            sent_count: report.success_count(),
            failed_count: report.failure_count(),
            errors: report
                .failures()
                .map(|failure| DeliveryError {
                    token: failure.token.inner(),
                    error: failure.category.to_string(),
                })
                .collect(),
            dry_run: dry_run.then_some(true),
        }
    }
}

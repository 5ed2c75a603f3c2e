use crate::flash_offers::rate_limiter::LimitStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Fixed retry hint handed out when the push gateway itself is throttling us.
pub const GATEWAY_QUOTA_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Unauthorized,
    InvalidRequest,
    OfferNotFound,
    VenueNotFound,
    RateLimitExceeded,
    GatewayInitFailed,
    DatabaseError,
    GatewayQuotaExceeded,
    InternalError,
}

impl ErrorCode {
    /// Client safe message for the code, used whenever a specific message cannot be returned.
    pub fn generic_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "Unauthorized",
            ErrorCode::InvalidRequest => "Invalid request",
            ErrorCode::OfferNotFound => "Offer not found",
            ErrorCode::VenueNotFound => "Venue not found",
            ErrorCode::RateLimitExceeded => "Venue has reached its daily flash offer limit",
            ErrorCode::GatewayInitFailed => "Push notification service is not available",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::GatewayQuotaExceeded => "Push gateway quota exceeded, retry later",
            ErrorCode::InternalError => "Internal server error",
        }
    }
}

/// Terminal failure of a dispatch. The `Display` text is what the caller sees, underlying
/// causes stay in `source()` and only reach the logs.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Offer not found")]
    OfferNotFound,
    #[error("Venue not found")]
    VenueNotFound,
    #[error("Venue has reached its daily flash offer limit")]
    RateLimitExceeded(LimitStatus),
    #[error("Push notification service is not available")]
    GatewayInitFailed(#[source] anyhow::Error),
    #[error("Database operation failed")]
    Database(#[source] anyhow::Error),
    #[error("Push gateway quota exceeded, retry later")]
    GatewayQuotaExceeded,
    #[error("Request timed out")]
    Timeout,
}

impl DispatchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            DispatchError::Unauthorized => ErrorCode::Unauthorized,
            DispatchError::InvalidRequest(_) => ErrorCode::InvalidRequest,
            DispatchError::OfferNotFound => ErrorCode::OfferNotFound,
            DispatchError::VenueNotFound => ErrorCode::VenueNotFound,
            DispatchError::RateLimitExceeded(_) => ErrorCode::RateLimitExceeded,
            DispatchError::GatewayInitFailed(_) => ErrorCode::GatewayInitFailed,
            DispatchError::Database(_) => ErrorCode::DatabaseError,
            DispatchError::GatewayQuotaExceeded => ErrorCode::GatewayQuotaExceeded,
            DispatchError::Timeout => ErrorCode::InternalError,
        }
    }

    pub fn details(&self) -> Option<Value> {
        match self {
            DispatchError::RateLimitExceeded(status) => Some(json!({
                "currentCount": status.current,
                "limit": status.limit,
                "resetsAt": status.resets_at,
            })),
            _ => None,
        }
    }

    /// Seconds the caller should wait before retrying, for the throttling errors only.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Option<u64> {
        match self {
            DispatchError::RateLimitExceeded(status) => {
                let seconds = status
                    .resets_at
                    .map(|resets_at| {
                        let millis = (resets_at - now).num_milliseconds().max(0) as u64;
                        (millis + 999) / 1000
                    })
                    .unwrap_or(0);
                Some(seconds.max(1))
            }
            DispatchError::GatewayQuotaExceeded => Some(GATEWAY_QUOTA_RETRY_AFTER_SECS),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::Duration;

    fn exhausted(resets_at: Option<DateTime<Utc>>) -> DispatchError {
        DispatchError::RateLimitExceeded(LimitStatus {
            allowed: false,
            current: 5,
            limit: Some(5),
            resets_at,
        })
    }

    #[test]
    fn codes_serialize_in_screaming_snake_case() {
        assert_eq!(
            serde_json::to_value(ErrorCode::GatewayQuotaExceeded).unwrap(),
            json!("GATEWAY_QUOTA_EXCEEDED")
        );
        assert_eq!(ErrorCode::OfferNotFound.to_string(), "OFFER_NOT_FOUND");
    }

    #[test]
    fn rate_limit_details_carry_the_counts() {
        let now = Utc::now();
        let details = exhausted(Some(now)).details().unwrap();
        assert_eq!(details["currentCount"], 5);
        assert_eq!(details["limit"], 5);
        assert!(details["resetsAt"].is_string());
    }

    #[test]
    fn retry_after_rounds_up_to_whole_seconds() {
        let now = Utc::now();
        let error = exhausted(Some(now + Duration::milliseconds(90_500)));
        assert_eq!(error.retry_after(now), Some(91));
    }

    #[test]
    fn retry_after_is_never_zero() {
        let now = Utc::now();
        assert_eq!(exhausted(Some(now - Duration::seconds(5))).retry_after(now), Some(1));
        assert_eq!(exhausted(None).retry_after(now), Some(1));
        assert_eq!(
            DispatchError::GatewayQuotaExceeded.retry_after(now),
            Some(GATEWAY_QUOTA_RETRY_AFTER_SECS)
        );
    }

    #[test]
    fn internal_causes_stay_out_of_the_message() {
        let error = DispatchError::Database(anyhow!("password authentication failed for user"));
        assert_eq!(error.to_string(), "Database operation failed");
        assert_eq!(error.code(), ErrorCode::DatabaseError);
        assert_eq!(error.retry_after(Utc::now()), None);
        assert_eq!(DispatchError::Timeout.code(), ErrorCode::InternalError);
    }
}

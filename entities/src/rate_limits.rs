use chrono::{DateTime, Duration, Utc};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

/// Length of the rolling window every quota is evaluated over.
pub fn rate_limit_window() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum RateLimitScope {
    VenueSend,
    UserReceive,
}

/// One append-only entry of a quota. The effective count for a scope is the sum of every
/// entry whose window started inside the last 24 hours.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitRecord {
    pub scope: RateLimitScope,
    pub owner_id: Uuid,
    pub count: u32,
    pub window_start: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RateLimitRecord {
    pub fn single(scope: RateLimitScope, owner_id: Uuid, now: DateTime<Utc>) -> Self {
        Self {
            scope,
            owner_id,
            count: 1,
            window_start: now,
            expires_at: now + rate_limit_window(),
        }
    }
}

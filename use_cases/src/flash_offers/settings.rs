use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;
use std::time::Duration;

/// Largest multicast the push gateway accepts in one call.
pub const GATEWAY_MULTICAST_LIMIT: usize = 500;

/// Tunables of the dispatch engine, read from the `dispatch` configuration section.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DispatchSettings {
    #[serde(default = "defaults::batch_size")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub batch_size: usize,
    #[serde(default = "defaults::max_concurrent_batches")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub max_concurrent_batches: usize,
    #[serde(default = "defaults::request_timeout_secs")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub request_timeout_secs: u64,
    #[serde(default = "defaults::retry_delay_ms")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub retry_delay_ms: u64,
    #[serde(default = "defaults::broadcast_radius_miles")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub broadcast_radius_miles: f64,
    #[serde(default = "defaults::check_in_lookback_days")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub check_in_lookback_days: i64,
    #[serde(default = "defaults::user_daily_limit")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub user_daily_limit: u32,
    #[serde(default = "defaults::user_limit_concurrency")]
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub user_limit_concurrency: usize,
    #[serde(default = "defaults::android_channel_id")]
    pub android_channel_id: String,
}

mod defaults {
    pub fn batch_size() -> usize {
        super::GATEWAY_MULTICAST_LIMIT
    }
    pub fn max_concurrent_batches() -> usize {
        4
    }
    pub fn request_timeout_secs() -> u64 {
        30
    }
    pub fn retry_delay_ms() -> u64 {
        500
    }
    pub fn broadcast_radius_miles() -> f64 {
        500.0
    }
    pub fn check_in_lookback_days() -> i64 {
        30
    }
    pub fn user_daily_limit() -> u32 {
        10
    }
    pub fn user_limit_concurrency() -> usize {
        16
    }
    pub fn android_channel_id() -> String {
        "flash_offers".to_string()
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            batch_size: defaults::batch_size(),
            max_concurrent_batches: defaults::max_concurrent_batches(),
            request_timeout_secs: defaults::request_timeout_secs(),
            retry_delay_ms: defaults::retry_delay_ms(),
            broadcast_radius_miles: defaults::broadcast_radius_miles(),
            check_in_lookback_days: defaults::check_in_lookback_days(),
            user_daily_limit: defaults::user_daily_limit(),
            user_limit_concurrency: defaults::user_limit_concurrency(),
            android_channel_id: defaults::android_channel_id(),
        }
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 || self.batch_size > GATEWAY_MULTICAST_LIMIT {
            return Err(format!(
                "dispatch.batch_size must be between 1 and {GATEWAY_MULTICAST_LIMIT}"
            ));
        }
        if self.max_concurrent_batches == 0 {
            return Err("dispatch.max_concurrent_batches must be positive".to_string());
        }
        if self.user_limit_concurrency == 0 {
            return Err("dispatch.user_limit_concurrency must be positive".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("dispatch.request_timeout_secs must be positive".to_string());
        }
        if self.broadcast_radius_miles <= 0.0 || self.check_in_lookback_days <= 0 {
            return Err("dispatch targeting bounds must be positive".to_string());
        }
        if self.android_channel_id.trim().is_empty() {
            return Err("dispatch.android_channel_id".to_string());
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

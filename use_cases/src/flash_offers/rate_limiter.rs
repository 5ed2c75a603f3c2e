use crate::flash_offers::retry::retry_once;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entities::rate_limits::{rate_limit_window, RateLimitRecord, RateLimitScope};
use entities::users::UserId;
use entities::venues::{SubscriptionTier, VenueId};
use futures::{stream, StreamExt};
#[cfg(test)]
use mockall::automock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait RateLimitRepo: Send + Sync {
    /// Every record of `scope` for `owner_id` whose window started at or after `since`.
    async fn rate_limit_records_since(
        &self,
        scope: RateLimitScope,
        owner_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RateLimitRecord>>;

    async fn append_rate_limit_records(&self, records: Vec<RateLimitRecord>)
        -> anyhow::Result<()>;
}

/// Outcome of a quota check. `limit` is `None` for scopes that are not metered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitStatus {
    pub allowed: bool,
    pub current: u32,
    pub limit: Option<u32>,
    pub resets_at: Option<DateTime<Utc>>,
}

impl LimitStatus {
    fn unmetered() -> Self {
        Self {
            allowed: true,
            current: 0,
            limit: None,
            resets_at: None,
        }
    }

    fn from_records(records: &[RateLimitRecord], limit: u32) -> Self {
        let current = records.iter().map(|record| record.count).sum::<u32>();
        let resets_at = records
            .iter()
            .map(|record| record.window_start)
            .min()
            .map(|earliest| earliest + rate_limit_window());
        Self {
            allowed: current < limit,
            current,
            limit: Some(limit),
            resets_at,
        }
    }

    fn fail_open(limit: u32) -> Self {
        Self {
            allowed: true,
            current: 0,
            limit: Some(limit),
            resets_at: None,
        }
    }
}

/// Rolling 24 hour quotas over append-only records.
///
/// Storage failures never block a send: the check is retried once, then allowed.
pub struct RateLimiter {
    repo: Arc<dyn RateLimitRepo>,
    user_daily_limit: u32,
    retry_delay: Duration,
    concurrency: usize,
}

impl RateLimiter {
    pub fn new(
        repo: Arc<dyn RateLimitRepo>,
        user_daily_limit: u32,
        retry_delay: Duration,
        concurrency: usize,
    ) -> Self {
        Self {
            repo,
            user_daily_limit,
            retry_delay,
            concurrency: concurrency.max(1),
        }
    }

    async fn check(
        &self,
        scope: RateLimitScope,
        owner_id: Uuid,
        limit: u32,
        now: DateTime<Utc>,
    ) -> LimitStatus {
        let since = now - rate_limit_window();
        let records = retry_once("rate_limit_records_since", self.retry_delay, || {
            self.repo.rate_limit_records_since(scope, owner_id, since)
        })
        .await;

        match records {
            Ok(records) => LimitStatus::from_records(&records, limit),
            Err(err) => {
                tracing::error!(
                    %scope,
                    %owner_id,
                    "Rate limit check failed, allowing the send: {err:?}"
                );
                LimitStatus::fail_open(limit)
            }
        }
    }

    #[tracing::instrument(skip(self), level = "info")]
    pub async fn check_venue_limit(
        &self,
        venue_id: VenueId,
        tier: SubscriptionTier,
        now: DateTime<Utc>,
    ) -> LimitStatus {
        match tier.daily_send_limit() {
            None => LimitStatus::unmetered(),
            Some(limit) => {
                self.check(RateLimitScope::VenueSend, venue_id.inner(), limit, now)
                    .await
            }
        }
    }

    pub async fn check_user_limit(&self, user_id: UserId, now: DateTime<Utc>) -> LimitStatus {
        self.check(
            RateLimitScope::UserReceive,
            user_id.inner(),
            self.user_daily_limit,
            now,
        )
        .await
    }

    /// Keeps the users that still have receive quota left. Checks run concurrently.
    #[tracing::instrument(skip(self, user_ids), fields(users = user_ids.len()), level = "info")]
    pub async fn filter_users_by_limit(
        &self,
        user_ids: HashSet<UserId>,
        now: DateTime<Utc>,
    ) -> HashSet<UserId> {
        let checked = stream::iter(user_ids)
            .map(|user_id| async move { (user_id, self.check_user_limit(user_id, now).await) })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        let before = checked.len();
        let allowed = checked
            .into_iter()
            .filter_map(|(user_id, status)| status.allowed.then_some(user_id))
            .collect::<HashSet<_>>();
        if allowed.len() < before {
            tracing::info!(
                dropped = before - allowed.len(),
                "Users over their daily receive limit were dropped"
            );
        }
        allowed
    }

    pub async fn increment_venue(&self, venue_id: VenueId, now: DateTime<Utc>) -> anyhow::Result<()> {
        let record = RateLimitRecord::single(RateLimitScope::VenueSend, venue_id.inner(), now);
        self.repo.append_rate_limit_records(vec![record]).await
    }

    pub async fn increment_users(
        &self,
        user_ids: &HashSet<UserId>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        if user_ids.is_empty() {
            return Ok(());
        }
        let records = user_ids
            .iter()
            .map(|user_id| RateLimitRecord::single(RateLimitScope::UserReceive, user_id.inner(), now))
            .collect();
        self.repo.append_rate_limit_records(records).await
    }
}

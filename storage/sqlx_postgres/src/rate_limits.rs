use crate::repository::Repository;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entities::rate_limits::{RateLimitRecord, RateLimitScope};
use itertools::Itertools;
use std::str::FromStr;
use use_cases::flash_offers::rate_limiter::RateLimitRepo;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct RateLimitRow {
    scope: String,
    owner_id: Uuid,
    count: i32,
    window_start: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<RateLimitRow> for RateLimitRecord {
    type Error = anyhow::Error;

    fn try_from(row: RateLimitRow) -> Result<Self, Self::Error> {
        Ok(RateLimitRecord {
            scope: RateLimitScope::from_str(&row.scope)
                .with_context(|| format!("Unknown rate limit scope {}", row.scope))?,
            owner_id: row.owner_id,
            // the table forbids negative counts
            count: u32::try_from(row.count).unwrap_or_default(),
            window_start: row.window_start,
            expires_at: row.expires_at,
        })
    }
}

#[async_trait]
impl RateLimitRepo for Repository {
    #[tracing::instrument(err, skip(self), level = "info")]
    async fn rate_limit_records_since(
        &self,
        scope: RateLimitScope,
        owner_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RateLimitRecord>> {
        let rows = sqlx::query_as::<_, RateLimitRow>(
            "
            SELECT scope, owner_id, count, window_start, expires_at
            FROM public.rate_limits
            WHERE scope = $1 AND owner_id = $2 AND window_start >= $3
            ",
        )
        .bind(scope.to_string())
        .bind(owner_id)
        .bind(since)
        .fetch_all(self.pool())
        .await
        .context("Failed to fetch rate limit records")?;

        rows.into_iter().map(RateLimitRecord::try_from).collect()
    }

    #[tracing::instrument(err, skip(self, records), fields(records = records.len()), level = "info")]
    async fn append_rate_limit_records(
        &self,
        records: Vec<RateLimitRecord>,
    ) -> anyhow::Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let scopes = records.iter().map(|r| r.scope.to_string()).collect_vec();
        let owners = records.iter().map(|r| r.owner_id).collect_vec();
        let counts = records
            .iter()
            .map(|r| i32::try_from(r.count).context("Rate limit count overflow"))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let window_starts = records.iter().map(|r| r.window_start).collect_vec();
        let expirations = records.iter().map(|r| r.expires_at).collect_vec();

        sqlx::query(
            "
            INSERT INTO public.rate_limits (scope, owner_id, count, window_start, expires_at)
            SELECT * FROM UNNEST($1::text[], $2::uuid[], $3::int4[], $4::timestamptz[], $5::timestamptz[])
            ",
        )
        .bind(&scopes[..])
        .bind(&owners[..])
        .bind(&counts[..])
        .bind(&window_starts[..])
        .bind(&expirations[..])
        .execute(self.pool())
        .await
        .context("Failed to append rate limit records")
        .map(|_| ())
    }
}

use crate::repository::Repository;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use entities::devices::{DeviceRegistration, Platform, PushToken};
use entities::locations::{BoundingBox, Coordinates};
use entities::preferences::NotificationPreference;
use entities::users::UserId;
use entities::venues::VenueId;
use itertools::Itertools;
use std::str::FromStr;
use use_cases::flash_offers::targeting::{CheckIn, TargetingRepo};
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct CheckInRow {
    user_id: Uuid,
    latitude: f64,
    longitude: f64,
}

#[derive(sqlx::FromRow)]
struct DeviceRow {
    user_id: Uuid,
    push_token: String,
    platform: String,
    active: bool,
}

#[derive(sqlx::FromRow)]
struct PreferenceRow {
    user_id: Uuid,
    flash_offers_enabled: bool,
    quiet_hours_start: Option<NaiveTime>,
    quiet_hours_end: Option<NaiveTime>,
    timezone: Option<String>,
    max_distance_miles: Option<f64>,
}

impl From<PreferenceRow> for NotificationPreference {
    fn from(row: PreferenceRow) -> Self {
        NotificationPreference {
            user_id: UserId::from(row.user_id),
            flash_offers_enabled: row.flash_offers_enabled,
            quiet_hours_start: row.quiet_hours_start,
            quiet_hours_end: row.quiet_hours_end,
            timezone: row
                .timezone
                .filter(|timezone| !timezone.trim().is_empty())
                .unwrap_or_else(|| NotificationPreference::DEFAULT_TIMEZONE.to_string()),
            max_distance_miles: row.max_distance_miles,
        }
    }
}

fn user_uuids(user_ids: &[UserId]) -> Vec<Uuid> {
    user_ids.iter().map(UserId::inner).collect_vec()
}

#[async_trait]
impl TargetingRepo for Repository {
    #[tracing::instrument(err, skip(self), level = "info")]
    async fn favorited_user_ids(&self, venue_id: VenueId) -> anyhow::Result<Vec<UserId>> {
        let user_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM public.favorites WHERE venue_id = $1",
        )
        .bind(venue_id.inner())
        .fetch_all(self.pool())
        .await
        .context("Failed to fetch favorites")?;

        Ok(user_ids.into_iter().map(UserId::from).collect())
    }

    #[tracing::instrument(err, skip(self), level = "info")]
    async fn recent_check_ins(
        &self,
        since: DateTime<Utc>,
        area: BoundingBox,
    ) -> anyhow::Result<Vec<CheckIn>> {
        let [east, west] = area.longitude_ranges();
        let rows = sqlx::query_as::<_, CheckInRow>(
            "
            SELECT c.user_id, v.latitude, v.longitude
            FROM public.check_ins c
            INNER JOIN public.venues v ON v.id = c.venue_id
            WHERE c.created_at >= $1
              AND v.latitude BETWEEN $2 AND $3
              AND (v.longitude BETWEEN $4 AND $5 OR v.longitude BETWEEN $6 AND $7)
            ",
        )
        .bind(since)
        .bind(area.min_latitude)
        .bind(area.max_latitude)
        .bind(east.0)
        .bind(east.1)
        .bind(west.0)
        .bind(west.1)
        .fetch_all(self.pool())
        .await
        .context("Failed to fetch recent check-ins")?;

        Ok(rows
            .into_iter()
            .map(|row| CheckIn {
                user_id: UserId::from(row.user_id),
                coordinates: Coordinates::new(row.latitude, row.longitude),
            })
            .collect())
    }

    #[tracing::instrument(err, skip(self), level = "info")]
    async fn users_with_active_devices(&self) -> anyhow::Result<Vec<UserId>> {
        let user_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT DISTINCT user_id FROM public.device_registrations WHERE active",
        )
        .fetch_all(self.pool())
        .await
        .context("Failed to fetch users with active devices")?;

        Ok(user_ids.into_iter().map(UserId::from).collect())
    }

    #[tracing::instrument(err, skip(self, user_ids), fields(users = user_ids.len()), level = "info")]
    async fn active_device_registrations(
        &self,
        user_ids: &[UserId],
    ) -> anyhow::Result<Vec<DeviceRegistration>> {
        let ids = user_uuids(user_ids);
        let rows = sqlx::query_as::<_, DeviceRow>(
            "
            SELECT user_id, push_token, platform, active
            FROM public.device_registrations
            WHERE active AND user_id = ANY($1)
            ORDER BY user_id, created_at
            ",
        )
        .bind(&ids[..])
        .fetch_all(self.pool())
        .await
        .context("Failed to fetch device registrations")?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let platform = match Platform::from_str(&row.platform) {
                    Ok(platform) => platform,
                    Err(_) => {
                        tracing::warn!(platform = %row.platform, "Skipping device with unknown platform");
                        return None;
                    }
                };
                Some(DeviceRegistration {
                    user_id: UserId::from(row.user_id),
                    token: PushToken::new(row.push_token),
                    platform,
                    active: row.active,
                })
            })
            .collect())
    }

    #[tracing::instrument(err, skip(self, user_ids), fields(users = user_ids.len()), level = "info")]
    async fn notification_preferences(
        &self,
        user_ids: &[UserId],
    ) -> anyhow::Result<Vec<NotificationPreference>> {
        let ids = user_uuids(user_ids);
        let rows = sqlx::query_as::<_, PreferenceRow>(
            "
            SELECT user_id, flash_offers_enabled, quiet_hours_start, quiet_hours_end,
                   timezone, max_distance_miles
            FROM public.notification_preferences
            WHERE user_id = ANY($1)
            ",
        )
        .bind(&ids[..])
        .fetch_all(self.pool())
        .await
        .context("Failed to fetch notification preferences")?;

        Ok(rows.into_iter().map(NotificationPreference::from).collect())
    }
}

use crate::flash_offers::retry::retry_once;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entities::devices::{DeviceRegistration, Platform, PushToken};
use entities::locations::{BoundingBox, Coordinates};
use entities::preferences::NotificationPreference;
use entities::users::UserId;
use entities::venues::{Venue, VenueId};
#[cfg(test)]
use mockall::automock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// A recorded visit of a user to a venue at `coordinates`.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckIn {
    pub user_id: UserId,
    pub coordinates: Coordinates,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TargetingRepo: Send + Sync {
    async fn favorited_user_ids(&self, venue_id: VenueId) -> anyhow::Result<Vec<UserId>>;

    /// Check-ins made at or after `since` at venues located inside `area`.
    async fn recent_check_ins(
        &self,
        since: DateTime<Utc>,
        area: BoundingBox,
    ) -> anyhow::Result<Vec<CheckIn>>;

    async fn users_with_active_devices(&self) -> anyhow::Result<Vec<UserId>>;

    async fn active_device_registrations(
        &self,
        user_ids: &[UserId],
    ) -> anyhow::Result<Vec<DeviceRegistration>>;

    async fn notification_preferences(
        &self,
        user_ids: &[UserId],
    ) -> anyhow::Result<Vec<NotificationPreference>>;
}

/// One device of one user considered for the offer, before preference and quota filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub user_id: UserId,
    pub device_token: PushToken,
    pub platform: Platform,
    pub preferences: Option<NotificationPreference>,
    pub distance_miles: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetingMode {
    Favorites,
    Proximity,
    Broadcast,
}

pub struct TargetingResolver {
    repo: Arc<dyn TargetingRepo>,
    broadcast_radius_miles: f64,
    check_in_lookback: chrono::Duration,
    retry_delay: Duration,
}

impl TargetingResolver {
    pub fn new(
        repo: Arc<dyn TargetingRepo>,
        broadcast_radius_miles: f64,
        check_in_lookback_days: i64,
        retry_delay: Duration,
    ) -> Self {
        Self {
            repo,
            broadcast_radius_miles,
            check_in_lookback: chrono::Duration::days(check_in_lookback_days),
            retry_delay,
        }
    }

    pub fn mode(&self, radius_miles: f64, favorites_only: bool) -> TargetingMode {
        if favorites_only {
            TargetingMode::Favorites
        } else if radius_miles >= self.broadcast_radius_miles {
            TargetingMode::Broadcast
        } else {
            TargetingMode::Proximity
        }
    }

    #[tracing::instrument(err, skip(self, venue), fields(venue_id = %venue.id), level = "info")]
    pub async fn resolve_candidates(
        &self,
        venue: &Venue,
        radius_miles: f64,
        favorites_only: bool,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Candidate>> {
        let mode = self.mode(radius_miles, favorites_only);
        let distances = match mode {
            TargetingMode::Favorites => {
                let user_ids = retry_once("favorited_user_ids", self.retry_delay, || {
                    self.repo.favorited_user_ids(venue.id)
                })
                .await?;
                at_venue(user_ids)
            }
            TargetingMode::Broadcast => {
                let user_ids = retry_once("users_with_active_devices", self.retry_delay, || {
                    self.repo.users_with_active_devices()
                })
                .await?;
                at_venue(user_ids)
            }
            TargetingMode::Proximity => {
                self.users_near(venue.coordinates, radius_miles, now)
                    .await?
            }
        };
        tracing::info!(?mode, users = distances.len(), "Resolved targeted users");

        if distances.is_empty() {
            return Ok(vec![]);
        }

        let mut user_ids = distances.keys().copied().collect::<Vec<_>>();
        user_ids.sort();

        let (registrations, preferences) = futures::try_join!(
            retry_once("active_device_registrations", self.retry_delay, || {
                self.repo.active_device_registrations(&user_ids)
            }),
            retry_once("notification_preferences", self.retry_delay, || {
                self.repo.notification_preferences(&user_ids)
            }),
        )?;

        let preferences = preferences
            .into_iter()
            .map(|preference| (preference.user_id, preference))
            .collect::<HashMap<_, _>>();

        let mut seen_tokens = HashSet::new();
        let candidates = registrations
            .into_iter()
            .filter(|registration| registration.active)
            .filter_map(|registration| {
                let distance_miles = *distances.get(&registration.user_id)?;
                if !seen_tokens.insert(registration.token.clone()) {
                    return None;
                }
                Some(Candidate {
                    user_id: registration.user_id,
                    preferences: preferences.get(&registration.user_id).cloned(),
                    device_token: registration.token,
                    platform: registration.platform,
                    distance_miles,
                })
            })
            .collect::<Vec<_>>();

        Ok(candidates)
    }

    async fn users_near(
        &self,
        center: Coordinates,
        radius_miles: f64,
        now: DateTime<Utc>,
    ) -> anyhow::Result<HashMap<UserId, f64>> {
        let area = BoundingBox::around(center, radius_miles);
        let since = now - self.check_in_lookback;
        let check_ins = retry_once("recent_check_ins", self.retry_delay, || {
            self.repo.recent_check_ins(since, area)
        })
        .await?;

        let mut closest: HashMap<UserId, f64> = HashMap::new();
        for check_in in check_ins {
            let distance = center.distance_miles(&check_in.coordinates);
            if distance > radius_miles {
                continue;
            }
            closest
                .entry(check_in.user_id)
                .and_modify(|current| *current = current.min(distance))
                .or_insert(distance);
        }
        Ok(closest)
    }
}

fn at_venue(user_ids: Vec<UserId>) -> HashMap<UserId, f64> {
    user_ids.into_iter().map(|user_id| (user_id, 0.0)).collect()
}

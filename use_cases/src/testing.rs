//! In-memory stand-ins for storage, the push gateway and the identity service.
//! Used by the engine's own tests and, through the `testing` feature, by the HTTP layer.

use crate::actor::Principal;
use crate::authentication::{AuthenticationError, Authenticator};
use crate::flash_offers::analytics::AnalyticsRepo;
use crate::flash_offers::gateway::{PushGateway, TokenSendResult};
use crate::flash_offers::offers::OfferRepo;
use crate::flash_offers::payload::NotificationPayload;
use crate::flash_offers::rate_limiter::RateLimitRepo;
use crate::flash_offers::targeting::{CheckIn, TargetingRepo};
use crate::flash_offers::token_invalidator::DeviceRegistrationRepo;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entities::analytics::AnalyticsRecord;
use entities::devices::{DeviceRegistration, PushToken};
use entities::locations::BoundingBox;
use entities::offers::{Offer, OfferId};
use entities::preferences::NotificationPreference;
use entities::rate_limits::{RateLimitRecord, RateLimitScope};
use entities::users::UserId;
use entities::venues::{Venue, VenueId};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use uuid::Uuid;

struct StoredCheckIn {
    check_in: CheckIn,
    at: DateTime<Utc>,
}

#[derive(Default)]
struct Store {
    offers: HashMap<OfferId, Offer>,
    venues: HashMap<VenueId, Venue>,
    favorites: Vec<(UserId, VenueId)>,
    check_ins: Vec<StoredCheckIn>,
    devices: Vec<DeviceRegistration>,
    preferences: HashMap<UserId, NotificationPreference>,
    rate_limits: Vec<RateLimitRecord>,
    analytics: Vec<AnalyticsRecord>,
    failing_offer_reads: usize,
    failing_rate_limit_reads: bool,
    failing_writes: bool,
}

#[derive(Clone, Default)]
pub struct InMemoryRepository {
    store: Arc<Mutex<Store>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert_offer(&self, offer: Offer) {
        self.store().offers.insert(offer.id, offer);
    }

    pub fn insert_venue(&self, venue: Venue) {
        self.store().venues.insert(venue.id, venue);
    }

    pub fn insert_favorite(&self, user_id: UserId, venue_id: VenueId) {
        self.store().favorites.push((user_id, venue_id));
    }

    pub fn insert_check_in(&self, check_in: CheckIn, at: DateTime<Utc>) {
        self.store().check_ins.push(StoredCheckIn { check_in, at });
    }

    pub fn insert_device(&self, registration: DeviceRegistration) {
        self.store().devices.push(registration);
    }

    pub fn insert_preference(&self, preference: NotificationPreference) {
        self.store()
            .preferences
            .insert(preference.user_id, preference);
    }

    pub fn insert_rate_limit_record(&self, record: RateLimitRecord) {
        self.store().rate_limits.push(record);
    }

    /// The next `count` offer lookups fail.
    pub fn fail_offer_reads(&self, count: usize) {
        self.store().failing_offer_reads = count;
    }

    pub fn fail_rate_limit_reads(&self) {
        self.store().failing_rate_limit_reads = true;
    }

    /// Every bookkeeping write fails from now on.
    pub fn fail_writes(&self) {
        self.store().failing_writes = true;
    }

    pub fn offer(&self, offer_id: OfferId) -> Option<Offer> {
        self.store().offers.get(&offer_id).cloned()
    }

    pub fn device(&self, token: &str) -> Option<DeviceRegistration> {
        self.store()
            .devices
            .iter()
            .find(|device| device.token.as_ref() == token)
            .cloned()
    }

    pub fn inactive_device_count(&self) -> usize {
        self.store()
            .devices
            .iter()
            .filter(|device| !device.active)
            .count()
    }

    pub fn rate_limit_records(&self, scope: RateLimitScope) -> Vec<RateLimitRecord> {
        self.store()
            .rate_limits
            .iter()
            .filter(|record| record.scope == scope)
            .cloned()
            .collect()
    }

    pub fn analytics_records(&self) -> Vec<AnalyticsRecord> {
        self.store().analytics.clone()
    }

    fn check_writable(&self) -> anyhow::Result<()> {
        match self.store().failing_writes {
            true => Err(anyhow!("storage is read only")),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl OfferRepo for InMemoryRepository {
    async fn find_offer(&self, offer_id: OfferId) -> anyhow::Result<Option<Offer>> {
        let mut store = self.store();
        if store.failing_offer_reads > 0 {
            store.failing_offer_reads -= 1;
            return Err(anyhow!("connection reset"));
        }
        Ok(store.offers.get(&offer_id).cloned())
    }

    async fn find_venue(&self, venue_id: VenueId) -> anyhow::Result<Option<Venue>> {
        Ok(self.store().venues.get(&venue_id).cloned())
    }

    async fn mark_offer_notification_sent(&self, offer_id: OfferId) -> anyhow::Result<()> {
        self.check_writable()?;
        if let Some(offer) = self.store().offers.get_mut(&offer_id) {
            offer.notification_sent = true;
        }
        Ok(())
    }
}

#[async_trait]
impl RateLimitRepo for InMemoryRepository {
    async fn rate_limit_records_since(
        &self,
        scope: RateLimitScope,
        owner_id: Uuid,
        since: DateTime<Utc>,
    ) -> anyhow::Result<Vec<RateLimitRecord>> {
        let store = self.store();
        if store.failing_rate_limit_reads {
            return Err(anyhow!("rate_limits is unavailable"));
        }
        Ok(store
            .rate_limits
            .iter()
            .filter(|record| {
                record.scope == scope && record.owner_id == owner_id && record.window_start >= since
            })
            .cloned()
            .collect())
    }

    async fn append_rate_limit_records(
        &self,
        records: Vec<RateLimitRecord>,
    ) -> anyhow::Result<()> {
        self.check_writable()?;
        self.store().rate_limits.extend(records);
        Ok(())
    }
}

#[async_trait]
impl TargetingRepo for InMemoryRepository {
    async fn favorited_user_ids(&self, venue_id: VenueId) -> anyhow::Result<Vec<UserId>> {
        Ok(self
            .store()
            .favorites
            .iter()
            .filter(|(_, favorite)| *favorite == venue_id)
            .map(|(user_id, _)| *user_id)
            .collect())
    }

    async fn recent_check_ins(
        &self,
        since: DateTime<Utc>,
        area: BoundingBox,
    ) -> anyhow::Result<Vec<CheckIn>> {
        Ok(self
            .store()
            .check_ins
            .iter()
            .filter(|stored| stored.at >= since && area.contains(&stored.check_in.coordinates))
            .map(|stored| stored.check_in.clone())
            .collect())
    }

    async fn users_with_active_devices(&self) -> anyhow::Result<Vec<UserId>> {
        Ok(self
            .store()
            .devices
            .iter()
            .filter(|device| device.active)
            .map(|device| device.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect())
    }

    async fn active_device_registrations(
        &self,
        user_ids: &[UserId],
    ) -> anyhow::Result<Vec<DeviceRegistration>> {
        Ok(self
            .store()
            .devices
            .iter()
            .filter(|device| device.active && user_ids.contains(&device.user_id))
            .cloned()
            .collect())
    }

    async fn notification_preferences(
        &self,
        user_ids: &[UserId],
    ) -> anyhow::Result<Vec<NotificationPreference>> {
        let store = self.store();
        Ok(user_ids
            .iter()
            .filter_map(|user_id| store.preferences.get(user_id).cloned())
            .collect())
    }
}

#[async_trait]
impl DeviceRegistrationRepo for InMemoryRepository {
    async fn deactivate_device_tokens(&self, tokens: &[PushToken]) -> anyhow::Result<u64> {
        self.check_writable()?;
        let mut deactivated = 0;
        for device in self.store().devices.iter_mut() {
            if device.active && tokens.contains(&device.token) {
                device.active = false;
                deactivated += 1;
            }
        }
        Ok(deactivated)
    }
}

#[async_trait]
impl AnalyticsRepo for InMemoryRepository {
    async fn record_analytics(&self, record: AnalyticsRecord) -> anyhow::Result<()> {
        self.check_writable()?;
        self.store().analytics.push(record);
        Ok(())
    }
}

#[derive(Default)]
struct GatewayState {
    rejections: HashMap<PushToken, String>,
    batches: Vec<Vec<PushToken>>,
    ready_error: Option<String>,
    batch_error: Option<String>,
    delay: Option<Duration>,
}

/// Push gateway that delivers everything unless told otherwise, and remembers each batch.
#[derive(Clone, Default)]
pub struct FakePushGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakePushGateway {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The gateway answers `code` for `token`.
    pub fn reject(&self, token: impl Into<PushToken>, code: &str) {
        self.state().rejections.insert(token.into(), code.to_string());
    }

    pub fn fail_readiness(&self, error: &str) {
        self.state().ready_error = Some(error.to_string());
    }

    pub fn fail_every_batch(&self, error: &str) {
        self.state().batch_error = Some(error.to_string());
    }

    pub fn delay_batches(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    pub fn sent_batches(&self) -> Vec<Vec<PushToken>> {
        self.state().batches.clone()
    }

    pub fn sent_tokens(&self) -> Vec<PushToken> {
        self.state().batches.concat()
    }
}

#[async_trait]
impl PushGateway for FakePushGateway {
    async fn ensure_ready(&self) -> anyhow::Result<()> {
        match self.state().ready_error.clone() {
            Some(error) => Err(anyhow!(error)),
            None => Ok(()),
        }
    }

    async fn send_multicast(
        &self,
        tokens: &[PushToken],
        _payload: &NotificationPayload,
    ) -> anyhow::Result<Vec<TokenSendResult>> {
        let delay = self.state().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.batches.push(tokens.to_vec());
        if let Some(error) = state.batch_error.clone() {
            return Err(anyhow!(error));
        }
        Ok(tokens
            .iter()
            .enumerate()
            .map(|(index, token)| match state.rejections.get(token) {
                Some(code) => TokenSendResult::Rejected {
                    code: code.clone(),
                    message: format!("rejected by fake gateway: {code}"),
                },
                None => TokenSendResult::Delivered {
                    message_id: Some(format!("projects/test/messages/{index}")),
                },
            })
            .collect())
    }
}

/// Authenticator that accepts a fixed set of bearer tokens.
#[derive(Clone, Default)]
pub struct StaticAuthenticator {
    principals: HashMap<String, Principal>,
}

impl StaticAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allow(mut self, bearer_token: &str, principal: Principal) -> Self {
        self.principals.insert(bearer_token.to_string(), principal);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, bearer_token: &str) -> Result<Principal, AuthenticationError> {
        self.principals
            .get(bearer_token)
            .cloned()
            .ok_or(AuthenticationError::Rejected)
    }
}

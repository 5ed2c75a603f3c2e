pub mod analytics;
pub mod dispatcher;
pub mod errors;
pub mod gateway;
pub mod offers;
pub mod payload;
pub mod preferences;
pub mod rate_limiter;
pub mod request;
pub mod retry;
pub mod settings;
pub mod targeting;
pub mod token_invalidator;

use crate::authentication::Authenticator;
use crate::flash_offers::analytics::AnalyticsRecorder;
use crate::flash_offers::dispatcher::{BatchDispatcher, DispatchReport};
use crate::flash_offers::errors::DispatchError;
use crate::flash_offers::gateway::PushGateway;
use crate::flash_offers::offers::OfferRepo;
use crate::flash_offers::payload::PayloadBuilder;
use crate::flash_offers::preferences::PreferenceFilter;
use crate::flash_offers::rate_limiter::RateLimiter;
use crate::flash_offers::request::{DispatchOutcome, DispatchRequest};
use crate::flash_offers::retry::retry_once;
use crate::flash_offers::settings::DispatchSettings;
use crate::flash_offers::targeting::TargetingResolver;
use crate::flash_offers::token_invalidator::TokenInvalidator;
use crate::repositories::Repository;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entities::analytics::{AnalyticsEventType, AnalyticsMetadata, AnalyticsRecord};
use entities::devices::PushToken;
use entities::offers::Offer;
use entities::users::UserId;
use entities::venues::Venue;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Entry point of the engine: one bounded pass that notifies the audience of a flash offer.
#[async_trait]
pub trait FlashOfferNotificationInteractor: Send + Sync {
    /// `credential` is the raw bearer token, `body` the unparsed request body. The body is
    /// only looked at once the caller is authenticated.
    async fn dispatch(
        &self,
        credential: Option<String>,
        body: &[u8],
    ) -> Result<DispatchOutcome, DispatchError>;
}

pub struct FlashOfferNotificationInteractorImpl {
    authenticator: Arc<dyn Authenticator>,
    offers: Arc<dyn OfferRepo>,
    gateway: Arc<dyn PushGateway>,
    rate_limiter: RateLimiter,
    targeting: TargetingResolver,
    payloads: PayloadBuilder,
    dispatcher: BatchDispatcher,
    analytics: AnalyticsRecorder,
    settings: DispatchSettings,
}

impl FlashOfferNotificationInteractorImpl {
    pub fn new<R: Repository + 'static>(
        repo: Arc<R>,
        gateway: Arc<dyn PushGateway>,
        authenticator: Arc<dyn Authenticator>,
        settings: DispatchSettings,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            repo.clone(),
            settings.user_daily_limit,
            settings.retry_delay(),
            settings.user_limit_concurrency,
        );
        let targeting = TargetingResolver::new(
            repo.clone(),
            settings.broadcast_radius_miles,
            settings.check_in_lookback_days,
            settings.retry_delay(),
        );
        let dispatcher = BatchDispatcher::new(
            gateway.clone(),
            TokenInvalidator::new(repo.clone()),
            settings.batch_size,
            settings.max_concurrent_batches,
        );

        Self {
            authenticator,
            offers: repo.clone(),
            gateway,
            rate_limiter,
            targeting,
            payloads: PayloadBuilder::new(settings.android_channel_id.clone()),
            dispatcher,
            analytics: AnalyticsRecorder::new(repo),
            settings,
        }
    }

    async fn run(
        &self,
        credential: Option<String>,
        body: &[u8],
    ) -> Result<DispatchOutcome, DispatchError> {
        let now = Utc::now();
        let credential = credential
            .filter(|credential| !credential.trim().is_empty())
            .ok_or(DispatchError::Unauthorized)?;
        let principal = self
            .authenticator
            .authenticate(&credential)
            .await
            .map_err(|err| {
                tracing::warn!("Caller was not authenticated: {err}");
                DispatchError::Unauthorized
            })?;

        let request = DispatchRequest::parse(body)?;
        tracing::info!(
            user_id = %principal.user_id,
            offer_id = %request.offer_id,
            dry_run = request.dry_run,
            "Flash offer dispatch requested"
        );

        let offer = retry_once("find_offer", self.settings.retry_delay(), || {
            self.offers.find_offer(request.offer_id)
        })
        .await
        .map_err(DispatchError::Database)?
        .ok_or(DispatchError::OfferNotFound)?;

        if offer.notification_sent && !request.dry_run {
            tracing::info!(offer_id = %offer.id, "Offer was already dispatched, skipping");
            return Ok(DispatchOutcome::nothing_sent(false));
        }

        let venue = retry_once("find_venue", self.settings.retry_delay(), || {
            self.offers.find_venue(offer.venue_id)
        })
        .await
        .map_err(DispatchError::Database)?
        .ok_or(DispatchError::VenueNotFound)?;

        let venue_limit = self
            .rate_limiter
            .check_venue_limit(venue.id, venue.tier, now)
            .await;
        if !venue_limit.allowed {
            tracing::info!(
                venue_id = %venue.id,
                current = venue_limit.current,
                limit = ?venue_limit.limit,
                "Venue reached its send limit"
            );
            return Err(DispatchError::RateLimitExceeded(venue_limit));
        }

        let candidates = self
            .targeting
            .resolve_candidates(&venue, offer.radius_miles, offer.favorites_only, now)
            .await
            .map_err(DispatchError::Database)?;
        let mut candidates = PreferenceFilter::filter(candidates, now);

        let users = candidates
            .iter()
            .map(|candidate| candidate.user_id)
            .collect::<HashSet<_>>();
        if !users.is_empty() {
            let allowed = self.rate_limiter.filter_users_by_limit(users, now).await;
            candidates.retain(|candidate| allowed.contains(&candidate.user_id));
        }

        if candidates.is_empty() {
            tracing::info!(offer_id = %offer.id, "No eligible recipients");
            return Ok(DispatchOutcome::nothing_sent(request.dry_run));
        }

        let payload = self.payloads.build(&offer, &venue.name);
        let owners = candidates
            .iter()
            .map(|candidate| (candidate.device_token.clone(), candidate.user_id))
            .collect::<HashMap<_, _>>();
        let tokens = candidates
            .into_iter()
            .map(|candidate| candidate.device_token)
            .collect::<Vec<_>>();
        let targeted = tokens.len();

        if request.dry_run {
            let report = DispatchReport::simulated(&tokens, self.dispatcher.batch_size());
            tracing::info!(offer_id = %offer.id, targeted, "Dry run, nothing was sent");
            return Ok(DispatchOutcome::from_report(targeted, &report, true));
        }

        self.gateway
            .ensure_ready()
            .await
            .map_err(DispatchError::GatewayInitFailed)?;

        let report = self.dispatcher.dispatch(&tokens, &payload).await;
        self.record_dispatch(&offer, &venue, &owners, targeted, &report, now)
            .await;

        if report.gateway_quota_exhausted() {
            return Err(DispatchError::GatewayQuotaExceeded);
        }
        Ok(DispatchOutcome::from_report(targeted, &report, false))
    }

    /// Bookkeeping after a real dispatch. Every write here is best effort.
    async fn record_dispatch(
        &self,
        offer: &Offer,
        venue: &Venue,
        owners: &HashMap<PushToken, UserId>,
        targeted: usize,
        report: &DispatchReport,
        now: DateTime<Utc>,
    ) {
        let sent = report.success_count();

        if sent > 0 {
            if let Err(err) = self.rate_limiter.increment_venue(venue.id, now).await {
                tracing::error!(venue_id = %venue.id, "Failed to record venue send: {err:?}");
            }
            let reached = report
                .delivered()
                .filter_map(|token| owners.get(token).copied())
                .collect::<HashSet<_>>();
            if let Err(err) = self.rate_limiter.increment_users(&reached, now).await {
                tracing::error!(
                    users = reached.len(),
                    "Failed to record user receives: {err:?}"
                );
            }
        }

        if report.gateway_quota_exhausted() {
            tracing::warn!(
                offer_id = %offer.id,
                "Gateway quota exhausted, offer left open for a retry"
            );
        } else if let Err(err) = self.offers.mark_offer_notification_sent(offer.id).await {
            tracing::error!(offer_id = %offer.id, "Failed to flag offer as dispatched: {err:?}");
        }

        let (event_type, recipient_count) = if sent > 0 && !report.gateway_quota_exhausted() {
            (AnalyticsEventType::Sent, sent)
        } else {
            (AnalyticsEventType::Failed, 0)
        };
        self.analytics
            .record(AnalyticsRecord {
                offer_id: offer.id,
                event_type,
                recipient_count,
                metadata: AnalyticsMetadata {
                    targeted_count: targeted,
                    failure_count: report.failure_count(),
                    invalid_token_count: report.invalid_tokens().len(),
                    venue_id: venue.id,
                },
            })
            .await;
    }
}

#[async_trait]
impl FlashOfferNotificationInteractor for FlashOfferNotificationInteractorImpl {
    #[tracing::instrument(err, skip(self, credential, body), level = "info")]
    async fn dispatch(
        &self,
        credential: Option<String>,
        body: &[u8],
    ) -> Result<DispatchOutcome, DispatchError> {
        let budget = self.settings.request_timeout();
        match tokio::time::timeout(budget, self.run(credential, body)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::error!(
                    timeout_secs = budget.as_secs(),
                    "Dispatch did not finish within its time budget"
                );
                Err(DispatchError::Timeout)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::Principal;
    use crate::flash_offers::errors::ErrorCode;
    use crate::flash_offers::targeting::CheckIn;
    use crate::testing::{FakePushGateway, InMemoryRepository, StaticAuthenticator};
    use chrono::Duration;
    use entities::analytics::AnalyticsEventType;
    use entities::devices::{DeviceRegistration, Platform};
    use entities::locations::Coordinates;
    use entities::offers::OfferId;
    use entities::preferences::NotificationPreference;
    use entities::rate_limits::{RateLimitRecord, RateLimitScope};
    use entities::venues::{SubscriptionTier, VenueId};
    use serde_json::json;

    const BEARER: &str = "valid-session-token";

    struct Fixture {
        repo: InMemoryRepository,
        gateway: FakePushGateway,
        venue: Venue,
        offer: Offer,
        settings: DispatchSettings,
    }

    impl Fixture {
        fn new(tier: SubscriptionTier, favorites_only: bool) -> Self {
            let repo = InMemoryRepository::new();
            let venue = Venue {
                id: VenueId::new(),
                name: "Coffee Shop".to_string(),
                coordinates: Coordinates::new(40.7128, -74.0060),
                tier,
            };
            let offer = Offer {
                id: OfferId::new(),
                venue_id: venue.id,
                discount_percentage: 25,
                description: "Any latte, 25% off for the next two hours".to_string(),
                expires_at: Utc::now() + Duration::hours(2),
                radius_miles: 5.0,
                favorites_only,
                notification_sent: false,
            };
            repo.insert_venue(venue.clone());
            repo.insert_offer(offer.clone());
            Self {
                repo,
                gateway: FakePushGateway::new(),
                venue,
                offer,
                settings: DispatchSettings {
                    retry_delay_ms: 0,
                    ..Default::default()
                },
            }
        }

        fn add_device(&self, user_id: UserId, token: &str) {
            self.repo.insert_device(DeviceRegistration {
                user_id,
                token: PushToken::new(token),
                platform: Platform::Android,
                active: true,
            });
        }

        /// Users that favorited the venue, each with one device `fan-{i}`.
        fn add_fans(&self, count: usize) -> Vec<UserId> {
            (0..count)
                .map(|i| {
                    let user_id = UserId::new();
                    self.repo.insert_favorite(user_id, self.venue.id);
                    self.add_device(user_id, &format!("fan-{i}"));
                    user_id
                })
                .collect()
        }

        fn add_visitor(&self, token: &str, coordinates: Coordinates) -> UserId {
            let user_id = UserId::new();
            self.repo.insert_check_in(
                CheckIn {
                    user_id,
                    coordinates,
                },
                Utc::now() - Duration::days(2),
            );
            self.add_device(user_id, token);
            user_id
        }

        fn interactor(&self) -> FlashOfferNotificationInteractorImpl {
            let authenticator = StaticAuthenticator::new().allow(
                BEARER,
                Principal {
                    user_id: UserId::new(),
                    email: Some("owner@coffee.shop".to_string()),
                },
            );
            FlashOfferNotificationInteractorImpl::new(
                Arc::new(self.repo.clone()),
                Arc::new(self.gateway.clone()),
                Arc::new(authenticator),
                self.settings.clone(),
            )
        }

        fn body(&self, dry_run: bool) -> Vec<u8> {
            json!({ "offerId": self.offer.id, "dryRun": dry_run })
                .to_string()
                .into_bytes()
        }

        async fn dispatch(&self, dry_run: bool) -> Result<DispatchOutcome, DispatchError> {
            self.interactor()
                .dispatch(Some(BEARER.to_string()), &self.body(dry_run))
                .await
        }

        fn offer_flagged(&self) -> bool {
            self.repo
                .offer(self.offer.id)
                .map(|offer| offer.notification_sent)
                .unwrap_or_default()
        }
    }

    #[tokio::test]
    async fn delivers_to_favorites_and_deactivates_invalid_tokens() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(50);
        fixture.gateway.reject("fan-7", "UNREGISTERED");
        fixture
            .gateway
            .reject("fan-31", "messaging/invalid-registration-token");

        let outcome = fixture.dispatch(false).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.targeted_user_count, 50);
        assert_eq!(outcome.sent_count, 48);
        assert_eq!(outcome.failed_count, 2);
        assert_eq!(outcome.dry_run, None);
        assert!(outcome.errors.iter().all(|e| e.error == "invalid-token"));
        assert_eq!(fixture.repo.inactive_device_count(), 2);
        assert_eq!(fixture.repo.device("fan-7").map(|d| d.active), Some(false));
        assert_eq!(fixture.repo.device("fan-31").map(|d| d.active), Some(false));
        assert!(fixture.offer_flagged());

        assert_eq!(fixture.repo.rate_limit_records(RateLimitScope::VenueSend).len(), 1);
        assert_eq!(fixture.repo.rate_limit_records(RateLimitScope::UserReceive).len(), 48);

        let analytics = fixture.repo.analytics_records();
        assert_eq!(analytics.len(), 1);
        assert_eq!(analytics[0].event_type, AnalyticsEventType::Sent);
        assert_eq!(analytics[0].recipient_count, 48);
        assert_eq!(analytics[0].metadata.targeted_count, 50);
        assert_eq!(analytics[0].metadata.failure_count, 2);
        assert_eq!(analytics[0].metadata.invalid_token_count, 2);
        assert_eq!(analytics[0].metadata.venue_id, fixture.venue.id);
    }

    #[tokio::test]
    async fn deactivated_tokens_are_not_targeted_again() {
        let fixture = Fixture::new(SubscriptionTier::Unlimited, true);
        fixture.add_fans(3);
        fixture.gateway.reject("fan-1", "UNREGISTERED");
        fixture.dispatch(false).await.unwrap();

        let second_offer = Offer {
            id: OfferId::new(),
            ..fixture.offer.clone()
        };
        fixture.repo.insert_offer(second_offer.clone());
        let body = json!({ "offerId": second_offer.id }).to_string();
        let outcome = fixture
            .interactor()
            .dispatch(Some(BEARER.to_string()), body.as_bytes())
            .await
            .unwrap();

        assert_eq!(outcome.targeted_user_count, 2);
        assert!(!fixture.gateway.sent_batches()[1].contains(&PushToken::new("fan-1")));
    }

    #[tokio::test]
    async fn missing_credential_is_unauthorized() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(3);

        let error = fixture
            .interactor()
            .dispatch(None, &fixture.body(false))
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::Unauthorized);
        assert!(fixture.gateway.sent_batches().is_empty());
    }

    #[tokio::test]
    async fn authentication_is_checked_before_the_body() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);

        let error = fixture
            .interactor()
            .dispatch(Some("forged".to_string()), b"{not json")
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn malformed_offer_id_is_an_invalid_request() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);

        let error = fixture
            .interactor()
            .dispatch(Some(BEARER.to_string()), br#"{"offerId": "not-a-uuid"}"#)
            .await
            .unwrap_err();

        assert_eq!(error.code(), ErrorCode::InvalidRequest);
    }

    #[tokio::test]
    async fn unknown_offer_and_venue_are_not_found() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        let body = json!({ "offerId": OfferId::new() }).to_string();
        let error = fixture
            .interactor()
            .dispatch(Some(BEARER.to_string()), body.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::OfferNotFound);

        let orphan = Offer {
            id: OfferId::new(),
            venue_id: VenueId::new(),
            ..fixture.offer.clone()
        };
        fixture.repo.insert_offer(orphan.clone());
        let body = json!({ "offerId": orphan.id }).to_string();
        let error = fixture
            .interactor()
            .dispatch(Some(BEARER.to_string()), body.as_bytes())
            .await
            .unwrap_err();
        assert_eq!(error.code(), ErrorCode::VenueNotFound);
    }

    #[tokio::test]
    async fn venue_at_its_ceiling_is_rate_limited() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(3);
        for hours_ago in 1..=5 {
            fixture.repo.insert_rate_limit_record(RateLimitRecord::single(
                RateLimitScope::VenueSend,
                fixture.venue.id.inner(),
                Utc::now() - Duration::hours(hours_ago),
            ));
        }

        let error = fixture.dispatch(false).await.unwrap_err();

        assert_eq!(error.code(), ErrorCode::RateLimitExceeded);
        let details = error.details().unwrap();
        assert_eq!(details["currentCount"], 5);
        assert_eq!(details["limit"], 5);
        let retry_after = error.retry_after(Utc::now()).unwrap();
        assert!(retry_after > 18 * 3600 && retry_after <= 19 * 3600);
        assert!(fixture.gateway.sent_batches().is_empty());
        assert!(!fixture.offer_flagged());
    }

    #[tokio::test]
    async fn expired_sends_no_longer_count_against_the_venue() {
        let fixture = Fixture::new(SubscriptionTier::Free, true);
        fixture.add_fans(1);
        fixture.repo.insert_rate_limit_record(RateLimitRecord::single(
            RateLimitScope::VenueSend,
            fixture.venue.id.inner(),
            Utc::now() - Duration::hours(25),
        ));

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.sent_count, 1);
    }

    #[tokio::test]
    async fn rate_limit_storage_failure_fails_open() {
        let fixture = Fixture::new(SubscriptionTier::Free, true);
        fixture.add_fans(2);
        fixture.repo.fail_rate_limit_reads();

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.sent_count, 2);
    }

    #[tokio::test]
    async fn dry_run_simulates_without_side_effects() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(10);

        let outcome = fixture.dispatch(true).await.unwrap();

        assert_eq!(outcome.dry_run, Some(true));
        assert_eq!(outcome.targeted_user_count, 10);
        assert_eq!(outcome.sent_count, 10);
        assert_eq!(outcome.failed_count, 0);
        assert!(fixture.gateway.sent_batches().is_empty());
        assert!(!fixture.offer_flagged());
        assert_eq!(fixture.repo.inactive_device_count(), 0);
        assert!(fixture.repo.analytics_records().is_empty());
        assert!(fixture
            .repo
            .rate_limit_records(RateLimitScope::VenueSend)
            .is_empty());
    }

    #[tokio::test]
    async fn already_dispatched_offer_is_not_sent_again() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(4);
        let first = fixture.dispatch(false).await.unwrap();
        assert_eq!(first.sent_count, 4);

        let second = fixture.dispatch(false).await.unwrap();

        assert_eq!(second.targeted_user_count, 0);
        assert_eq!(second.sent_count, 0);
        assert_eq!(second.failed_count, 0);
        assert_eq!(fixture.gateway.sent_batches().len(), 1);
        assert_eq!(fixture.repo.analytics_records().len(), 1);
    }

    #[tokio::test]
    async fn disabled_users_are_never_dispatched_to() {
        let fixture = Fixture::new(SubscriptionTier::Pro, false);
        let enabled = fixture.add_visitor("next-door", Coordinates::new(40.7130, -74.0062));
        let disabled = fixture.add_visitor("same-block", Coordinates::new(40.7129, -74.0061));
        fixture.repo.insert_preference(NotificationPreference {
            flash_offers_enabled: false,
            ..NotificationPreference::fail_open(disabled)
        });
        fixture.repo.insert_preference(NotificationPreference::fail_open(enabled));

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.targeted_user_count, 1);
        assert_eq!(
            fixture.gateway.sent_tokens(),
            vec![PushToken::new("next-door")]
        );
    }

    #[tokio::test]
    async fn proximity_ignores_users_outside_the_radius_or_lookback() {
        let fixture = Fixture::new(SubscriptionTier::Pro, false);
        fixture.add_visitor("near", Coordinates::new(40.7220, -74.0000));
        fixture.add_visitor("philadelphia", Coordinates::new(39.9526, -75.1652));
        let stale = UserId::new();
        fixture.repo.insert_check_in(
            CheckIn {
                user_id: stale,
                coordinates: Coordinates::new(40.7128, -74.0060),
            },
            Utc::now() - Duration::days(45),
        );
        fixture.add_device(stale, "stale");

        fixture.dispatch(false).await.unwrap();

        assert_eq!(fixture.gateway.sent_tokens(), vec![PushToken::new("near")]);
    }

    #[tokio::test]
    async fn distance_preference_is_honoured() {
        let fixture = Fixture::new(SubscriptionTier::Pro, false);
        // roughly 3.3 miles from the venue
        let wanderer = fixture.add_visitor("wanderer", Coordinates::new(40.7580, -73.9855));
        fixture.repo.insert_preference(NotificationPreference {
            max_distance_miles: Some(1.0),
            ..NotificationPreference::fail_open(wanderer)
        });

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.targeted_user_count, 0);
        assert!(fixture.gateway.sent_batches().is_empty());
    }

    #[tokio::test]
    async fn users_at_their_daily_limit_are_skipped() {
        let mut fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.settings.user_daily_limit = 2;
        let fans = fixture.add_fans(3);
        for _ in 0..2 {
            fixture.repo.insert_rate_limit_record(RateLimitRecord::single(
                RateLimitScope::UserReceive,
                fans[0].inner(),
                Utc::now() - Duration::hours(3),
            ));
        }

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.targeted_user_count, 2);
        assert_eq!(outcome.failed_count, 0);
        assert!(!fixture.gateway.sent_tokens().contains(&PushToken::new("fan-0")));
    }

    #[tokio::test]
    async fn empty_audience_succeeds_without_sending() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::nothing_sent(false));
        assert!(fixture.gateway.sent_batches().is_empty());
        assert!(!fixture.offer_flagged());
        assert!(fixture.repo.analytics_records().is_empty());
    }

    #[tokio::test]
    async fn large_audiences_are_sent_in_gateway_sized_batches() {
        let fixture = Fixture::new(SubscriptionTier::Unlimited, true);
        fixture.add_fans(1200);

        let outcome = fixture.dispatch(false).await.unwrap();

        let sizes = fixture
            .gateway
            .sent_batches()
            .iter()
            .map(Vec::len)
            .collect::<Vec<_>>();
        assert_eq!(sizes.iter().sum::<usize>(), 1200);
        assert!(sizes.iter().all(|size| *size <= 500));
        assert_eq!(sizes.len(), 3);
        assert_eq!(outcome.sent_count + outcome.failed_count, outcome.targeted_user_count);
    }

    #[tokio::test]
    async fn gateway_that_cannot_start_fails_before_sending() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(2);
        fixture.gateway.fail_readiness("invalid service account key");

        let error = fixture.dispatch(false).await.unwrap_err();

        assert_eq!(error.code(), ErrorCode::GatewayInitFailed);
        assert!(fixture.gateway.sent_batches().is_empty());
        assert!(!fixture.offer_flagged());
    }

    #[tokio::test]
    async fn failed_batches_are_reported_per_token() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(3);
        fixture.gateway.fail_every_batch("connection reset by peer");

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.sent_count, 0);
        assert_eq!(outcome.failed_count, 3);
        assert_eq!(outcome.errors.len(), 3);
        assert!(fixture
            .repo
            .rate_limit_records(RateLimitScope::VenueSend)
            .is_empty());
        let analytics = fixture.repo.analytics_records();
        assert_eq!(analytics[0].event_type, AnalyticsEventType::Failed);
        assert_eq!(analytics[0].recipient_count, 0);
    }

    #[tokio::test]
    async fn gateway_quota_exhaustion_leaves_the_offer_open() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(4);
        fixture.gateway.reject("fan-0", "QUOTA_EXCEEDED");
        fixture.gateway.reject("fan-1", "RESOURCE_EXHAUSTED");
        fixture.gateway.reject("fan-2", "messaging/message-rate-exceeded");
        fixture.gateway.reject("fan-3", "UNREGISTERED");

        let error = fixture.dispatch(false).await.unwrap_err();

        assert_eq!(error.code(), ErrorCode::GatewayQuotaExceeded);
        assert_eq!(error.retry_after(Utc::now()), Some(60));
        assert!(!fixture.offer_flagged());
        assert_eq!(fixture.repo.device("fan-3").map(|d| d.active), Some(false));
        let analytics = fixture.repo.analytics_records();
        assert_eq!(analytics[0].event_type, AnalyticsEventType::Failed);
    }

    #[tokio::test]
    async fn a_transient_offer_lookup_failure_is_retried() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(1);
        fixture.repo.fail_offer_reads(1);

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.sent_count, 1);
    }

    #[tokio::test]
    async fn a_persistent_offer_lookup_failure_is_a_database_error() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(1);
        fixture.repo.fail_offer_reads(2);

        let error = fixture.dispatch(false).await.unwrap_err();

        assert_eq!(error.code(), ErrorCode::DatabaseError);
    }

    #[tokio::test]
    async fn bookkeeping_failures_do_not_fail_the_dispatch() {
        let fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.add_fans(2);
        fixture.repo.fail_writes();

        let outcome = fixture.dispatch(false).await.unwrap();

        assert_eq!(outcome.sent_count, 2);
        assert!(!fixture.offer_flagged());
    }

    #[tokio::test]
    async fn dispatch_is_bounded_by_the_time_budget() {
        let mut fixture = Fixture::new(SubscriptionTier::Core, true);
        fixture.settings.request_timeout_secs = 1;
        fixture.add_fans(1);
        fixture
            .gateway
            .delay_batches(std::time::Duration::from_secs(3));

        let error = fixture.dispatch(false).await.unwrap_err();

        assert!(matches!(error, DispatchError::Timeout));
        assert_eq!(error.code(), ErrorCode::InternalError);
    }
}

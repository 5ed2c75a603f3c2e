use crate::repository::Repository;
use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use entities::locations::Coordinates;
use entities::offers::{Offer, OfferId};
use entities::users::UserId;
use entities::venues::{SubscriptionTier, Venue, VenueId};

impl Repository {
    pub(crate) async fn insert_venue(&self, name: &str, tier: SubscriptionTier) -> Venue {
        self.save_venue(Venue {
            id: VenueId::new(),
            name: name.to_string(),
            coordinates: Coordinates::new(40.7128, -74.0060),
            tier,
        })
        .await
    }

    pub(crate) async fn insert_venue_at(&self, name: &str, coordinates: Coordinates) -> Venue {
        self.save_venue(Venue {
            id: VenueId::new(),
            name: name.to_string(),
            coordinates,
            tier: SubscriptionTier::Free,
        })
        .await
    }

    async fn save_venue(&self, venue: Venue) -> Venue {
        sqlx::query(
            "INSERT INTO public.venues (id, name, latitude, longitude, subscription_tier) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(venue.id.inner())
        .bind(&venue.name)
        .bind(venue.coordinates.latitude)
        .bind(venue.coordinates.longitude)
        .bind(venue.tier.to_string())
        .execute(self.pool())
        .await
        .unwrap();
        venue
    }

    pub(crate) async fn insert_offer(&self, venue_id: VenueId, favorites_only: bool) -> Offer {
        let offer = Offer {
            id: OfferId::new(),
            venue_id,
            discount_percentage: 25,
            description: "Any latte, 25% off".to_string(),
            expires_at: Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap(),
            radius_miles: 5.0,
            favorites_only,
            notification_sent: false,
        };
        sqlx::query(
            "
            INSERT INTO public.offers (id, venue_id, discount_percentage, description, expires_at, radius_miles, favorites_only)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(offer.id.inner())
        .bind(offer.venue_id.inner())
        .bind(offer.discount_percentage as i32)
        .bind(&offer.description)
        .bind(offer.expires_at)
        .bind(offer.radius_miles)
        .bind(offer.favorites_only)
        .execute(self.pool())
        .await
        .unwrap();
        offer
    }

    pub(crate) async fn insert_favorite(&self, user_id: UserId, venue_id: VenueId) {
        sqlx::query("INSERT INTO public.favorites (user_id, venue_id) VALUES ($1, $2)")
            .bind(user_id.inner())
            .bind(venue_id.inner())
            .execute(self.pool())
            .await
            .unwrap();
    }

    pub(crate) async fn insert_check_in(&self, user_id: UserId, venue_id: VenueId, at: DateTime<Utc>) {
        sqlx::query("INSERT INTO public.check_ins (user_id, venue_id, created_at) VALUES ($1, $2, $3)")
            .bind(user_id.inner())
            .bind(venue_id.inner())
            .bind(at)
            .execute(self.pool())
            .await
            .unwrap();
    }

    pub(crate) async fn insert_device(&self, user_id: UserId, token: &str, active: bool) {
        sqlx::query(
            "INSERT INTO public.device_registrations (user_id, push_token, platform, active) VALUES ($1, $2, 'android', $3)",
        )
        .bind(user_id.inner())
        .bind(token)
        .bind(active)
        .execute(self.pool())
        .await
        .unwrap();
    }

    pub(crate) async fn insert_preference(
        &self,
        user_id: UserId,
        flash_offers_enabled: bool,
        quiet_hours_start: Option<NaiveTime>,
        timezone: &str,
    ) {
        sqlx::query(
            "
            INSERT INTO public.notification_preferences (user_id, flash_offers_enabled, quiet_hours_start, timezone)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(user_id.inner())
        .bind(flash_offers_enabled)
        .bind(quiet_hours_start)
        .bind(timezone)
        .execute(self.pool())
        .await
        .unwrap();
    }
}

use crate::repository::Repository;
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entities::locations::Coordinates;
use entities::offers::{Offer, OfferId};
use entities::venues::{SubscriptionTier, Venue, VenueId};
use std::str::FromStr;
use use_cases::flash_offers::offers::OfferRepo;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct OfferRow {
    id: Uuid,
    venue_id: Uuid,
    discount_percentage: i32,
    description: String,
    expires_at: DateTime<Utc>,
    radius_miles: f64,
    favorites_only: bool,
    notification_sent: bool,
}

impl TryFrom<OfferRow> for Offer {
    type Error = anyhow::Error;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        Ok(Offer {
            id: OfferId::from(row.id),
            venue_id: VenueId::from(row.venue_id),
            discount_percentage: u32::try_from(row.discount_percentage)
                .context("Negative discount percentage")?,
            description: row.description,
            expires_at: row.expires_at,
            radius_miles: row.radius_miles,
            favorites_only: row.favorites_only,
            notification_sent: row.notification_sent,
        })
    }
}

#[derive(sqlx::FromRow)]
struct VenueRow {
    id: Uuid,
    name: String,
    latitude: f64,
    longitude: f64,
    subscription_tier: String,
}

impl From<VenueRow> for Venue {
    fn from(row: VenueRow) -> Self {
        // an unrecognised tier is treated as the most restrictive one
        let tier = SubscriptionTier::from_str(&row.subscription_tier).unwrap_or_else(|_| {
            tracing::warn!(
                venue_id = %row.id,
                tier = %row.subscription_tier,
                "Unknown subscription tier"
            );
            SubscriptionTier::Free
        });
        Venue {
            id: VenueId::from(row.id),
            name: row.name,
            coordinates: Coordinates::new(row.latitude, row.longitude),
            tier,
        }
    }
}

#[async_trait]
impl OfferRepo for Repository {
    #[tracing::instrument(err, skip(self), level = "info")]
    async fn find_offer(&self, offer_id: OfferId) -> anyhow::Result<Option<Offer>> {
        let row = sqlx::query_as::<_, OfferRow>(
            "
            SELECT id, venue_id, discount_percentage, description, expires_at,
                   radius_miles, favorites_only, notification_sent
            FROM public.offers WHERE id = $1
            ",
        )
        .bind(offer_id.inner())
        .fetch_optional(self.pool())
        .await
        .context("Failed to fetch offer")?;

        row.map(Offer::try_from).transpose()
    }

    #[tracing::instrument(err, skip(self), level = "info")]
    async fn find_venue(&self, venue_id: VenueId) -> anyhow::Result<Option<Venue>> {
        let row = sqlx::query_as::<_, VenueRow>(
            "
            SELECT id, name, latitude, longitude, subscription_tier
            FROM public.venues WHERE id = $1
            ",
        )
        .bind(venue_id.inner())
        .fetch_optional(self.pool())
        .await
        .context("Failed to fetch venue")?;

        Ok(row.map(Venue::from))
    }

    #[tracing::instrument(err, skip(self), level = "info")]
    async fn mark_offer_notification_sent(&self, offer_id: OfferId) -> anyhow::Result<()> {
        sqlx::query(
            "
            UPDATE public.offers SET notification_sent = true
            WHERE id = $1 AND notification_sent = false
            ",
        )
        .bind(offer_id.inner())
        .execute(self.pool())
        .await
        .context("Failed to flag offer as dispatched")
        .map(|_| ())
    }
}

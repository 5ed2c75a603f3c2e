use async_trait::async_trait;
use entities::offers::{Offer, OfferId};
use entities::venues::{Venue, VenueId};
#[cfg(test)]
use mockall::automock;

#[cfg_attr(test, automock)]
#[async_trait]
pub trait OfferRepo: Send + Sync {
    async fn find_offer(&self, offer_id: OfferId) -> anyhow::Result<Option<Offer>>;

    async fn find_venue(&self, venue_id: VenueId) -> anyhow::Result<Option<Venue>>;

    /// Flips the dispatched flag. A no-op for an offer that is already flagged.
    async fn mark_offer_notification_sent(&self, offer_id: OfferId) -> anyhow::Result<()>;
}

use crate::venues::VenueId;
use chrono::{DateTime, Utc};
use shared_kernel::uuid_key;

uuid_key!(OfferId);

/// A time-limited promotion. Created by the venue-management flow; the dispatch engine
/// only reads it and flips `notification_sent` once.
#[derive(Debug, Clone, PartialEq)]
pub struct Offer {
    pub id: OfferId,
    pub venue_id: VenueId,
    pub discount_percentage: u32,
    pub description: String,
    pub expires_at: DateTime<Utc>,
    pub radius_miles: f64,
    pub favorites_only: bool,
    pub notification_sent: bool,
}

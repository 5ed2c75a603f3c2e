use crate::offers::OfferId;
use crate::venues::VenueId;
use serde::Serialize;
use strum_macros::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display)]
#[strum(serialize_all = "snake_case")]
pub enum AnalyticsEventType {
    Sent,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsMetadata {
    pub targeted_count: usize,
    pub failure_count: usize,
    pub invalid_token_count: usize,
    pub venue_id: VenueId,
}

/// Aggregate outcome of one dispatch. Write-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsRecord {
    pub offer_id: OfferId,
    pub event_type: AnalyticsEventType,
    pub recipient_count: usize,
    pub metadata: AnalyticsMetadata,
}

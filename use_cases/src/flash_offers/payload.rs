use chrono::{DateTime, Utc};
use entities::offers::{Offer, OfferId};
use entities::venues::VenueId;
use serde::Serialize;

pub const FLASH_OFFER_CATEGORY: &str = "flash_offer";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: PayloadData,
    pub android: AndroidHints,
    pub ios: IosHints,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadData {
    pub offer_id: OfferId,
    pub venue_id: VenueId,
    pub category: String,
    pub expires_at: DateTime<Utc>,
}

impl PayloadData {
    /// Push data maps only carry strings.
    pub fn as_string_map(&self) -> Vec<(&'static str, String)> {
        vec![
            ("offerId", self.offer_id.to_string()),
            ("venueId", self.venue_id.to_string()),
            ("category", self.category.clone()),
            ("expiresAt", self.expires_at.to_rfc3339()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AndroidPriority {
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidHints {
    pub priority: AndroidPriority,
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IosHints {
    pub content_available: u8,
    pub sound: String,
}

pub struct PayloadBuilder {
    android_channel_id: String,
}

impl PayloadBuilder {
    pub fn new(android_channel_id: impl Into<String>) -> Self {
        Self {
            android_channel_id: android_channel_id.into(),
        }
    }

    pub fn build(&self, offer: &Offer, venue_name: &str) -> NotificationPayload {
        let description = offer.description.trim();
        let body = if description.is_empty() {
            format!(
                "Grab {}% off before this flash offer expires!",
                offer.discount_percentage
            )
        } else {
            description.to_string()
        };

        NotificationPayload {
            title: format!("{}% off at {}", offer.discount_percentage, venue_name.trim()),
            body,
            data: PayloadData {
                offer_id: offer.id,
                venue_id: offer.venue_id,
                category: FLASH_OFFER_CATEGORY.to_string(),
                expires_at: offer.expires_at,
            },
            android: AndroidHints {
                priority: AndroidPriority::High,
                channel_id: self.android_channel_id.clone(),
            },
            ios: IosHints {
                content_available: 1,
                sound: "default".to_string(),
            },
        }
    }
}

use crate::locations::Coordinates;
use shared_kernel::uuid_key;
use strum_macros::{Display, EnumString};

uuid_key!(VenueId);

/// Subscription level of a venue. Drives how many flash offers it may push per 24 hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display)]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum SubscriptionTier {
    Free,
    Core,
    Pro,
    #[strum(to_string = "unlimited", serialize = "premium", serialize = "enterprise")]
    Unlimited,
}

impl SubscriptionTier {
    /// Rolling 24 hour send ceiling, `None` when the tier is not metered.
    pub fn daily_send_limit(&self) -> Option<u32> {
        match self {
            SubscriptionTier::Free => Some(1),
            SubscriptionTier::Core => Some(5),
            SubscriptionTier::Pro => Some(20),
            SubscriptionTier::Unlimited => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Venue {
    pub id: VenueId,
    pub name: String,
    pub coordinates: Coordinates,
    pub tier: SubscriptionTier,
}

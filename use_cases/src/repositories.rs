use crate::flash_offers::{
    analytics::AnalyticsRepo, offers::OfferRepo, rate_limiter::RateLimitRepo,
    targeting::TargetingRepo, token_invalidator::DeviceRegistrationRepo,
};

pub trait Repository:
    OfferRepo + RateLimitRepo + TargetingRepo + DeviceRegistrationRepo + AnalyticsRepo + Clone
{
}

impl<T> Repository for T where
    T: Clone + OfferRepo + RateLimitRepo + TargetingRepo + DeviceRegistrationRepo + AnalyticsRepo
{
}

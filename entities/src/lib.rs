pub mod analytics;
pub mod devices;
pub mod locations;
pub mod offers;
pub mod preferences;
pub mod rate_limits;
pub mod users;
pub mod venues;

mod analytics;
pub mod configuration;
mod devices;
#[cfg(test)]
mod fixtures;
pub mod migrations;
mod offers;
mod rate_limits;
pub mod repository;
mod targeting;

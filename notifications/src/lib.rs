mod auth;
pub mod config;
pub mod gateway;
mod message;

pub use gateway::FcmGateway;

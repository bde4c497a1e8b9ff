//! HubSpot CRM implementation of the remote contact directory and OAuth token endpoint

pub mod client;
pub mod config;
pub mod models;
pub mod oauth;
pub mod rate_limit;

pub use client::{HubSpotClient, HubSpotTransport};
pub use config::{HubSpotConfig, RateLimitConfig};
pub use oauth::HubSpotOAuth;
pub use rate_limit::RateLimiter;

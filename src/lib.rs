//! geoip-warden: cached, self-refreshing GeoIP2 lookups
//!
//! Keeps a MaxMind GeoIP2 database on disk, refreshes it when it gets stale
//! and resolves connecting players' addresses against the reader that is
//! currently installed.

pub mod cli;
pub mod config;
pub mod database;
pub mod download;
pub mod error;
pub mod events;
pub mod utils;

// Re-export common types
pub use config::AppConfig;
pub use database::{DatabaseManager, LookupResult, LookupService};
pub use error::{GeoIpError, LookupError, Result};
pub use events::{GeoIpListener, PlayerLoginEvent};

/// Logged at startup as required by the GeoLite2 license
pub const ATTRIBUTION_NOTICE: &str =
    "This product includes GeoLite2 data created by MaxMind, available from https://www.maxmind.com/.";

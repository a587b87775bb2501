//! Host event adapter
//!
//! Turns player login events into a single geolocation log line. The event
//! is never blocked or rejected by a failed lookup.

use crate::database::{Location, LookupResult, LookupService};
use crate::error::LookupError;

/// A player connecting to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerLoginEvent {
    pub player_name: String,
    /// Hostname or literal IP of the peer
    pub address: String,
}

impl PlayerLoginEvent {
    pub fn new(player_name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            player_name: player_name.into(),
            address: address.into(),
        }
    }
}

/// Logs where connecting players come from
#[derive(Clone)]
pub struct GeoIpListener {
    service: LookupService,
}

impl GeoIpListener {
    pub fn new(service: LookupService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &LookupService {
        &self.service
    }

    pub fn on_player_login(&self, event: &PlayerLoginEvent) -> LookupResult {
        let result = self.service.locate(&event.address);

        match &result {
            LookupResult::Resolved(location) => {
                log::info!("Player {} comes from {}", event.player_name, describe(location));
            }
            LookupResult::UnknownPrivate => {
                log::info!("Player {} comes from unknown country", event.player_name);
            }
            LookupResult::UnknownError(LookupError::ReaderUnavailable) => {
                log::warn!("GeoIP database is not available.");
            }
            // already reported at error level by the lookup service
            LookupResult::UnknownError(_) => {}
        }

        result
    }
}

/// "city, country" when a city is known, otherwise just the country
pub fn describe(location: &Location) -> String {
    let country = location.country.as_deref().unwrap_or("unknown country");
    match location.city.as_deref() {
        Some(city) => format!("{}, {}", city, country),
        None => country.to_string(),
    }
}

//! Error types for geoip-warden
//!
//! This module defines custom error types using thiserror for better error handling.

use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for geoip-warden
#[derive(Error, Debug)]
pub enum GeoIpError {
    /// Configuration error (empty URL, missing license key, bad values)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// No local database and automatic download is disabled
    #[error("Cannot find GeoIP database file: {0:?}")]
    MissingArtifact(PathBuf),

    /// Server answered with a non-success status code
    #[error("Failed to download database with response code {status} - {url}")]
    HttpStatus { status: u16, url: String },

    /// Timeout, DNS failure, connection reset and friends
    #[error("Network error: {0}")]
    Transport(String),

    /// Archive contained no member with the database extension
    #[error("No member ending in {0} found in archive")]
    NoMatchingMember(String),

    /// Archive or compressed stream could not be decoded
    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    /// Database file could not be opened as a reader
    #[error("Failed to open GeoIP database: {0}")]
    DatabaseOpen(String),

    /// Lookup failure
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// File I/O error
    #[error("File I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("YAML parse error: {0}")]
    YamlError(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias for geoip-warden
pub type Result<T> = std::result::Result<T, GeoIpError>;

impl GeoIpError {
    /// Create a config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GeoIpError::ConfigError(msg.into())
    }

    /// Create a transport error
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        GeoIpError::Transport(msg.into())
    }

    /// Create a corrupt archive error
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        GeoIpError::CorruptArchive(msg.into())
    }

    /// True for both shapes of fetch failure
    pub fn is_fetch_error(&self) -> bool {
        matches!(self, GeoIpError::HttpStatus { .. } | GeoIpError::Transport(_))
    }
}

impl From<tempfile::PersistError> for GeoIpError {
    fn from(err: tempfile::PersistError) -> Self {
        GeoIpError::IoError(err.error)
    }
}

/// Lookup failures carried inside [`crate::database::LookupResult`]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No reader handle has been installed yet
    #[error("GeoIP database is not available")]
    ReaderUnavailable,

    /// Public address missing from the database
    #[error("The address {0} is not in the database.")]
    AddressNotFound(IpAddr),

    /// Peer address could not be parsed as an IP
    #[error("Invalid IP address: {0}")]
    InvalidAddress(String),

    /// Reader reported a failure other than not-found
    #[error("GeoIP2 lookup error: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_classification() {
        let status = GeoIpError::HttpStatus {
            status: 401,
            url: "https://example.com/db.tar.gz".to_string(),
        };
        assert!(status.is_fetch_error());
        assert!(status.to_string().contains("401"));
        assert!(GeoIpError::transport("timed out").is_fetch_error());
        assert!(!GeoIpError::config("Empty GeoIP database URL").is_fetch_error());
    }

    #[test]
    fn test_lookup_error_converts() {
        let err: GeoIpError = LookupError::ReaderUnavailable.into();
        assert_eq!(err.to_string(), "GeoIP database is not available");
    }
}

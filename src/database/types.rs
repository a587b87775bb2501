//! Type definitions for the database module
//!
//! This module contains the data model shared by the lifecycle manager,
//! the downloader and the lookup service.

use crate::error::{GeoIpError, LookupError, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Placeholder substituted with the license key in download URL templates
pub const LICENSE_KEY_PLACEHOLDER: &str = "{LICENSEKEY}";

/// Granularity of location data kept on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    Country,
    City,
}

impl Variant {
    pub fn from_show_cities(show_cities: bool) -> Self {
        if show_cities { Variant::City } else { Variant::Country }
    }

    /// File name of the canonical artifact for this variant
    pub fn file_name(&self) -> &'static str {
        match self {
            Variant::Country => "GeoIP2-Country.mmdb",
            Variant::City => "GeoIP2-City.mmdb",
        }
    }

    pub fn canonical_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(self.file_name())
    }
}

/// The canonical on-disk database file for one variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseArtifact {
    pub path: PathBuf,
    pub variant: Variant,
}

impl DatabaseArtifact {
    pub fn new(data_dir: &Path, variant: Variant) -> Self {
        Self {
            path: variant.canonical_path(data_dir),
            variant,
        }
    }

    /// Modification time, or `None` when the file does not exist
    pub fn modified(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path)
            .ok()
            .filter(|m| m.is_file())
            .and_then(|m| m.modified().ok())
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Download and refresh settings for a single refresh cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPolicy {
    pub variant: Variant,
    /// URL template containing [`LICENSE_KEY_PLACEHOLDER`]
    pub url_template: String,
    pub license_key: Option<String>,
    pub download_if_missing: bool,
    pub refresh_enabled: bool,
    pub refresh_interval_days: u32,
}

impl DownloadPolicy {
    /// Substitute the license key into the URL template.
    ///
    /// Fails without touching the network when the template is empty or
    /// the license key is missing.
    pub fn resolve_url(&self) -> Result<String> {
        let template = self.url_template.trim();
        if template.is_empty() {
            return Err(GeoIpError::config("Empty GeoIP database URL"));
        }

        let license_key = match self.license_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key,
            _ => return Err(GeoIpError::config("GeoIP database license key missing")),
        };

        let url = template.replace(LICENSE_KEY_PLACEHOLDER, license_key);
        reqwest::Url::parse(&url)
            .map_err(|e| GeoIpError::config(format!("Invalid GeoIP database URL: {}", e)))?;

        Ok(url)
    }
}

impl Default for DownloadPolicy {
    fn default() -> Self {
        Self {
            variant: Variant::Country,
            url_template: String::new(),
            license_key: None,
            download_if_missing: false,
            refresh_enabled: true,
            refresh_interval_days: 30,
        }
    }
}

/// Location fields resolved for an address
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct Location {
    pub country: Option<String>,
    pub country_code: Option<String>,
    /// Only populated when the city variant is active
    pub city: Option<String>,
}

/// Outcome of a single lookup
#[derive(Debug, Clone, PartialEq)]
pub enum LookupResult {
    Resolved(Location),
    /// Private or reserved address missing from the database
    UnknownPrivate,
    UnknownError(LookupError),
}

impl LookupResult {
    pub fn location(&self) -> Option<&Location> {
        match self {
            LookupResult::Resolved(location) => Some(location),
            _ => None,
        }
    }

    /// Severity this outcome is logged at; private addresses are expected
    pub fn log_level(&self) -> log::Level {
        match self {
            LookupResult::Resolved(_) => log::Level::Debug,
            LookupResult::UnknownPrivate => log::Level::Info,
            LookupResult::UnknownError(_) => log::Level::Error,
        }
    }
}

/// Lifecycle state of the managed database
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    Downloading,
    Extracting,
    Ready,
    Unavailable,
}

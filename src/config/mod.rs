//! Configuration module for geoip-warden
//!
//! Handles loading and managing configuration from YAML files and environment variables.

use crate::database::{DownloadPolicy, LICENSE_KEY_PLACEHOLDER, Variant};
use crate::download::DEFAULT_TIMEOUT_SECS;
use crate::error::{GeoIpError, Result};
use crate::utils::path;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AppConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub global: GlobalConfig,
}

/// Database download and refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    /// Keep the city database instead of the country one
    #[serde(default)]
    pub show_cities: bool,

    /// Fetch the database when no local copy exists
    #[serde(default = "default_true")]
    pub download_if_missing: bool,

    /// Country database URL template
    #[serde(default = "default_country_url")]
    pub download_url: String,

    /// City database URL template
    #[serde(default = "default_city_url")]
    pub download_url_city: String,

    /// MaxMind license key
    #[serde(default)]
    pub license_key: String,

    /// Upper bound for a whole download
    #[serde(default = "default_timeout_secs")]
    pub download_timeout_secs: u64,

    #[serde(default)]
    pub update: UpdateConfig,
}

/// Periodic refresh configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UpdateConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_refresh_days")]
    pub by_every_x_days: u32,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Enable colored output
    #[serde(default = "default_true")]
    pub enable_colors: bool,

    /// Output in JSON format
    #[serde(default)]
    pub json: bool,
}

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GlobalConfig {
    /// Verbose logging
    #[serde(default)]
    pub verbose: bool,

    /// Directory holding the database files
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_refresh_days() -> u32 {
    30
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_country_url() -> String {
    maxmind_url("GeoLite2-Country")
}

fn default_city_url() -> String {
    maxmind_url("GeoLite2-City")
}

fn maxmind_url(edition: &str) -> String {
    format!(
        "https://download.maxmind.com/app/geoip_download?edition_id={}&license_key={}&suffix=tar.gz",
        edition, LICENSE_KEY_PLACEHOLDER
    )
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            show_cities: false,
            download_if_missing: true,
            download_url: default_country_url(),
            download_url_city: default_city_url(),
            license_key: String::new(),
            download_timeout_secs: default_timeout_secs(),
            update: UpdateConfig::default(),
        }
    }
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            by_every_x_days: default_refresh_days(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            enable_colors: true,
            json: false,
        }
    }
}

impl DatabaseConfig {
    pub fn variant(&self) -> Variant {
        Variant::from_show_cities(self.show_cities)
    }

    /// URL template for the selected variant
    pub fn url_template(&self) -> &str {
        match self.variant() {
            Variant::Country => &self.download_url,
            Variant::City => &self.download_url_city,
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Snapshot of the settings for one refresh cycle
    pub fn download_policy(&self) -> DownloadPolicy {
        let license_key = self.license_key.trim();
        DownloadPolicy {
            variant: self.variant(),
            url_template: self.url_template().to_string(),
            license_key: (!license_key.is_empty()).then(|| license_key.to_string()),
            download_if_missing: self.download_if_missing,
            refresh_enabled: self.update.enabled,
            refresh_interval_days: self.update.by_every_x_days,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_file = path::config_file()?;
        if let Some(dir) = config_file.parent() {
            path::ensure_dir(dir)?;
        }

        if config_file.exists() {
            Self::load_from(&config_file)
        } else {
            let mut config = Self::default();
            config.save(&config_file)?;
            config.apply_env();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(config_file: &Path) -> Result<Self> {
        let content = fs::read_to_string(config_file)
            .map_err(|e| GeoIpError::config(format!("Failed to read config file {:?}: {}", config_file, e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from YAML text without environment overrides
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GeoIpError::YamlError(format!("Failed to parse config file: {}", e)))
    }

    /// Apply environment variable overrides
    fn apply_env(&mut self) {
        if let Ok(val) = env::var("MAXMIND_LICENSE_KEY") {
            self.database.license_key = val;
        }
        if let Ok(val) = env::var("GEOIP_WARDEN_SHOW_CITIES") {
            self.database.show_cities = matches!(val.trim(), "1" | "true" | "yes");
        }
    }

    /// Reject malformed values up front instead of deep in the download path.
    ///
    /// Empty URLs and license keys pass; they only matter once a download
    /// is actually attempted.
    pub fn validate(&self) -> Result<()> {
        let db = &self.database;

        if db.download_timeout_secs == 0 {
            return Err(GeoIpError::config("database.download-timeout-secs must be greater than 0"));
        }

        for (key, template) in [
            ("database.download-url", &db.download_url),
            ("database.download-url-city", &db.download_url_city),
        ] {
            let template = template.trim();
            if template.is_empty() {
                continue;
            }

            let sample = template.replace(LICENSE_KEY_PLACEHOLDER, "key");
            let url = reqwest::Url::parse(&sample)
                .map_err(|e| GeoIpError::config(format!("{} is not a valid URL: {}", key, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(GeoIpError::config(format!(
                    "{} must use http or https, got {}",
                    key,
                    url.scheme()
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)
            .map_err(|e| GeoIpError::YamlError(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, yaml).map_err(|e| GeoIpError::config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Directory holding the canonical database files
    pub fn data_dir(&self) -> Result<PathBuf> {
        match self.global.data_dir.as_deref() {
            Some(dir) if !dir.trim().is_empty() => Ok(path::expand_tilde(dir.trim())),
            _ => path::data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert!(!config.database.show_cities);
        assert!(config.database.update.enabled);
        assert_eq!(config.database.update.by_every_x_days, 30);
        assert!(config.database.download_url.contains(LICENSE_KEY_PLACEHOLDER));
        assert!(config.output.enable_colors);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = AppConfig::from_yaml(
            "database:\n  show-cities: true\n  license-key: abc\n  update:\n    by-every-x-days: 7\n",
        )
        .unwrap();

        assert!(config.database.show_cities);
        assert!(config.database.update.enabled);
        assert_eq!(config.database.update.by_every_x_days, 7);
        assert!(config.database.download_if_missing);

        let policy = config.database.download_policy();
        assert_eq!(policy.variant, Variant::City);
        assert_eq!(policy.url_template, config.database.download_url_city);
        assert_eq!(policy.license_key.as_deref(), Some("abc"));
        assert_eq!(policy.refresh_interval_days, 7);
    }

    #[test]
    fn test_blank_license_key_becomes_none() {
        let config = AppConfig::from_yaml("database:\n  license-key: '  '\n").unwrap();
        assert_eq!(config.database.download_policy().license_key, None);
    }

    #[test]
    fn test_malformed_values_fail_fast() {
        assert!(AppConfig::from_yaml("database:\n  update:\n    by-every-x-days: soon\n").is_err());

        let config = AppConfig::from_yaml("database:\n  download-url: 'ftp://x/{LICENSEKEY}.tar.gz'\n").unwrap();
        assert!(matches!(config.validate(), Err(GeoIpError::ConfigError(_))));

        let config = AppConfig::from_yaml("database:\n  download-url: 'not a url'\n").unwrap();
        assert!(matches!(config.validate(), Err(GeoIpError::ConfigError(_))));

        let config = AppConfig::from_yaml("database:\n  download-timeout-secs: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(GeoIpError::ConfigError(_))));
    }

    #[test]
    fn test_empty_url_is_not_a_load_error() {
        let config = AppConfig::from_yaml("database:\n  download-url: ''\n").unwrap();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip_through_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("config.yaml");

        let mut config = AppConfig::default();
        config.database.update.by_every_x_days = 14;
        config.global.data_dir = Some("/srv/geoip".to_string());
        config.save(&file).unwrap();

        let yaml = fs::read_to_string(&file).unwrap();
        assert!(yaml.contains("by-every-x-days: 14"));
        assert!(yaml.contains("show-cities"));

        let loaded = AppConfig::from_yaml(&yaml).unwrap();
        assert_eq!(loaded.database.update.by_every_x_days, 14);
        assert_eq!(loaded.data_dir().unwrap(), PathBuf::from("/srv/geoip"));
    }
}

//! Where geoip-warden keeps its config file and database artifacts

use crate::error::{GeoIpError, Result};
use std::env;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "geoip-warden";
const CONFIG_HOME_VAR: &str = "GEOIP_WARDEN_CONFIG_HOME";
const DATA_HOME_VAR: &str = "GEOIP_WARDEN_DATA_HOME";

/// `$var` if set, else `base/geoip-warden`
fn resolve(var: &str, base: Option<PathBuf>, what: &str) -> Result<PathBuf> {
    match env::var(var) {
        Ok(path) if !path.trim().is_empty() => Ok(expand_tilde(path.trim())),
        _ => base
            .map(|dir| dir.join(APP_DIR))
            .ok_or_else(|| GeoIpError::config(format!("Unable to determine {} directory", what))),
    }
}

/// Directory holding `config.yaml`
pub fn config_dir() -> Result<PathBuf> {
    resolve(CONFIG_HOME_VAR, dirs::config_dir(), "configuration")
}

/// Default directory for the canonical database files, used when the
/// config names no `data-dir`
pub fn data_dir() -> Result<PathBuf> {
    resolve(DATA_HOME_VAR, dirs::data_dir(), "data")
}

pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.yaml"))
}

/// Create `path` and its parents if missing
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)
            .map_err(|e| GeoIpError::config(format!("Failed to create directory {:?}: {}", path, e)))?;
    }
    Ok(())
}

/// `~/x` becomes `$HOME/x`; anything else is taken as is
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

//! Freshness policy
//!
//! Decides from the artifact's modification time and the download policy
//! whether a refresh is required. No I/O happens here.

use crate::database::types::DownloadPolicy;
use crate::error::{GeoIpError, Result};
use std::path::Path;
use std::time::SystemTime;

const SECS_PER_DAY: u64 = 86_400;

/// Whole days elapsed between `modified` and `now`; zero if `modified` is in the future
pub fn age_in_days(modified: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(modified)
        .map(|age| age.as_secs() / SECS_PER_DAY)
        .unwrap_or(0)
}

/// Decide whether the artifact at `path` must be fetched.
///
/// `modified` is `None` when the artifact does not exist. A missing artifact
/// with `download_if_missing` disabled is a [`GeoIpError::MissingArtifact`].
pub fn needs_refresh(
    path: &Path,
    modified: Option<SystemTime>,
    now: SystemTime,
    policy: &DownloadPolicy,
) -> Result<bool> {
    let Some(modified) = modified else {
        if policy.download_if_missing {
            return Ok(true);
        }
        return Err(GeoIpError::MissingArtifact(path.to_path_buf()));
    };

    if !policy.refresh_enabled {
        return Ok(false);
    }

    Ok(age_in_days(modified, now) > u64::from(policy.refresh_interval_days))
}

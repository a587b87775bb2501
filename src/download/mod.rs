//! Database downloader module
//!
//! Streams database downloads into temporary files next to their final
//! destination and unwraps them into the canonical artifact.

pub mod archive;

use crate::error::{GeoIpError, Result};
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

pub use archive::{ContainerKind, StagedArtifact, stage_file, unwrap_file};

// Constants
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Database downloader
///
/// Handles downloading database files from remote URLs with optional
/// progress tracking. Every request is bounded by a timeout.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    show_progress: bool,
}

impl Downloader {
    /// Create a new downloader with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    /// Create a new downloader whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("geoip-warden/{}", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(CONNECT_TIMEOUT_SECS)))
            .build()
            .map_err(|e| GeoIpError::transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            show_progress: false,
        })
    }

    /// Display a progress bar while downloading
    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    /// Download `url` into a temporary file inside `dest_dir`.
    ///
    /// The file is only handed back once the whole body has been written.
    /// On any failure no temporary file is left behind. `secret` is masked
    /// wherever the URL shows up in logs or errors.
    ///
    /// # Returns
    ///
    /// * `Ok(NamedTempFile)` - Download completed; dropping it deletes the file
    /// * `Err(GeoIpError::HttpStatus)` - Server answered with a non-success status
    /// * `Err(GeoIpError::Transport)` - Connection, DNS or timeout failure
    pub async fn fetch(&self, url: &str, secret: Option<&str>, dest_dir: &Path) -> Result<NamedTempFile> {
        log::debug!("Downloading from: {}", redact(url, secret));

        std::fs::create_dir_all(dest_dir)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| GeoIpError::transport(format!("Failed to send request: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeoIpError::HttpStatus {
                status: status.as_u16(),
                url: redact(url, secret),
            });
        }

        let total_size = response.content_length();
        let pb = match total_size {
            Some(total) if self.show_progress => Some(progress_bar(total)),
            _ => None,
        };

        let mut temp = NamedTempFile::new_in(dest_dir)?;
        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| GeoIpError::transport(format!("Failed to read chunk: {}", e.without_url())))?;

            temp.write_all(&chunk)?;

            downloaded += chunk.len() as u64;
            if let Some(ref pb) = pb {
                pb.set_position(downloaded);
            }
        }

        temp.flush()?;

        if let Some(pb) = pb {
            pb.finish_with_message("Download complete");
        }

        log::info!("Downloaded {} bytes to {:?}", downloaded, temp.path());
        Ok(temp)
    }
}

fn progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message("Downloading GeoIP database");
    pb
}

/// Strip the query string and mask `secret` so license keys never reach the logs
pub fn redact(url: &str, secret: Option<&str>) -> String {
    let url = match secret.filter(|s| !s.is_empty()) {
        Some(secret) => url.replace(secret, "REDACTED"),
        None => url.to_string(),
    };
    match reqwest::Url::parse(&url) {
        Ok(mut parsed) => {
            if parsed.query().is_some() {
                parsed.set_query(Some("redacted"));
            }
            parsed.to_string()
        }
        Err(_) => url,
    }
}

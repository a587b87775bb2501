//! CLI module for geoip-warden
//!
//! Stands in for the host runtime: keeps the database ready and replays
//! login events given on the command line or on stdin.

use crate::config::AppConfig;
use crate::database::{DatabaseManager, LookupResult, LookupService};
use crate::download::Downloader;
use crate::error::{LookupError, Result};
use crate::events::{GeoIpListener, PlayerLoginEvent, describe};
use crate::ATTRIBUTION_NOTICE;
use clap::Parser;
use serde::Serialize;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[cfg(feature = "colored-output")]
use colored::Colorize;

#[derive(Parser, Debug)]
#[command(name = "geoip-warden")]
#[command(version, about = "Keep a GeoIP2 database fresh and locate connecting players")]
#[command(long_about = "geoip-warden keeps a MaxMind GeoIP2 database cached on disk, refreshes it\n\
    when it gets stale and reports where players connect from.\n\n\
    Examples:\n  \
    $ geoip-warden 81.2.69.142\n  \
    $ geoip-warden --player Steve --cities 81.2.69.142:19132\n  \
    $ echo \"Alex 2001:4860::8888\" | geoip-warden --json\n  \
    $ geoip-warden --update")]
pub struct Cli {
    /// Peer addresses to locate (read from stdin when none are given)
    #[arg(value_name = "ADDRESS")]
    pub addresses: Vec<String>,

    /// Configuration file to use instead of the default one
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory holding the database files
    #[arg(short, long, value_name = "DIR")]
    pub data_dir: Option<String>,

    /// Keep the city database instead of the country one
    #[arg(long)]
    pub cities: bool,

    /// Download the database now, even if the local copy is fresh
    #[arg(long)]
    pub update: bool,

    /// Player name used for addresses given without one
    #[arg(short, long, default_value = "player")]
    pub player: String,

    /// Output JSON
    #[arg(short, long)]
    pub json: bool,

    /// Show debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// One lookup as printed by the CLI
#[derive(Debug, Serialize)]
struct LookupReport<'a> {
    player: &'a str,
    address: &'a str,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    country_code: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<'a> LookupReport<'a> {
    fn new(event: &'a PlayerLoginEvent, result: &'a LookupResult) -> Self {
        let mut report = Self {
            player: &event.player_name,
            address: &event.address,
            status: "resolved",
            country: None,
            country_code: None,
            city: None,
            error: None,
        };

        match result {
            LookupResult::Resolved(location) => {
                report.country = location.country.as_deref();
                report.country_code = location.country_code.as_deref();
                report.city = location.city.as_deref();
            }
            LookupResult::UnknownPrivate => report.status = "private",
            LookupResult::UnknownError(e) => {
                report.status = "error";
                report.error = Some(e.to_string());
            }
        }
        report
    }
}

impl Cli {
    /// Load the configuration named on the command line, or the default one
    pub fn load_config(&self) -> Result<AppConfig> {
        match &self.config {
            Some(path) => AppConfig::load_from(path),
            None => AppConfig::load(),
        }
    }

    pub async fn run(&self, mut config: AppConfig) -> Result<()> {
        // Apply CLI options to config
        if self.cities {
            config.database.show_cities = true;
        }
        if let Some(ref dir) = self.data_dir {
            config.global.data_dir = Some(dir.clone());
        }
        if self.json {
            config.output.json = true;
        }

        log::info!("{}", ATTRIBUTION_NOTICE);

        let downloader = Downloader::with_timeout(config.database.download_timeout())?.show_progress(self.update);
        let data_dir = config.data_dir()?;
        crate::utils::path::ensure_dir(&data_dir)?;
        let manager = Arc::new(DatabaseManager::new(
            data_dir,
            config.database.download_policy(),
            downloader,
        ));

        // failures are logged by the manager; lookups report unknown without a reader
        let outcome = if self.update {
            manager.refresh().await
        } else {
            manager.ensure_ready().await
        };
        if let Err(e) = outcome {
            eprintln!("GeoIP database not refreshed: {}", e);
        }

        if self.update && self.addresses.is_empty() {
            return Ok(());
        }

        let listener = GeoIpListener::new(LookupService::new(manager));

        if !self.addresses.is_empty() {
            for address in &self.addresses {
                let event = PlayerLoginEvent::new(self.player.clone(), address.clone());
                self.print_event(&listener, &event, &config)?;
            }
        } else {
            self.process_events_from_stdin(&listener, &config)?;
        }

        Ok(())
    }

    /// Process login events from stdin (pipe or interactive mode)
    fn process_events_from_stdin(&self, listener: &GeoIpListener, config: &AppConfig) -> Result<()> {
        let stdin = io::stdin();
        let interactive = atty::is(atty::Stream::Stdin);

        if interactive {
            println!("geoip-warden interactive mode (enter `[NAME] ADDRESS`, quit or Ctrl+D to exit)");
        }

        for line in stdin.lock().lines() {
            let line = line?;
            let trimmed = line.trim();

            if trimmed.is_empty() {
                continue;
            }
            if interactive && (trimmed == "quit" || trimmed == "exit") {
                break;
            }

            let event = self.parse_event(trimmed);
            self.print_event(listener, &event, config)?;
        }

        Ok(())
    }

    /// `ADDRESS` or `NAME ADDRESS`
    fn parse_event(&self, line: &str) -> PlayerLoginEvent {
        let mut parts = line.split_whitespace();
        match (parts.next(), parts.next()) {
            (Some(name), Some(address)) => PlayerLoginEvent::new(name, address),
            _ => PlayerLoginEvent::new(self.player.clone(), line),
        }
    }

    fn print_event(&self, listener: &GeoIpListener, event: &PlayerLoginEvent, config: &AppConfig) -> Result<()> {
        let result = listener.on_player_login(event);
        let mut stdout = io::stdout();

        if config.output.json {
            let report = LookupReport::new(event, &result);
            let json = serde_json::to_string(&report)?;
            writeln!(stdout, "{}", json)?;
        } else {
            let text = format_text(&result, config.output.enable_colors);
            writeln!(stdout, "{} ({}) -> {}", event.player_name, event.address, text)?;
        }
        stdout.flush()?;
        Ok(())
    }
}

/// Human readable form of a lookup result
fn format_text(result: &LookupResult, use_color: bool) -> String {
    let text = match result {
        LookupResult::Resolved(location) => describe(location),
        LookupResult::UnknownPrivate => "unknown country (private address)".to_string(),
        LookupResult::UnknownError(LookupError::ReaderUnavailable) => "[database unavailable]".to_string(),
        LookupResult::UnknownError(e) => format!("[{}]", e),
    };

    if use_color { paint(text, result) } else { text }
}

#[cfg(feature = "colored-output")]
fn paint(text: String, result: &LookupResult) -> String {
    match result {
        LookupResult::Resolved(_) => text.green().to_string(),
        LookupResult::UnknownPrivate => text.yellow().to_string(),
        LookupResult::UnknownError(_) => text.red().to_string(),
    }
}

#[cfg(not(feature = "colored-output"))]
fn paint(text: String, _result: &LookupResult) -> String {
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Location;

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from(["geoip-warden", "--cities", "--player", "Steve", "81.2.69.142"]);
        assert!(cli.cities);
        assert_eq!(cli.player, "Steve");
        assert_eq!(cli.addresses, vec!["81.2.69.142".to_string()]);
        assert!(!cli.update);
    }

    #[test]
    fn test_parse_event_line() {
        let cli = Cli::parse_from(["geoip-warden"]);
        assert_eq!(cli.parse_event("Alex 8.8.8.8"), PlayerLoginEvent::new("Alex", "8.8.8.8"));
        assert_eq!(cli.parse_event("8.8.8.8"), PlayerLoginEvent::new("player", "8.8.8.8"));
    }

    #[test]
    fn test_format_text_plain() {
        let resolved = LookupResult::Resolved(Location {
            country: Some("Sweden".to_string()),
            country_code: Some("SE".to_string()),
            city: Some("Stockholm".to_string()),
        });
        assert_eq!(format_text(&resolved, false), "Stockholm, Sweden");
        assert_eq!(
            format_text(&LookupResult::UnknownPrivate, false),
            "unknown country (private address)"
        );
        assert_eq!(
            format_text(&LookupResult::UnknownError(LookupError::ReaderUnavailable), false),
            "[database unavailable]"
        );
    }

    #[test]
    fn test_json_report() {
        let event = PlayerLoginEvent::new("Steve", "127.0.0.1");
        let result = LookupResult::UnknownPrivate;
        let json = serde_json::to_string(&LookupReport::new(&event, &result)).unwrap();
        assert_eq!(json, r#"{"player":"Steve","address":"127.0.0.1","status":"private"}"#);
    }
}

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::fetcher::FetchSettings;

pub const APP_NAME: &str = "ArbFinder";
pub const DEFAULT_USER_AGENT: &str = "ArbFinder/0.2 (+https://cloudcurio.cc)";

/// Per-request timeout (seconds).
pub const HTTP_TIMEOUT_SECS: u64 = 20;

/// Maximum simultaneous in-flight requests across all hosts.
pub const MAX_CONCURRENCY: usize = 6;

/// Minimum spacing between two requests to the same host (seconds).
pub const RATE_LIMIT_SECS: f64 = 1.0;

/// Attempts per fetch before giving up.
pub const RETRY_MAX: u32 = 3;

/// Backoff for attempt n is `RETRY_BASE_SECS * 2^(n-1) + U(0, RETRY_JITTER_SECS)`.
pub const RETRY_BASE_SECS: f64 = 0.6;
pub const RETRY_JITTER_SECS: f64 = 0.2;

pub const DEFAULT_LIVE_LIMIT: usize = 80;
pub const DEFAULT_COMP_LIMIT: usize = 150;
pub const DEFAULT_SIM_THRESHOLD: u8 = 86;
pub const DEFAULT_THRESHOLD_PCT: f64 = 20.0;
pub const DEFAULT_WATCH_INTERVAL_SECS: u64 = 3600;

/// Reported deal URLs are forgotten by the watch loop after this many hours.
pub const DEFAULT_WATCH_SEEN_TTL_HOURS: u64 = 168;

/// Live providers searched when `--providers` is not given.
pub const DEFAULT_LIVE_PROVIDERS: &[&str] = &["shopgoodwill", "govdeals", "governmentsurplus"];

/// Paginated fetches allowed per query, per provider.
pub mod page_caps {
    pub const SHOPGOODWILL: u32 = 3;
    pub const GOVDEALS: u32 = 2;
    pub const GOVERNMENT_SURPLUS: u32 = 2;
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub user_agent: String,
    pub http_timeout_secs: u64,
    /// Global in-flight request cap (ARB_MAX_CONCURRENCY)
    pub max_concurrency: usize,
    /// Same-host spacing in seconds (ARB_RATE_LIMIT_SECS)
    pub rate_limit_secs: f64,
    /// Attempts per fetch (ARB_RETRY_MAX)
    pub retry_max: u32,
    /// Base backoff in seconds (ARB_RETRY_BASE_SECS)
    pub retry_base_secs: f64,
    /// Watch-loop seen-set retention in hours, 0 = keep forever (ARB_WATCH_SEEN_TTL_HOURS)
    pub watch_seen_ttl_hours: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("ARB_DB_PATH").unwrap_or_else(|_| default_db_path()),
            user_agent: std::env::var("ARB_USER_AGENT")
                .unwrap_or_else(|_| DEFAULT_USER_AGENT.to_string()),
            http_timeout_secs: env_parse("ARB_HTTP_TIMEOUT_SECS", HTTP_TIMEOUT_SECS)?,
            max_concurrency: env_parse("ARB_MAX_CONCURRENCY", MAX_CONCURRENCY)?,
            rate_limit_secs: env_parse("ARB_RATE_LIMIT_SECS", RATE_LIMIT_SECS)?,
            retry_max: env_parse("ARB_RETRY_MAX", RETRY_MAX)?,
            retry_base_secs: env_parse("ARB_RETRY_BASE_SECS", RETRY_BASE_SECS)?,
            watch_seen_ttl_hours: env_parse("ARB_WATCH_SEEN_TTL_HOURS", DEFAULT_WATCH_SEEN_TTL_HOURS)?,
        })
    }

    pub fn fetch_settings(&self) -> Result<FetchSettings> {
        if self.max_concurrency == 0 {
            return Err(AppError::Config("ARB_MAX_CONCURRENCY must be at least 1".to_string()));
        }
        if self.retry_max == 0 {
            return Err(AppError::Config("ARB_RETRY_MAX must be at least 1".to_string()));
        }
        let non_negative = |v: f64| v.is_finite() && v >= 0.0;
        if !non_negative(self.rate_limit_secs) || !non_negative(self.retry_base_secs) {
            return Err(AppError::Config(
                "ARB_RATE_LIMIT_SECS and ARB_RETRY_BASE_SECS must be non-negative".to_string(),
            ));
        }
        Ok(FetchSettings {
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.http_timeout_secs),
            max_concurrency: self.max_concurrency,
            rate_limit: Duration::from_secs_f64(self.rate_limit_secs),
            retry_max: self.retry_max,
            retry_base: Duration::from_secs_f64(self.retry_base_secs),
            retry_jitter: Duration::from_secs_f64(RETRY_JITTER_SECS),
        })
    }

    pub fn watch_seen_ttl(&self) -> Option<Duration> {
        match self.watch_seen_ttl_hours {
            0 => None,
            h => Some(Duration::from_secs(h * 3600)),
        }
    }
}

fn default_db_path() -> String {
    match std::env::var("HOME") {
        Ok(home) if !home.is_empty() => format!("{home}/.arb_finder.sqlite3"),
        _ => ".arb_finder.sqlite3".to_string(),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has an invalid value: {raw}"))),
        _ => Ok(default),
    }
}

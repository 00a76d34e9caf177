//! Configuration module for Linkwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::time::Duration;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listen port (default: 8080)
    pub port: u16,
    /// Database connection string (default: "sqlite3://linkwatch.db")
    pub database_url: String,
    /// Period between check cycles (default: 15s)
    pub check_interval: Duration,
    /// Global cap on in-flight probes (default: 8)
    pub max_concurrency: usize,
    /// Per-attempt HTTP timeout for probes (default: 5s)
    pub http_timeout: Duration,
    /// Max time to drain the HTTP server after a shutdown signal (default: 10s)
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            database_url: "sqlite3://linkwatch.db".to_string(),
            check_interval: Duration::from_secs(15),
            max_concurrency: 8,
            http_timeout: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PORT`: HTTP listen port
    /// - `DATABASE_URL`: `sqlite3://<path>` or a bare SQLite file path
    /// - `CHECK_INTERVAL`: period between check cycles, e.g. `15s`, `500ms`, `2m`
    /// - `MAX_CONCURRENCY`: global cap on in-flight probes
    /// - `HTTP_TIMEOUT`: per-attempt HTTP timeout
    /// - `SHUTDOWN_GRACE`: HTTP server drain budget on shutdown
    pub fn load() -> Self {
        let mut cfg = Self::default();

        if let Ok(port_str) = env::var("PORT") {
            if let Ok(port) = port_str.parse() {
                cfg.port = port;
            }
        }

        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.is_empty() {
                cfg.database_url = url;
            }
        }

        if let Ok(value) = env::var("CHECK_INTERVAL") {
            if let Some(interval) = parse_duration(&value) {
                cfg.check_interval = interval;
            }
        }

        if let Ok(value) = env::var("MAX_CONCURRENCY") {
            if let Ok(max) = value.parse::<usize>() {
                if max > 0 {
                    cfg.max_concurrency = max;
                }
            }
        }

        if let Ok(value) = env::var("HTTP_TIMEOUT") {
            if let Some(timeout) = parse_duration(&value) {
                cfg.http_timeout = timeout;
            }
        }

        if let Ok(value) = env::var("SHUTDOWN_GRACE") {
            if let Some(grace) = parse_duration(&value) {
                cfg.shutdown_grace = grace;
            }
        }

        cfg
    }

    /// Resolve the SQLite file path from `database_url`.
    ///
    /// Accepts `sqlite3://<path>` or a bare path. Postgres URLs are recognized
    /// but this build binds the store to SQLite, so they are a fatal
    /// configuration error.
    pub fn sqlite_path(&self) -> Result<String, String> {
        if let Some(path) = self.database_url.strip_prefix("sqlite3://") {
            Ok(path.to_string())
        } else if self.database_url.starts_with("postgres://")
            || self.database_url.starts_with("postgresql://")
        {
            Err(format!(
                "unsupported database engine in DATABASE_URL (this build is SQLite-only): {}",
                self.database_url
            ))
        } else {
            Ok(self.database_url.clone())
        }
    }
}

/// Parse a duration string with an optional `ms`/`s`/`m` suffix.
/// A bare number is taken as seconds.
fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(millis) = s.strip_suffix("ms") {
        millis.parse().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse().ok().map(Duration::from_secs)
    }
}

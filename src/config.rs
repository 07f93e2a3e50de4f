//! Configuration module for availwatch.
//!
//! Loads configuration from environment variables with sensible defaults.

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP port for the web server (default: 8080)
    pub http_port: u16,
    /// Path to the SQLite database file (default: "availwatch.db")
    pub db_path: String,
    /// Base URL of the availability backend (default: "http://localhost:8001")
    pub backend_url: String,
    /// How often the snapshot is re-fetched (default: 60s)
    pub snapshot_interval: Duration,
    /// Stream and status polling interval while a check runs (default: 2000ms)
    pub stream_interval: Duration,
    /// Per-request timeout against the backend (default: 10s)
    pub request_timeout: Duration,
    /// How long stats samples are kept (default: 7 days)
    pub history_retention: Duration,
    /// Concurrency passed to the backend when triggering a check (default: 100)
    pub max_concurrent: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            db_path: "availwatch.db".to_string(),
            backend_url: "http://localhost:8001".to_string(),
            snapshot_interval: Duration::from_secs(60),
            stream_interval: Duration::from_millis(2000),
            request_timeout: Duration::from_secs(10),
            history_retention: Duration::from_secs(7 * 24 * 3600),
            max_concurrent: 100,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `AVAILWATCH_HTTP_PORT`: HTTP port (default: 8080)
    /// - `AVAILWATCH_DB_PATH`: Database file path (default: "availwatch.db")
    /// - `AVAILWATCH_BACKEND_URL`: Backend base URL
    /// - `AVAILWATCH_SNAPSHOT_INTERVAL_SECS`: Snapshot refresh interval
    /// - `AVAILWATCH_STREAM_INTERVAL_MS`: Polling interval during a check
    /// - `AVAILWATCH_REQUEST_TIMEOUT_SECS`: Backend request timeout
    /// - `AVAILWATCH_HISTORY_RETENTION_HOURS`: Stats history retention
    /// - `AVAILWATCH_MAX_CONCURRENT`: Concurrency for triggered checks
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(port) = parse_var(&lookup, "AVAILWATCH_HTTP_PORT") {
            cfg.http_port = port;
        }

        if let Some(db_path) = lookup("AVAILWATCH_DB_PATH") {
            cfg.db_path = db_path;
        }

        if let Some(url) = lookup("AVAILWATCH_BACKEND_URL") {
            cfg.backend_url = url;
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "AVAILWATCH_SNAPSHOT_INTERVAL_SECS") {
            cfg.snapshot_interval = Duration::from_secs(secs.max(1));
        }

        if let Some(ms) = parse_var::<u64, _>(&lookup, "AVAILWATCH_STREAM_INTERVAL_MS") {
            cfg.stream_interval = Duration::from_millis(ms.max(100));
        }

        if let Some(secs) = parse_var::<u64, _>(&lookup, "AVAILWATCH_REQUEST_TIMEOUT_SECS") {
            cfg.request_timeout = Duration::from_secs(secs.max(1));
        }

        if let Some(hours) = parse_var::<u64, _>(&lookup, "AVAILWATCH_HISTORY_RETENTION_HOURS") {
            cfg.history_retention = Duration::from_secs(hours.max(1) * 3600);
        }

        if let Some(n) = parse_var::<u32, _>(&lookup, "AVAILWATCH_MAX_CONCURRENT") {
            cfg.max_concurrent = n.max(1);
        }

        cfg
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.http_port, 8080);
        assert_eq!(cfg.db_path, "availwatch.db");
        assert_eq!(cfg.stream_interval, Duration::from_millis(2000));
        assert_eq!(cfg.max_concurrent, 100);
    }

    #[test]
    fn test_overrides_and_invalid_values() {
        let vars: HashMap<&str, &str> = [
            ("AVAILWATCH_HTTP_PORT", "9090"),
            ("AVAILWATCH_BACKEND_URL", "http://backend:8001"),
            ("AVAILWATCH_STREAM_INTERVAL_MS", "500"),
            ("AVAILWATCH_SNAPSHOT_INTERVAL_SECS", "soon"),
            ("AVAILWATCH_HISTORY_RETENTION_HOURS", "48"),
        ]
        .into_iter()
        .collect();

        let cfg = ServerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.http_port, 9090);
        assert_eq!(cfg.backend_url, "http://backend:8001");
        assert_eq!(cfg.stream_interval, Duration::from_millis(500));
        assert_eq!(cfg.snapshot_interval, Duration::from_secs(60));
        assert_eq!(cfg.history_retention, Duration::from_secs(48 * 3600));
    }
}

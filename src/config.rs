use std::path::PathBuf;
use std::time::Duration;

use crate::schema::SchemaVersion;

#[derive(Clone, Debug)]
pub struct Config {
    /// Storage root; archives live under `<root>/events/<YYYYMMDD>/`.
    pub storage_root: PathBuf,
    pub lastupdate_url: String,
    /// Base URL for pointer entries that carry a bare filename.
    pub feed_base_url: String,
    pub fetch_timeout_secs: u64,
    pub fetch_every_secs: u64,
    pub cleanup_every_secs: u64,
    pub keep_days: u32,
    pub cache_ttl_secs: u64,
    pub default_threshold: f64,
    pub default_max_events: usize,
    /// Optional guard on range-query length in days. `None` accepts any range.
    pub max_range_days: Option<i64>,
    pub schema_version: SchemaVersion,
    pub ledger_path: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            storage_root: PathBuf::from(std::env::var("GEOALERTS_ROOT").unwrap_or_else(|_| "./gdelt".to_string())),
            lastupdate_url: std::env::var("FEED_LASTUPDATE_URL").unwrap_or_else(|_| "http://data.gdeltproject.org/gdeltv2/lastupdate.txt".to_string()),
            feed_base_url: std::env::var("FEED_BASE_URL").unwrap_or_else(|_| "http://data.gdeltproject.org/gdeltv2/".to_string()),
            fetch_timeout_secs: std::env::var("FETCH_TIMEOUT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(30),
            fetch_every_secs: std::env::var("FETCH_EVERY_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(900),
            cleanup_every_secs: std::env::var("CLEANUP_EVERY_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(86_400),
            keep_days: std::env::var("KEEP_DAYS").ok().and_then(|v| v.parse().ok()).unwrap_or(7),
            cache_ttl_secs: std::env::var("CACHE_TTL_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            default_threshold: std::env::var("SEVERITY_THRESHOLD").ok().and_then(|v| v.parse().ok()).unwrap_or(-5.0),
            default_max_events: std::env::var("MAX_EVENTS").ok().and_then(|v| v.parse().ok()).unwrap_or(1000),
            max_range_days: std::env::var("MAX_RANGE_DAYS").ok().and_then(|v| v.parse().ok()),
            schema_version: std::env::var("SCHEMA_VERSION").ok().and_then(|v| SchemaVersion::parse(&v)).unwrap_or_default(),
            ledger_path: std::env::var("LEDGER_PATH").unwrap_or_else(|_| "./geoalerts.sqlite".to_string()),
        }
    }

    /// Config rooted at `root` with every other field at its default.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: root.into(),
            lastupdate_url: "http://data.gdeltproject.org/gdeltv2/lastupdate.txt".to_string(),
            feed_base_url: "http://data.gdeltproject.org/gdeltv2/".to_string(),
            fetch_timeout_secs: 30,
            fetch_every_secs: 900,
            cleanup_every_secs: 86_400,
            keep_days: 7,
            cache_ttl_secs: 300,
            default_threshold: -5.0,
            default_max_events: 1000,
            max_range_days: None,
            schema_version: SchemaVersion::default(),
            ledger_path: "./geoalerts.sqlite".to_string(),
        }
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

pub fn now_ts() -> u64 {
    chrono::Utc::now().timestamp() as u64
}

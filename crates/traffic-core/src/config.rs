//! Deployment configuration loaded from the environment.
//!
//! Variables use the `TRAFFIC_` prefix (`TRAFFIC_DATA_DIR`,
//! `TRAFFIC_LIVE_CAPACITY`, ...). An optional `.env` file is loaded first.
//!
//! ```ignore
//! use traffic_core::TrafficConfig;
//!
//! let config = TrafficConfig::from_env()?;
//! println!("live buffer in {}", config.data_dir.display());
//! ```

use crate::error::{Result, TrafficError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TRAFFIC_";

fn default_data_dir() -> PathBuf {
    PathBuf::from("./traffic-data")
}

fn default_live_capacity() -> usize {
    4000
}

fn default_lock_timeout_ms() -> u64 {
    1000
}

fn default_settings_refresh_ms() -> u64 {
    1000
}

fn default_stats_table() -> String {
    "traffic_stats".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrafficConfig {
    /// Directory holding the live segments, the lock file and settings
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Durable store URL, defaults to a SQLite file under `data_dir`
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default)]
    pub site_id: u64,

    #[serde(default = "default_live_capacity")]
    pub live_capacity: usize,

    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,

    #[serde(default = "default_stats_table")]
    pub stats_table: String,

    /// How often running processes check `settings.json` for changes
    #[serde(default = "default_settings_refresh_ms")]
    pub settings_refresh_ms: u64,
}

impl Default for TrafficConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            database_url: None,
            site_id: 0,
            live_capacity: default_live_capacity(),
            lock_timeout_ms: default_lock_timeout_ms(),
            stats_table: default_stats_table(),
            settings_refresh_ms: default_settings_refresh_ms(),
        }
    }
}

impl TrafficConfig {
    /// Load `.env` if present, then read `TRAFFIC_*` variables.
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to load .env file");
            }
        }
        let config: Self = envy::prefixed(ENV_PREFIX).from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_site_id(mut self, site_id: u64) -> Self {
        self.site_id = site_id;
        self
    }

    pub fn with_live_capacity(mut self, capacity: usize) -> Self {
        self.live_capacity = capacity;
        self
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_settings_refresh(mut self, interval: Duration) -> Self {
        self.settings_refresh_ms = interval.as_millis() as u64;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.live_capacity == 0 {
            return Err(TrafficError::Config(
                "live_capacity must be greater than zero".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(TrafficError::Config(
                "lock_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stats_table.trim().is_empty() {
            return Err(TrafficError::Config("stats_table must not be empty".to_string()));
        }
        // Interpolated into SQL, so identifiers only.
        if !self
            .stats_table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(TrafficError::Config(format!(
                "stats_table '{}' must contain only letters, digits and underscores",
                self.stats_table
            )));
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite://{}?mode=rwc",
                self.data_dir.join("traffic.db").display()
            ),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn settings_refresh(&self) -> Duration {
        Duration::from_millis(self.settings_refresh_ms)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join("settings.json")
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

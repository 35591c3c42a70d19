//! Application configuration
//!
//! Loaded from a JSON file in the data directory. Every field has a
//! default so a missing or partial file still yields a runnable config.

use crate::error::{AppError, Result};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "config.json";

/// Capture scheduling and pacing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Whether scheduled captures run at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minutes between scheduled captures. 1440 aligns to local midnight.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,

    /// Fixed delay between consecutive price requests in a bulk capture
    #[serde(default = "default_fetch_delay_ms")]
    pub fetch_delay_ms: u64,

    /// Per-request timeout for a single price fetch
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Timezone used for wall-clock alignment of fire times
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_minutes: default_interval_minutes(),
            fetch_delay_ms: default_fetch_delay_ms(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            timezone: default_timezone(),
        }
    }
}

/// Outbound notification settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Discord webhook URL for capture summaries and spike alerts
    #[serde(default)]
    pub discord_webhook_url: Option<String>,
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Directory holding the store document and this config file
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            capture: CaptureConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `<data_dir>/config.json`.
    ///
    /// A missing file yields defaults; a present but malformed file is a
    /// hard error so a typo never silently reverts settings.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);

        let mut config = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|e| AppError::Config(format!("Failed to read {}: {}", path.display(), e)))?;
            serde_json::from_str::<AppConfig>(&raw)
                .map_err(|e| AppError::Config(format!("Invalid config file: {}", e)))?
        } else {
            AppConfig::default()
        };

        config.data_dir = data_dir.to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        if self.capture.interval_minutes == 0 {
            return Err(AppError::Config(
                "capture.interval_minutes must be at least 1".to_string(),
            ));
        }
        if self.capture.fetch_timeout_secs == 0 {
            return Err(AppError::Config(
                "capture.fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if let Some(webhook) = &self.notifications.discord_webhook_url {
            url::Url::parse(webhook)
                .map_err(|e| AppError::Config(format!("Invalid webhook URL: {}", e)))?;
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_minutes() -> u32 {
    1440
}

fn default_fetch_delay_ms() -> u64 {
    1500
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_timezone() -> Tz {
    chrono_tz::UTC
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".")
}

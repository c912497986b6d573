//! Configuration management for Beacon
//!
//! This module provides the configuration a host hands over at initialization:
//! where to keep data, which application is reporting, whether upload is on,
//! and the pacing rules of the upload task queue.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::{BeaconError, Result};

/// Beacon configuration
///
/// Either built by the host directly or loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Directory Beacon may write its own state into
    pub data_path: PathBuf,

    /// Application identifier used in ping upload paths
    pub package_name: String,

    /// Whether pings may be uploaded
    #[serde(default = "default_upload_enabled")]
    pub upload_enabled: bool,

    /// Number of recorded events that triggers submission of the owning ping
    #[serde(default)]
    pub max_events: Option<usize>,

    /// Keep ping-lifetime data in memory only
    #[serde(default)]
    pub delay_ping_lifetime_io: bool,

    /// Base URL pings are uploaded to
    #[serde(default = "default_server_endpoint")]
    pub server_endpoint: String,

    /// Upload queue pacing
    #[serde(default)]
    pub upload: UploadPolicy,
}

/// Pacing rules for the upload task queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPolicy {
    /// Maximum upload tasks handed out per rate-limit interval
    #[serde(default = "default_max_pings_per_interval")]
    pub max_pings_per_interval: u32,

    /// Length of the rate-limit interval
    #[serde(default = "default_rate_limit_interval_secs")]
    pub rate_limit_interval_secs: u64,

    /// Delay before a recoverable failure becomes eligible again
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Upper bound for the doubling backoff
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

// Default value providers
fn default_upload_enabled() -> bool {
    true
}

fn default_server_endpoint() -> String {
    "https://incoming.telemetry.example.org".to_string()
}

fn default_max_pings_per_interval() -> u32 {
    15
}

fn default_rate_limit_interval_secs() -> u64 {
    60
}

fn default_initial_backoff_ms() -> u64 {
    1_000
}

fn default_max_backoff_ms() -> u64 {
    5 * 60 * 1_000
}

impl Configuration {
    /// Create a configuration with defaults for everything but the required fields
    pub fn new(data_path: impl Into<PathBuf>, package_name: impl Into<String>) -> Self {
        Self {
            data_path: data_path.into(),
            package_name: package_name.into(),
            upload_enabled: default_upload_enabled(),
            max_events: None,
            delay_ping_lifetime_io: false,
            server_endpoint: default_server_endpoint(),
            upload: UploadPolicy::default(),
        }
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            BeaconError::InvalidConfig(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write this configuration as TOML
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| {
            BeaconError::Other(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject configurations Beacon cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.package_name.trim().is_empty() {
            return Err(BeaconError::InvalidConfig(
                "package_name must not be empty".to_string(),
            ));
        }
        if self.data_path.as_os_str().is_empty() {
            return Err(BeaconError::InvalidConfig(
                "data_path must not be empty".to_string(),
            ));
        }
        if self.max_events == Some(0) {
            return Err(BeaconError::InvalidConfig(
                "max_events must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl UploadPolicy {
    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_secs(self.rate_limit_interval_secs)
    }

    /// Backoff after the given number of consecutive recoverable failures (1-based)
    pub fn backoff_for(&self, failures: u32) -> Duration {
        let shift = failures.saturating_sub(1).min(32);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(1u64 << shift)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_pings_per_interval: default_max_pings_per_interval(),
            rate_limit_interval_secs: default_rate_limit_interval_secs(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

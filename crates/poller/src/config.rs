//! Poller configuration management

use crate::engine::DEFAULT_POLL_INTERVAL;
use crate::hid::{
    ACCEPTED_USAGES, DEFAULT_READ_TIMEOUT, DEFAULT_WRITE_READ_DELAY, DeviceMatcher, PRODUCT_ID,
    TransactionTiming, VENDOR_ID,
};
use crate::session::{DEFAULT_SHUTDOWN_TIMEOUT, SessionSettings};
use anyhow::{Context, Result, anyhow};
use protocol::UsagePair;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PollerConfig {
    #[serde(default)]
    pub poller: PollerSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub timing: TimingSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerSettings {
    #[serde(default = "PollerSettings::default_log_level")]
    pub log_level: String,
    /// Fire the start signal as soon as the consumer is up
    #[serde(default = "PollerSettings::default_auto_start")]
    pub auto_start: bool,
    #[serde(default)]
    pub service_mode: bool,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            auto_start: Self::default_auto_start(),
            service_mode: false,
        }
    }
}

impl PollerSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_auto_start() -> bool {
        true
    }
}

/// Identity of the device to poll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "DeviceSettings::default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "DeviceSettings::default_product_id")]
    pub product_id: u16,
    /// Accepted (usage_page, usage) pairs
    #[serde(default = "DeviceSettings::default_usages")]
    pub usages: Vec<UsagePair>,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            usages: Self::default_usages(),
        }
    }
}

impl DeviceSettings {
    fn default_vendor_id() -> u16 {
        VENDOR_ID
    }

    fn default_product_id() -> u16 {
        PRODUCT_ID
    }

    fn default_usages() -> Vec<UsagePair> {
        ACCEPTED_USAGES.to_vec()
    }

    pub fn matcher(&self) -> DeviceMatcher {
        DeviceMatcher {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            usages: self.usages.clone(),
        }
    }
}

/// Timing knobs, all in milliseconds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingSettings {
    #[serde(default = "TimingSettings::default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "TimingSettings::default_read_timeout")]
    pub read_timeout_ms: u64,
    #[serde(default = "TimingSettings::default_write_read_delay")]
    pub write_read_delay_ms: u64,
    #[serde(default = "TimingSettings::default_shutdown_timeout")]
    pub shutdown_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: Self::default_poll_interval(),
            read_timeout_ms: Self::default_read_timeout(),
            write_read_delay_ms: Self::default_write_read_delay(),
            shutdown_timeout_ms: Self::default_shutdown_timeout(),
        }
    }
}

impl TimingSettings {
    fn default_poll_interval() -> u64 {
        DEFAULT_POLL_INTERVAL.as_millis() as u64
    }

    fn default_read_timeout() -> u64 {
        DEFAULT_READ_TIMEOUT.as_millis() as u64
    }

    fn default_write_read_delay() -> u64 {
        DEFAULT_WRITE_READ_DELAY.as_millis() as u64
    }

    fn default_shutdown_timeout() -> u64 {
        DEFAULT_SHUTDOWN_TIMEOUT.as_millis() as u64
    }

    pub fn transaction_timing(&self) -> TransactionTiming {
        TransactionTiming {
            write_read_delay: Duration::from_millis(self.write_read_delay_ms),
            read_timeout: Duration::from_millis(self.read_timeout_ms),
        }
    }
}

impl PollerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).as_ref())
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/hid-poller/poller.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: PollerConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("{:#}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("hid-poller").join("poller.toml")
        } else {
            PathBuf::from(".config/hid-poller/poller.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.poller.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.poller.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.device.usages.is_empty() {
            return Err(anyhow!("device.usages must list at least one usage pair"));
        }

        if self.timing.poll_interval_ms == 0 {
            return Err(anyhow!("timing.poll_interval_ms must be greater than 0"));
        }

        if self.timing.read_timeout_ms == 0 {
            return Err(anyhow!("timing.read_timeout_ms must be greater than 0"));
        }

        Ok(())
    }

    /// Runtime parameters for [`crate::session::Session::start`]
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            matcher: self.device.matcher(),
            timing: self.timing.transaction_timing(),
            poll_interval: Duration::from_millis(self.timing.poll_interval_ms),
            shutdown_timeout: Duration::from_millis(self.timing.shutdown_timeout_ms),
        }
    }
}

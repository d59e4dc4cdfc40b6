//! # Relay Configuration
//!
//! Everything tunable lives in one TOML file. Every section and field has a
//! default, so an empty file is a valid configuration apart from the serial
//! port paths, which almost always need setting.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [master]
//! port = "/dev/ttyS1"
//! baud = 115200
//!
//! [downstream]
//! port = "/dev/ttyS2"
//!
//! [time]
//! utc_offset_secs = 10800
//! refresh_interval_ms = 30000
//!
//! [delivery]
//! target_ms = 50
//! tolerance_ms = 5
//!
//! [watchdog]
//! timeout_secs = 60
//! feed_interval_ms = 1000
//! ```
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use ntp_relay::config::Config;
//! let config: Config = toml::from_str("[delivery]\ntarget_ms = 100\n").unwrap();
//! assert_eq!(config.delivery.target_ms, 100);
//! assert_eq!(config.delivery.tolerance_ms, 5);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_master_link")]
    pub master: SerialLinkConfig,
    #[serde(default = "default_downstream_link")]
    pub downstream: SerialLinkConfig,
    #[serde(default)]
    pub time: TimeConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub watchdog: WatchdogConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            master: default_master_link(),
            downstream: default_downstream_link(),
            time: TimeConfig::default(),
            delivery: DeliveryConfig::default(),
            failover: FailoverConfig::default(),
            retry: RetryConfig::default(),
            watchdog: WatchdogConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// One UART link.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SerialLinkConfig {
    #[serde(default)]
    pub port: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// How long a link probe waits for a reply line.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for SerialLinkConfig {
    fn default() -> Self {
        Self {
            port: "".to_string(),
            baud: default_baud(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

/// Time queries and the precision clock.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeConfig {
    #[serde(default = "default_ntp_port")]
    pub ntp_port: u16,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
    #[serde(default = "default_refresh_interval_ms")]
    pub refresh_interval_ms: u64,
    /// Offset applied when rendering date and time frames.
    #[serde(default = "default_utc_offset_secs")]
    pub utc_offset_secs: i64,
    /// Epochs below this are treated as "no valid time".
    #[serde(default = "default_min_plausible_epoch")]
    pub min_plausible_epoch: u64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            ntp_port: default_ntp_port(),
            query_timeout_ms: default_query_timeout_ms(),
            refresh_interval_ms: default_refresh_interval_ms(),
            utc_offset_secs: default_utc_offset_secs(),
            min_plausible_epoch: default_min_plausible_epoch(),
        }
    }
}

/// Downstream frame timing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_target_ms")]
    pub target_ms: u16,
    #[serde(default = "default_tolerance_ms")]
    pub tolerance_ms: u16,
    /// Main loop period.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            target_ms: default_target_ms(),
            tolerance_ms: default_tolerance_ms(),
            tick_ms: default_tick_ms(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FailoverConfig {
    #[serde(default = "default_fail_threshold")]
    pub threshold: u32,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            threshold: default_fail_threshold(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_retry_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchdogConfig {
    #[serde(default = "default_wdt_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_feed_interval_ms")]
    pub feed_interval_ms: u64,
    /// Where the host watchdog leaves its reset-cause marker.
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_wdt_timeout_secs(),
            feed_interval_ms: default_feed_interval_ms(),
            state_dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// Startup wait for the link to come up.
    #[serde(default = "default_link_wait_ms")]
    pub link_wait_ms: u64,
    #[serde(default = "default_link_poll_ms")]
    pub poll_ms: u64,
    #[serde(default = "default_link_check_interval_ms")]
    pub check_interval_ms: u64,
    /// Any routable address; only used to ask the OS for a route.
    #[serde(default = "default_probe_target")]
    pub probe_target: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            link_wait_ms: default_link_wait_ms(),
            poll_ms: default_link_poll_ms(),
            check_interval_ms: default_link_check_interval_ms(),
            probe_target: default_probe_target(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Reject combinations the loop cannot honour.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.delivery;
        if d.tick_ms == 0 {
            return Err(ConfigError::Invalid("delivery.tick_ms must be positive".into()));
        }
        if u64::from(d.tolerance_ms) <= d.tick_ms {
            return Err(ConfigError::Invalid(format!(
                "delivery.tolerance_ms ({}) must exceed the tick period ({}ms) or seconds get skipped",
                d.tolerance_ms, d.tick_ms
            )));
        }
        if d.target_ms < d.tolerance_ms {
            return Err(ConfigError::Invalid(
                "delivery.target_ms must not be smaller than tolerance_ms".into(),
            ));
        }
        if u32::from(d.target_ms) + u32::from(d.tolerance_ms) >= 1000 {
            return Err(ConfigError::Invalid(
                "delivery window must end before the next second".into(),
            ));
        }
        let w = &self.watchdog;
        if w.feed_interval_ms == 0 || w.feed_interval_ms > crate::watchdog::MAX_FEED_INTERVAL_MS {
            return Err(ConfigError::Invalid(format!(
                "watchdog.feed_interval_ms must be between 1 and {}",
                crate::watchdog::MAX_FEED_INTERVAL_MS
            )));
        }
        if w.feed_interval_ms >= w.timeout_secs.saturating_mul(1000) {
            return Err(ConfigError::Invalid(
                "watchdog.feed_interval_ms must be shorter than the timeout".into(),
            ));
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid("retry.attempts must be positive".into()));
        }
        if self.failover.threshold == 0 {
            return Err(ConfigError::Invalid("failover.threshold must be positive".into()));
        }
        if self.time.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid("time.refresh_interval_ms must be positive".into()));
        }
        self.log_level()?;
        Ok(())
    }

    pub fn log_level(&self) -> Result<tracing::Level, ConfigError> {
        parse_log_level(&self.logging.level)
    }
}

pub fn parse_log_level(level: &str) -> Result<tracing::Level, ConfigError> {
    tracing::Level::from_str(level)
        .map_err(|_| ConfigError::Invalid(format!("unknown log level '{}'", level)))
}

/// Load and validate a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

fn default_master_link() -> SerialLinkConfig {
    SerialLinkConfig {
        port: "/dev/ttyS1".to_string(),
        ..SerialLinkConfig::default()
    }
}
fn default_downstream_link() -> SerialLinkConfig {
    SerialLinkConfig {
        port: "/dev/ttyS2".to_string(),
        ..SerialLinkConfig::default()
    }
}
fn default_baud() -> u32 { 115_200 }
fn default_probe_timeout_ms() -> u64 { 1000 }
fn default_ntp_port() -> u16 { 123 }
fn default_query_timeout_ms() -> u64 { 1000 }
fn default_refresh_interval_ms() -> u64 { crate::clock::DEFAULT_REFRESH_INTERVAL_MS }
fn default_utc_offset_secs() -> i64 { 10_800 }
fn default_min_plausible_epoch() -> u64 { 100_000 }
fn default_target_ms() -> u16 { crate::scheduler::delivery::DEFAULT_TARGET_MS }
fn default_tolerance_ms() -> u16 { crate::scheduler::delivery::DEFAULT_TOLERANCE_MS }
fn default_tick_ms() -> u64 { 1 }
fn default_status_interval_ms() -> u64 { crate::scheduler::delivery::DEFAULT_STATUS_INTERVAL_MS }
fn default_fail_threshold() -> u32 { crate::failover::DEFAULT_FAIL_THRESHOLD }
fn default_retry_attempts() -> u32 { crate::scheduler::retry::DEFAULT_ATTEMPTS }
fn default_retry_delay_ms() -> u64 { crate::scheduler::retry::DEFAULT_DELAY_MS }
fn default_wdt_timeout_secs() -> u64 { crate::watchdog::DEFAULT_TIMEOUT_SECS }
fn default_feed_interval_ms() -> u64 { crate::watchdog::DEFAULT_FEED_INTERVAL_MS }
fn default_state_dir() -> PathBuf { PathBuf::from("state") }
fn default_link_wait_ms() -> u64 { 30_000 }
fn default_link_poll_ms() -> u64 { 500 }
fn default_link_check_interval_ms() -> u64 { 30_000 }
fn default_probe_target() -> String { "8.8.8.8:53".to_string() }
fn default_store_path() -> PathBuf { PathBuf::from("state/relay-store.json") }
fn default_log_level() -> String { "info".to_string() }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.master.port, "/dev/ttyS1");
        assert_eq!(config.downstream.baud, 115_200);
        assert_eq!(config.delivery.target_ms, 50);
        assert_eq!(config.time.utc_offset_secs, 10_800);
        assert_eq!(config.retry.attempts, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tolerance_must_exceed_tick() {
        let config: Config = toml::from_str("[delivery]\ntick_ms = 5\ntolerance_ms = 5\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn feed_interval_is_bounded() {
        let config: Config = toml::from_str("[watchdog]\nfeed_interval_ms = 6000\n").unwrap();
        assert!(config.validate().is_err());
        let config: Config =
            toml::from_str("[watchdog]\ntimeout_secs = 1\nfeed_interval_ms = 1000\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_log_level_is_rejected() {
        let config: Config = toml::from_str("[logging]\nlevel = \"loud\"\n").unwrap();
        assert!(config.validate().is_err());
        assert_eq!(parse_log_level("debug").unwrap(), tracing::Level::DEBUG);
    }
}

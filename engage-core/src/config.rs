//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/engage/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/engage/` (~/.config/engage/)
//! - Data: `$XDG_DATA_HOME/engage/` (~/.local/share/engage/)
//! - State/Logs: `$XDG_STATE_HOME/engage/` (~/.local/state/engage/)

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_DATA_HOME or ~/.local/share
fn xdg_data_home() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/share"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Tracking collector configuration
    #[serde(default)]
    pub collector: CollectorConfig,

    /// Realtime channel configuration
    #[serde(default)]
    pub channel: ChannelConfig,

    /// Campaign targeting configuration
    #[serde(default)]
    pub targeting: TargetingConfig,

    /// Campaign frequency capping
    #[serde(default)]
    pub frequency: FrequencyConfig,

    /// Dashboard notification settings
    #[serde(default)]
    pub notifications: NotificationConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Tracking collector configuration
///
/// When enabled, tracking beacons are posted to `server_url`.
#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    /// Enable/disable beacon delivery
    #[serde(default)]
    pub enabled: bool,

    /// Collector base URL (e.g., `https://api.example.com`)
    pub server_url: Option<String>,

    /// HTTP request timeout in seconds
    #[serde(default = "default_collector_timeout")]
    pub timeout_secs: u64,

    /// Seconds between time-on-page reports while the page is visible
    #[serde(default = "default_time_on_page_interval")]
    pub time_on_page_interval_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server_url: None,
            timeout_secs: default_collector_timeout(),
            time_on_page_interval_secs: default_time_on_page_interval(),
        }
    }
}

impl CollectorConfig {
    /// Check if collector is properly configured and enabled
    pub fn is_ready(&self) -> bool {
        self.enabled && self.server_url.is_some()
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if self.server_url.is_none() {
            return Err(Error::Config(
                "collector.server_url is required when collector is enabled".to_string(),
            ));
        }
        if self.time_on_page_interval_secs == 0 {
            return Err(Error::Config(
                "collector.time_on_page_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between time-on-page reports
    pub fn time_on_page_interval(&self) -> Duration {
        Duration::from_secs(self.time_on_page_interval_secs)
    }
}

fn default_collector_timeout() -> u64 {
    10
}

fn default_time_on_page_interval() -> u64 {
    30
}

/// Realtime channel configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChannelConfig {
    /// Socket server base URL (e.g., `https://realtime.example.com`)
    pub socket_url: Option<String>,
    /// Organization the dashboard viewer belongs to
    pub organization_id: Option<String>,
    /// Chatbot the dashboard viewer is watching
    pub chatbot_id: Option<String>,
    /// JSON `{"ip": ...}` service a widget visitor reports its public IP from
    pub ip_lookup_url: Option<String>,
}

/// How the targeting evaluator treats condition fields it does not understand
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFieldPolicy {
    /// Unknown fields are a trivial pass
    #[default]
    Pass,
    /// Unknown fields never match
    Fail,
}

/// Campaign targeting configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TargetingConfig {
    /// Seconds of dwell on a first visit before the visitor counts as returning
    #[serde(default = "default_returning_delay")]
    pub returning_delay_secs: u64,

    /// Seconds between campaign re-evaluations for time-based triggers
    #[serde(default = "default_recheck_interval")]
    pub recheck_interval_secs: u64,

    /// Policy for condition fields other than the URL fields
    #[serde(default)]
    pub unknown_condition_fields: UnknownFieldPolicy,
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self {
            returning_delay_secs: default_returning_delay(),
            recheck_interval_secs: default_recheck_interval(),
            unknown_condition_fields: UnknownFieldPolicy::default(),
        }
    }
}

impl TargetingConfig {
    /// Dwell on a first visit before the visitor counts as returning
    pub fn returning_delay(&self) -> Duration {
        Duration::from_secs(self.returning_delay_secs)
    }

    /// Interval between campaign re-evaluations
    pub fn recheck_interval(&self) -> Duration {
        Duration::from_secs(self.recheck_interval_secs)
    }
}

fn default_returning_delay() -> u64 {
    5
}

fn default_recheck_interval() -> u64 {
    5
}

/// Campaign frequency capping configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FrequencyConfig {
    /// Apply `max_views`/`cooldown_hours` to recurring campaigns too
    #[serde(default)]
    pub cap_recurring: bool,

    /// Maximum impressions per visitor for capped campaigns
    #[serde(default = "default_max_views")]
    pub max_views: u32,

    /// Minimum hours between impressions for capped campaigns
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u64,
}

impl Default for FrequencyConfig {
    fn default() -> Self {
        Self {
            cap_recurring: false,
            max_views: default_max_views(),
            cooldown_hours: default_cooldown_hours(),
        }
    }
}

fn default_max_views() -> u32 {
    3
}

fn default_cooldown_hours() -> u64 {
    24
}

/// Dashboard notification configuration
#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    /// A connecting visitor created less than this many ms ago is announced as new
    #[serde(default = "default_new_visitor_window")]
    pub new_visitor_window_ms: u64,

    /// Voice names to prefer for announcements, best match first
    #[serde(default = "default_preferred_voices")]
    pub preferred_voices: Vec<String>,

    /// Text spoken when a new visitor arrives
    #[serde(default = "default_announcement_text")]
    pub announcement_text: String,

    /// Alert sound volume (0.0 - 1.0)
    #[serde(default = "default_sound_volume")]
    pub sound_volume: f32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            new_visitor_window_ms: default_new_visitor_window(),
            preferred_voices: default_preferred_voices(),
            announcement_text: default_announcement_text(),
            sound_volume: default_sound_volume(),
        }
    }
}

fn default_new_visitor_window() -> u64 {
    10_000
}

fn default_preferred_voices() -> Vec<String> {
    vec![
        "Google UK English Female".to_string(),
        "Google US English Female".to_string(),
        "Microsoft Zira".to_string(),
    ]
}

fn default_announcement_text() -> String {
    "New user came".to_string()
}

fn default_sound_volume() -> f32 {
    0.7
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Maximum number of log files to keep
    #[serde(default = "default_max_log_files")]
    pub max_files: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            max_files: default_max_log_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_log_files() -> usize {
    5
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        config.collector.validate()?;
        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/engage/config.toml` (~/.config/engage/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("engage").join("config.toml")
    }

    /// Returns the data directory path (for the SQLite store)
    pub fn data_dir() -> PathBuf {
        xdg_data_home().join("engage")
    }

    /// Returns the state directory path (for logs)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("engage")
    }

    /// Returns the database file path
    ///
    /// `$XDG_DATA_HOME/engage/data.db` (~/.local/share/engage/data.db)
    pub fn database_path() -> PathBuf {
        Self::data_dir().join("data.db")
    }

    /// Returns the log file path
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("engage.log")
    }
}

//! Runtime configuration.
//!
//! Values come from an optional TOML file (missing file → defaults), then
//! environment variables override individual fields. Credentials have no
//! defaults and are checked by [`ShieldConfig::validate`].

use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::detector::{DetectorConfig, Percentage};
use crate::error::ConfigError;
use crate::security_level::SecurityLevel;

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".loadshield/config.toml";
const DEFAULT_CPU_THRESHOLD: Percentage = 80;
const DEFAULT_HIGH_CPU_DURATION_SECS: u64 = 15;
const DEFAULT_NORMAL_COOLDOWN_SECS: u64 = 60;
const DEFAULT_MONITORING_INTERVAL_SECS: u64 = 5;
const DEFAULT_CLOUDFLARE_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
const DEFAULT_TELEGRAM_BASE_URL: &str = "https://api.telegram.org/bot";
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOG_FILE_PATH: &str = "./logs/monitor.log";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MonitoringConfig {
    #[serde(default = "default_cpu_threshold")]
    pub cpu_threshold: Percentage,
    #[serde(default = "default_high_cpu_duration_secs")]
    pub high_cpu_duration_secs: u64,
    #[serde(default = "default_normal_cooldown_secs")]
    pub normal_cooldown_secs: u64,
    #[serde(default = "default_monitoring_interval_secs")]
    pub monitoring_interval_secs: u64,
}

impl MonitoringConfig {
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            high_threshold: self.cpu_threshold,
            high_duration: Duration::from_secs(self.high_cpu_duration_secs),
            normal_cooldown: Duration::from_secs(self.normal_cooldown_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.monitoring_interval_secs)
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cpu_threshold: DEFAULT_CPU_THRESHOLD,
            high_cpu_duration_secs: DEFAULT_HIGH_CPU_DURATION_SECS,
            normal_cooldown_secs: DEFAULT_NORMAL_COOLDOWN_SECS,
            monitoring_interval_secs: DEFAULT_MONITORING_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CloudflareConfig {
    #[serde(default)]
    pub api_token: String,
    #[serde(default)]
    pub zone_id: String,
    #[serde(default = "default_security_level")]
    pub default_security_level: SecurityLevel,
    #[serde(default = "default_cloudflare_base_url")]
    pub base_url: String,
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            zone_id: String::new(),
            default_security_level: default_security_level(),
            base_url: default_cloudflare_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_base_url")]
    pub base_url: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            base_url: default_telegram_base_url(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default = "default_log_file_path")]
    pub log_file_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_to_file: false,
            log_file_path: default_log_file_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default, PartialEq, Eq)]
pub struct ShieldConfig {
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub cloudflare: CloudflareConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ShieldConfig {
    /// Loads the file (default path when `None`), applies process environment
    /// overrides, and validates.
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = match path {
            Some(path) => path,
            None => default_config_path()?,
        };
        let mut config = Self::from_file(&config_path)?;
        config.apply_env_overrides(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str::<ShieldConfig>(&content).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            details: err.to_string(),
        })
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(value) = positive_number(&lookup, "CPU_THRESHOLD") {
            match Percentage::try_from(value) {
                Ok(threshold) => self.monitoring.cpu_threshold = threshold,
                Err(_) => warn!(value, "Ignoring out-of-range CPU_THRESHOLD"),
            }
        }
        if let Some(value) = positive_number(&lookup, "HIGH_CPU_DURATION") {
            self.monitoring.high_cpu_duration_secs = value;
        }
        if let Some(value) = positive_number(&lookup, "COOLDOWN_PERIOD") {
            self.monitoring.normal_cooldown_secs = value;
        }
        if let Some(value) = positive_number(&lookup, "MONITORING_INTERVAL") {
            self.monitoring.monitoring_interval_secs = value;
        }

        if let Some(value) = non_empty("CLOUDFLARE_API_TOKEN") {
            self.cloudflare.api_token = value;
        }
        if let Some(value) = non_empty("CLOUDFLARE_ZONE_ID") {
            self.cloudflare.zone_id = value;
        }
        if let Some(value) = non_empty("CLOUDFLARE_DEFAULT_SECURITY_LEVEL") {
            self.cloudflare.default_security_level = value.parse()?;
        }
        if let Some(value) = non_empty("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = value;
        }
        if let Some(value) = non_empty("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = value;
        }

        if let Some(value) = non_empty("LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = lookup("LOG_TO_FILE") {
            self.logging.log_to_file = value.trim() == "true";
        }
        if let Some(value) = non_empty("LOG_FILE_PATH") {
            self.logging.log_file_path = PathBuf::from(value);
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let credentials = [
            ("cloudflare.api_token", &self.cloudflare.api_token),
            ("cloudflare.zone_id", &self.cloudflare.zone_id),
            ("telegram.bot_token", &self.telegram.bot_token),
            ("telegram.chat_id", &self.telegram.chat_id),
        ];
        if let Some((name, _)) = credentials
            .iter()
            .find(|(_, value)| value.trim().is_empty())
        {
            return Err(ConfigError::MissingCredential(*name));
        }

        if self.monitoring.cpu_threshold > 100 {
            return Err(ConfigError::Invalid {
                field: "monitoring.cpu_threshold",
                reason: format!("{} is above 100%", self.monitoring.cpu_threshold),
            });
        }
        if self.monitoring.monitoring_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "monitoring.monitoring_interval_secs",
                reason: "interval must be at least one second".to_string(),
            });
        }
        Ok(())
    }
}

pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Zero and unparsable values fall back to the current setting.
fn positive_number<F>(lookup: &F, key: &str) -> Option<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(0) | Err(_) => {
            warn!(key, value = %raw, "Ignoring invalid numeric override");
            None
        }
        Ok(value) => Some(value),
    }
}

fn default_cpu_threshold() -> Percentage {
    DEFAULT_CPU_THRESHOLD
}

fn default_high_cpu_duration_secs() -> u64 {
    DEFAULT_HIGH_CPU_DURATION_SECS
}

fn default_normal_cooldown_secs() -> u64 {
    DEFAULT_NORMAL_COOLDOWN_SECS
}

fn default_monitoring_interval_secs() -> u64 {
    DEFAULT_MONITORING_INTERVAL_SECS
}

fn default_security_level() -> SecurityLevel {
    SecurityLevel::Medium
}

fn default_cloudflare_base_url() -> String {
    DEFAULT_CLOUDFLARE_BASE_URL.to_string()
}

fn default_telegram_base_url() -> String {
    DEFAULT_TELEGRAM_BASE_URL.to_string()
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_log_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE_PATH)
}

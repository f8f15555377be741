//! Configuration for the knee telemetry service.

use crate::generation::{GenerationConfig, DEFAULT_TIMEOUT};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest accepted lookback, in days.
pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// Main configuration for the service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub host: String,

    /// Port to bind to (0 for random)
    pub port: u16,

    /// Path of the JSON model file
    pub model_path: PathBuf,

    /// Which repository backs the telemetry store
    pub store: StoreBackend,

    /// SQLite database file (sqlite backend only)
    pub database_path: PathBuf,

    /// Trailing window for history, assessment and chat, in days
    pub window_days: i64,

    /// Number of readings embedded in an assistant prompt
    pub digest_limit: usize,

    /// IANA timezone used to render digest timestamps
    pub display_timezone: String,

    /// Text-generation service settings
    pub generation: GenerationSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = Self::data_dir();

        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            model_path: data_dir.join("model.json"),
            store: StoreBackend::Sqlite,
            database_path: data_dir.join("telemetry.db"),
            window_days: crate::core::DEFAULT_WINDOW_DAYS,
            digest_limit: crate::core::DEFAULT_DIGEST_LIMIT,
            display_timezone: "UTC".to_string(),
            generation: GenerationSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `config_path`, or defaults when it is absent.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = serde_json::from_str(&content)
                .map_err(|e| ConfigError::Parse(e.to_string()))?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `config_path`, creating parent directories.
    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(config_path, content)?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("knee-telemetry")
            .join("config.json")
    }

    fn data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("knee-telemetry")
    }

    /// Ensure the database directory exists.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.database_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_WINDOW_DAYS).contains(&self.window_days) {
            return Err(ConfigError::Invalid(format!(
                "window_days must be between 1 and {MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }
        if self.digest_limit == 0 {
            return Err(ConfigError::Invalid("digest_limit must be at least 1".into()));
        }
        self.timezone()?;
        Ok(())
    }

    /// Parsed display timezone.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.display_timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::Invalid(format!("unknown timezone '{}'", self.display_timezone)))
    }
}

/// Repository selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

/// Text-generation settings as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    #[serde(with = "duration_serde")]
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            model: "gemini-1.5-pro".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl GenerationSettings {
    /// Resolve the client configuration, reading the key from the environment.
    ///
    /// A missing key is not fatal: requests will fail upstream and surface as
    /// upstream errors.
    pub fn resolve(&self) -> GenerationConfig {
        let api_key = std::env::var(&self.api_key_env).unwrap_or_else(|_| {
            tracing::warn!("{} is not set; chat replies will fail", self.api_key_env);
            String::new()
        });
        GenerationConfig::new(&self.base_url, &self.model, api_key).with_timeout(self.timeout)
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

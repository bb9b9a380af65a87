//! Configuration management for ffdown.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::cache::CACHE_FILENAME;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application name used for config and cache directories.
const APP_NAME: &str = "ffdown";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Identity presented by default. A mobile one, so the desktop site can
/// still be reached by translating it.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Android 15; Mobile; rv:145.0) Gecko/145.0 Firefox/145.0";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP client settings.
    pub http: HttpConfig,

    /// Bot challenge browser settings.
    pub challenge: ChallengeConfig,

    /// Resume cache settings.
    pub cache: CacheConfig,

    /// Output settings.
    pub output: OutputConfig,
}

/// HTTP client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// User-Agent sent with every request.
    pub user_agent: String,

    /// Request timeout in seconds.
    pub timeout_sec: u64,

    /// Delay between web requests in seconds.
    pub delay_between_requests_sec: f64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_sec: 30,
            delay_between_requests_sec: 0.5,
        }
    }
}

/// Browser used to get past bot challenges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChallengeConfig {
    /// Run the browser without a window.
    pub headless: bool,

    /// Path to a Chrome/Chromium executable. Auto-detected when unset.
    pub chrome_path: Option<PathBuf>,

    /// How often to re-check the page while a challenge is showing.
    pub poll_interval_ms: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            poll_interval_ms: 1000,
        }
    }
}

/// Resume cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache file. Defaults to the platform cache directory.
    pub path: Option<PathBuf>,
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for finished books.
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.user_agent.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "http.user_agent".to_string(),
                message: "must not be empty".to_string(),
            });
        }

        if self.http.timeout_sec == 0 {
            return Err(ConfigError::InvalidValue {
                key: "http.timeout_sec".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        let delay = self.http.delay_between_requests_sec;
        if !delay.is_finite() || delay < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "http.delay_between_requests_sec".to_string(),
                message: "must be a finite number of seconds, not negative".to_string(),
            });
        }

        if self.challenge.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "challenge.poll_interval_ms".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }

    /// Returns the effective cache file, using config or default.
    pub fn cache_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.cache.path {
            return Ok(path.clone());
        }

        dirs::cache_dir()
            .map(|p| p.join(APP_NAME).join(CACHE_FILENAME))
            .ok_or(ConfigError::NoConfigDir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{NamedTempFile, TempDir};

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http.user_agent, DEFAULT_USER_AGENT);
        assert!(config.challenge.headless);
        assert_eq!(config.challenge.poll_interval_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_round_trip() {
        let mut config = Config::default();
        config.http.timeout_sec = 5;
        config.cache.path = Some(PathBuf::from("/tmp/ffdown.json"));
        let file = NamedTempFile::new().unwrap();

        config.save_to(file.path()).unwrap();

        let loaded = Config::load_from(file.path()).unwrap();
        assert_eq!(loaded.http.timeout_sec, 5);
        assert_eq!(loaded.cache.path, config.cache.path);
        assert_eq!(loaded.http.user_agent, config.http.user_agent);
    }

    #[test]
    fn test_missing_file_creates_default() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sub").join(CONFIG_FILENAME);
        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.http.timeout_sec, 30);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[challenge]\nheadless = false\n").unwrap();
        let config = Config::load_from(file.path()).unwrap();
        assert!(!config.challenge.headless);
        assert_eq!(config.http.user_agent, DEFAULT_USER_AGENT);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.http.user_agent = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.challenge.poll_interval_ms = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "challenge.poll_interval_ms"
        ));
    }

    #[test]
    fn test_delay_must_be_finite() {
        for delay in [f64::INFINITY, f64::NAN, -1.0] {
            let mut config = Config::default();
            config.http.delay_between_requests_sec = delay;
            assert!(matches!(
                config.validate(),
                Err(ConfigError::InvalidValue { key, .. }) if key == "http.delay_between_requests_sec"
            ));
        }

        let config: Config = toml::from_str("[http]\ndelay_between_requests_sec = inf\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cache_path_override() {
        let mut config = Config::default();
        config.cache.path = Some(PathBuf::from("custom.json"));
        assert_eq!(config.cache_path().unwrap(), PathBuf::from("custom.json"));
    }
}

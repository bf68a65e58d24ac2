//! Configuration module
//!
//! Handles loading and managing configuration.

mod env;
mod profile;

pub use env::{print_env_help, EnvConfig};
pub use profile::{profile_file_name, ProfileManager, ProfileSelection};
#[cfg(test)]
pub use env::{EnvBuilder, EnvGuard};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::executor::{BatchOptions, DEFAULT_MAILBOX_CAPACITY};
use crate::http::{DEFAULT_AUTH, DEFAULT_EXCHANGE, DEFAULT_HOST};

/// Directory under the home directory holding settings and test cases
const APP_DIR: &str = ".mqprobe";

/// Keys accepted by `config get` / `config set`
pub const CONFIG_KEYS: &[&str] = &[
    "host",
    "auth",
    "exchange",
    "tests_dir",
    "concurrency",
    "delay_ms",
    "timeout_secs",
    "log_buffer",
];

/// Application configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Management API base URL
    pub host: String,

    /// Basic auth credentials, base64 encoded `user:password`
    pub auth: String,

    /// Exchange messages are published through
    pub exchange: String,

    /// Directory holding test case files (defaults to ~/.mqprobe/tests)
    pub tests_dir: Option<PathBuf>,

    /// Default number of tests in flight for batch runs
    pub concurrency: usize,

    /// Default delay before each batch task after the first
    pub delay_ms: u64,

    /// HTTP timeout in seconds
    pub timeout_secs: u64,

    /// Events buffered per log subscriber before dropping
    pub log_buffer: usize,

    /// Active profile, a settings file beside this one that takes over
    /// every other setting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let batch = BatchOptions::default();
        Self {
            host: DEFAULT_HOST.to_string(),
            auth: DEFAULT_AUTH.to_string(),
            exchange: DEFAULT_EXCHANGE.to_string(),
            tests_dir: None,
            concurrency: batch.concurrency,
            delay_ms: batch.delay.as_millis() as u64,
            timeout_secs: 30,
            log_buffer: DEFAULT_MAILBOX_CAPACITY,
            profile: None,
        }
    }
}

impl AppConfig {
    /// Default settings file location
    pub fn default_path() -> PathBuf {
        app_dir().join("settings.json")
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content =
            std::fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

        let config: Self = if is_yaml_file(path.as_ref()) {
            serde_yaml::from_str(&content).context("Failed to parse YAML config")?
        } else {
            serde_json::from_str(&content).context("Failed to parse JSON config")?
        };

        Ok(config)
    }

    /// Load from file if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load the settings in effect: the active profile when the settings
    /// file names one, the settings file itself otherwise
    pub fn load_effective(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = Self::load_or_default(path)?;
        let Some(profile) = settings.profile.clone() else {
            return Ok(settings);
        };

        let profile_path = ProfileManager::for_settings(path).profile_path(&profile)?;
        if !profile_path.exists() {
            bail!(
                "Active profile {profile} not found at {}, run `mqprobe config select` to pick another",
                profile_path.display()
            );
        }
        let mut config = Self::load(&profile_path)
            .with_context(|| format!("Failed to load profile {profile}"))?;
        config.profile = Some(profile);
        Ok(config)
    }

    /// File that `config set` writes to: the active profile if any
    pub fn active_path(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        match Self::load_or_default(path)?.profile {
            Some(profile) => ProfileManager::for_settings(path).profile_path(&profile),
            None => Ok(path.to_path_buf()),
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = if is_yaml_file(path.as_ref()) {
            serde_yaml::to_string(self).context("Failed to serialize config")?
        } else {
            serde_json::to_string_pretty(self).context("Failed to serialize config")?
        };

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        std::fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Apply environment variable overrides
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(host) = &env.host {
            self.host = host.clone();
        }
        if let Some(auth) = &env.auth {
            self.auth = auth.clone();
        }
        if let Some(exchange) = &env.exchange {
            self.exchange = exchange.clone();
        }
        if let Some(dir) = &env.tests_dir {
            self.tests_dir = Some(PathBuf::from(dir));
        }
        self.concurrency = env.concurrency.unwrap_or(self.concurrency);
        self.delay_ms = env.delay_ms.unwrap_or(self.delay_ms);
        self.timeout_secs = env.timeout.unwrap_or(self.timeout_secs);
        self
    }

    /// Resolved test case directory
    pub fn tests_dir(&self) -> PathBuf {
        self.tests_dir
            .clone()
            .unwrap_or_else(|| app_dir().join("tests"))
    }

    /// Batch options from the configured defaults
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions::from_raw(self.concurrency as i64, self.delay_ms as i64)
    }

    /// Read a single setting as text
    pub fn get(&self, key: &str) -> Result<String> {
        let value = match key {
            "host" => self.host.clone(),
            "auth" => self.auth.clone(),
            "exchange" => self.exchange.clone(),
            "tests_dir" => self.tests_dir().display().to_string(),
            "concurrency" => self.concurrency.to_string(),
            "delay_ms" => self.delay_ms.to_string(),
            "timeout_secs" => self.timeout_secs.to_string(),
            "log_buffer" => self.log_buffer.to_string(),
            _ => bail!("Unknown config key: {key} (expected one of {})", CONFIG_KEYS.join(", ")),
        };
        Ok(value)
    }

    /// Update a single setting from text
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "host" => self.host = value.trim_end_matches('/').to_string(),
            "auth" => self.auth = value.to_string(),
            "exchange" => self.exchange = value.to_string(),
            "tests_dir" => self.tests_dir = Some(PathBuf::from(value)),
            "concurrency" => self.concurrency = parse_number(key, value)?,
            "delay_ms" => self.delay_ms = parse_number(key, value)?,
            "timeout_secs" => self.timeout_secs = parse_number(key, value)?,
            "log_buffer" => self.log_buffer = parse_number(key, value)?,
            _ => bail!("Unknown config key: {key} (expected one of {})", CONFIG_KEYS.join(", ")),
        }
        Ok(())
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow::anyhow!("Invalid value for {key}: {value}"))
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Check if file is YAML based on extension
fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.host, "http://localhost:15672");
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.delay_ms, 500);
        assert!(config.tests_dir().ends_with(".mqprobe/tests"));
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/settings.json");

        let mut config = AppConfig::default();
        config.set("host", "http://rabbit:15672/").unwrap();
        config.set("concurrency", "8").unwrap();
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.host, "http://rabbit:15672");
        assert_eq!(loaded.concurrency, 8);
    }

    #[test]
    fn test_load_partial_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.yaml");
        std::fs::write(&path, "host: http://mq:15672\ndelay_ms: 0\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.host, "http://mq:15672");
        assert_eq!(config.delay_ms, 0);
        assert_eq!(config.auth, DEFAULT_AUTH);
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_get_set_keys() {
        let mut config = AppConfig::default();
        for key in CONFIG_KEYS {
            assert!(config.get(key).is_ok(), "missing getter for {key}");
        }
        assert!(config.set("concurrency", "many").is_err());
        assert!(config.set("colour", "blue").is_err());
        assert!(config.get("colour").is_err());
    }

    #[test]
    fn test_batch_options_normalized() {
        let config = AppConfig {
            concurrency: 0,
            ..AppConfig::default()
        };
        assert_eq!(config.batch_options().concurrency, 1);
    }

    #[test]
    fn test_effective_settings_follow_profile() {
        let dir = TempDir::new().unwrap();
        let settings = dir.path().join("settings.json");

        let mut base = AppConfig::default();
        base.set("host", "http://base:15672").unwrap();
        base.save(&settings).unwrap();
        assert_eq!(AppConfig::load_effective(&settings).unwrap().host, "http://base:15672");
        assert_eq!(AppConfig::active_path(&settings).unwrap(), settings);

        let selection = ProfileManager::for_settings(&settings)
            .select(&settings, "staging")
            .unwrap();
        let mut staging = AppConfig::load(&selection.path).unwrap();
        staging.set("host", "http://staging:15672").unwrap();
        staging.save(&selection.path).unwrap();

        let effective = AppConfig::load_effective(&settings).unwrap();
        assert_eq!(effective.host, "http://staging:15672");
        assert_eq!(effective.profile.as_deref(), Some("staging.json"));
        assert_eq!(AppConfig::active_path(&settings).unwrap(), selection.path);

        std::fs::remove_file(&selection.path).unwrap();
        assert!(AppConfig::load_effective(&settings).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = EnvConfig {
            host: Some("http://env-host:15672".into()),
            concurrency: Some(6),
            ..EnvConfig::default()
        };
        let config = AppConfig::default().with_env(&env);
        assert_eq!(config.host, "http://env-host:15672");
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.delay_ms, 500);
    }
}

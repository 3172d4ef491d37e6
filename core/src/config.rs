//! Configuration management for Asgard Sync

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AsgardError, AsgardResult};

/// Application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application settings
    pub app: AppConfig,
    /// Sync settings
    pub sync: SyncConfig,
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application name
    pub name: String,
    /// Debug mode
    pub debug: bool,
    /// Log level
    pub log_level: String,
    /// Configuration directory
    pub config_dir: PathBuf,
}

/// Polling and cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Folder hierarchy poll interval (seconds)
    pub hierarchy_poll_interval: u64,
    /// Inbox new-mail check interval (seconds)
    pub inbox_poll_interval: u64,
    /// Reconcile interval of an open non-inbox folder (seconds)
    pub folder_poll_interval: u64,
    /// Full inbox reconcile interval, the pass that notices deletions (seconds)
    pub inbox_reconcile_interval: u64,
    /// Non-inbox folders kept in the content cache
    pub folder_cache_capacity: usize,
    /// Name of the inbox folder
    pub inbox_name: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: crate::APP_NAME.to_string(),
            debug: false,
            log_level: "info".to_string(),
            config_dir: crate::default_config_dir(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            hierarchy_poll_interval: 30,
            inbox_poll_interval: 20,
            folder_poll_interval: 10,
            inbox_reconcile_interval: 120,
            folder_cache_capacity: 8,
            inbox_name: crate::DEFAULT_INBOX_NAME.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn hierarchy_interval(&self) -> Duration {
        Duration::from_secs(self.hierarchy_poll_interval)
    }

    pub fn inbox_interval(&self) -> Duration {
        Duration::from_secs(self.inbox_poll_interval)
    }

    pub fn folder_interval(&self) -> Duration {
        Duration::from_secs(self.folder_poll_interval)
    }

    pub fn inbox_reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.inbox_reconcile_interval)
    }

    /// Validate the sync settings
    pub fn validate(&self) -> AsgardResult<()> {
        let intervals = [
            ("hierarchy_poll_interval", self.hierarchy_poll_interval),
            ("inbox_poll_interval", self.inbox_poll_interval),
            ("folder_poll_interval", self.folder_poll_interval),
            ("inbox_reconcile_interval", self.inbox_reconcile_interval),
        ];
        for (name, value) in intervals {
            if value == 0 {
                return Err(AsgardError::config(format!("{} cannot be zero", name)));
            }
        }

        if self.folder_cache_capacity == 0 {
            return Err(AsgardError::config("Folder cache capacity cannot be zero"));
        }

        if self.inbox_name.trim().is_empty() {
            return Err(AsgardError::config("Inbox name cannot be empty"));
        }

        Ok(())
    }
}

impl Config {
    /// Load configuration from file, or defaults when it does not exist
    pub fn load(config_path: &Path) -> AsgardResult<Self> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, config_path: &Path) -> AsgardResult<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Self {
        let mut config = Config::default();
        config.apply_env();
        config
    }

    /// Override settings with any `ASGARD_MAIL_*` variables that are set
    pub fn apply_env(&mut self) {
        if let Ok(debug) = std::env::var("ASGARD_MAIL_DEBUG") {
            self.app.debug = debug == "1" || debug.to_lowercase() == "true";
        }

        if let Ok(log_level) = std::env::var("ASGARD_MAIL_LOG_LEVEL") {
            self.app.log_level = log_level;
        }

        if let Ok(config_dir) = std::env::var("ASGARD_MAIL_CONFIG_DIR") {
            self.app.config_dir = PathBuf::from(config_dir);
        }

        if let Some(secs) = env_parse("ASGARD_MAIL_HIERARCHY_POLL_SECONDS") {
            self.sync.hierarchy_poll_interval = secs;
        }

        if let Some(secs) = env_parse("ASGARD_MAIL_INBOX_POLL_SECONDS") {
            self.sync.inbox_poll_interval = secs;
        }

        if let Some(secs) = env_parse("ASGARD_MAIL_FOLDER_POLL_SECONDS") {
            self.sync.folder_poll_interval = secs;
        }

        if let Some(secs) = env_parse("ASGARD_MAIL_INBOX_RECONCILE_SECONDS") {
            self.sync.inbox_reconcile_interval = secs;
        }

        if let Some(capacity) = env_parse("ASGARD_MAIL_FOLDER_CACHE_CAPACITY") {
            self.sync.folder_cache_capacity = capacity;
        }

        if let Ok(inbox_name) = std::env::var("ASGARD_MAIL_INBOX_NAME") {
            self.sync.inbox_name = inbox_name;
        }
    }

    /// Get the configuration file path
    pub fn config_file_path(&self) -> PathBuf {
        self.app.config_dir.join("config.toml")
    }

    /// Validate the configuration
    pub fn validate(&self) -> AsgardResult<()> {
        if self.app.log_level.trim().is_empty() {
            return Err(AsgardError::config("Log level cannot be empty"));
        }
        self.sync.validate()
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let value = std::env::var(name).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring invalid value for {}: {}", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.app.name, "Asgard Sync");
        assert_eq!(config.sync.hierarchy_interval(), Duration::from_secs(30));
        assert_eq!(config.sync.inbox_interval(), Duration::from_secs(20));
        assert_eq!(config.sync.folder_interval(), Duration::from_secs(10));
        assert_eq!(config.sync.inbox_name, "INBOX");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.app.debug = true;
        config.sync.folder_cache_capacity = 3;

        config.save(&config_path).unwrap();
        assert!(config_path.exists());

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        std::fs::write(&config_path, "[sync]\ninbox_poll_interval = 5\n").unwrap();

        let loaded = Config::load(&config_path).unwrap();
        assert_eq!(loaded.sync.inbox_poll_interval, 5);
        assert_eq!(loaded.sync.folder_poll_interval, 10);
        assert_eq!(loaded.app.log_level, "info");
    }

    #[test]
    fn test_missing_file_gives_defaults_and_bad_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent.toml");
        assert_eq!(Config::load(&missing).unwrap(), Config::default());

        let broken = temp_dir.path().join("broken.toml");
        std::fs::write(&broken, "[sync\n").unwrap();
        assert!(matches!(Config::load(&broken), Err(AsgardError::Toml(_))));
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.sync.folder_poll_interval = 0;
        assert!(config.validate().is_err());

        config.sync.folder_poll_interval = 10;
        config.sync.folder_cache_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_env() {
        std::env::set_var("ASGARD_MAIL_DEBUG", "1");
        std::env::set_var("ASGARD_MAIL_INBOX_POLL_SECONDS", "45");
        std::env::set_var("ASGARD_MAIL_FOLDER_CACHE_CAPACITY", "not-a-number");

        let config = Config::load_from_env();
        assert!(config.app.debug);
        assert_eq!(config.sync.inbox_poll_interval, 45);
        assert_eq!(config.sync.folder_cache_capacity, 8);

        std::env::remove_var("ASGARD_MAIL_DEBUG");
        std::env::remove_var("ASGARD_MAIL_INBOX_POLL_SECONDS");
        std::env::remove_var("ASGARD_MAIL_FOLDER_CACHE_CAPACITY");
    }
}

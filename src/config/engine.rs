use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const DATA_DIR_ENV: &str = "TASKMILL_DATA_DIR";
pub const RETENTION_DAYS_ENV: &str = "TASKMILL_RETENTION_DAYS";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    /// How long SQLite itself waits on a locked database before reporting busy.
    pub busy_timeout: Duration,
    /// Attempts made to start a write transaction before giving up with `Busy`.
    pub max_write_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Soft-deleted rows older than this are eligible for purge.
    pub retention_days: i64,
}

impl EngineConfig {
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.data_dir.join("registry.db")
    }

    #[must_use]
    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    #[must_use]
    pub fn workspace_db_path(&self, storage_identifier: &str) -> PathBuf {
        self.workspaces_dir().join(format!("{storage_identifier}.db"))
    }

    /// Builds the configuration from defaults, then `<data_dir>/config.toml`,
    /// then environment variables.
    pub fn load(data_dir_override: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = env_var(DATA_DIR_ENV) {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = data_dir_override {
            config.data_dir = dir.to_path_buf();
        }

        let file_path = config.data_dir.join(CONFIG_FILE_NAME);
        if file_path.exists() {
            let content = fs::read_to_string(&file_path)?;
            let file: ConfigFile = toml::from_str(&content).map_err(|e| {
                Error::Config(format!("failed to parse {}: {e}", file_path.display()))
            })?;
            file.apply(&mut config);
        }

        if let Some(days) = env_var(RETENTION_DAYS_ENV) {
            config.retention_days = days.parse().map_err(|_| {
                Error::Config(format!("{RETENTION_DAYS_ENV} must be an integer, got '{days}'"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_write_attempts == 0 {
            return Err(Error::Config(
                "max_write_attempts must be at least 1".to_string(),
            ));
        }
        if self.retention_days < 0 {
            return Err(Error::Config(format!(
                "retention_days must not be negative, got {}",
                self.retention_days
            )));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(Error::Config(
                "retry_base_delay must not exceed retry_max_delay".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            busy_timeout: Duration::from_millis(250),
            max_write_attempts: 8,
            retry_base_delay: Duration::from_millis(10),
            retry_max_delay: Duration::from_millis(500),
            retention_days: 30,
        }
    }
}

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", "taskmill")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".taskmill"))
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// On-disk overrides. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    busy_timeout_ms: Option<u64>,
    max_write_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_max_delay_ms: Option<u64>,
    retention_days: Option<i64>,
}

impl ConfigFile {
    fn apply(self, config: &mut EngineConfig) {
        if let Some(ms) = self.busy_timeout_ms {
            config.busy_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = self.max_write_attempts {
            config.max_write_attempts = attempts;
        }
        if let Some(ms) = self.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = self.retry_max_delay_ms {
            config.retry_max_delay = Duration::from_millis(ms);
        }
        if let Some(days) = self.retention_days {
            config.retention_days = days;
        }
    }
}

use crate::store::{FileStateStore, InMemoryStateStore, StateStore};
use ::config::{Config, Environment, File};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Prefix for environment overrides, e.g. `MONITOR_PROFILE_PROFILE_PATH`.
pub const ENV_PREFIX: &str = "MONITOR_PROFILE";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(Utf8PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] ::config::ConfigError),
}

/// Which [`StateStore`] backs the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    File,
    Memory,
}

/// Logging settings consumed by [`crate::logging::setup_logging`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: Utf8PathBuf,
    pub prefix: String,
    pub debug: bool,
    pub console: bool,
    /// Write the log file as JSON lines instead of plain text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: Utf8PathBuf::from("logs"),
            prefix: "monitor-profile".to_string(),
            debug: false,
            console: true,
            json: false,
        }
    }
}

/// Application settings, layered as defaults, then an optional file, then
/// environment variables.
///
/// These settings describe where and how the profile is stored; they are
/// not part of the profile document itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub profile_path: Utf8PathBuf,
    pub backend: Backend,
    /// Copy corrupt profile files aside before they are replaced
    pub backup_corrupt: bool,
    pub logging: LoggingConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile_path: Utf8PathBuf::from("profile.json"),
            backend: Backend::File,
            backup_corrupt: true,
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load settings from `file` (if given) and `MONITOR_PROFILE_*` variables.
    ///
    /// Nested keys use `__`, e.g. `MONITOR_PROFILE_LOGGING__DEBUG=true`.
    pub fn load(file: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        Self::load_from(file, Self::environment())
    }

    /// Load settings from `file` and an explicit environment source.
    pub fn load_from(file: Option<&Utf8Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            builder = builder.add_source(File::from(path.as_std_path()).required(true));
        }

        let config: AppConfig = builder.add_source(env).build()?.try_deserialize()?;

        tracing::debug!(
            "Resolved configuration: profile={}, backend={:?}, backup_corrupt={}",
            config.profile_path,
            config.backend,
            config.backup_corrupt
        );
        Ok(config)
    }

    /// The environment source used by [`load`](Self::load).
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    /// Build the configured store.
    pub fn open_store(&self) -> Arc<dyn StateStore> {
        match self.backend {
            Backend::File => Arc::new(
                FileStateStore::new(self.profile_path.clone())
                    .with_corrupt_backup(self.backup_corrupt),
            ),
            Backend::Memory => Arc::new(InMemoryStateStore::new()),
        }
    }
}

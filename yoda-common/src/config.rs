//! Bootstrap configuration file resolution and loading
//!
//! Config file resolution follows this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. User config directory (`~/.config/yoda/config.toml` on Linux)
//! 4. System config directory (`/etc/yoda/config.toml`, unix only)
//! 5. Built-in defaults (fallback, no file)
//!
//! A missing file at tiers 3-4 is not an error; the service starts on defaults.
//! A file named explicitly (tiers 1-2) must exist and parse.

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "YODA_CONFIG";

const APP_DIR: &str = "yoda";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Where the bootstrap configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    CommandLine(PathBuf),
    Environment(PathBuf),
    UserDir(PathBuf),
    SystemDir(PathBuf),
    Defaults,
}

impl ConfigSource {
    /// Path of the config file, if any
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::CommandLine(p)
            | ConfigSource::Environment(p)
            | ConfigSource::UserDir(p)
            | ConfigSource::SystemDir(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }

    /// True when the user named the file explicitly (CLI or environment)
    pub fn is_explicit(&self) -> bool {
        matches!(
            self,
            ConfigSource::CommandLine(_) | ConfigSource::Environment(_)
        )
    }
}

/// Resolves the bootstrap config file following the priority order above
#[derive(Debug, Clone)]
pub struct ConfigFileResolver {
    env_var_name: String,
    user_dir: Option<PathBuf>,
    system_dir: Option<PathBuf>,
}

impl ConfigFileResolver {
    /// Resolver using the platform config directories
    pub fn new(env_var_name: impl Into<String>) -> Self {
        let system_dir = if cfg!(unix) {
            Some(PathBuf::from("/etc").join(APP_DIR))
        } else {
            None
        };

        Self {
            env_var_name: env_var_name.into(),
            user_dir: dirs::config_dir().map(|d| d.join(APP_DIR)),
            system_dir,
        }
    }

    /// Override the directories searched at tiers 3 and 4
    pub fn with_search_dirs(
        mut self,
        user_dir: Option<PathBuf>,
        system_dir: Option<PathBuf>,
    ) -> Self {
        self.user_dir = user_dir;
        self.system_dir = system_dir;
        self
    }

    /// Resolve the config file location
    pub fn resolve(&self, cli_arg: Option<&Path>) -> ConfigSource {
        // Priority 1: Command-line argument
        if let Some(path) = cli_arg {
            return ConfigSource::CommandLine(path.to_path_buf());
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(&self.env_var_name) {
            if !path.trim().is_empty() {
                return ConfigSource::Environment(PathBuf::from(path));
            }
        }

        // Priority 3: User config directory
        if let Some(path) = self.user_dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME)) {
            if path.exists() {
                return ConfigSource::UserDir(path);
            }
        }

        // Priority 4: System config directory
        if let Some(path) = self.system_dir.as_ref().map(|d| d.join(CONFIG_FILE_NAME)) {
            if path.exists() {
                return ConfigSource::SystemDir(path);
            }
        }

        ConfigSource::Defaults
    }
}

/// Load a TOML document from the resolved source
///
/// `ConfigSource::Defaults` yields `T::default()`. An explicitly named file that
/// does not exist is a configuration error.
pub fn load_toml<T>(source: &ConfigSource) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let Some(path) = source.path() else {
        warn!("No config file found, using built-in defaults");
        return Ok(T::default());
    };

    if !path.exists() {
        if source.is_explicit() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        warn!("Config file {} disappeared, using built-in defaults", path.display());
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)?;
    let parsed = toml::from_str::<T>(&content)
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
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

fn default_log_level() -> String {
    "info".to_string()
}

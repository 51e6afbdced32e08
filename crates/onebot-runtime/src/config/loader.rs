//! Configuration loader using figment.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults (`T::default()`)
//! 2. Configuration file (TOML, feature `toml-config`)
//! 3. Environment variables (`ONEBOT_*`)
//! 4. Programmatic overrides ([`ConfigLoader::merge`])
//!
//! # Environment Variable Mapping
//!
//! Environment variables are mapped using the `ONEBOT_` prefix with `__` as
//! the nesting separator:
//!
//! - `ONEBOT_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `ONEBOT_EVENT_QUEUE__CAPACITY=1024` → `event_queue.capacity = 1024`
//! - `ONEBOT_HEARTBEAT__ENABLED=false` → `heartbeat.enabled = false`
//!
//! # Example
//!
//! ```rust,ignore
//! use onebot_runtime::config::{ConfigLoader, RuntimeConfig};
//!
//! let config: RuntimeConfig = ConfigLoader::new()
//!     .file_if_exists("onebot.toml")
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(feature = "toml-config")]
use figment::providers::{Format, Toml};
use figment::providers::{Env, Serialized};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};

/// Default environment variable prefix.
pub const DEFAULT_ENV_PREFIX: &str = "ONEBOT_";

/// Configuration loader with figment-based multi-source support.
///
/// The loader is generic over the extracted type, so a hosting program can
/// load a struct that embeds [`RuntimeConfig`](super::RuntimeConfig) next to
/// its own sections in one pass.
pub struct ConfigLoader {
    /// Programmatic overrides, merged last.
    overrides: Figment,
    config_file: Option<PathBuf>,
    /// Whether a missing `config_file` is an error.
    required: bool,
    env_prefix: String,
    load_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Creates a new configuration loader with defaults.
    pub fn new() -> Self {
        Self {
            overrides: Figment::new(),
            config_file: None,
            required: false,
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            load_env: true,
        }
    }

    /// Loads the given file; it must exist.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self.required = true;
        self
    }

    /// Loads the given file if it exists and falls back to defaults otherwise.
    pub fn file_if_exists<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self.required = false;
        self
    }

    /// Changes the environment variable prefix (default `ONEBOT_`).
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables loading environment variables (default: true).
    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Merges additional configuration programmatically.
    ///
    /// Overrides take precedence over every other source.
    pub fn merge<S: Serialize>(mut self, overrides: S) -> Self {
        self.overrides = self.overrides.merge(Serialized::defaults(overrides));
        self
    }

    /// Loads and returns the configuration.
    pub fn load<T>(self) -> ConfigResult<T>
    where
        T: Serialize + DeserializeOwned + Default,
    {
        let figment = self.build_figment::<T>()?;
        let config: T = figment.extract()?;
        debug!("Configuration loaded successfully");
        Ok(config)
    }

    fn build_figment<T>(self) -> ConfigResult<Figment>
    where
        T: Serialize + Default,
    {
        let mut figment = Figment::from(Serialized::defaults(T::default()));

        if let Some(path) = &self.config_file {
            if path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                figment = Self::merge_config_file(figment, path)?;
            } else if self.required {
                return Err(ConfigError::FileNotFound(path.clone()));
            } else {
                warn!(path = %path.display(), "Configuration file not found, using defaults");
            }
        }

        if self.load_env {
            trace!(prefix = %self.env_prefix, "Loading environment variables");
            figment = figment.merge(Env::prefixed(&self.env_prefix).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges a single config file into the figment, dispatching on file extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            _ => {
                let _ = figment;
                Err(ConfigError::UnsupportedFormat(ext.to_string()))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LogLevel, RuntimeConfig};
    use figment::Jail;
    use serde::Deserialize;

    fn extract_err(e: ConfigError) -> figment::Error {
        figment::Error::from(e.to_string())
    }

    #[test]
    fn test_default_config() {
        let config: RuntimeConfig = ConfigLoader::new().without_env().load().unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_missing_required_file() {
        let err = ConfigLoader::new()
            .without_env()
            .file("definitely/not/here.toml")
            .load::<RuntimeConfig>()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_missing_optional_file_uses_defaults() {
        let config: RuntimeConfig = ConfigLoader::new()
            .without_env()
            .file_if_exists("definitely/not/here.toml")
            .load()
            .unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn test_env_overrides() {
        Jail::expect_with(|jail| {
            jail.set_env("ONEBOT_EVENT_QUEUE__CAPACITY", "8");
            jail.set_env("ONEBOT_LOGGING__LEVEL", "debug");

            let config: RuntimeConfig = ConfigLoader::new().load().map_err(extract_err)?;
            assert_eq!(config.event_queue.capacity, Some(8));
            assert_eq!(config.logging.level, LogLevel::Debug);
            Ok(())
        });
    }

    #[test]
    fn test_programmatic_merge_wins() {
        Jail::expect_with(|jail| {
            jail.set_env("ONEBOT_HEARTBEAT__INTERVAL_MS", "2000");

            let mut overrides = RuntimeConfig::default();
            overrides.heartbeat.interval_ms = 500;
            let config: RuntimeConfig = ConfigLoader::new()
                .merge(overrides)
                .load()
                .map_err(extract_err)?;
            assert_eq!(config.heartbeat.interval_ms, 500);
            Ok(())
        });
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_toml_file_with_host_sections() {
        #[derive(Debug, Default, Serialize, Deserialize)]
        struct HostConfig {
            #[serde(flatten)]
            runtime: RuntimeConfig,
            #[serde(default)]
            repl: Repl,
        }

        #[derive(Debug, Default, Serialize, Deserialize)]
        struct Repl {
            #[serde(default)]
            user_id: String,
        }

        Jail::expect_with(|jail| {
            jail.create_file(
                "onebot.toml",
                r#"
                [heartbeat]
                enabled = false

                [repl]
                user_id = "user"
                "#,
            )?;
            jail.set_env("ONEBOT_HEARTBEAT__INTERVAL_MS", "3000");

            let config: HostConfig = ConfigLoader::new()
                .file("onebot.toml")
                .load()
                .map_err(extract_err)?;
            assert!(!config.runtime.heartbeat.enabled);
            assert_eq!(config.runtime.heartbeat.interval_ms, 3000);
            assert_eq!(config.repl.user_id, "user");
            Ok(())
        });
    }

    #[test]
    fn test_unsupported_extension() {
        Jail::expect_with(|jail| {
            jail.create_file("onebot.ini", "x = 1")?;
            let err = ConfigLoader::new()
                .without_env()
                .file("onebot.ini")
                .load::<RuntimeConfig>()
                .unwrap_err();
            assert!(matches!(err, ConfigError::UnsupportedFormat(ref ext) if ext == "ini"));
            Ok(())
        });
    }
}

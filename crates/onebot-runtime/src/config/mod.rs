//! Configuration for runtime instances.
//!
//! [`RuntimeConfig`] is loaded through [`ConfigLoader`], which layers
//! defaults, an optional TOML file and `ONEBOT_*` environment variables.
//! Hosting programs usually embed it in their own configuration type.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, DEFAULT_ENV_PREFIX};
pub use schema::{
    EventQueueConfig, HeartbeatConfig, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RuntimeConfig, ShutdownConfig,
};
pub use validation::validate_config;

//! Semantic checks that serde cannot express.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, RuntimeConfig};

/// Validates a runtime configuration.
pub fn validate_config(config: &RuntimeConfig) -> ConfigResult<()> {
    if config.event_queue.capacity == Some(0) {
        return Err(ConfigError::validation(
            "event_queue.capacity must be greater than 0 (omit it for an unbounded queue)",
        ));
    }

    if config.shutdown.drain_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "shutdown.drain_timeout_ms must be greater than 0",
        ));
    }

    if config.heartbeat.enabled && config.heartbeat.interval_ms == 0 {
        return Err(ConfigError::validation(
            "heartbeat.interval_ms must be greater than 0 when heartbeat is enabled",
        ));
    }

    if config.logging.output == LogOutput::File && config.logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.file_path is required when logging.output is \"file\"",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&RuntimeConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = RuntimeConfig::default();
        config.event_queue.capacity = Some(0);

        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("event_queue.capacity"));
    }

    #[test]
    fn test_zero_interval_only_matters_when_enabled() {
        let mut config = RuntimeConfig::default();
        config.heartbeat.interval_ms = 0;
        assert!(validate_config(&config).is_err());

        config.heartbeat.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = RuntimeConfig::default();
        config.logging.output = LogOutput::File;
        assert!(validate_config(&config).is_err());

        config.logging.file_path = Some("log.txt".into());
        assert!(validate_config(&config).is_ok());
    }
}

//! Service configuration.
//!
//! Validated at load time, with defaults matching the reference service.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Default chunk size for pipe reads and writes.
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Smallest chunk size the launcher will operate with. Smaller requests are
/// clamped up to this.
pub const MIN_BUFFER_SIZE: usize = 1024;

/// Configuration for the service process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Chunk size used when copying between pipes and caller streams.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Interval between housekeeping ticks while the message loop runs.
    #[serde(default = "default_housekeeping_interval")]
    #[serde(with = "humantime_serde")]
    pub housekeeping_interval: Duration,

    /// Grace period after the loop exits, giving stray worker threads time
    /// to finish before `run` returns.
    #[serde(default = "default_shutdown_grace")]
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_housekeeping_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_shutdown_grace() -> Duration {
    Duration::from_secs(1)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            housekeeping_interval: default_housekeeping_interval(),
            shutdown_grace: default_shutdown_grace(),
        }
    }
}

impl ServiceConfig {
    /// Returns the buffer size clamped to the supported minimum.
    #[must_use]
    pub fn effective_buffer_size(&self) -> usize {
        self.buffer_size.max(MIN_BUFFER_SIZE)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns an error if any field is out of range.
    pub fn validate(&self) -> SessionResult<()> {
        if self.buffer_size == 0 {
            return Err(SessionError::config("buffer_size cannot be zero"));
        }
        if self.housekeeping_interval.is_zero() {
            return Err(SessionError::config(
                "housekeeping_interval cannot be zero",
            ));
        }
        Ok(())
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed, or fails
    /// validation.
    pub fn load(path: impl AsRef<std::path::Path>) -> SessionResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SessionError::config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SessionError::config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.buffer_size, 65536);
        assert_eq!(config.housekeeping_interval, Duration::from_secs(5));
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_buffer_size_clamped() {
        let config = ServiceConfig {
            buffer_size: 16,
            ..ServiceConfig::default()
        };
        assert_eq!(config.effective_buffer_size(), MIN_BUFFER_SIZE);
        // Still valid: the launcher clamps, it does not reject.
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_buffer_size_rejected() {
        let config = ServiceConfig {
            buffer_size: 0,
            ..ServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_with_humantime_durations() {
        let config: ServiceConfig = toml::from_str(
            r#"
            buffer_size = 8192
            housekeeping_interval = "10s"
            shutdown_grace = "250ms"
            "#,
        )
        .unwrap();
        assert_eq!(config.buffer_size, 8192);
        assert_eq!(config.housekeeping_interval, Duration::from_secs(10));
        assert_eq!(config.shutdown_grace, Duration::from_millis(250));
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let config: ServiceConfig = toml::from_str("").unwrap();
        assert_eq!(config.buffer_size, DEFAULT_BUFFER_SIZE);
    }
}

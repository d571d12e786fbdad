//! Runtime knobs for the central manager.

use std::time::Duration;

use log::LevelFilter;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the application command queue.
    pub command_buffer: usize,
    /// MTU assumed for a session until a negotiation completes.
    pub default_mtu: u16,
    /// Age after which an unanswered request is cleared. `None` disables the watchdog.
    pub request_timeout_ms: Option<u64>,
    pub watchdog_interval_ms: u64,
    /// Threshold for diagnostics forwarded on the event bus.
    pub log_level: LevelFilter,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            command_buffer: 256,
            default_mtu: 20,
            request_timeout_ms: Some(30_000),
            watchdog_interval_ms: 1_000,
            log_level: LevelFilter::Info,
        }
    }
}

impl ManagerConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.command_buffer == 0 {
            return Err(Error::Config("command_buffer must be > 0".to_string()));
        }
        if self.watchdog_interval_ms == 0 {
            return Err(Error::Config("watchdog_interval_ms must be > 0".to_string()));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(Error::Config("request_timeout_ms must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_millis(self.watchdog_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = ManagerConfig::from_json(r#"{ "default_mtu": 23 }"#).unwrap();
        assert_eq!(config.default_mtu, 23);
        assert_eq!(config.command_buffer, 256);
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn watchdog_can_be_disabled() {
        let config =
            ManagerConfig::from_json(r#"{ "request_timeout_ms": null, "log_level": "debug" }"#)
                .unwrap();
        assert_eq!(config.request_timeout(), None);
        assert_eq!(config.log_level, LevelFilter::Debug);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            ManagerConfig::from_json(r#"{ "command_buffer": 0 }"#),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            ManagerConfig::from_json("not json"),
            Err(Error::Config(_))
        ));
    }
}

//! Session flow configuration
//!
//! Layering follows defaults → TOML file → `LANTERN_*` environment → validate.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;

/// Default debounce window applied to the sync state stream
pub const DEFAULT_SYNC_DEBOUNCE_MS: u64 = 100;

/// Upper bound accepted for the debounce window
pub const MAX_SYNC_DEBOUNCE_MS: u64 = 10_000;

/// Default capacity of the backstack change feed
pub const DEFAULT_CHANGE_FEED_CAPACITY: usize = 64;

/// Configuration for a [`crate::SessionFlowController`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionFlowConfig {
    /// Quiet period the sync state must hold before the reconciliation loop acts
    pub sync_debounce_ms: u64,

    /// Return navigation programming errors instead of recovering to the room list
    pub strict_navigation: bool,

    /// Capacity of the broadcast feed of backstack changes
    pub change_feed_capacity: usize,

    /// Fallback tracing filter used by binaries when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for SessionFlowConfig {
    fn default() -> Self {
        Self {
            sync_debounce_ms: DEFAULT_SYNC_DEBOUNCE_MS,
            strict_navigation: cfg!(debug_assertions),
            change_feed_capacity: DEFAULT_CHANGE_FEED_CAPACITY,
            log_filter: "info".to_string(),
        }
    }
}

impl SessionFlowConfig {
    /// Create config for testing (strict navigation, default debounce, verbose logs)
    pub fn for_testing() -> Self {
        Self {
            sync_debounce_ms: DEFAULT_SYNC_DEBOUNCE_MS,
            strict_navigation: true,
            change_feed_capacity: 256,
            log_filter: "debug".to_string(),
        }
    }

    /// Debounce window as a duration
    pub fn sync_debounce(&self) -> Duration {
        Duration::from_millis(self.sync_debounce_ms)
    }

    /// Load configuration the full way: defaults, optional file, env, validation.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file. Missing keys keep their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Merge `LANTERN_*` environment variables.
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(|key| std::env::var(key).ok())
    }

    /// Merge variables from an arbitrary lookup (env-shaped keys).
    pub fn merge_with_vars<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("LANTERN_SYNC_DEBOUNCE_MS") {
            self.sync_debounce_ms = value.parse().map_err(|_| ConfigError::Invalid {
                key: "sync_debounce_ms",
                message: format!("not a number of milliseconds: {value}"),
            })?;
        }
        if let Some(value) = lookup("LANTERN_STRICT_NAVIGATION") {
            self.strict_navigation = value.parse().map_err(|_| ConfigError::Invalid {
                key: "strict_navigation",
                message: format!("not a boolean: {value}"),
            })?;
        }
        if let Some(value) = lookup("LANTERN_CHANGE_FEED_CAPACITY") {
            self.change_feed_capacity = value.parse().map_err(|_| ConfigError::Invalid {
                key: "change_feed_capacity",
                message: format!("not a capacity: {value}"),
            })?;
        }
        if let Some(value) = lookup("LANTERN_LOG_FILTER") {
            self.log_filter = value;
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sync_debounce_ms == 0 || self.sync_debounce_ms > MAX_SYNC_DEBOUNCE_MS {
            return Err(ConfigError::Invalid {
                key: "sync_debounce_ms",
                message: format!(
                    "{} is outside 1..={MAX_SYNC_DEBOUNCE_MS}",
                    self.sync_debounce_ms
                ),
            });
        }
        if self.change_feed_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "change_feed_capacity",
                message: "must be greater than zero".to_string(),
            });
        }
        if self.log_filter.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "log_filter",
                message: "cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

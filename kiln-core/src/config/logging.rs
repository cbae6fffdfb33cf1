//! Logging configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Logging settings as written in `kiln.toml` or the environment
///
/// Kept as strings here; [`crate::logging::LoggingConfig::from_settings`]
/// turns them into typed values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Env: KILN_LOG_LEVEL
    pub level: String,
    /// `human`, `json` or `logfmt`. Env: KILN_LOG_FORMAT
    pub format: String,
    /// `stdout` or `stderr`. Env: KILN_LOG_STREAM
    pub stream: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "human".to_string(), stream: "stdout".to_string() }
    }
}

impl LogSettings {
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    pub fn apply_env_vars(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(level) = lookup("KILN_LOG_LEVEL") {
            self.level = level;
        }
        if let Some(format) = lookup("KILN_LOG_FORMAT") {
            self.format = format;
        }
        if let Some(stream) = lookup("KILN_LOG_STREAM") {
            self.stream = stream;
        }
    }

    /// Fails if any value is not recognised
    pub fn validate(&self) -> Result<()> {
        crate::logging::LoggingConfig::from_settings(self).map(|_| ())
    }
}

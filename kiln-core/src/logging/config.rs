//! Typed logging configuration

use anyhow::{anyhow, Result};
use std::str::FromStr;

use crate::config::LogSettings;
use crate::logging::{LogFormat, LogOutput};

/// Logging configuration for the Kiln logger
#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    /// Minimum log level to capture
    pub level: LogLevel,
    /// Where log lines are written
    pub output: LogOutput,
    /// How log lines are rendered
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: LogLevel::Info, output: LogOutput::Stdout, format: LogFormat::Human }
    }
}

/// Log levels in order of severity (compatible with standard log crate)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<log::Level> for LogLevel {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => LogLevel::Error,
            log::Level::Warn => LogLevel::Warn,
            log::Level::Info => LogLevel::Info,
            log::Level::Debug => LogLevel::Debug,
            log::Level::Trace => LogLevel::Trace,
        }
    }
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(anyhow!("Unknown log level '{}'", other)),
        }
    }
}

impl LoggingConfig {
    /// Structured JSON on stdout
    pub fn production() -> Self {
        Self { level: LogLevel::Info, output: LogOutput::Stdout, format: LogFormat::Json }
    }

    /// Human-readable, verbose
    pub fn development() -> Self {
        Self { level: LogLevel::Debug, output: LogOutput::Stdout, format: LogFormat::Human }
    }

    /// Build from string settings (config file / environment)
    pub fn from_settings(settings: &LogSettings) -> Result<Self> {
        Ok(Self {
            level: settings.level.parse()?,
            output: settings.stream.parse()?,
            format: settings.format.parse()?,
        })
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_config() {
        let config = LoggingConfig::production();
        assert_eq!(config.level, LogLevel::Info);
        assert_eq!(config.format, LogFormat::Json);
    }

    #[test]
    fn test_from_settings() {
        let settings = LogSettings {
            level: "WARN".to_string(),
            format: "logfmt".to_string(),
            stream: "stderr".to_string(),
        };
        let config = LoggingConfig::from_settings(&settings).unwrap();

        assert_eq!(config.level, LogLevel::Warn);
        assert_eq!(config.format, LogFormat::Logfmt);
        assert_eq!(config.output, LogOutput::Stderr);
    }

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error < LogLevel::Debug);
        assert_eq!(log::LevelFilter::from(LogLevel::Trace), log::LevelFilter::Trace);
    }

    #[test]
    fn test_builder_pattern() {
        let config = LoggingConfig::production()
            .with_level(LogLevel::Debug)
            .with_format(LogFormat::Human)
            .with_output(LogOutput::Stderr);

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.output, LogOutput::Stderr);
    }
}

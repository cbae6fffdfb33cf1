//! Log output destinations and the entries written to them

use anyhow::anyhow;
use std::str::FromStr;

use crate::logging::LogLevel;

/// Where log lines are written
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
}

impl FromStr for LogOutput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdout" => Ok(LogOutput::Stdout),
            "stderr" => Ok(LogOutput::Stderr),
            other => Err(anyhow!("Unknown log stream '{}' (expected stdout or stderr)", other)),
        }
    }
}

/// A structured log entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Timestamp when the log was created
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Target (usually module path)
    pub target: String,
    /// Worker thread the record came from, if any
    pub worker: Option<String>,
}

impl LogEntry {
    /// Create a new log entry
    pub fn new(level: LogLevel, message: String, target: String) -> Self {
        Self { timestamp: chrono::Utc::now(), level, message, target, worker: None }
    }

    /// Create a LogEntry from a standard log::Record
    ///
    /// Messages of the form `[Thread-3] ...` carry their worker as a field.
    pub fn from_log_record(record: &log::Record) -> Self {
        let message = record.args().to_string();
        let entry = Self::new(record.level().into(), String::new(), record.target().to_string());

        match split_worker(&message) {
            Some((worker, rest)) => {
                Self { worker: Some(worker.to_string()), message: rest.to_string(), ..entry }
            }
            None => Self { message, ..entry },
        }
    }

    pub fn with_worker(mut self, worker: &str) -> Self {
        self.worker = Some(worker.to_string());
        self
    }
}

/// Split `[worker] message` into its parts
fn split_worker(message: &str) -> Option<(&str, &str)> {
    let rest = message.strip_prefix('[')?;
    let (worker, rest) = rest.split_once("] ")?;
    if worker.is_empty() || worker.contains(char::is_whitespace) {
        return None;
    }
    Some((worker, rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_creation() {
        let entry =
            LogEntry::new(LogLevel::Info, "Test message".to_string(), "kiln::server".to_string());

        assert_eq!(entry.level, LogLevel::Info);
        assert_eq!(entry.message, "Test message");
        assert!(entry.worker.is_none());
    }

    #[test]
    fn test_worker_prefix_is_extracted() {
        let record = log::Record::builder()
            .args(format_args!("[Thread-4] Serving connection from 127.0.0.1:5000"))
            .level(log::Level::Info)
            .target("kiln")
            .build();
        let entry = LogEntry::from_log_record(&record);

        assert_eq!(entry.worker.as_deref(), Some("Thread-4"));
        assert_eq!(entry.message, "Serving connection from 127.0.0.1:5000");
    }

    #[test]
    fn test_plain_messages_are_untouched() {
        assert_eq!(split_worker("Server stopped"), None);
        assert_eq!(split_worker("[not a worker] text"), None);
    }

    #[test]
    fn test_output_parsing() {
        assert_eq!("STDERR".parse::<LogOutput>().unwrap(), LogOutput::Stderr);
        assert!("file".parse::<LogOutput>().is_err());
    }
}

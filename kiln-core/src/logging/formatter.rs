//! Log formatting options for different output styles

use anyhow::anyhow;
use std::str::FromStr;

use crate::logging::destinations::LogEntry;

/// How logs should be formatted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    /// Structured JSON format
    /// Example: {"timestamp":"2024-01-15T10:30:00Z","level":"INFO","target":"kiln","worker":"Thread-1","message":"Started"}
    Json,

    /// Human-readable format (default)
    /// Example: 2024-01-15 10:30:00.000 INFO  [kiln] [Thread-1] Started
    Human,

    /// Logfmt format (key=value pairs)
    /// Example: timestamp=2024-01-15T10:30:00Z level=INFO target=kiln worker=Thread-1 message="Started"
    Logfmt,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "human" | "text" => Ok(LogFormat::Human),
            "logfmt" => Ok(LogFormat::Logfmt),
            other => Err(anyhow!("Unknown log format '{}' (expected human, json or logfmt)", other)),
        }
    }
}

impl LogFormat {
    /// Format a log entry according to this format
    pub fn format_entry(&self, entry: &LogEntry) -> String {
        match self {
            LogFormat::Json => format_json(entry),
            LogFormat::Human => format_human(entry),
            LogFormat::Logfmt => format_logfmt(entry),
        }
    }
}

fn level_name(entry: &LogEntry) -> String {
    format!("{:?}", entry.level).to_uppercase()
}

/// Format log entry as JSON
fn format_json(entry: &LogEntry) -> String {
    let mut json = serde_json::Map::new();

    json.insert("timestamp".to_string(), serde_json::Value::String(entry.timestamp.to_rfc3339()));
    json.insert("level".to_string(), serde_json::Value::String(level_name(entry)));
    json.insert("target".to_string(), serde_json::Value::String(entry.target.clone()));
    if let Some(worker) = &entry.worker {
        json.insert("worker".to_string(), serde_json::Value::String(worker.clone()));
    }
    json.insert("message".to_string(), serde_json::Value::String(entry.message.clone()));

    serde_json::to_string(&json).unwrap_or_else(|_| "Failed to serialize log entry".to_string())
}

/// Format log entry in human-readable format
fn format_human(entry: &LogEntry) -> String {
    let timestamp = entry.timestamp.format("%Y-%m-%d %H:%M:%S%.3f");
    let level = format!("{:5}", level_name(entry));

    match &entry.worker {
        Some(worker) => {
            format!("{} {} [{}] [{}] {}", timestamp, level, entry.target, worker, entry.message)
        }
        None => format!("{} {} [{}] {}", timestamp, level, entry.target, entry.message),
    }
}

/// Format log entry in logfmt format
fn format_logfmt(entry: &LogEntry) -> String {
    let mut parts = vec![
        format!("timestamp={}", entry.timestamp.to_rfc3339()),
        format!("level={}", level_name(entry)),
        format!("target={}", entry.target),
    ];

    if let Some(worker) = &entry.worker {
        parts.push(format!("worker={}", worker));
    }
    parts.push(format!("message=\"{}\"", entry.message.replace('"', "\\\"")));

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;

    #[test]
    fn test_json_format() {
        let entry = LogEntry::new(LogLevel::Info, "Started".to_string(), "kiln".to_string())
            .with_worker("Thread-1");

        let formatted = LogFormat::Json.format_entry(&entry);

        let parsed: serde_json::Value = serde_json::from_str(&formatted).unwrap();
        assert_eq!(parsed["message"], "Started");
        assert_eq!(parsed["level"], "INFO");
        assert_eq!(parsed["target"], "kiln");
        assert_eq!(parsed["worker"], "Thread-1");
    }

    #[test]
    fn test_human_format() {
        let entry = LogEntry::new(
            LogLevel::Warn,
            "Thread pool saturated".to_string(),
            "kiln::pool".to_string(),
        );

        let formatted = LogFormat::Human.format_entry(&entry);

        assert!(formatted.contains("WARN "));
        assert!(formatted.contains("[kiln::pool] Thread pool saturated"));
    }

    #[test]
    fn test_logfmt_format() {
        let entry = LogEntry::new(
            LogLevel::Error,
            "bad \"quote\"".to_string(),
            "kiln".to_string(),
        )
        .with_worker("Thread-7");

        let formatted = LogFormat::Logfmt.format_entry(&entry);

        assert!(formatted.contains("level=ERROR"));
        assert!(formatted.contains("worker=Thread-7"));
        assert!(formatted.ends_with("message=\"bad \\\"quote\\\"\""));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("text".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}

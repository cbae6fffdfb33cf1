//! Kiln logging backend for the standard `log` crate
//!
//! Server components never call this module. They record [`crate::events::Event`]s
//! on an injected sink; the default [`crate::events::LogSink`] turns those into
//! `log` records, and the logger installed here renders them.
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_core::logging::{LogFormat, LoggingConfig};
//!
//! let config = LoggingConfig::production().with_format(LogFormat::Logfmt);
//! kiln_core::logging::init_logging(&config).unwrap();
//!
//! log::info!("Server starting on port {}", 8080);
//! ```

pub mod config;
pub mod destinations;
pub mod formatter;

// Re-export main types for convenience
pub use config::{LogLevel, LoggingConfig};
pub use destinations::{LogEntry, LogOutput};
pub use formatter::LogFormat;

use std::io::{self, Write};
use std::sync::Once;

static INIT: Once = Once::new();

/// Install the Kiln logger
///
/// Safe to call more than once; only the first call has an effect.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = init_logging_internal(config);
    });
    result
}

fn init_logging_internal(config: &LoggingConfig) -> anyhow::Result<()> {
    log::set_boxed_logger(Box::new(KilnLogger::new(config.clone())))
        .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
    log::set_max_level(config.level.into());
    Ok(())
}

/// `log::Log` implementation writing one formatted line per record
struct KilnLogger {
    config: LoggingConfig,
}

impl KilnLogger {
    fn new(config: LoggingConfig) -> Self {
        Self { config }
    }

    fn write_line(&self, line: &str) -> io::Result<()> {
        match self.config.output {
            LogOutput::Stdout => writeln!(io::stdout().lock(), "{}", line),
            LogOutput::Stderr => writeln!(io::stderr().lock(), "{}", line),
        }
    }
}

impl log::Log for KilnLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        LogLevel::from(metadata.level()) <= self.config.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let entry = LogEntry::from_log_record(record);
        // A closed stdout must not take a worker down
        let _ = self.write_line(&self.config.format.format_entry(&entry));
    }

    fn flush(&self) {
        let _ = match self.config.output {
            LogOutput::Stdout => io::stdout().flush(),
            LogOutput::Stderr => io::stderr().flush(),
        };
    }
}

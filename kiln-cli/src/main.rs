//! Kiln CLI: starts the HTTP server.
//!
//! ```bash
//! kiln                       # 127.0.0.1:8080, 10 workers
//! kiln 9000 0.0.0.0 32       # port, host, worker threads
//! kiln --config kiln.toml --log-format json
//! ```
//!
//! See `kiln --help` for all available options.

mod commands;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "kiln",
    about = "Serve static files and accept JSON uploads over HTTP/1.1",
    version,
    after_help = "Settings are read from kiln.toml and KILN_* environment variables; \
                  command-line values take precedence."
)]
pub struct Cli {
    /// Port to listen on (non-numeric values keep the configured port)
    pub port: Option<String>,

    /// Address to bind
    pub host: Option<String>,

    /// Worker threads, clamped to 1..=100 (non-numeric values keep the configured size)
    pub threads: Option<String>,

    /// Configuration file
    #[arg(long, short = 'c', default_value = kiln_core::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Directory files are served from
    #[arg(long)]
    pub resource_dir: Option<PathBuf>,

    /// Log output format: human, json or logfmt
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log level: error, warn, info, debug or trace
    #[arg(long)]
    pub log_level: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = commands::serve::run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

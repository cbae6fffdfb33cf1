//! Kiln - Core
//!
//! A from-scratch HTTP/1.1 server that serves static files and accepts JSON
//! uploads, built on a bounded pool of worker threads.
//!
//! # Overview
//!
//! Each accepted socket becomes a [`server::ConnectionTask`] that is submitted to
//! the [`server::ThreadPool`]. A worker owns the connection for its whole
//! lifetime and runs the keep-alive protocol loop in
//! [`server::ConnectionHandler`]: read a bounded request, validate it, dispatch
//! it, write the response, then decide whether to wait for another request.
//!
//! When every worker is busy and the queue is full, the listener answers the
//! new connection with `503 Service Unavailable` and closes it.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use kiln_core::config::KilnConfig;
//! use kiln_core::server::HttpServer;
//!
//! let config = KilnConfig::load()?;
//! let server = HttpServer::bind(config.server)?;
//! server.run()?;
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! # Architecture
//!
//! - [`security`] - Host header and path containment checks (pure functions)
//! - [`http`] - Request parsing, bounded socket reads, response serialization
//! - [`dispatch`] - GET file serving and POST JSON uploads
//! - [`server`] - Thread pool, connection state machine and listener
//! - [`config`] - Layered configuration (defaults, TOML, environment)
//! - [`logging`] - `log` crate backend with human, JSON and logfmt output
//! - [`events`] - Injected event sink used by every component

pub mod clock;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod http;
pub mod logging;
pub mod security;
pub mod server;
pub mod storage;

pub use config::KilnConfig;
pub use server::{HttpServer, ShutdownHandle, ThreadPool};

// Main result type for the server
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for Kiln
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// HTTP-related errors (parsing, connection issues, etc.)
    #[error("HTTP Error: {0}")]
    Http(#[from] http::HttpError),
    /// Configuration could not be loaded or is invalid
    #[error("Configuration Error: {0}")]
    Config(String),
    /// Listener could not bind to the requested address
    #[error("Bind Error: failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    /// The worker pool refused the operation (for example after shutdown)
    #[error("Pool Error: {0}")]
    Pool(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Config(format!("{:#}", err))
    }
}

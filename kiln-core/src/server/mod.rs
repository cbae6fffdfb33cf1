//! Connection scheduling: listener, worker pool and per-connection loop
//!
//! - [`listener`] - Accept loop, 503 admission path, graceful shutdown
//! - [`pool`] - Fixed worker threads over a bounded queue
//! - [`connection`] - Keep-alive protocol state machine run by each worker

pub mod connection;
pub mod listener;
pub mod pool;

pub use connection::{ConnectionHandler, ConnectionLimits, ConnectionSession, ConnectionState};
pub use listener::{HttpServer, ShutdownHandle};
pub use pool::{Submission, ThreadPool};

use std::net::TcpStream;
use std::time::Instant;

/// An accepted connection waiting for a worker
///
/// Submitted to the pool once and consumed by exactly one worker.
#[derive(Debug)]
pub struct ConnectionTask<S = TcpStream> {
    pub stream: S,
    /// Peer address, for logging
    pub peer: String,
    pub accepted_at: Instant,
}

impl<S> ConnectionTask<S> {
    pub fn new(stream: S, peer: String) -> Self {
        Self { stream, peer, accepted_at: Instant::now() }
    }
}

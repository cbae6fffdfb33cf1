//! Server events and the sink they are recorded to
//!
//! Components never log through global state directly. They receive an
//! [`EventSink`] at construction and record typed [`Event`]s on it. The default
//! [`LogSink`] forwards every event to the `log` facade, so formatting and
//! destinations stay the business of [`crate::logging`].

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Why a connection loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client asked for `Connection: close` (or HTTP/1.0 without keep-alive)
    ClientRequested,
    /// The client closed the socket
    PeerClosed,
    /// No request line arrived before the idle timeout
    IdleTimeout,
    /// The per-connection request cap was reached
    RequestLimit,
    /// The last response signalled closure (protocol or security error)
    ErrorResponse,
    /// Socket-level failure (reset, broken pipe)
    Io,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CloseReason::ClientRequested => "client requested close",
            CloseReason::PeerClosed => "peer closed connection",
            CloseReason::IdleTimeout => "idle timeout",
            CloseReason::RequestLimit => "request limit reached",
            CloseReason::ErrorResponse => "error response",
            CloseReason::Io => "socket error",
        };
        f.write_str(text)
    }
}

/// Everything the core reports about its own operation
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ServerStarted { addr: String, pool_size: usize, queue_capacity: usize, resource_dir: String },
    ServerStopped,
    WorkerStarted { worker: String },
    WorkerStopped { worker: String },
    WorkerPanicked { worker: String, message: String },
    ConnectionAccepted { peer: String },
    ConnectionQueued { queue_len: usize },
    ConnectionRejected { peer: String },
    ConnectionServing { worker: String, peer: String },
    ConnectionClosed { worker: String, peer: String, requests: usize, reason: CloseReason },
    RequestReceived { worker: String, method: String, path: String, version: String },
    ResponseSent { worker: String, status: u16, bytes: usize },
    SecurityViolation { worker: String, detail: String },
    UploadCreated { worker: String, path: String, bytes: usize },
    Failure { worker: String, detail: String },
}

impl Event {
    /// Severity this event is reported at
    pub fn level(&self) -> log::Level {
        match self {
            Event::WorkerPanicked { .. } | Event::Failure { .. } => log::Level::Error,
            Event::ConnectionQueued { .. }
            | Event::ConnectionRejected { .. }
            | Event::SecurityViolation { .. } => log::Level::Warn,
            Event::RequestReceived { .. } | Event::ResponseSent { .. } => log::Level::Debug,
            _ => log::Level::Info,
        }
    }

    /// Worker thread this event came from, if any
    pub fn worker(&self) -> Option<&str> {
        match self {
            Event::WorkerStarted { worker }
            | Event::WorkerStopped { worker }
            | Event::WorkerPanicked { worker, .. }
            | Event::ConnectionServing { worker, .. }
            | Event::ConnectionClosed { worker, .. }
            | Event::RequestReceived { worker, .. }
            | Event::ResponseSent { worker, .. }
            | Event::SecurityViolation { worker, .. }
            | Event::UploadCreated { worker, .. }
            | Event::Failure { worker, .. } => Some(worker),
            _ => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ServerStarted { addr, pool_size, queue_capacity, resource_dir } => write!(
                f,
                "HTTP server started on http://{} (pool size {}, queue capacity {}, serving '{}')",
                addr, pool_size, queue_capacity, resource_dir
            ),
            Event::ServerStopped => f.write_str("Server stopped"),
            Event::WorkerStarted { .. } => f.write_str("Started"),
            Event::WorkerStopped { .. } => f.write_str("Stopped"),
            Event::WorkerPanicked { message, .. } => write!(f, "Unhandled error: {}", message),
            Event::ConnectionAccepted { peer } => write!(f, "Connection from {}", peer),
            Event::ConnectionQueued { queue_len } => {
                write!(f, "Thread pool saturated, queuing connection. Queue size: {}", queue_len)
            }
            Event::ConnectionRejected { peer } => write!(
                f,
                "Connection from {} rejected with 503 due to thread pool saturation",
                peer
            ),
            Event::ConnectionServing { peer, .. } => write!(f, "Serving connection from {}", peer),
            Event::ConnectionClosed { peer, requests, reason, .. } => write!(
                f,
                "Closed connection from {} after {} request(s): {}",
                peer, requests, reason
            ),
            Event::RequestReceived { method, path, version, .. } => {
                write!(f, "Request: {} {} {}", method, path, version)
            }
            Event::ResponseSent { status, bytes, .. } => {
                write!(f, "Response: {} ({} bytes)", status, bytes)
            }
            Event::SecurityViolation { detail, .. } => write!(f, "Security violation: {}", detail),
            Event::UploadCreated { path, bytes, .. } => {
                write!(f, "Created file: {} ({} bytes)", path, bytes)
            }
            Event::Failure { detail, .. } => write!(f, "Error: {}", detail),
        }
    }
}

/// Destination for server events
pub trait EventSink: Send + Sync {
    fn record(&self, event: &Event);
}

/// Shared handle to an event sink
pub type SharedSink = Arc<dyn EventSink>;

/// Forwards events to the `log` facade
#[derive(Debug, Clone)]
pub struct LogSink {
    target: &'static str,
}

impl LogSink {
    pub fn new() -> Self {
        Self { target: "kiln" }
    }

    /// Convenience constructor returning a [`SharedSink`]
    pub fn shared() -> SharedSink {
        Arc::new(Self::new())
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for LogSink {
    fn record(&self, event: &Event) {
        match event.worker() {
            Some(worker) => log::log!(target: self.target, event.level(), "[{}] {}", worker, event),
            None => log::log!(target: self.target, event.level(), "{}", event),
        }
    }
}

/// Keeps every recorded event in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Number of recorded events matching a predicate
    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        events.iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for MemorySink {
    fn record(&self, event: &Event) {
        self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event.clone());
    }
}

/// Discards every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&self, _event: &Event) {}
}

//! HTTP/1.1 wire layer built on the standard library
//!
//! This module turns bytes into requests and responses into bytes. It knows
//! nothing about files, uploads or worker threads.
//!
//! # Architecture
//!
//! - [`request`] - Request line, header and body parsing
//! - [`reader`] - Bounded, deadline-aware reading of one request from a socket
//! - [`response`] - Response building and serialization
//! - [`transport`] - The socket abstraction the reader and writer operate on

pub mod reader;
pub mod request;
pub mod response;
pub mod transport;

// Re-export main types for convenience
pub use reader::{ReadOutcome, ReadPhase, RequestReader};
pub use request::{Headers, HttpMethod, HttpRequest, HttpVersion, RequestHead};
pub use response::{HttpResponse, Persistence, StatusCode};
pub use transport::Transport;

/// Result type for HTTP operations
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// HTTP-specific error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpError {
    /// Invalid HTTP request format
    InvalidRequest(String),
    /// Method other than GET or POST
    UnsupportedMethod(String),
    /// Version other than HTTP/1.0 or HTTP/1.1
    UnsupportedVersion(String),
    /// Invalid HTTP headers
    InvalidHeaders(String),
    /// Request exceeded the byte ceiling before it was complete
    RequestTooLarge(usize),
    /// Connection-related errors
    ConnectionError(String),
    /// Generic I/O errors
    IoError(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::InvalidRequest(msg) => write!(f, "Invalid HTTP request: {}", msg),
            HttpError::UnsupportedMethod(method) => {
                write!(f, "Unsupported HTTP method: {}", method)
            }
            HttpError::UnsupportedVersion(version) => {
                write!(f, "Unsupported HTTP version: {}", version)
            }
            HttpError::InvalidHeaders(msg) => write!(f, "Invalid headers: {}", msg),
            HttpError::RequestTooLarge(limit) => {
                write!(f, "Request exceeds the {} byte limit", limit)
            }
            HttpError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            HttpError::IoError(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

impl From<std::io::Error> for HttpError {
    fn from(err: std::io::Error) -> Self {
        HttpError::IoError(err.to_string())
    }
}

/// Hard ceiling on request line + headers + body
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8192;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8080;

/// HTTP/1.1 protocol constants
pub mod constants {
    /// HTTP/1.1 version string
    pub const HTTP_1_1: &str = "HTTP/1.1";

    /// Common HTTP headers
    pub mod headers {
        pub const CONTENT_TYPE: &str = "Content-Type";
        pub const CONTENT_LENGTH: &str = "Content-Length";
        pub const CONTENT_DISPOSITION: &str = "Content-Disposition";
        pub const CONNECTION: &str = "Connection";
        pub const KEEP_ALIVE: &str = "Keep-Alive";
        pub const DATE: &str = "Date";
        pub const SERVER: &str = "Server";
        pub const RETRY_AFTER: &str = "Retry-After";
        pub const HOST: &str = "Host";
    }

    /// Common content types
    pub mod content_types {
        pub const JSON: &str = "application/json";
        pub const HTML: &str = "text/html; charset=utf-8";
        pub const TEXT: &str = "text/plain; charset=utf-8";
        pub const BINARY: &str = "application/octet-stream";
    }

    /// Value of the `Server` header
    pub const SERVER_NAME: &str = concat!("kiln/", env!("CARGO_PKG_VERSION"));

    /// HTTP line ending
    pub const CRLF: &str = "\r\n";
    pub const CRLF_BYTES: &[u8] = b"\r\n";
    pub const DOUBLE_CRLF_BYTES: &[u8] = b"\r\n\r\n";
}

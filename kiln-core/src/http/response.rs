//! HTTP response building and serialization
//!
//! A response is built once with the fluent API and never mutated afterwards.
//! Framing headers (`Content-Length`, `Date`, `Connection`, `Keep-Alive`,
//! `Server`) are not part of the built value; they are produced by
//! [`HttpResponse::to_bytes`] from the connection's keep-alive decision.

use super::constants::{content_types, headers, CRLF, HTTP_1_1, SERVER_NAME};

/// HTTP status codes produced by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    // 2xx Success
    Ok = 200,
    Created = 201,

    // 4xx Client Error
    BadRequest = 400,
    Forbidden = 403,
    NotFound = 404,
    UnsupportedMediaType = 415,

    // 5xx Server Error
    InternalServerError = 500,
    ServiceUnavailable = 503,
}

impl StatusCode {
    /// Get the status code as a number
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the reason phrase for this status code
    pub fn reason_phrase(self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::UnsupportedMediaType => "Unsupported Media Type",
            StatusCode::InternalServerError => "Internal Server Error",
            StatusCode::ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl std::fmt::Display for StatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}

/// What the `Connection` header of a response announces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Keep the connection open for further requests
    KeepAlive {
        /// Idle timeout advertised in the `Keep-Alive` header
        timeout_secs: u64,
        /// Requests still allowed on this connection
        remaining: usize,
    },
    /// Close the connection after this response
    Close,
}

/// HTTP response builder with fluent API
///
/// # Example
///
/// ```rust
/// use kiln_core::http::{HttpResponse, Persistence, StatusCode};
///
/// let response = HttpResponse::ok().html("<h1>Hello</h1>");
/// let bytes = response.to_bytes(Persistence::Close, "Mon, 15 Jan 2024 10:30:00 GMT");
/// assert!(bytes.starts_with(b"HTTP/1.1 200 OK\r\n"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    closes_connection: bool,
}

impl HttpResponse {
    /// Create a new HTTP response with the given status code
    pub fn new(status: StatusCode) -> Self {
        Self { status, headers: Vec::new(), body: Vec::new(), closes_connection: false }
    }

    // Convenience constructors for common status codes

    /// Create a 200 OK response
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    /// Create a 201 Created response
    pub fn created() -> Self {
        Self::new(StatusCode::Created)
    }

    /// Create an error response with a plain-text `Error <code>: <detail>` body
    pub fn error(status: StatusCode, detail: &str) -> Self {
        let detail = if detail.is_empty() { status.reason_phrase() } else { detail };
        Self::new(status).text(&format!("Error {}: {}\n", status.as_u16(), detail))
    }

    /// Create the 503 sent when the worker pool is saturated
    pub fn service_unavailable(retry_after_secs: u64) -> Self {
        Self::new(StatusCode::ServiceUnavailable)
            .header(headers::RETRY_AFTER, &retry_after_secs.to_string())
            .content_type(content_types::TEXT)
            .closing()
    }

    // Builder methods

    /// Set a header, replacing any earlier value with the same name
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the Content-Type header
    pub fn content_type(self, content_type: &str) -> Self {
        self.header(headers::CONTENT_TYPE, content_type)
    }

    /// Set the body as raw bytes
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Set the body as text (UTF-8)
    pub fn text(self, text: &str) -> Self {
        self.content_type(content_types::TEXT).body(text.as_bytes().to_vec())
    }

    /// Set the body as HTML
    pub fn html(self, html: &str) -> Self {
        self.html_bytes(html.as_bytes().to_vec())
    }

    /// Set an HTML body that is already in bytes
    pub fn html_bytes(self, html: Vec<u8>) -> Self {
        self.content_type(content_types::HTML).body(html)
    }

    /// Set the body as JSON
    pub fn json(self, json: &str) -> Self {
        self.content_type(content_types::JSON).body(json.as_bytes().to_vec())
    }

    /// Set the body as a file download
    pub fn attachment(self, filename: &str, data: Vec<u8>) -> Self {
        let filename = filename.replace(['"', '\\', '\r', '\n'], "_");
        self.content_type(content_types::BINARY)
            .header(headers::CONTENT_DISPOSITION, &format!("attachment; filename=\"{}\"", filename))
            .body(data)
    }

    /// Mark this response as ending the connection
    pub fn closing(mut self) -> Self {
        self.closes_connection = true;
        self
    }

    // Accessors

    /// Get the status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get a specific header (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Get the response body
    pub fn body_bytes(&self) -> &[u8] {
        &self.body
    }

    /// Whether this response forces the connection to close
    pub fn closes_connection(&self) -> bool {
        self.closes_connection
    }

    /// Convert the response to raw HTTP bytes for transmission
    ///
    /// `Content-Length` always equals the body length; no chunked encoding is
    /// ever produced.
    pub fn to_bytes(&self, persistence: Persistence, date: &str) -> Vec<u8> {
        let mut head = format!("{} {}{}", HTTP_1_1, self.status, CRLF);

        for (name, value) in &self.headers {
            if is_framing_header(name) {
                continue;
            }
            push_header(&mut head, name, value);
        }

        push_header(&mut head, headers::CONTENT_LENGTH, &self.body.len().to_string());
        push_header(&mut head, headers::DATE, date);
        push_header(&mut head, headers::SERVER, SERVER_NAME);

        match persistence {
            Persistence::KeepAlive { timeout_secs, remaining } => {
                push_header(&mut head, headers::CONNECTION, "keep-alive");
                push_header(
                    &mut head,
                    headers::KEEP_ALIVE,
                    &format!("timeout={}, max={}", timeout_secs, remaining),
                );
            }
            Persistence::Close => push_header(&mut head, headers::CONNECTION, "close"),
        }

        // Empty line to separate headers from body
        head.push_str(CRLF);

        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }
}

fn push_header(head: &mut String, name: &str, value: &str) {
    head.push_str(name);
    head.push_str(": ");
    head.push_str(value);
    head.push_str(CRLF);
}

/// Headers that are derived at serialization time and never taken from the builder
fn is_framing_header(name: &str) -> bool {
    [
        headers::CONTENT_LENGTH,
        headers::DATE,
        headers::SERVER,
        headers::CONNECTION,
        headers::KEEP_ALIVE,
        "Transfer-Encoding",
    ]
    .iter()
    .any(|framing| framing.eq_ignore_ascii_case(name))
}

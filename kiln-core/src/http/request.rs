//! HTTP request parsing and representation
//!
//! Parsing is split in two steps because the body length is only known once
//! the head is parsed: [`HttpRequest::parse_head`] handles the request line and
//! headers, [`RequestHead::with_body`] attaches the body bytes.

use std::collections::HashMap;
use std::str::FromStr;

use super::constants::{CRLF, DOUBLE_CRLF_BYTES};
use super::{HttpError, HttpResult};

/// HTTP methods supported by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    GET,
    POST,
}

impl HttpMethod {
    /// Convert method to string
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
        }
    }
}

impl FromStr for HttpMethod {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::GET),
            "POST" => Ok(HttpMethod::POST),
            _ => Err(HttpError::UnsupportedMethod(s.to_string())),
        }
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP version information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http1_0,
    Http1_1,
}

impl HttpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpVersion::Http1_0 => "HTTP/1.0",
            HttpVersion::Http1_1 => "HTTP/1.1",
        }
    }
}

impl FromStr for HttpVersion {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(HttpVersion::Http1_0),
            "HTTP/1.1" => Ok(HttpVersion::Http1_1),
            _ => Err(HttpError::UnsupportedVersion(s.to_string())),
        }
    }
}

impl std::fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// HTTP headers collection. Names are stored lower-cased; a repeated header
/// replaces the earlier value.
pub type Headers = HashMap<String, String>;

/// Request line and headers, before the body has been read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    method: HttpMethod,
    target: String,
    version: HttpVersion,
    headers: Headers,
}

impl RequestHead {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn version(&self) -> HttpVersion {
        self.version
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }

    /// Declared body length (0 when absent)
    pub fn content_length(&self) -> HttpResult<usize> {
        match self.header("content-length") {
            None => Ok(0),
            Some(value) => value.trim().parse::<usize>().map_err(|e| {
                HttpError::InvalidHeaders(format!("Invalid Content-Length '{}': {}", value, e))
            }),
        }
    }

    /// Combine the head with its body into a complete request
    pub fn with_body(self, body: Vec<u8>) -> HttpRequest {
        HttpRequest { head: self, body }
    }
}

/// Represents a complete HTTP request
///
/// Immutable once constructed. The target is kept exactly as received; path
/// resolution happens in [`crate::security`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    head: RequestHead,
    body: Vec<u8>,
}

impl HttpRequest {
    /// Parse a complete HTTP request (head plus the whole body) from raw bytes
    ///
    /// # Example
    ///
    /// ```rust
    /// use kiln_core::http::HttpRequest;
    ///
    /// let raw = b"GET / HTTP/1.1\r\nHost: localhost:8080\r\n\r\n";
    /// let request = HttpRequest::parse(raw)?;
    /// assert_eq!(request.path(), "/");
    /// # Ok::<(), kiln_core::http::HttpError>(())
    /// ```
    pub fn parse(raw_request: &[u8]) -> HttpResult<Self> {
        let head_end = find_subsequence(raw_request, DOUBLE_CRLF_BYTES)
            .ok_or_else(|| HttpError::InvalidRequest("Missing end of headers".to_string()))?;

        let head = Self::parse_head(&raw_request[..head_end])?;
        let body = raw_request[head_end + DOUBLE_CRLF_BYTES.len()..].to_vec();

        let expected = head.content_length()?;
        if body.len() != expected {
            return Err(HttpError::InvalidRequest(format!(
                "Body length {} does not match Content-Length {}",
                body.len(),
                expected
            )));
        }

        Ok(head.with_body(body))
    }

    /// Parse the request line and headers (without the terminating blank line)
    pub fn parse_head(head: &[u8]) -> HttpResult<RequestHead> {
        let head_str = std::str::from_utf8(head)
            .map_err(|e| HttpError::InvalidRequest(format!("Invalid UTF-8: {}", e)))?;

        let mut lines = head_str.split(CRLF);
        let request_line = lines
            .next()
            .filter(|line| !line.is_empty())
            .ok_or_else(|| HttpError::InvalidRequest("Empty request".to_string()))?;

        let (method, target, version) = Self::parse_request_line(request_line)?;
        let headers = Self::parse_headers(lines)?;

        if headers
            .get("transfer-encoding")
            .is_some_and(|te| !te.eq_ignore_ascii_case("identity"))
        {
            return Err(HttpError::InvalidHeaders("Transfer-Encoding is not supported".to_string()));
        }

        Ok(RequestHead { method, target, version, headers })
    }

    /// Parse the HTTP request line (e.g., "GET /path HTTP/1.1")
    pub fn parse_request_line(line: &str) -> HttpResult<(HttpMethod, String, HttpVersion)> {
        let parts: Vec<&str> = line.split(' ').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(HttpError::InvalidRequest(format!("Invalid request line: {}", line)));
        }

        let version = parts[2].parse()?;
        let method = parts[0].parse()?;
        let target = parts[1];
        if !target.starts_with('/') {
            return Err(HttpError::InvalidRequest(format!("Invalid request target: {}", target)));
        }

        Ok((method, target.to_string(), version))
    }

    /// Parse HTTP headers from lines
    fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HttpResult<Headers> {
        let mut headers = HashMap::new();

        for line in lines {
            if line.is_empty() {
                continue;
            }

            let (name, value) = line.split_once(':').ok_or_else(|| {
                HttpError::InvalidHeaders(format!("Invalid header line: {}", line))
            })?;

            if name.is_empty() || name.contains(char::is_whitespace) {
                return Err(HttpError::InvalidHeaders(format!("Invalid header name: {}", name)));
            }

            headers.insert(name.to_ascii_lowercase(), value.trim().to_string());
        }

        Ok(headers)
    }

    // Accessors

    /// Get the HTTP method
    pub fn method(&self) -> HttpMethod {
        self.head.method
    }

    /// Get the raw request target, query string included
    pub fn target(&self) -> &str {
        &self.head.target
    }

    /// Get the request path (target without query string or fragment)
    pub fn path(&self) -> &str {
        let target = self.head.target.as_str();
        let end = target.find(['?', '#']).unwrap_or(target.len());
        &target[..end]
    }

    /// Get the HTTP version
    pub fn version(&self) -> HttpVersion {
        self.head.version
    }

    /// Get all headers
    pub fn headers(&self) -> &Headers {
        &self.head.headers
    }

    /// Get a specific header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.header(name)
    }

    /// Get the request body
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Whether the client wants the connection kept open after this request
    ///
    /// HTTP/1.1 defaults to persistent unless `Connection: close` is sent.
    /// HTTP/1.0 is persistent only with an explicit `Connection: keep-alive`.
    pub fn wants_keep_alive(&self) -> bool {
        let has_token = |token: &str| {
            self.header("connection")
                .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
                .unwrap_or(false)
        };

        match self.head.version {
            HttpVersion::Http1_1 => !has_token("close"),
            HttpVersion::Http1_0 => has_token("keep-alive"),
        }
    }
}

/// Position of the first occurrence of `needle` in `haystack`
pub(crate) fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_method_parsing() {
        assert_eq!("GET".parse::<HttpMethod>().unwrap(), HttpMethod::GET);
        assert_eq!("POST".parse::<HttpMethod>().unwrap(), HttpMethod::POST);
        assert_eq!(
            "DELETE".parse::<HttpMethod>(),
            Err(HttpError::UnsupportedMethod("DELETE".to_string()))
        );
        assert!("get".parse::<HttpMethod>().is_err());
    }

    #[test]
    fn test_http_version_parsing() {
        assert_eq!("HTTP/1.1".parse::<HttpVersion>().unwrap(), HttpVersion::Http1_1);
        assert_eq!("HTTP/1.0".parse::<HttpVersion>().unwrap(), HttpVersion::Http1_0);
        assert!("HTTP/2.0".parse::<HttpVersion>().is_err());
    }

    #[test]
    fn test_request_line_parsing() {
        let (method, path, version) =
            HttpRequest::parse_request_line("GET /users HTTP/1.1").unwrap();
        assert_eq!(method, HttpMethod::GET);
        assert_eq!(path, "/users");
        assert_eq!(version, HttpVersion::Http1_1);

        assert!(HttpRequest::parse_request_line("GET /users").is_err());
        assert!(HttpRequest::parse_request_line("GET  /users HTTP/1.1").is_err());
        assert!(HttpRequest::parse_request_line("GET users HTTP/1.1").is_err());
    }

    #[test]
    fn test_headers_parsing() {
        let lines = ["Host: localhost", "Content-Type: application/json", ""];
        let headers = HttpRequest::parse_headers(lines.into_iter()).unwrap();
        assert_eq!(headers.get("host"), Some(&"localhost".to_string()));
        assert_eq!(headers.get("content-type"), Some(&"application/json".to_string()));
    }

    #[test]
    fn test_repeated_header_last_wins() {
        let lines = ["X-Token: first", "x-token: second"];
        let headers = HttpRequest::parse_headers(lines.into_iter()).unwrap();
        assert_eq!(headers.get("x-token"), Some(&"second".to_string()));
    }

    #[test]
    fn test_header_without_colon_is_rejected() {
        let raw = b"GET / HTTP/1.1\r\nHost localhost\r\n\r\n";
        assert!(matches!(HttpRequest::parse(raw), Err(HttpError::InvalidHeaders(_))));
    }

    #[test]
    fn test_parse_full_request_with_body() {
        let raw = b"POST /upload HTTP/1.1\r\nHost: localhost:8080\r\nContent-Type: application/json\r\nContent-Length: 7\r\n\r\n{\"a\":1}";
        let request = HttpRequest::parse(raw).unwrap();

        assert_eq!(request.method(), HttpMethod::POST);
        assert_eq!(request.path(), "/upload");
        assert_eq!(request.header("Content-Type"), Some("application/json"));
        assert_eq!(request.body(), b"{\"a\":1}");
    }

    #[test]
    fn test_body_length_mismatch() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nshort";
        assert!(HttpRequest::parse(raw).is_err());
    }

    #[test]
    fn test_chunked_is_rejected() {
        let raw = b"POST / HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        assert!(matches!(HttpRequest::parse(raw), Err(HttpError::InvalidHeaders(_))));
    }

    #[test]
    fn test_path_strips_query() {
        let raw = b"GET /index.html?page=1 HTTP/1.1\r\n\r\n";
        let request = HttpRequest::parse(raw).unwrap();
        assert_eq!(request.path(), "/index.html");
        assert_eq!(request.target(), "/index.html?page=1");
    }

    #[test]
    fn test_keep_alive_defaults() {
        let http11 = HttpRequest::parse(b"GET / HTTP/1.1\r\n\r\n").unwrap();
        assert!(http11.wants_keep_alive());

        let http11_close =
            HttpRequest::parse(b"GET / HTTP/1.1\r\nConnection: Close\r\n\r\n").unwrap();
        assert!(!http11_close.wants_keep_alive());

        let http10 = HttpRequest::parse(b"GET / HTTP/1.0\r\n\r\n").unwrap();
        assert!(!http10.wants_keep_alive());

        let http10_ka =
            HttpRequest::parse(b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(http10_ka.wants_keep_alive());
    }
}

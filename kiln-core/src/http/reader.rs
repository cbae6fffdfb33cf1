//! Reads exactly one request from a transport, within a byte ceiling and a
//! deadline.

use std::io;
use std::time::Instant;

use super::constants::{CRLF_BYTES, DOUBLE_CRLF_BYTES};
use super::request::{find_subsequence, HttpRequest, RequestHead};
use super::transport::{is_timeout, Transport};
use super::HttpError;

/// Size of a single socket read
const READ_CHUNK: usize = 4096;

/// How far the current request has progressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPhase {
    /// Nothing of the next request has arrived yet
    AwaitingRequestLine,
    /// Some bytes arrived but the blank line ending the head has not
    ReadingHeaders,
    /// The head is parsed, body bytes are outstanding
    ReadingBody,
}

/// Result of trying to read one request
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete, well-formed request
    Complete(HttpRequest),
    /// The peer closed the stream before sending anything
    Eof,
    /// The deadline passed before a complete request arrived
    TimedOut,
    /// The bytes received cannot become a valid request. `respond` is true
    /// when a request line was recognised, so an error status is worth sending.
    Malformed { error: HttpError, respond: bool },
    /// Socket-level failure
    Failed(io::Error),
}

/// Incremental reader holding bytes between requests on one connection
#[derive(Debug)]
pub struct RequestReader {
    buffer: Vec<u8>,
    max_size: usize,
    head: Option<(RequestHead, usize)>,
}

impl RequestReader {
    pub fn new(max_size: usize) -> Self {
        Self { buffer: Vec::with_capacity(max_size.min(READ_CHUNK)), max_size, head: None }
    }

    /// Current progress on the request being read
    pub fn phase(&self) -> ReadPhase {
        if self.head.is_some() {
            ReadPhase::ReadingBody
        } else if self.buffer.is_empty() {
            ReadPhase::AwaitingRequestLine
        } else {
            ReadPhase::ReadingHeaders
        }
    }

    /// Read until one complete request is available, the deadline passes, the
    /// byte ceiling is hit or the stream fails.
    pub fn read_request<T: Transport + ?Sized>(
        &mut self,
        stream: &mut T,
        deadline: Instant,
    ) -> ReadOutcome {
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match self.try_complete() {
                Ok(Some(request)) => return ReadOutcome::Complete(request),
                Ok(None) => {}
                Err(error) => {
                    self.reset();
                    return ReadOutcome::Malformed { error, respond: true };
                }
            }

            if self.buffer.len() >= self.max_size {
                let respond = self.request_line_recognised();
                self.reset();
                return ReadOutcome::Malformed {
                    error: HttpError::RequestTooLarge(self.max_size),
                    respond,
                };
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ReadOutcome::TimedOut;
            }
            if let Err(e) = stream.set_read_timeout(Some(remaining)) {
                return ReadOutcome::Failed(e);
            }

            let want = READ_CHUNK.min(self.max_size - self.buffer.len());
            match stream.read(&mut chunk[..want]) {
                Ok(0) if self.phase() == ReadPhase::AwaitingRequestLine => {
                    return ReadOutcome::Eof
                }
                Ok(0) => {
                    self.reset();
                    return ReadOutcome::Malformed {
                        error: HttpError::ConnectionError(
                            "Stream closed in the middle of a request".to_string(),
                        ),
                        respond: false,
                    };
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_timeout(&e) => return ReadOutcome::TimedOut,
                Err(e) => return ReadOutcome::Failed(e),
            }
        }
    }

    /// Try to carve a complete request out of the buffer
    fn try_complete(&mut self) -> Result<Option<HttpRequest>, HttpError> {
        if self.head.is_none() {
            // Tolerate stray blank lines between requests
            while self.buffer.starts_with(CRLF_BYTES) {
                self.buffer.drain(..CRLF_BYTES.len());
            }

            let Some(head_end) = find_subsequence(&self.buffer, DOUBLE_CRLF_BYTES) else {
                return Ok(None);
            };

            let head = HttpRequest::parse_head(&self.buffer[..head_end])?;
            let body_start = head_end + DOUBLE_CRLF_BYTES.len();
            let body_len = head.content_length()?;
            match body_start.checked_add(body_len) {
                Some(total) if total <= self.max_size => {}
                _ => return Err(HttpError::RequestTooLarge(self.max_size)),
            }

            self.buffer.drain(..body_start);
            self.head = Some((head, body_len));
        }

        match self.head.take() {
            Some((head, body_len)) if self.buffer.len() >= body_len => {
                let body: Vec<u8> = self.buffer.drain(..body_len).collect();
                Ok(Some(head.with_body(body)))
            }
            pending => {
                self.head = pending;
                Ok(None)
            }
        }
    }

    /// Whether the buffer starts with a complete, parseable request line
    fn request_line_recognised(&self) -> bool {
        if self.head.is_some() {
            return true;
        }
        let Some(line_end) = find_subsequence(&self.buffer, CRLF_BYTES) else {
            return false;
        };
        std::str::from_utf8(&self.buffer[..line_end])
            .map(|line| HttpRequest::parse_request_line(line).is_ok())
            .unwrap_or(false)
    }

    fn reset(&mut self) {
        self.buffer.clear();
        self.head = None;
    }
}

//! Per-connection protocol loop
//!
//! A worker that claims a [`ConnectionTask`] runs [`ConnectionHandler::handle`]
//! until the connection closes. The loop moves through explicit
//! [`ConnectionState`]s; the timeout and request-count rules live on
//! [`ConnectionSession`] so they can be exercised without sockets.
//!
//! ```text
//! AwaitingRequestLine -> ReadingHeaders -> ReadingBody -> Dispatching
//!     -> WritingResponse -> KeepAliveWait -> AwaitingRequestLine ...
//!                       \-> Closed
//! ```

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::ConnectionTask;
use crate::clock::{http_date, Clock};
use crate::dispatch::{DispatchError, Dispatcher};
use crate::events::{CloseReason, Event, SharedSink};
use crate::http::constants::headers;
use crate::http::{
    HttpRequest, HttpResponse, Persistence, ReadOutcome, ReadPhase, RequestReader, Transport,
    DEFAULT_MAX_REQUEST_SIZE,
};
use crate::security::SecurityValidator;

/// Hard caps applied to every connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionLimits {
    /// How long to wait for the next request before closing silently
    pub idle_timeout: Duration,
    /// Responses served before the connection is closed
    pub max_requests: usize,
    /// Ceiling on request line + headers + body
    pub max_request_size: usize,
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(30),
            max_requests: 100,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        }
    }
}

/// Where a connection is in its request/response cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingRequestLine,
    ReadingHeaders,
    ReadingBody,
    Dispatching,
    WritingResponse,
    KeepAliveWait,
    Closed(CloseReason),
}

impl From<ReadPhase> for ConnectionState {
    fn from(phase: ReadPhase) -> Self {
        match phase {
            ReadPhase::AwaitingRequestLine => ConnectionState::AwaitingRequestLine,
            ReadPhase::ReadingHeaders => ConnectionState::ReadingHeaders,
            ReadPhase::ReadingBody => ConnectionState::ReadingBody,
        }
    }
}

/// Mutable state of one connection, owned by the worker serving it
#[derive(Debug, Clone)]
pub struct ConnectionSession {
    limits: ConnectionLimits,
    served: usize,
    last_activity: Instant,
    state: ConnectionState,
}

impl ConnectionSession {
    /// Start a session at the moment a worker claims the connection
    pub fn new(limits: ConnectionLimits, now: Instant) -> Self {
        Self { limits, served: 0, last_activity: now, state: ConnectionState::AwaitingRequestLine }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn served(&self) -> usize {
        self.served
    }

    pub fn is_open(&self) -> bool {
        !matches!(self.state, ConnectionState::Closed(_))
    }

    /// Instant after which waiting for the next request gives up
    pub fn deadline(&self) -> Instant {
        self.last_activity + self.limits.idle_timeout
    }

    pub fn is_idle_expired(&self, now: Instant) -> bool {
        now >= self.deadline()
    }

    /// Record how far reading got (used when a read stops early)
    pub fn observe_read(&mut self, phase: ReadPhase) {
        let still_waiting =
            self.state == ConnectionState::KeepAliveWait && phase == ReadPhase::AwaitingRequestLine;
        if self.is_open() && !still_waiting {
            self.state = phase.into();
        }
    }

    /// A complete request arrived
    pub fn begin_dispatch(&mut self) {
        self.state = ConnectionState::Dispatching;
    }

    /// Decide what the response about to be written announces
    ///
    /// Closing responses win, then the request cap, then the client's wish.
    pub fn begin_write(
        &mut self,
        response_closes: bool,
        client_keep_alive: bool,
    ) -> (Persistence, Option<CloseReason>) {
        self.state = ConnectionState::WritingResponse;

        if response_closes {
            (Persistence::Close, Some(CloseReason::ErrorResponse))
        } else if self.served + 1 >= self.limits.max_requests {
            (Persistence::Close, Some(CloseReason::RequestLimit))
        } else if !client_keep_alive {
            (Persistence::Close, Some(CloseReason::ClientRequested))
        } else {
            let persistence = Persistence::KeepAlive {
                timeout_secs: self.limits.idle_timeout.as_secs(),
                remaining: self.limits.max_requests - self.served - 1,
            };
            (persistence, None)
        }
    }

    /// The response was written; the idle clock restarts from `now`
    pub fn finish_response(&mut self, now: Instant, close: Option<CloseReason>) {
        self.served += 1;
        self.last_activity = now;
        self.state = match close {
            Some(reason) => ConnectionState::Closed(reason),
            None => ConnectionState::KeepAliveWait,
        };
    }

    pub fn close(&mut self, reason: CloseReason) {
        if self.is_open() {
            self.state = ConnectionState::Closed(reason);
        }
    }

    /// Reason the session closed, if it has
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self.state {
            ConnectionState::Closed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Runs the request/response loop for connections, shared by all workers
pub struct ConnectionHandler {
    validator: SecurityValidator,
    dispatcher: Dispatcher,
    clock: Arc<dyn Clock>,
    sink: SharedSink,
    limits: ConnectionLimits,
}

impl ConnectionHandler {
    pub fn new(
        validator: SecurityValidator,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
        sink: SharedSink,
        limits: ConnectionLimits,
    ) -> Self {
        Self { validator, dispatcher, clock, sink, limits }
    }

    pub fn limits(&self) -> ConnectionLimits {
        self.limits
    }

    /// Serve every request on the connection, then close it
    pub fn handle<S: Transport>(&self, task: ConnectionTask<S>, worker: &str) -> ConnectionSession {
        let ConnectionTask { mut stream, peer, .. } = task;
        self.sink
            .record(&Event::ConnectionServing { worker: worker.to_string(), peer: peer.clone() });

        let mut session = ConnectionSession::new(self.limits, self.clock.instant());
        if stream.set_write_timeout(Some(self.limits.idle_timeout)).is_err() {
            session.close(CloseReason::Io);
        }

        let mut reader = RequestReader::new(self.limits.max_request_size);
        while session.is_open() {
            self.serve_one(&mut stream, &mut reader, &mut session, worker);
        }

        // Best effort; the peer may already be gone
        let _ = stream.close();

        self.sink.record(&Event::ConnectionClosed {
            worker: worker.to_string(),
            peer,
            requests: session.served(),
            reason: session.close_reason().unwrap_or(CloseReason::Io),
        });
        session
    }

    /// One read, dispatch, write cycle
    fn serve_one<S: Transport>(
        &self,
        stream: &mut S,
        reader: &mut RequestReader,
        session: &mut ConnectionSession,
        worker: &str,
    ) {
        let request = match reader.read_request(stream, session.deadline()) {
            ReadOutcome::Complete(request) => request,
            ReadOutcome::Eof => return session.close(CloseReason::PeerClosed),
            ReadOutcome::TimedOut => {
                session.observe_read(reader.phase());
                return session.close(CloseReason::IdleTimeout);
            }
            ReadOutcome::Failed(_) => return session.close(CloseReason::Io),
            ReadOutcome::Malformed { error, respond } => {
                if respond {
                    let response = DispatchError::from(error).to_response();
                    let (persistence, _) = session.begin_write(true, false);
                    if self.write_response(stream, &response, persistence, worker).is_ok() {
                        let now = self.clock.instant();
                        session.finish_response(now, Some(CloseReason::ErrorResponse));
                    }
                }
                return session.close(CloseReason::ErrorResponse);
            }
        };

        session.begin_dispatch();
        self.sink.record(&Event::RequestReceived {
            worker: worker.to_string(),
            method: request.method().to_string(),
            path: request.target().to_string(),
            version: request.version().to_string(),
        });

        let response = self.respond(&request, worker);
        let (persistence, close) =
            session.begin_write(response.closes_connection(), request.wants_keep_alive());

        match self.write_response(stream, &response, persistence, worker) {
            Ok(()) => session.finish_response(self.clock.instant(), close),
            Err(_) => session.close(CloseReason::Io),
        }
    }

    /// Validate, then dispatch or reject
    fn respond(&self, request: &HttpRequest, worker: &str) -> HttpResponse {
        let decision = self.validator.validate(request.header(headers::HOST), request.target());

        match DispatchError::from_decision(&decision) {
            Some(err) => {
                self.sink.record(&Event::SecurityViolation {
                    worker: worker.to_string(),
                    detail: format!("{} ({} {})", err, request.method(), request.target()),
                });
                err.to_response()
            }
            None => match decision.resolved_path() {
                Some(path) => self.dispatcher.dispatch(request, path, worker),
                None => DispatchError::Storage("no resolved path".to_string()).to_response(),
            },
        }
    }

    fn write_response<S: Transport>(
        &self,
        stream: &mut S,
        response: &HttpResponse,
        persistence: Persistence,
        worker: &str,
    ) -> std::io::Result<()> {
        let bytes = response.to_bytes(persistence, &http_date(self.clock.now_utc()));
        stream.write_all(&bytes)?;
        stream.flush()?;

        self.sink.record(&Event::ResponseSent {
            worker: worker.to_string(),
            status: response.status().as_u16(),
            bytes: bytes.len(),
        });
        Ok(())
    }
}

//! TCP listener and accept loop
//!
//! The accept loop is the only place admission control happens: every
//! accepted socket is offered to the pool with a non-blocking submit, and a
//! rejected socket is answered with `503 Service Unavailable` right here,
//! before any connection state exists for it.

use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, TcpListener, TcpStream};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::connection::ConnectionHandler;
use super::pool::{Submission, ThreadPool};
use super::ConnectionTask;
use crate::clock::{http_date, Clock, SystemClock};
use crate::config::ServerConfig;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::events::{Event, LogSink, SharedSink};
use crate::http::{Persistence, Transport};
use crate::security::{HostPolicy, SecurityValidator};
use crate::storage::DiskStore;
use crate::{Error, Result};

/// Bound on writing the 503 to a rejected client
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_millis(500);

/// Total time a rejected socket is drained before it is dropped, so the 503
/// is not lost to a reset
const REJECT_LINGER: Duration = Duration::from_millis(50);

/// Most bytes read from a rejected socket while lingering
const REJECT_DRAIN_LIMIT: usize = 8192;

/// First pause after a failed `accept`
const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);

/// Longest pause between repeated `accept` failures
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Name used for events raised by the accept loop
const LISTENER_NAME: &str = "main";

/// Stops a running [`HttpServer`] from another thread
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    wake_addr: SocketAddr,
}

impl ShutdownHandle {
    /// Ask the accept loop to stop; queued and in-flight connections finish first
    pub fn shutdown(&self) {
        if self.flag.swap(true, Ordering::SeqCst) {
            return;
        }
        // Unblock accept() with a throwaway connection
        let _ = TcpStream::connect_timeout(&self.wake_addr, Duration::from_secs(1));
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// The HTTP server: a bound listener feeding a worker pool
///
/// # Example
///
/// ```rust,no_run
/// use kiln_core::config::ServerConfig;
/// use kiln_core::server::HttpServer;
///
/// let server = HttpServer::bind(ServerConfig::default())?;
/// let handle = server.shutdown_handle();
/// std::thread::spawn(move || server.run());
/// handle.shutdown();
/// # Ok::<(), kiln_core::Error>(())
/// ```
pub struct HttpServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    config: ServerConfig,
    resource_root: PathBuf,
    pool: ThreadPool<ConnectionTask>,
    clock: Arc<dyn Clock>,
    sink: SharedSink,
    shutdown: Arc<AtomicBool>,
}

impl HttpServer {
    /// Bind with the system clock, logging events through `log`
    pub fn bind(config: ServerConfig) -> Result<Self> {
        Self::bind_with(config, LogSink::shared(), Arc::new(SystemClock))
    }

    /// Bind with explicit collaborators
    ///
    /// Creates the resource and upload directories if needed and starts the
    /// worker threads. Port 0 binds an ephemeral port; the `Host` policy then
    /// uses the port actually bound.
    pub fn bind_with(config: ServerConfig, sink: SharedSink, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate_limits()?;
        config.prepare_directories()?;

        let addr = socket_address(&config.host, config.port);
        let listener =
            TcpListener::bind(&addr).map_err(|source| Error::Bind { addr: addr.clone(), source })?;
        let local_addr = listener.local_addr()?;

        let resource_root = config.resource_dir.canonicalize()?;
        let validator = SecurityValidator::new(
            HostPolicy::new(&config.host, local_addr.port()),
            resource_root.clone(),
            &config.default_document,
        );
        let dispatcher = Dispatcher::new(
            Arc::new(DiskStore),
            Arc::clone(&clock),
            &resource_root.join(&config.upload_subdir),
            &config.upload_subdir,
            Arc::clone(&sink),
        );
        let handler = ConnectionHandler::new(
            validator,
            dispatcher,
            Arc::clone(&clock),
            Arc::clone(&sink),
            config.connection_limits(),
        );

        let pool = ThreadPool::new(
            config.pool_size,
            config.queue_capacity(),
            Arc::clone(&sink),
            move |task: ConnectionTask, worker: &str| {
                handler.handle(task, worker);
            },
        )
        .map_err(|e| Error::Pool(format!("Failed to start workers: {}", e)))?;

        Ok(Self {
            listener,
            local_addr,
            config,
            resource_root,
            pool,
            clock,
            sink,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { flag: Arc::clone(&self.shutdown), wake_addr: wake_address(self.local_addr) }
    }

    /// Accept connections until shut down, then drain the pool
    pub fn run(mut self) -> Result<()> {
        self.sink.record(&Event::ServerStarted {
            addr: self.local_addr.to_string(),
            pool_size: self.pool.size(),
            queue_capacity: self.pool.queue_capacity(),
            resource_dir: self.resource_root.display().to_string(),
        });

        let mut backoff = AcceptBackoff::new();
        loop {
            let accepted = self.listener.accept();
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            match accepted {
                Ok((stream, peer)) => {
                    backoff.reset();
                    self.admit(stream, peer);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    // Persistent failures (EMFILE) would otherwise spin this loop
                    let pause = backoff.next_pause();
                    self.sink.record(&Event::Failure {
                        worker: LISTENER_NAME.to_string(),
                        detail: format!(
                            "Failed to accept connection: {} (retrying in {}ms)",
                            e,
                            pause.as_millis()
                        ),
                    });
                    std::thread::sleep(pause);
                }
            }
        }

        self.pool.shutdown();
        self.sink.record(&Event::ServerStopped);
        Ok(())
    }

    /// Offer a connection to the pool, answering 503 if it is full
    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        let peer = peer.to_string();
        self.sink.record(&Event::ConnectionAccepted { peer: peer.clone() });

        if let Submission::Rejected(task) = self.pool.try_execute(ConnectionTask::new(stream, peer)) {
            self.sink.record(&Event::ConnectionRejected { peer: task.peer.clone() });
            self.reject(task.stream);
        }
    }

    /// Send the 503 and close, never blocking the accept loop for long
    fn reject(&self, mut stream: TcpStream) {
        let response =
            DispatchError::Capacity { retry_after_secs: self.config.retry_after_secs }.to_response();
        let bytes = response.to_bytes(Persistence::Close, &http_date(self.clock.now_utc()));

        let _ = stream.set_write_timeout(Some(REJECT_WRITE_TIMEOUT));
        if stream.write_all(&bytes).and_then(|()| stream.flush()).is_err() {
            return;
        }
        let _ = stream.shutdown(Shutdown::Write);

        linger(&mut stream, Instant::now() + REJECT_LINGER, REJECT_DRAIN_LIMIT);
    }
}

/// Swallow what a rejected client already sent, until EOF, `deadline` or
/// `limit` bytes, whichever comes first
///
/// Returns the number of bytes discarded.
fn linger<S: Transport>(stream: &mut S, deadline: Instant, limit: usize) -> usize {
    let mut scratch = [0u8; 1024];
    let mut drained = 0;

    while drained < limit {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() || stream.set_read_timeout(Some(remaining)).is_err() {
            break;
        }
        let want = scratch.len().min(limit - drained);
        match stream.read(&mut scratch[..want]) {
            Ok(0) => break,
            Ok(n) => drained += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
    drained
}

/// Exponential pause between failed `accept` calls
#[derive(Debug)]
struct AcceptBackoff {
    current: Duration,
}

impl AcceptBackoff {
    fn new() -> Self {
        Self { current: ACCEPT_BACKOFF_MIN }
    }

    /// Pause to take now; doubles for the next failure up to the maximum
    fn next_pause(&mut self) -> Duration {
        let pause = self.current;
        self.current = (self.current * 2).min(ACCEPT_BACKOFF_MAX);
        pause
    }

    fn reset(&mut self) {
        self.current = ACCEPT_BACKOFF_MIN;
    }
}

/// `host:port`, bracketing IPv6 literals
fn socket_address(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

/// Loopback address that reaches a listener bound to `addr`
fn wake_address(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), addr.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), addr.port())
        }
        _ => addr,
    }
}

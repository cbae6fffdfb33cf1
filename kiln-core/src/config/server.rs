//! Server configuration

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::server::ConnectionLimits;

/// Largest worker pool accepted from any source
pub const MAX_POOL_SIZE: usize = 100;

/// Smallest request ceiling that still fits a realistic request head
pub const MIN_REQUEST_SIZE: usize = 256;

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server listening address
    /// Env: KILN_HOST
    /// Default: "127.0.0.1"
    pub host: String,

    /// Server listening port
    /// Env: KILN_PORT
    /// Default: 8080
    pub port: u16,

    /// Number of worker threads (clamped to 1..=100)
    /// Env: KILN_POOL_SIZE
    /// Default: 10
    pub pool_size: usize,

    /// Queue capacity as a multiple of the pool size
    /// Env: KILN_QUEUE_FACTOR
    /// Default: 5
    pub queue_factor: usize,

    /// Directory files are served from
    /// Env: KILN_RESOURCE_DIR
    /// Default: "resources"
    pub resource_dir: PathBuf,

    /// Upload directory, relative to `resource_dir`
    /// Env: KILN_UPLOAD_SUBDIR
    /// Default: "uploads"
    pub upload_subdir: String,

    /// Document served for `/`
    /// Env: KILN_DEFAULT_DOCUMENT
    /// Default: "index.html"
    pub default_document: String,

    /// Seconds an idle keep-alive connection is held open
    /// Env: KILN_KEEP_ALIVE_TIMEOUT
    /// Default: 30
    pub keep_alive_timeout_secs: u64,

    /// Requests served on one connection before it is closed
    /// Env: KILN_MAX_REQUESTS
    /// Default: 100
    pub max_requests_per_connection: usize,

    /// Ceiling on request line + headers + body, in bytes
    /// Env: KILN_MAX_REQUEST_SIZE
    /// Default: 8192
    pub max_request_size: usize,

    /// `Retry-After` value sent with 503 responses
    /// Env: KILN_RETRY_AFTER
    /// Default: 5
    pub retry_after_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: crate::http::DEFAULT_PORT,
            pool_size: 10,
            queue_factor: 5,
            resource_dir: PathBuf::from("resources"),
            upload_subdir: "uploads".to_string(),
            default_document: "index.html".to_string(),
            keep_alive_timeout_secs: 30,
            max_requests_per_connection: 100,
            max_request_size: crate::http::DEFAULT_MAX_REQUEST_SIZE,
            retry_after_secs: 5,
        }
    }
}

impl ServerConfig {
    /// Merge another config into this one (other takes priority)
    pub fn merge(&mut self, other: Self) {
        *self = other;
    }

    /// Apply environment variables
    pub fn apply_env_vars(&mut self) {
        self.apply_env_from(|key| env::var(key).ok());
    }

    /// Apply overrides from any key lookup; unparsable numbers are ignored
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(value: Option<String>, slot: &mut T) {
            if let Some(v) = value.and_then(|v| v.trim().parse().ok()) {
                *slot = v;
            }
        }

        if let Some(host) = lookup("KILN_HOST") {
            self.host = host;
        }
        parsed(lookup("KILN_PORT"), &mut self.port);
        let mut pool_size = self.pool_size;
        parsed(lookup("KILN_POOL_SIZE"), &mut pool_size);
        self.set_pool_size(pool_size);
        parsed(lookup("KILN_QUEUE_FACTOR"), &mut self.queue_factor);
        if let Some(dir) = lookup("KILN_RESOURCE_DIR") {
            self.resource_dir = PathBuf::from(dir);
        }
        if let Some(subdir) = lookup("KILN_UPLOAD_SUBDIR") {
            self.upload_subdir = subdir;
        }
        if let Some(document) = lookup("KILN_DEFAULT_DOCUMENT") {
            self.default_document = document;
        }
        parsed(lookup("KILN_KEEP_ALIVE_TIMEOUT"), &mut self.keep_alive_timeout_secs);
        parsed(lookup("KILN_MAX_REQUESTS"), &mut self.max_requests_per_connection);
        parsed(lookup("KILN_MAX_REQUEST_SIZE"), &mut self.max_request_size);
        parsed(lookup("KILN_RETRY_AFTER"), &mut self.retry_after_secs);
    }

    /// Set the pool size, clamped to `1..=MAX_POOL_SIZE`
    pub fn set_pool_size(&mut self, size: usize) {
        self.pool_size = size.clamp(1, MAX_POOL_SIZE);
    }

    /// Tasks that may wait while every worker is busy
    pub fn queue_capacity(&self) -> usize {
        self.pool_size.saturating_mul(self.queue_factor)
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.resource_dir.join(&self.upload_subdir)
    }

    pub fn keep_alive_timeout(&self) -> Duration {
        Duration::from_secs(self.keep_alive_timeout_secs)
    }

    /// Per-connection caps derived from this config
    pub fn connection_limits(&self) -> ConnectionLimits {
        ConnectionLimits {
            idle_timeout: self.keep_alive_timeout(),
            max_requests: self.max_requests_per_connection,
            max_request_size: self.max_request_size,
        }
    }

    /// Create the resource and upload directories if they are missing
    pub fn prepare_directories(&self) -> Result<()> {
        for dir in [self.resource_dir.clone(), self.upload_dir()] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            bail!("Invalid port: port must be between 1 and 65535");
        }
        self.validate_limits()
    }

    /// Validate everything except the port, which may be 0 (ephemeral) when
    /// binding programmatically
    pub fn validate_limits(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("Invalid host: host cannot be empty");
        }

        if self.pool_size == 0 || self.pool_size > MAX_POOL_SIZE {
            bail!("Invalid pool_size: must be between 1 and {}", MAX_POOL_SIZE);
        }

        if self.queue_factor == 0 {
            bail!("Invalid queue_factor: must be at least 1");
        }

        if self.keep_alive_timeout_secs == 0 {
            bail!("Invalid keep_alive_timeout_secs: must be greater than 0");
        }

        if self.max_requests_per_connection == 0 {
            bail!("Invalid max_requests_per_connection: must be greater than 0");
        }

        if self.max_request_size < MIN_REQUEST_SIZE {
            bail!("Invalid max_request_size: must be at least {} bytes", MIN_REQUEST_SIZE);
        }

        if !is_plain_name(&self.default_document) {
            bail!(
                "Invalid default_document '{}': must be a file name without path separators",
                self.default_document
            );
        }

        if !is_plain_name(&self.upload_subdir) {
            bail!(
                "Invalid upload_subdir '{}': must be a directory name without path separators",
                self.upload_subdir
            );
        }

        Ok(())
    }
}

/// A single path component with no traversal
fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && !name.contains(['/', '\\', '\0'])
        && !name.contains("..")
        && Path::new(name).file_name().is_some()
}

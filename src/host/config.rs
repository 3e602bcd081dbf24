//! Host configuration
//!
//! Everything the supervisor needs to launch and watch one engine process.

use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{EngineError, Result};
use crate::rpc::{DEFAULT_NAMESPACE, DEFAULT_REQUEST_TIMEOUT};
use crate::tracker::DEFAULT_EVENT_CAPACITY;

/// Executable looked up on `PATH` when none is configured
pub const DEFAULT_EXECUTABLE: &str = "aria2c";

/// Random RPC ports are drawn from this range
pub const PORT_RANGE: std::ops::Range<u16> = 6000..7000;

/// Configuration for an [`EngineHost`](super::EngineHost)
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Engine executable; `None` looks up `aria2c` on `PATH`
    pub executable: Option<PathBuf>,
    /// Working directory of the engine process
    pub work_dir: PathBuf,
    /// Where downloads are written (`--dir`)
    pub download_dir: PathBuf,
    /// RPC port; `None` picks one at random
    pub port: Option<u16>,
    /// RPC secret; `None` generates one
    pub secret: Option<String>,
    /// Method namespace, `aria2` for stock engines
    pub namespace: String,
    /// Extra engine command-line arguments
    pub extra_args: Vec<String>,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Health probe attempts before giving up
    pub probe_attempts: u32,
    /// Delay after each failed probe attempt
    pub probe_interval: Duration,
    /// Delay between refreshes
    pub refresh_interval: Duration,
    /// Page size for the waiting and stopped lists
    pub page_size: i64,
    /// How long to wait for the engine to exit before killing it
    pub shutdown_timeout: Duration,
    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            executable: None,
            work_dir: PathBuf::from("."),
            download_dir: PathBuf::from("."),
            port: None,
            secret: None,
            namespace: DEFAULT_NAMESPACE.to_string(),
            extra_args: Vec::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            probe_attempts: 10,
            probe_interval: Duration::from_millis(1000),
            refresh_interval: Duration::from_millis(1000),
            page_size: 100,
            shutdown_timeout: Duration::from_secs(10),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl HostConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.port == Some(0) {
            return Err(EngineError::config_error_with_field("port cannot be 0", "port"));
        }

        if let Some(secret) = &self.secret {
            if secret.is_empty() {
                return Err(EngineError::config_error_with_field("secret cannot be empty", "secret"));
            }
        }

        if self.namespace.is_empty() || self.namespace.contains('.') {
            return Err(EngineError::config_error_with_field(
                format!("invalid method namespace '{}'", self.namespace),
                "namespace",
            ));
        }

        if self.probe_attempts == 0 {
            return Err(EngineError::config_error_with_field(
                "probe_attempts must be at least 1",
                "probe_attempts",
            ));
        }

        if self.page_size < 1 {
            return Err(EngineError::config_error_with_field("page_size must be at least 1", "page_size"));
        }

        if self.refresh_interval.is_zero() {
            return Err(EngineError::config_error_with_field(
                "refresh_interval cannot be zero",
                "refresh_interval",
            ));
        }

        if self.download_dir.as_os_str().is_empty() {
            return Err(EngineError::config_error_with_field("download_dir cannot be empty", "download_dir"));
        }

        Ok(())
    }

    /// Configured port, or a random one from [`PORT_RANGE`]
    pub fn resolve_port(&self) -> u16 {
        self.port
            .unwrap_or_else(|| rand::thread_rng().gen_range(PORT_RANGE))
    }

    /// Configured secret, or 16 random bytes as hex
    pub fn resolve_secret(&self) -> String {
        self.secret.clone().unwrap_or_else(|| {
            let bytes: [u8; 16] = rand::random();
            hex::encode(bytes)
        })
    }
}

/// Short form of a secret for logs
pub(crate) fn redact(secret: &str) -> String {
    let shown: String = secret.chars().take(4).collect();
    format!("{}…", shown)
}

//! CLI argument parsing
//!
//! Defines the command-line interface using clap.

use clap::Parser;
use std::path::PathBuf;

/// Download through a supervised aria2 engine
#[derive(Parser, Debug, Clone)]
#[command(name = "aria2-host")]
#[command(author = "aria2-host contributors")]
#[command(version = "0.1.0")]
#[command(about = "Launches an aria2 engine, submits downloads and follows them to completion", long_about = None)]
pub struct CliArgs {
    /// Magnet links, URLs or .torrent files to download
    #[arg(value_name = "INPUT", required = true)]
    pub inputs: Vec<String>,

    /// Path to the aria2c executable (default: looked up on PATH)
    #[arg(long, value_name = "PATH")]
    pub aria2c: Option<PathBuf>,

    /// Working directory of the engine process
    #[arg(long, value_name = "DIR")]
    pub work_dir: Option<PathBuf>,

    /// Download directory (default: ./downloads)
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// RPC port (default: random in 6000-6999)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// RPC secret (default: random)
    #[arg(long)]
    pub secret: Option<String>,

    /// Refresh interval in milliseconds
    #[arg(long, default_value = "1000")]
    pub refresh_ms: u64,

    /// Health probe attempts before giving up
    #[arg(long, default_value = "10")]
    pub probe_attempts: u32,

    /// Delay between health probes in milliseconds
    #[arg(long, default_value = "1000")]
    pub probe_interval_ms: u64,

    /// Seconds to wait for the engine to exit before killing it
    #[arg(long, default_value = "10")]
    pub shutdown_timeout_secs: u64,

    /// Kill a leftover engine from an earlier session before starting
    #[arg(long, value_name = "PID")]
    pub reclaim_pid: Option<u32>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no progress output)
    #[arg(short, long)]
    pub quiet: bool,
}

impl CliArgs {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose && !self.quiet
    }

    /// Check if quiet mode is enabled
    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Get the log level based on verbosity
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

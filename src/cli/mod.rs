//! CLI module
//!
//! Command-line interface for the engine host.

pub mod args;
pub mod config;
pub mod progress;

pub use args::CliArgs;
pub use config::{Config, Input};
pub use progress::{DownloadStats, ProgressDisplay};

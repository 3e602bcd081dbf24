//! Host module
//!
//! Launching, probing, polling and stopping an engine process.

pub mod config;
pub mod process;
pub mod reuse;
pub mod supervisor;

pub use config::HostConfig;
pub use process::{engine_args, resolve_executable, EngineProcess};
pub use reuse::{reclaim_instance, reclaim_with_client};
pub use supervisor::{refresh, EngineHost};

//! aria2-host
//!
//! Client, supervisor and task tracker for the aria2 download engine. The
//! engine is driven over its JSON-RPC interface; this crate launches it,
//! submits downloads and keeps a graph of every download it reports,
//! including the ones it generates itself from metadata.

pub mod cli;
pub mod client;
pub mod error;
pub mod host;
pub mod rpc;
pub mod torrent;
pub mod tracker;

pub use error::{EngineError, Result};

pub use client::{ConnectionState, EngineClient};
pub use host::{reclaim_instance, EngineHost, EngineProcess, HostConfig};
pub use rpc::{
    BatchCall, EngineOptions, Gid, HttpTransport, PositionOrigin, RpcChannel, RpcParams, StatusSnapshot, TaskStatus,
    Transport,
};
pub use torrent::{MagnetInfo, MagnetParser, TorrentMeta, TorrentParser};
pub use tracker::{EventBus, Task, TaskEvent, TaskGraph, TaskSource};
pub use cli::{CliArgs, Config, DownloadStats, ProgressDisplay};

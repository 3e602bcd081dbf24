//! Torrent input module
//!
//! Readers for the inputs handed to the engine: `.torrent` files and magnet links.

pub mod magnet;
pub mod parser;

pub use magnet::{MagnetInfo, MagnetParser};
pub use parser::{TorrentMeta, TorrentParser};

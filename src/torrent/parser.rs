//! Torrent file reader
//!
//! The engine does all real torrent handling. This reader only checks that
//! a file is a torrent and pulls out what the console shows before the
//! engine reports back: name, size and info hash.

use anyhow::{anyhow, Context, Result};
use serde_bencode::value::Value;
use sha1::{Digest, Sha1};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

/// A torrent ready to submit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMeta {
    /// The file exactly as read; sent to the engine as is
    pub raw: Vec<u8>,
    pub name: String,
    pub info_hash: [u8; 20],
    pub total_length: u64,
    pub file_count: usize,
}

impl TorrentMeta {
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }
}

/// Parser for .torrent files
pub struct TorrentParser;

impl TorrentParser {
    /// Parse a .torrent file from bytes
    pub fn parse_bytes(data: Vec<u8>) -> Result<TorrentMeta> {
        let root: Value = serde_bencode::from_bytes(&data).context("Torrent is not valid bencode")?;
        let Value::Dict(root) = root else {
            return Err(anyhow!("Torrent root must be a dictionary"));
        };

        let info = root
            .get(b"info".as_slice())
            .ok_or_else(|| anyhow!("Missing info dictionary"))?;
        let Value::Dict(info_dict) = info else {
            return Err(anyhow!("info must be a dictionary"));
        };

        let name = bytes_field(info_dict, "name")
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .ok_or_else(|| anyhow!("Missing name field"))?;

        let (total_length, file_count) = match (int_field(info_dict, "length"), info_dict.get(b"files".as_slice())) {
            (Some(length), _) => (length.max(0) as u64, 1),
            (None, Some(Value::List(files))) => {
                let total = files
                    .iter()
                    .filter_map(|f| match f {
                        Value::Dict(d) => int_field(d, "length"),
                        _ => None,
                    })
                    .map(|l| l.max(0) as u64)
                    .sum();
                (total, files.len())
            }
            _ => return Err(anyhow!("Neither length nor files found in info dict")),
        };

        // Canonical bencode is key-sorted, so re-encoding yields the original bytes
        let info_bytes = serde_bencode::to_bytes(info).context("Failed to re-encode info dictionary")?;
        let info_hash: [u8; 20] = Sha1::digest(&info_bytes).into();

        info!("Read torrent '{}' ({} files, {} bytes)", name, file_count, total_length);
        Ok(TorrentMeta {
            raw: data,
            name,
            info_hash,
            total_length,
            file_count,
        })
    }

    /// Parse a .torrent file from a file path
    pub fn parse_file(path: &Path) -> Result<TorrentMeta> {
        let data = std::fs::read(path).with_context(|| format!("Failed to read torrent file '{}'", path.display()))?;
        debug!("Read {} bytes from {}", data.len(), path.display());
        Self::parse_bytes(data).with_context(|| format!("Invalid torrent file '{}'", path.display()))
    }

    /// Whether an input names a local .torrent file
    pub fn is_torrent_path(input: &str) -> bool {
        input.to_ascii_lowercase().ends_with(".torrent") && !input.contains("://")
    }
}

fn bytes_field<'a>(dict: &'a HashMap<Vec<u8>, Value>, key: &str) -> Option<&'a [u8]> {
    match dict.get(key.as_bytes()) {
        Some(Value::Bytes(b)) => Some(b),
        _ => None,
    }
}

fn int_field(dict: &HashMap<Vec<u8>, Value>, key: &str) -> Option<i64> {
    match dict.get(key.as_bytes()) {
        Some(Value::Int(i)) => Some(*i),
        _ => None,
    }
}

//! Magnet link reader
//!
//! Pulls the info hash and display name out of a `magnet:` URI so the
//! download can be labelled before the engine has fetched its metadata.

use anyhow::{anyhow, Result};
use tracing::{debug, warn};
use url::Url;

/// Parsed magnet link information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetInfo {
    /// The link as given, forwarded to the engine unchanged
    pub uri: String,
    /// SHA1 info hash from the xt parameter
    pub info_hash: [u8; 20],
    /// Display name (dn parameter)
    pub display_name: Option<String>,
    /// Tracker URLs (tr parameters)
    pub trackers: Vec<String>,
    /// Total size in bytes (xl parameter)
    pub total_size: Option<u64>,
}

impl MagnetInfo {
    pub fn info_hash_hex(&self) -> String {
        hex::encode(self.info_hash)
    }

    /// Display name, else the hex info hash
    pub fn label(&self) -> String {
        self.display_name.clone().unwrap_or_else(|| self.info_hash_hex())
    }
}

/// Parser for magnet links
pub struct MagnetParser;

impl MagnetParser {
    /// Parse a magnet link string
    ///
    /// # Example
    /// ```ignore
    /// let magnet = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c&dn=Big+Buck+Bunny";
    /// let info = MagnetParser::parse(magnet)?;
    /// ```
    pub fn parse(magnet_uri: &str) -> Result<MagnetInfo> {
        let magnet_uri = magnet_uri.trim();
        let url = Url::parse(magnet_uri).map_err(|e| anyhow!("Invalid magnet URL format: {}", e))?;

        if url.scheme() != "magnet" {
            return Err(anyhow!("URL is not a magnet link (scheme '{}')", url.scheme()));
        }

        let mut info_hash = None;
        let mut display_name = None;
        let mut trackers = Vec::new();
        let mut total_size = None;

        for (key, value) in url.query_pairs().into_owned() {
            match key.as_str() {
                "xt" => {
                    if let Some(hash) = Self::extract_info_hash(&value)? {
                        info_hash = Some(hash);
                    }
                }
                "dn" => display_name = Some(value),
                "tr" => trackers.push(value),
                "xl" => match value.parse::<u64>() {
                    Ok(size) => total_size = Some(size),
                    Err(_) => warn!("Invalid xl parameter value: {}", value),
                },
                _ => debug!("Ignoring magnet parameter: {}", key),
            }
        }

        let info_hash =
            info_hash.ok_or_else(|| anyhow!("Magnet link must contain an info hash (xt=urn:btih:<hash>)"))?;

        debug!(
            "Parsed magnet link: info_hash={}, name={}",
            hex::encode(info_hash),
            display_name.as_deref().unwrap_or("(none)")
        );

        Ok(MagnetInfo {
            uri: magnet_uri.to_string(),
            info_hash,
            display_name,
            trackers,
            total_size,
        })
    }

    /// Extract info hash from an xt parameter value.
    ///
    /// The hash is 40 hex characters or 32 base32 characters.
    fn extract_info_hash(xt_value: &str) -> Result<Option<[u8; 20]>> {
        let Some(hash_str) = xt_value.strip_prefix("urn:btih:") else {
            debug!("xt parameter is not a BitTorrent info hash: {}", xt_value);
            return Ok(None);
        };

        let bytes = match hash_str.len() {
            40 => hex::decode(hash_str).map_err(|e| anyhow!("Invalid hex info hash: {}", e))?,
            32 => decode_base32(hash_str).ok_or_else(|| anyhow!("Invalid base32 info hash: {}", hash_str))?,
            n => return Err(anyhow!("Info hash has invalid length: {} (expected 40 or 32)", n)),
        };

        let hash: [u8; 20] = bytes
            .try_into()
            .map_err(|_| anyhow!("Info hash does not decode to 20 bytes"))?;
        Ok(Some(hash))
    }

    /// Check if a string looks like a magnet link
    pub fn is_magnet_link(input: &str) -> bool {
        input.trim().starts_with("magnet:?") || input.trim().starts_with("magnet://")
    }
}

/// RFC 4648 base32 without padding, case-insensitive
fn decode_base32(text: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for c in text.bytes() {
        let value = match c.to_ascii_uppercase() {
            c @ b'A'..=b'Z' => c - b'A',
            c @ b'2'..=b'7' => c - b'2' + 26,
            _ => return None,
        };
        buffer = (buffer << 5) | value as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            out.push((buffer >> bits) as u8);
            buffer &= (1 << bits) - 1;
        }
    }
    Some(out)
}

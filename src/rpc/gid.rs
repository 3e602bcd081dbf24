//! Download identifiers
//!
//! The engine identifies every download with a 64-bit GID. It sends them as
//! 16-digit hex strings, but the value may also show up as a bare number or a
//! quoted decimal. All of these normalize to the same [`Gid`].

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::EngineError;

/// Length of the engine's own GID representation
const WIRE_HEX_LEN: usize = 16;

/// Opaque 64-bit download identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Gid(u64);

impl Gid {
    /// Wrap a raw value
    pub const fn new(value: u64) -> Self {
        Gid(value)
    }

    /// The raw 64-bit value
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Zero-padded form the engine expects in requests
    pub fn to_wire(&self) -> String {
        format!("{:016x}", self.0)
    }

    /// Parse the canonical hex form, with or without a `0x` prefix.
    ///
    /// Inverse of `Display` and `to_wire`.
    pub fn parse(text: &str) -> Result<Self, EngineError> {
        let text = text.trim();
        let digits = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .unwrap_or(text);
        parse_radix(text, digits, 16)
    }

    /// Parse a quoted GID as the engine may send it.
    ///
    /// A string is read as hex when it has the engine's 16-character length,
    /// carries a `0x` prefix, or contains a hex letter. Any other all-digit
    /// string is a decimal.
    fn parse_wire(text: &str) -> Result<Self, EngineError> {
        let text = text.trim();
        let looks_hex = text.len() == WIRE_HEX_LEN
            || text.starts_with("0x")
            || text.starts_with("0X")
            || text.bytes().any(|b| matches!(b, b'a'..=b'f' | b'A'..=b'F'));

        if looks_hex {
            Gid::parse(text)
        } else {
            parse_radix(text, text, 10)
        }
    }
}

fn parse_radix(text: &str, digits: &str, radix: u32) -> Result<Gid, EngineError> {
    if digits.is_empty() {
        return Err(EngineError::validation_error_with_field(
            format!("invalid GID '{}': no digits", text),
            "gid",
        ));
    }
    u64::from_str_radix(digits, radix)
        .map(Gid)
        .map_err(|e| EngineError::validation_error_with_field(format!("invalid GID '{}': {}", text, e), "gid"))
}

impl From<u64> for Gid {
    fn from(value: u64) -> Self {
        Gid(value)
    }
}

impl From<Gid> for u64 {
    fn from(gid: Gid) -> Self {
        gid.0
    }
}

impl FromStr for Gid {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Gid::parse(s)
    }
}

/// Canonical form: lowercase hex, no padding
impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl Serialize for Gid {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_wire())
    }
}

struct GidVisitor;

impl<'de> Visitor<'de> for GidVisitor {
    type Value = Gid;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a GID as a number, decimal string or hex string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Gid, E> {
        Ok(Gid(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Gid, E> {
        Ok(Gid(v as u64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Gid, E> {
        Gid::parse_wire(v).map_err(|e| E::custom(e.to_string()))
    }
}

impl<'de> Deserialize<'de> for Gid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(GidVisitor)
    }
}

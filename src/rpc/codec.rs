//! Engine value encodings
//!
//! aria2 speaks its own dialect of JSON: acknowledgements are strings,
//! large integers are quoted, binary data is base64, peer ids are
//! percent-encoded and piece maps are hex bit-vectors. The modules here are
//! used through `#[serde(with = "...")]` on request and response fields.

use base64::{engine::general_purpose, Engine as _};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Acknowledgement booleans: `"true"`, `"false"` or `"OK"`
pub mod ok_bool {
    use super::*;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(if *value { "true" } else { "false" })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(from_value(value.as_ref()))
    }

    pub(crate) fn from_value(value: Option<&Value>) -> bool {
        match value {
            Some(Value::String(s)) => s == "true" || s == "OK",
            Some(Value::Bool(b)) => *b,
            _ => false,
        }
    }
}

/// Parse a quoted or bare integer, treating `null`/absent as zero
fn integer_from_value<T>(value: Option<Value>) -> Result<T, String>
where
    T: std::str::FromStr + Default,
    T::Err: fmt::Display,
{
    match value {
        None | Some(Value::Null) => Ok(T::default()),
        Some(Value::String(s)) if s.is_empty() => Ok(T::default()),
        Some(Value::String(s)) => s.trim().parse::<T>().map_err(|e| format!("invalid integer '{}': {}", s, e)),
        Some(Value::Number(n)) => n.to_string().parse::<T>().map_err(|e| format!("invalid integer {}: {}", n, e)),
        Some(other) => Err(format!("expected integer, found {}", other)),
    }
}

/// Integers written as quoted decimals; bare numbers accepted on read
pub mod quoted {
    use super::*;

    pub fn serialize<T: fmt::Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: std::str::FromStr + Default,
        T::Err: fmt::Display,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        integer_from_value(value).map_err(D::Error::custom)
    }
}

/// Optional quoted integers: absent or `null` stays `None`
pub mod quoted_opt {
    use super::*;

    pub fn serialize<T: fmt::Display, S: Serializer>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: std::str::FromStr + Default,
        T::Err: fmt::Display,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(v) => integer_from_value(Some(v)).map(Some).map_err(D::Error::custom),
        }
    }
}

/// Binary payloads as base64 text
pub mod base64_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&general_purpose::STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        general_purpose::STANDARD.decode(text.as_bytes()).map_err(D::Error::custom)
    }
}

/// Peer ids as percent-encoded text, decoded to raw bytes
pub mod percent_bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&urlencoding::encode_binary(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = Option::<String>::deserialize(deserializer)?.unwrap_or_default();
        Ok(urlencoding::decode_binary(text.as_bytes()).into_owned())
    }
}

/// Unix timestamps as quoted decimal seconds
pub mod unix_seconds {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<SystemTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(time) => {
                let secs = time
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or_default();
                serializer.serialize_str(&secs.to_string())
            }
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<SystemTime>, D::Error> {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(v) => {
                let secs: u64 = integer_from_value(Some(v)).map_err(D::Error::custom)?;
                Ok(Some(UNIX_EPOCH + Duration::from_secs(secs)))
            }
        }
    }
}

/// Piece availability as a big-endian hex bit-vector.
///
/// Bit 0 is the most significant bit of the first byte. Bits past
/// `len` are always zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Bitfield {
    bytes: Vec<u8>,
    len: usize,
}

impl Bitfield {
    /// Build from raw bytes, treating every bit as meaningful
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let len = bytes.len() * 8;
        Self { bytes, len }
    }

    /// Parse the engine's hex form
    pub fn from_hex(text: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(text)?;
        Ok(Self::from_bytes(bytes))
    }

    /// Restrict to the real bit count, clearing any overflow bits
    pub fn truncated(mut self, len: usize) -> Self {
        let len = len.min(self.bytes.len() * 8);
        self.bytes.truncate((len + 7) / 8);
        if len % 8 != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= 0xffu8 << (8 - len % 8);
            }
        }
        self.len = len;
        self
    }

    /// Number of bits
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether piece `index` is present
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.bytes[index / 8] & (0x80 >> (index % 8)) != 0
    }

    /// Number of set bits
    pub fn count_ones(&self) -> usize {
        self.bytes.iter().map(|b| b.count_ones() as usize).sum()
    }

    /// Iterate bits in index order
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        (0..self.len).map(move |i| self.get(i))
    }

    /// Lowercase hex, as the engine writes it
    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl Serialize for Bitfield {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Bitfield {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Bitfield::from_hex(&text).map_err(D::Error::custom)
    }
}

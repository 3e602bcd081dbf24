//! Engine options
//!
//! The engine takes and returns options as a flat object of string values
//! keyed by the command-line option name (`dir`, `pause`, `select-file`...).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-download or global option set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineOptions(BTreeMap<String, String>);

impl EngineOptions {
    /// An empty option set, encoded as `{}`
    pub fn new() -> Self {
        Self::default()
    }

    /// Set any option by its command-line name
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Download directory
    pub fn dir(self, dir: impl Into<String>) -> Self {
        self.set("dir", dir)
    }

    /// Add the download in the paused state
    pub fn pause(self, pause: bool) -> Self {
        self.set("pause", bool_text(pause))
    }

    /// Pause downloads created from metadata downloads
    pub fn pause_metadata(self, pause: bool) -> Self {
        self.set("pause-metadata", bool_text(pause))
    }

    /// 1-based file indexes or ranges, e.g. `1,3-5`
    pub fn select_file(self, selection: impl Into<String>) -> Self {
        self.set("select-file", selection)
    }

    pub fn allow_overwrite(self, allow: bool) -> Self {
        self.set("allow-overwrite", bool_text(allow))
    }

    pub fn all_proxy(self, proxy: impl Into<String>) -> Self {
        self.set("all-proxy", proxy)
    }

    pub fn max_download_limit(self, bytes_per_sec: u64) -> Self {
        self.set("max-download-limit", bytes_per_sec.to_string())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Read a boolean option; the engine writes `true`/`false`
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.get(key)? {
            "true" | "OK" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key)?.parse().ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn bool_text(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

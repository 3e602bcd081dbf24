//! Response payloads
//!
//! Status objects returned by the engine. Every key may be missing when the
//! caller restricted the key set, so all fields default.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::SystemTime;

use super::codec::{self, Bitfield};
use super::gid::Gid;

/// Download status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Waiting,
    Paused,
    Error,
    Complete,
    Removed,
    #[default]
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// Whether the engine will not make further progress on its own
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Error | TaskStatus::Complete | TaskStatus::Removed)
    }
}

/// Point-in-time status of one download (`tellStatus` and friends)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatusSnapshot {
    pub gid: Option<Gid>,
    pub status: TaskStatus,
    #[serde(with = "codec::quoted")]
    pub total_length: u64,
    #[serde(with = "codec::quoted")]
    pub completed_length: u64,
    #[serde(with = "codec::quoted")]
    pub uploaded_length: u64,
    pub bitfield: Option<Bitfield>,
    /// Bytes per second
    #[serde(with = "codec::quoted")]
    pub download_speed: u64,
    /// Bytes per second
    #[serde(with = "codec::quoted")]
    pub upload_speed: u64,
    pub info_hash: Option<String>,
    #[serde(with = "codec::quoted")]
    pub num_seeders: u32,
    #[serde(with = "codec::ok_bool")]
    pub seeder: bool,
    #[serde(with = "codec::quoted")]
    pub piece_length: u64,
    #[serde(with = "codec::quoted")]
    pub num_pieces: u32,
    #[serde(with = "codec::quoted")]
    pub connections: u32,
    #[serde(with = "codec::quoted")]
    pub error_code: i64,
    pub error_message: Option<String>,
    /// Downloads the engine generated from this one, e.g. the real torrent
    /// download after a magnet's metadata fetch
    pub followed_by: Option<Vec<Gid>>,
    /// Reverse link of `followed_by`
    pub following: Option<Gid>,
    /// Parent download this one is a part of
    pub belongs_to: Option<Gid>,
    pub dir: Option<String>,
    pub files: Option<Vec<FileStatus>>,
    pub bittorrent: Option<BitTorrentInfo>,
    #[serde(with = "codec::quoted_opt")]
    pub verified_length: Option<u64>,
    #[serde(with = "codec::ok_bool")]
    pub verify_integrity_pending: bool,
}

impl StatusSnapshot {
    /// Completion ratio in 0.0..=1.0
    pub fn progress(&self) -> f64 {
        if self.total_length == 0 {
            0.0
        } else {
            self.completed_length as f64 / self.total_length as f64
        }
    }

    /// Piece map limited to the real piece count
    pub fn pieces(&self) -> Option<Bitfield> {
        let bits = self.bitfield.clone()?;
        Some(if self.num_pieces > 0 {
            bits.truncated(self.num_pieces as usize)
        } else {
            bits
        })
    }

    /// Display name: torrent name, else first file path
    pub fn name(&self) -> Option<&str> {
        self.bittorrent
            .as_ref()
            .and_then(|bt| bt.info.as_ref())
            .map(|info| info.name.as_str())
            .or_else(|| {
                self.files
                    .as_ref()
                    .and_then(|files| files.first())
                    .map(|f| f.path.as_str())
                    .filter(|p| !p.is_empty())
            })
    }

    pub fn followed_by(&self) -> &[Gid] {
        self.followed_by.as_deref().unwrap_or(&[])
    }
}

/// One file of a download (`getFiles`, `files` key)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileStatus {
    /// 1-based, in torrent/metalink order
    #[serde(with = "codec::quoted")]
    pub index: u32,
    pub path: String,
    #[serde(with = "codec::quoted")]
    pub length: u64,
    /// Only counts completed pieces
    #[serde(with = "codec::quoted")]
    pub completed_length: u64,
    #[serde(with = "codec::ok_bool")]
    pub selected: bool,
    pub uris: Vec<UriInfo>,
}

/// A URI used by a download (`getUris`)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UriInfo {
    pub uri: String,
    pub status: UriStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UriStatus {
    Used,
    Waiting,
}

/// BitTorrent metadata of a download
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BitTorrentInfo {
    /// Tiers of announce URIs
    pub announce_list: Vec<Vec<String>>,
    pub comment: Option<String>,
    #[serde(with = "codec::unix_seconds")]
    pub creation_date: Option<SystemTime>,
    pub mode: Option<BitTorrentMode>,
    pub info: Option<BitTorrentName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BitTorrentMode {
    Single,
    Multi,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BitTorrentName {
    pub name: String,
}

/// A connected BitTorrent peer (`getPeers`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerInfo {
    /// Raw peer id bytes
    #[serde(with = "codec::percent_bytes")]
    pub peer_id: Vec<u8>,
    pub ip: String,
    #[serde(with = "codec::quoted")]
    pub port: u16,
    pub bitfield: Option<Bitfield>,
    #[serde(with = "codec::ok_bool")]
    pub am_choking: bool,
    #[serde(with = "codec::ok_bool")]
    pub peer_choking: bool,
    #[serde(with = "codec::quoted")]
    pub download_speed: u64,
    #[serde(with = "codec::quoted")]
    pub upload_speed: u64,
    #[serde(with = "codec::ok_bool")]
    pub seeder: bool,
}

impl PeerInfo {
    pub fn socket_addr(&self) -> Option<std::net::SocketAddr> {
        let ip: std::net::IpAddr = self.ip.parse().ok()?;
        Some(std::net::SocketAddr::new(ip, self.port))
    }
}

/// Servers connected for one file (`getServers`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FileServers {
    #[serde(with = "codec::quoted")]
    pub index: u32,
    pub servers: Vec<ServerInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerInfo {
    pub uri: String,
    /// Differs from `uri` after a redirect
    pub current_uri: String,
    #[serde(with = "codec::quoted")]
    pub download_speed: u64,
}

/// `getGlobalStat`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GlobalStat {
    #[serde(with = "codec::quoted")]
    pub download_speed: u64,
    #[serde(with = "codec::quoted")]
    pub upload_speed: u64,
    #[serde(with = "codec::quoted")]
    pub num_active: u32,
    #[serde(with = "codec::quoted")]
    pub num_waiting: u32,
    #[serde(with = "codec::quoted")]
    pub num_stopped: u32,
    #[serde(with = "codec::quoted")]
    pub num_stopped_total: u32,
}

/// `getVersion`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VersionInfo {
    pub version: String,
    pub enabled_features: Vec<String>,
}

/// `getSessionInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionInfo {
    pub session_id: String,
}

/// Acknowledgement result: `"OK"` or a boolean string
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack(pub bool);

impl<'de> Deserialize<'de> for Ack {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        codec::ok_bool::deserialize(deserializer).map(Ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_snapshot_from_engine_json() {
        let snapshot: StatusSnapshot = serde_json::from_value(json!({
            "gid": "2089b05ecca3d829",
            "status": "active",
            "totalLength": "34896138",
            "completedLength": "34896138",
            "uploadedLength": "0",
            "bitfield": "fffc",
            "downloadSpeed": "0",
            "uploadSpeed": "0",
            "numPieces": "14",
            "pieceLength": "2097152",
            "connections": "1",
            "seeder": "false",
            "followedBy": ["0000000000000001", "2"],
            "files": [{
                "index": "1",
                "length": "34896138",
                "completedLength": "34896138",
                "path": "/downloads/file",
                "selected": "true",
                "uris": [{ "status": "used", "uri": "http://example.org/file" }]
            }]
        }))
        .unwrap();

        assert_eq!(snapshot.gid, Some(Gid::new(0x2089b05ecca3d829)));
        assert_eq!(snapshot.status, TaskStatus::Active);
        assert_eq!(snapshot.total_length, 34896138);
        assert_eq!(snapshot.followed_by(), &[Gid::new(1), Gid::new(2)]);
        assert_eq!(snapshot.pieces().unwrap().len(), 14);
        assert_eq!(snapshot.pieces().unwrap().count_ones(), 14);
        assert_eq!(snapshot.progress(), 1.0);
        assert_eq!(snapshot.name(), Some("/downloads/file"));

        let file = &snapshot.files.as_ref().unwrap()[0];
        assert!(file.selected);
        assert_eq!(file.uris[0].status, UriStatus::Used);
    }

    #[test]
    fn test_restricted_keys_default() {
        let snapshot: StatusSnapshot = serde_json::from_value(json!({ "gid": "1" })).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Unknown);
        assert_eq!(snapshot.total_length, 0);
        assert!(snapshot.followed_by().is_empty());
        assert_eq!(snapshot.progress(), 0.0);
    }

    #[test]
    fn test_unknown_status_value() {
        let snapshot: StatusSnapshot = serde_json::from_value(json!({ "status": "seeding" })).unwrap();
        assert_eq!(snapshot.status, TaskStatus::Unknown);

        let status: TaskStatus = serde_json::from_value(json!("frobbed")).unwrap();
        assert_eq!(status, TaskStatus::Unknown);
        let status: TaskStatus = serde_json::from_value(json!("paused")).unwrap();
        assert_eq!(status, TaskStatus::Paused);
    }

    #[test]
    fn test_bittorrent_info_and_name() {
        let snapshot: StatusSnapshot = serde_json::from_value(json!({
            "bittorrent": {
                "announceList": [["udp://tracker.example:80"]],
                "creationDate": 1600000000,
                "mode": "multi",
                "info": { "name": "Big Buck Bunny" }
            }
        }))
        .unwrap();
        let bt = snapshot.bittorrent.as_ref().unwrap();
        assert_eq!(bt.mode, Some(BitTorrentMode::Multi));
        assert!(bt.creation_date.is_some());
        assert_eq!(snapshot.name(), Some("Big Buck Bunny"));
    }

    #[test]
    fn test_peer_info() {
        let peer: PeerInfo = serde_json::from_value(json!({
            "peerId": "-AR1360-%8C%AA%D8",
            "ip": "192.168.1.2",
            "port": "6881",
            "amChoking": "true",
            "peerChoking": "false",
            "downloadSpeed": "10",
            "uploadSpeed": "0",
            "seeder": "true",
            "bitfield": "80"
        }))
        .unwrap();
        assert_eq!(&peer.peer_id[..8], b"-AR1360-");
        assert_eq!(peer.peer_id.len(), 11);
        assert!(peer.am_choking);
        assert!(!peer.peer_choking);
        assert_eq!(peer.socket_addr().unwrap().port(), 6881);
    }

    #[test]
    fn test_ack() {
        let ok: Ack = serde_json::from_value(json!("OK")).unwrap();
        assert_eq!(ok, Ack(true));
        let no: Ack = serde_json::from_value(json!("false")).unwrap();
        assert_eq!(no, Ack(false));
    }

    #[test]
    fn test_global_stat() {
        let stat: GlobalStat = serde_json::from_value(json!({
            "downloadSpeed": "21846",
            "numActive": "2",
            "numStopped": "0",
            "numWaiting": "0",
            "uploadSpeed": "0"
        }))
        .unwrap();
        assert_eq!(stat.download_speed, 21846);
        assert_eq!(stat.num_active, 2);
        assert_eq!(stat.num_stopped_total, 0);
    }
}

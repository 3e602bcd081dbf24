//! Typed requests
//!
//! One struct per engine method. Each declares its method name, response type
//! and positional layout; optional fields always come last.

use base64::{engine::general_purpose, Engine as _};
use serde::Serialize;

use super::gid::Gid;
use super::options::EngineOptions;
use super::params::{ParamWriter, RpcParams};
use super::responses::{
    Ack, FileServers, FileStatus, GlobalStat, PeerInfo, SessionInfo, StatusSnapshot, UriInfo, VersionInfo,
};
use crate::error::{EngineError, Result};

/// Reference point for `changePosition`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PositionOrigin {
    /// From the head of the queue
    #[serde(rename = "POS_SET")]
    Set,
    /// Relative to the current position
    #[serde(rename = "POS_CUR")]
    Cur,
    /// From the tail of the queue
    #[serde(rename = "POS_END")]
    End,
}

fn non_negative(field: &'static str, value: i64) -> Result<()> {
    if value < 0 {
        Err(EngineError::validation_error_with_field(
            format!("{} must be non-negative, got {}", field, value),
            field,
        ))
    } else {
        Ok(())
    }
}

/// Options and queue position shared by the add methods.
///
/// A position without options still needs the options slot filled.
fn push_options_and_position(
    out: &mut ParamWriter,
    options: Option<&EngineOptions>,
    position: Option<i64>,
) -> Result<()> {
    if let Some(pos) = position {
        non_negative("position", pos)?;
    }
    let filler = EngineOptions::new();
    let options = options.or(position.map(|_| &filler));
    out.push_opt("options", options)?;
    out.push_opt("position", position.as_ref())
}

fn push_keys(out: &mut ParamWriter, keys: Option<&Vec<String>>) -> Result<()> {
    out.push_opt("keys", keys)
}

/// `addUri`: one download from URIs pointing at the same resource
#[derive(Debug, Clone, Default)]
pub struct AddUri {
    pub uris: Vec<String>,
    pub options: Option<EngineOptions>,
    pub position: Option<i64>,
}

impl RpcParams for AddUri {
    type Response = Gid;
    const METHOD: &'static str = "addUri";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        if self.uris.is_empty() {
            return Err(EngineError::validation_error_with_field("at least one URI is required", "uris"));
        }
        out.push("uris", &self.uris)?;
        push_options_and_position(out, self.options.as_ref(), self.position)
    }
}

/// `addTorrent`: raw `.torrent` bytes, sent as base64
#[derive(Debug, Clone, Default)]
pub struct AddTorrent {
    pub torrent: Vec<u8>,
    /// Web-seed URIs
    pub uris: Option<Vec<String>>,
    pub options: Option<EngineOptions>,
    pub position: Option<i64>,
}

impl RpcParams for AddTorrent {
    type Response = Gid;
    const METHOD: &'static str = "addTorrent";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        out.push("torrent", &general_purpose::STANDARD.encode(&self.torrent))?;
        let empty = Vec::new();
        let uris = self
            .uris
            .as_ref()
            .or((self.options.is_some() || self.position.is_some()).then_some(&empty));
        out.push_opt("uris", uris)?;
        push_options_and_position(out, self.options.as_ref(), self.position)
    }
}

/// `addMetalink`: may create several downloads
#[derive(Debug, Clone, Default)]
pub struct AddMetalink {
    pub metalink: Vec<u8>,
    pub options: Option<EngineOptions>,
    pub position: Option<i64>,
}

impl RpcParams for AddMetalink {
    type Response = Vec<Gid>;
    const METHOD: &'static str = "addMetalink";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        out.push("metalink", &general_purpose::STANDARD.encode(&self.metalink))?;
        push_options_and_position(out, self.options.as_ref(), self.position)
    }
}

/// Requests that take a single GID
macro_rules! gid_request {
    ($(#[$meta:meta])* $name:ident, $method:literal, $response:ty) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct $name {
            pub gid: Gid,
        }

        impl $name {
            pub fn new(gid: Gid) -> Self {
                Self { gid }
            }
        }

        impl RpcParams for $name {
            type Response = $response;
            const METHOD: &'static str = $method;

            fn encode(&self, out: &mut ParamWriter) -> Result<()> {
                out.push("gid", &self.gid)
            }
        }
    };
}

gid_request!(Remove, "remove", Gid);
gid_request!(
    /// Remove without the engine's cleanup actions
    ForceRemove, "forceRemove", Gid
);
gid_request!(Pause, "pause", Gid);
gid_request!(ForcePause, "forcePause", Gid);
gid_request!(Unpause, "unpause", Gid);
gid_request!(GetUris, "getUris", Vec<UriInfo>);
gid_request!(GetFiles, "getFiles", Vec<FileStatus>);
gid_request!(GetPeers, "getPeers", Vec<PeerInfo>);
gid_request!(GetServers, "getServers", Vec<FileServers>);
gid_request!(GetOption, "getOption", EngineOptions);
gid_request!(RemoveDownloadResult, "removeDownloadResult", Ack);

/// Requests with no parameters besides the token
macro_rules! unit_request {
    ($(#[$meta:meta])* $name:ident, $method:literal, $response:ty $(, $flag:ident = $value:expr)*) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl RpcParams for $name {
            type Response = $response;
            const METHOD: &'static str = $method;
            $(const $flag: bool = $value;)*

            fn encode(&self, _out: &mut ParamWriter) -> Result<()> {
                Ok(())
            }
        }
    };
}

unit_request!(PauseAll, "pauseAll", Ack);
unit_request!(ForcePauseAll, "forcePauseAll", Ack);
unit_request!(UnpauseAll, "unpauseAll", Ack);
unit_request!(GetGlobalOption, "getGlobalOption", EngineOptions);
unit_request!(GetGlobalStat, "getGlobalStat", GlobalStat);
unit_request!(PurgeDownloadResult, "purgeDownloadResult", Ack);
unit_request!(GetVersion, "getVersion", VersionInfo);
unit_request!(GetSessionInfo, "getSessionInfo", SessionInfo);
unit_request!(SaveSession, "saveSession", Ack);
unit_request!(
    /// Graceful shutdown; closes the connection on success
    Shutdown, "shutdown", Ack, SHUTS_DOWN = true
);
unit_request!(
    /// Immediate shutdown; closes the connection on success
    ForceShutdown, "forceShutdown", Ack, SHUTS_DOWN = true
);
unit_request!(
    ListMethods, "listMethods", Vec<String>, SYSTEM = true, REQUIRES_TOKEN = false
);
unit_request!(
    ListNotifications, "listNotifications", Vec<String>, SYSTEM = true, REQUIRES_TOKEN = false
);

/// `tellStatus`, optionally restricted to some keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TellStatus {
    pub gid: Gid,
    pub keys: Option<Vec<String>>,
}

impl RpcParams for TellStatus {
    type Response = StatusSnapshot;
    const METHOD: &'static str = "tellStatus";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        out.push("gid", &self.gid)?;
        push_keys(out, self.keys.as_ref())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TellActive {
    pub keys: Option<Vec<String>>,
}

impl RpcParams for TellActive {
    type Response = Vec<StatusSnapshot>;
    const METHOD: &'static str = "tellActive";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        push_keys(out, self.keys.as_ref())
    }
}

/// `tellWaiting`. A negative offset counts from the tail and is passed through.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TellWaiting {
    pub offset: i64,
    pub num: i64,
    pub keys: Option<Vec<String>>,
}

impl RpcParams for TellWaiting {
    type Response = Vec<StatusSnapshot>;
    const METHOD: &'static str = "tellWaiting";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        non_negative("num", self.num)?;
        out.push("offset", &self.offset)?;
        out.push("num", &self.num)?;
        push_keys(out, self.keys.as_ref())
    }
}

/// `tellStopped`, same paging rules as [`TellWaiting`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TellStopped {
    pub offset: i64,
    pub num: i64,
    pub keys: Option<Vec<String>>,
}

impl RpcParams for TellStopped {
    type Response = Vec<StatusSnapshot>;
    const METHOD: &'static str = "tellStopped";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        non_negative("num", self.num)?;
        out.push("offset", &self.offset)?;
        out.push("num", &self.num)?;
        push_keys(out, self.keys.as_ref())
    }
}

/// `changePosition`; the result is the new queue position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangePosition {
    pub gid: Gid,
    pub pos: i64,
    pub how: PositionOrigin,
}

impl RpcParams for ChangePosition {
    type Response = i64;
    const METHOD: &'static str = "changePosition";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        if self.how == PositionOrigin::Set {
            non_negative("pos", self.pos)?;
        }
        out.push("gid", &self.gid)?;
        out.push("pos", &self.pos)?;
        out.push("how", &self.how)
    }
}

/// `changeUri`; the result is `(deleted, added)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeUri {
    pub gid: Gid,
    /// 1-based
    pub file_index: i64,
    pub del_uris: Vec<String>,
    pub add_uris: Vec<String>,
    pub position: Option<i64>,
}

impl RpcParams for ChangeUri {
    type Response = (u32, u32);
    const METHOD: &'static str = "changeUri";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        if self.file_index < 1 {
            return Err(EngineError::validation_error_with_field(
                format!("file index is 1-based, got {}", self.file_index),
                "file_index",
            ));
        }
        if let Some(pos) = self.position {
            non_negative("position", pos)?;
        }
        out.push("gid", &self.gid)?;
        out.push("fileIndex", &self.file_index)?;
        out.push("delUris", &self.del_uris)?;
        out.push("addUris", &self.add_uris)?;
        out.push_opt("position", self.position.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeOption {
    pub gid: Gid,
    pub options: EngineOptions,
}

impl RpcParams for ChangeOption {
    type Response = Ack;
    const METHOD: &'static str = "changeOption";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        out.push("gid", &self.gid)?;
        out.push("options", &self.options)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeGlobalOption {
    pub options: EngineOptions,
}

impl RpcParams for ChangeGlobalOption {
    type Response = Ack;
    const METHOD: &'static str = "changeGlobalOption";

    fn encode(&self, out: &mut ParamWriter) -> Result<()> {
        out.push("options", &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::params::encode_params;
    use serde_json::{json, Value};

    fn encoded<P: RpcParams>(params: &P) -> Value {
        Value::Array(encode_params(params, "abc").unwrap())
    }

    #[test]
    fn test_add_uri_with_position_fills_options() {
        let req = AddUri {
            uris: vec!["http://localhost/file".to_string()],
            options: None,
            position: Some(3),
        };
        assert_eq!(encoded(&req), json!(["token:abc", ["http://localhost/file"], {}, 3]));
        assert_eq!(AddUri::method_name("aria2"), "aria2.addUri");
        assert_eq!(AddUri::method_name("engine"), "engine.addUri");
    }

    #[test]
    fn test_add_uri_minimal() {
        let req = AddUri {
            uris: vec!["magnet:?xt=urn:btih:abc".to_string()],
            ..Default::default()
        };
        assert_eq!(encoded(&req), json!(["token:abc", ["magnet:?xt=urn:btih:abc"]]));
    }

    #[test]
    fn test_add_uri_rejects_negative_position() {
        let req = AddUri {
            uris: vec!["http://localhost/file".to_string()],
            options: None,
            position: Some(-1),
        };
        let err = encode_params(&req, "abc").unwrap_err();
        assert!(matches!(err, EngineError::ValidationError { .. }));
    }

    #[test]
    fn test_add_torrent_base64_and_empty_uris() {
        let req = AddTorrent {
            torrent: b"d4:infoe".to_vec(),
            uris: None,
            options: Some(EngineOptions::new().dir("/data")),
            position: None,
        };
        assert_eq!(encoded(&req), json!(["token:abc", "ZDQ6aW5mb2U=", [], { "dir": "/data" }]));

        let bare = AddTorrent {
            torrent: b"d4:infoe".to_vec(),
            ..Default::default()
        };
        assert_eq!(encoded(&bare), json!(["token:abc", "ZDQ6aW5mb2U="]));
    }

    #[test]
    fn test_gid_request_uses_padded_hex() {
        let req = Remove::new(Gid::new(0x1a2b3c4d5e));
        assert_eq!(encoded(&req), json!(["token:abc", "0000001a2b3c4d5e"]));
    }

    #[test]
    fn test_tell_waiting_paging() {
        let req = TellWaiting { offset: -1, num: 100, keys: None };
        assert_eq!(encoded(&req), json!(["token:abc", -1, 100]));

        let bad = TellWaiting { offset: 0, num: -5, keys: None };
        assert!(encode_params(&bad, "abc").is_err());
    }

    #[test]
    fn test_tell_stopped_method() {
        assert_eq!(TellStopped::method_name("aria2"), "aria2.tellStopped");
        let req = TellStopped {
            offset: 0,
            num: 10,
            keys: Some(vec!["gid".to_string(), "status".to_string()]),
        };
        assert_eq!(encoded(&req), json!(["token:abc", 0, 10, ["gid", "status"]]));
    }

    #[test]
    fn test_change_position() {
        let req = ChangePosition { gid: Gid::new(1), pos: -2, how: PositionOrigin::Cur };
        assert_eq!(encoded(&req), json!(["token:abc", "0000000000000001", -2, "POS_CUR"]));

        let bad = ChangePosition { gid: Gid::new(1), pos: -2, how: PositionOrigin::Set };
        assert!(encode_params(&bad, "abc").is_err());
    }

    #[test]
    fn test_change_uri_file_index_is_one_based() {
        let req = ChangeUri {
            gid: Gid::new(1),
            file_index: 0,
            del_uris: vec![],
            add_uris: vec!["http://mirror/file".to_string()],
            position: None,
        };
        let err = encode_params(&req, "abc").unwrap_err();
        assert!(err.to_string().contains("file_index"));
    }

    #[test]
    fn test_system_methods_have_no_token() {
        assert_eq!(Value::Array(encode_params(&ListMethods, "abc").unwrap()), json!([]));
        assert_eq!(ListMethods::method_name("aria2"), "system.listMethods");
        assert_eq!(ListNotifications::method_name("engine"), "system.listNotifications");
    }

    #[test]
    fn test_shutdown_flags() {
        assert!(Shutdown::SHUTS_DOWN);
        assert!(ForceShutdown::SHUTS_DOWN);
        assert!(!GetVersion::SHUTS_DOWN);
    }
}

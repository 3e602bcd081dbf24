//! RPC module
//!
//! JSON-RPC 2.0 plumbing for the aria2 engine: envelopes, the HTTP
//! transport, request correlation, `system.multicall` batching and the
//! engine's value dialect.

pub mod batch;
pub mod channel;
pub mod codec;
pub mod gid;
pub mod message;
pub mod options;
pub mod params;
pub mod requests;
pub mod responses;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use batch::BatchCall;
pub use channel::{RpcChannel, DEFAULT_NAMESPACE};
pub use codec::Bitfield;
pub use gid::Gid;
pub use message::{JsonRpcRequest, JsonRpcResponse, RpcErrorObject};
pub use options::EngineOptions;
pub use params::{encode_params, ParamWriter, RpcParams};
pub use requests::PositionOrigin;
pub use responses::{
    Ack, BitTorrentInfo, BitTorrentMode, BitTorrentName, FileServers, FileStatus, GlobalStat, PeerInfo, ServerInfo, SessionInfo,
    StatusSnapshot, TaskStatus, UriInfo, UriStatus, VersionInfo,
};
pub use transport::{HttpTransport, Transport, DEFAULT_REQUEST_TIMEOUT};

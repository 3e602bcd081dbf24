//! Engine client
//!
//! One typed async method per engine capability, on top of an
//! [`RpcChannel`]. Arguments are validated locally before anything is sent,
//! and the client refuses to talk to an engine it has shut down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EngineError, Result};
use crate::rpc::requests::*;
use crate::rpc::{
    BatchCall, EngineOptions, FileServers, FileStatus, Gid, GlobalStat, HttpTransport, PeerInfo, RpcChannel,
    RpcParams, SessionInfo, StatusSnapshot, Transport, UriInfo, VersionInfo,
};

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// The engine was shut down; every call fails locally
    Closed,
}

/// Typed JSON-RPC client for one engine instance
#[derive(Debug)]
pub struct EngineClient {
    channel: Arc<RpcChannel>,
    closed: AtomicBool,
}

fn key_list(keys: Option<&[&str]>) -> Option<Vec<String>> {
    keys.map(|k| k.iter().map(|s| s.to_string()).collect())
}

impl EngineClient {
    /// Client over any transport, default namespace
    pub fn new(transport: Arc<dyn Transport>, secret: impl Into<String>) -> Self {
        Self::from_channel(RpcChannel::new(transport, secret))
    }

    pub fn from_channel(channel: RpcChannel) -> Self {
        Self {
            channel: Arc::new(channel),
            closed: AtomicBool::new(false),
        }
    }

    /// HTTP client for `<base>/jsonrpc`
    pub fn connect(base: &str, secret: impl Into<String>, timeout: Duration) -> Result<Self> {
        let transport = HttpTransport::new(base, timeout)?;
        Ok(Self::new(Arc::new(transport), secret))
    }

    /// HTTP client for an engine on `localhost:<port>`
    pub fn localhost(port: u16, secret: impl Into<String>, timeout: Duration) -> Result<Self> {
        let transport = HttpTransport::localhost(port, timeout)?;
        Ok(Self::new(Arc::new(transport), secret))
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    pub fn endpoint(&self) -> String {
        self.channel.endpoint()
    }

    fn mark_closed(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Connection to {} closed", self.channel.endpoint());
        }
    }

    /// Send any typed request
    pub async fn call<P: RpcParams>(&self, params: &P) -> Result<P::Response> {
        if self.is_closed() {
            return Err(EngineError::ConnectionClosed);
        }
        let response = self.channel.call(params).await?;
        if P::SHUTS_DOWN {
            self.mark_closed();
        }
        Ok(response)
    }

    /// Send up to eight requests as one `system.multicall`.
    ///
    /// The first failing slot fails the whole batch with its protocol error.
    /// A shutdown-class call that succeeded still closes the client.
    pub async fn batch<B: BatchCall>(&self, calls: B) -> Result<B::Output> {
        if self.is_closed() {
            return Err(EngineError::ConnectionClosed);
        }
        let slots = self.channel.multicall(&calls).await?;
        if B::shut_down_by(&slots) {
            self.mark_closed();
        }
        B::decode_results(self.channel.namespace(), slots)
    }

    /// Add a download from one or more URIs of the same resource
    pub async fn add_uri(
        &self,
        uris: Vec<String>,
        options: Option<EngineOptions>,
        position: Option<i64>,
    ) -> Result<Gid> {
        self.call(&AddUri { uris, options, position }).await
    }

    /// Add a download from raw `.torrent` bytes
    pub async fn add_torrent(
        &self,
        torrent: Vec<u8>,
        web_seed_uris: Option<Vec<String>>,
        options: Option<EngineOptions>,
        position: Option<i64>,
    ) -> Result<Gid> {
        self.call(&AddTorrent {
            torrent,
            uris: web_seed_uris,
            options,
            position,
        })
        .await
    }

    /// Add every download described by a metalink document
    pub async fn add_metalink(
        &self,
        metalink: Vec<u8>,
        options: Option<EngineOptions>,
        position: Option<i64>,
    ) -> Result<Vec<Gid>> {
        self.call(&AddMetalink { metalink, options, position }).await
    }

    pub async fn remove(&self, gid: Gid) -> Result<Gid> {
        self.call(&Remove::new(gid)).await
    }

    pub async fn force_remove(&self, gid: Gid) -> Result<Gid> {
        self.call(&ForceRemove::new(gid)).await
    }

    pub async fn pause(&self, gid: Gid) -> Result<Gid> {
        self.call(&Pause::new(gid)).await
    }

    pub async fn force_pause(&self, gid: Gid) -> Result<Gid> {
        self.call(&ForcePause::new(gid)).await
    }

    pub async fn unpause(&self, gid: Gid) -> Result<Gid> {
        self.call(&Unpause::new(gid)).await
    }

    pub async fn pause_all(&self) -> Result<bool> {
        Ok(self.call(&PauseAll).await?.0)
    }

    pub async fn force_pause_all(&self) -> Result<bool> {
        Ok(self.call(&ForcePauseAll).await?.0)
    }

    pub async fn unpause_all(&self) -> Result<bool> {
        Ok(self.call(&UnpauseAll).await?.0)
    }

    /// Status of one download, optionally limited to `keys`
    pub async fn tell_status(&self, gid: Gid, keys: Option<&[&str]>) -> Result<StatusSnapshot> {
        self.call(&TellStatus { gid, keys: key_list(keys) }).await
    }

    pub async fn tell_active(&self, keys: Option<&[&str]>) -> Result<Vec<StatusSnapshot>> {
        self.call(&TellActive { keys: key_list(keys) }).await
    }

    /// One page of the waiting queue. Negative offsets count from the tail.
    pub async fn tell_waiting(&self, offset: i64, num: i64, keys: Option<&[&str]>) -> Result<Vec<StatusSnapshot>> {
        self.call(&TellWaiting {
            offset,
            num,
            keys: key_list(keys),
        })
        .await
    }

    /// One page of stopped downloads. Negative offsets count from the tail.
    pub async fn tell_stopped(&self, offset: i64, num: i64, keys: Option<&[&str]>) -> Result<Vec<StatusSnapshot>> {
        self.call(&TellStopped {
            offset,
            num,
            keys: key_list(keys),
        })
        .await
    }

    pub async fn get_uris(&self, gid: Gid) -> Result<Vec<UriInfo>> {
        self.call(&GetUris::new(gid)).await
    }

    pub async fn get_files(&self, gid: Gid) -> Result<Vec<FileStatus>> {
        self.call(&GetFiles::new(gid)).await
    }

    pub async fn get_peers(&self, gid: Gid) -> Result<Vec<PeerInfo>> {
        self.call(&GetPeers::new(gid)).await
    }

    pub async fn get_servers(&self, gid: Gid) -> Result<Vec<FileServers>> {
        self.call(&GetServers::new(gid)).await
    }

    /// Move a waiting download; returns its new position
    pub async fn change_position(&self, gid: Gid, pos: i64, how: PositionOrigin) -> Result<i64> {
        self.call(&ChangePosition { gid, pos, how }).await
    }

    /// Remove and add URIs of one file; returns `(deleted, added)`
    pub async fn change_uri(
        &self,
        gid: Gid,
        file_index: i64,
        del_uris: Vec<String>,
        add_uris: Vec<String>,
        position: Option<i64>,
    ) -> Result<(u32, u32)> {
        self.call(&ChangeUri {
            gid,
            file_index,
            del_uris,
            add_uris,
            position,
        })
        .await
    }

    pub async fn get_option(&self, gid: Gid) -> Result<EngineOptions> {
        self.call(&GetOption::new(gid)).await
    }

    pub async fn change_option(&self, gid: Gid, options: EngineOptions) -> Result<bool> {
        Ok(self.call(&ChangeOption { gid, options }).await?.0)
    }

    pub async fn get_global_option(&self) -> Result<EngineOptions> {
        self.call(&GetGlobalOption).await
    }

    pub async fn change_global_option(&self, options: EngineOptions) -> Result<bool> {
        Ok(self.call(&ChangeGlobalOption { options }).await?.0)
    }

    pub async fn get_global_stat(&self) -> Result<GlobalStat> {
        self.call(&GetGlobalStat).await
    }

    pub async fn purge_download_result(&self) -> Result<bool> {
        Ok(self.call(&PurgeDownloadResult).await?.0)
    }

    pub async fn remove_download_result(&self, gid: Gid) -> Result<bool> {
        Ok(self.call(&RemoveDownloadResult::new(gid)).await?.0)
    }

    pub async fn get_version(&self) -> Result<VersionInfo> {
        self.call(&GetVersion).await
    }

    pub async fn get_session_info(&self) -> Result<SessionInfo> {
        self.call(&GetSessionInfo).await
    }

    pub async fn save_session(&self) -> Result<bool> {
        Ok(self.call(&SaveSession).await?.0)
    }

    /// Graceful engine shutdown; the connection is closed on success
    pub async fn shutdown(&self) -> Result<bool> {
        Ok(self.call(&Shutdown).await?.0)
    }

    /// Immediate engine shutdown; the connection is closed on success
    pub async fn force_shutdown(&self) -> Result<bool> {
        Ok(self.call(&ForceShutdown).await?.0)
    }

    pub async fn list_methods(&self) -> Result<Vec<String>> {
        self.call(&ListMethods).await
    }

    pub async fn list_notifications(&self) -> Result<Vec<String>> {
        self.call(&ListNotifications).await
    }

    /// Close without contacting the engine
    pub fn close(&self) {
        self.mark_closed();
    }

    /// Best-effort forced shutdown, then close. Never fails.
    pub async fn dispose(&self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.channel.call(&ForceShutdown).await {
            debug!("Ignoring forced shutdown failure during dispose: {}", e);
        }
        self.mark_closed();
    }
}

impl Drop for EngineClient {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        // Outside a runtime there is nothing to run the request on
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!("EngineClient dropped while open and outside a runtime; engine left running");
            return;
        };
        let channel = self.channel.clone();
        handle.spawn(async move {
            if let Err(e) = channel.call(&ForceShutdown).await {
                debug!("Forced shutdown on drop failed: {}", e);
            }
        });
    }
}

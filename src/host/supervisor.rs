//! Engine supervisor
//!
//! Owns one engine process and the client talking to it. Startup probes the
//! engine until it answers, then a background loop refreshes the task graph.
//! Teardown runs in a fixed order: stop polling, ask the engine to shut
//! down, wait for the process, release it.

use parking_lot::Mutex;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use super::config::{redact, HostConfig};
use super::process::{engine_args, resolve_executable, EngineProcess};
use crate::client::EngineClient;
use crate::error::{EngineError, Result};
use crate::rpc::{HttpTransport, RpcChannel, StatusSnapshot, Transport, VersionInfo};
use crate::tracker::{EventBus, TaskEvent, TaskGraph};

/// Session health shared with the poll loop
#[derive(Debug, Default)]
struct FaultState {
    faulted: AtomicBool,
    reason: Mutex<Option<String>>,
}

impl FaultState {
    /// Record the first fault and announce it
    fn fault(&self, reason: String, events: &EventBus) {
        if self.faulted.swap(true, Ordering::AcqRel) {
            return;
        }
        error!("Engine session faulted: {}", reason);
        *self.reason.lock() = Some(reason.clone());
        events.publish(TaskEvent::SessionFaulted { reason });
    }
}

/// A supervised engine session
pub struct EngineHost {
    config: HostConfig,
    port: Option<u16>,
    process: Option<EngineProcess>,
    client: Arc<EngineClient>,
    graph: Arc<TaskGraph>,
    events: EventBus,
    fault: Arc<FaultState>,
    cancel: CancellationToken,
    poll_task: Option<JoinHandle<()>>,
}

impl EngineHost {
    /// Spawn an engine and wait for it to answer.
    ///
    /// A spawn failure is returned as an error. A probe failure is not: the
    /// host comes back faulted, without a poll loop, so it can still be
    /// stopped and the process reaped.
    pub async fn start(config: HostConfig, events: EventBus) -> Result<Self> {
        config.validate()?;

        let executable = resolve_executable(config.executable.as_deref())?;
        let port = config.resolve_port();
        let secret = config.resolve_secret();
        let args = engine_args(port, &secret, &config.download_dir, &config.extra_args);

        info!(
            "Starting {} on port {} (secret {})",
            executable.display(),
            port,
            redact(&secret)
        );
        let process = EngineProcess::spawn(&executable, &args, &config.work_dir)?;

        let transport = HttpTransport::localhost(port, config.request_timeout)?;
        let client = EngineClient::from_channel(RpcChannel::with_namespace(
            Arc::new(transport),
            secret,
            config.namespace.clone(),
        ));

        Ok(Self::launch(config, Some(port), Some(process), client, events).await)
    }

    /// Supervise an engine that is already running behind `transport`
    pub async fn attach(
        config: HostConfig,
        transport: Arc<dyn Transport>,
        secret: impl Into<String>,
        events: EventBus,
    ) -> Result<Self> {
        config.validate()?;
        let client = EngineClient::from_channel(RpcChannel::with_namespace(
            transport,
            secret,
            config.namespace.clone(),
        ));
        Ok(Self::launch(config, None, None, client, events).await)
    }

    async fn launch(
        config: HostConfig,
        port: Option<u16>,
        process: Option<EngineProcess>,
        client: EngineClient,
        events: EventBus,
    ) -> Self {
        let client = Arc::new(client);
        let graph = Arc::new(TaskGraph::new(client.clone(), events.clone()));

        let mut host = Self {
            config,
            port,
            process,
            client,
            graph,
            events,
            fault: Arc::new(FaultState::default()),
            cancel: CancellationToken::new(),
            poll_task: None,
        };

        match host.probe().await {
            Ok(version) => {
                info!("Engine {} is up at {}", version.version, host.client.endpoint());
                host.start_poll_loop();
            }
            Err(e) => host.fault.fault(format!("Health probe failed: {}", e), &host.events),
        }
        host
    }

    /// Ask for the version until the engine answers.
    ///
    /// Transport failures are retried; anything else is fatal at once.
    async fn probe(&mut self) -> Result<VersionInfo> {
        let attempts = self.config.probe_attempts;
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.client.get_version().await {
                Ok(version) => return Ok(version),
                Err(e) if e.is_retryable() => {
                    debug!("Probe attempt {}/{} failed: {}", attempt, attempts, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }

            if let Some(status) = self.process.as_mut().and_then(|p| p.try_exit_status()) {
                return Err(EngineError::process_error(format!("Engine exited during startup with {}", status)));
            }

            tokio::time::sleep(self.config.probe_interval).await;
        }

        Err(EngineError::probe_error(attempts, last_error.as_ref()))
    }

    fn start_poll_loop(&mut self) {
        let poller = Poller {
            client: self.client.clone(),
            graph: self.graph.clone(),
            events: self.events.clone(),
            fault: self.fault.clone(),
            cancel: self.cancel.clone(),
            interval: self.config.refresh_interval,
            page_size: self.config.page_size,
        };
        self.poll_task = Some(tokio::spawn(poller.run()));
    }

    pub fn client(&self) -> &Arc<EngineClient> {
        &self.client
    }

    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// RPC port of a spawned engine
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(EngineProcess::pid)
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.faulted.load(Ordering::Acquire)
    }

    pub fn fault_reason(&self) -> Option<String> {
        self.fault.reason.lock().clone()
    }

    pub fn is_polling(&self) -> bool {
        self.poll_task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Tear the session down. Never fails; returns the exit status if known.
    pub async fn stop(mut self) -> Option<ExitStatus> {
        self.cancel.cancel();
        if let Some(task) = self.poll_task.take() {
            if let Err(e) = task.await {
                warn!("Poll loop ended abnormally: {}", e);
            }
        }

        if !self.client.is_closed() {
            match self.client.shutdown().await {
                Ok(_) => debug!("Engine accepted shutdown"),
                Err(e) => {
                    warn!("Graceful shutdown failed: {}; forcing", e);
                    self.client.dispose().await;
                }
            }
        }

        let status = match self.process.take() {
            Some(mut process) => process.wait_or_kill(self.config.shutdown_timeout).await,
            None => None,
        };
        info!("Engine stopped (exit status: {:?})", status);
        status
    }
}

impl Drop for EngineHost {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Background refresh of the task graph
struct Poller {
    client: Arc<EngineClient>,
    graph: Arc<TaskGraph>,
    events: EventBus,
    fault: Arc<FaultState>,
    cancel: CancellationToken,
    interval: Duration,
    page_size: i64,
}

impl Poller {
    async fn run(self) {
        debug!("Poll loop started ({:?} interval)", self.interval);
        let failure = loop {
            if self.cancel.is_cancelled() {
                break None;
            }

            match refresh(&self.client, &self.graph, self.page_size).await {
                Ok(applied) => trace!("Refreshed {} tasks", applied),
                Err(e) if e.is_transport() => {
                    warn!("Lost contact with engine: {}", e);
                    break Some(e);
                }
                Err(e) => {
                    error!("Refresh failed: {}", e);
                    break Some(e);
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break None,
                _ = tokio::time::sleep(self.interval) => {}
            }
        };

        match failure {
            None => debug!("Poll loop cancelled"),
            Some(e) => self.fault.fault(format!("Refresh failed: {}", e), &self.events),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum StatusList {
    Waiting,
    Stopped,
}

/// Fetch one full list, page by page, until an empty page
async fn fetch_all(client: &EngineClient, list: StatusList, page_size: i64) -> Result<Vec<StatusSnapshot>> {
    let mut all = Vec::new();
    let mut offset = 0;
    loop {
        let page = match list {
            StatusList::Waiting => client.tell_waiting(offset, page_size, None).await?,
            StatusList::Stopped => client.tell_stopped(offset, page_size, None).await?,
        };
        if page.is_empty() {
            return Ok(all);
        }
        offset += page.len() as i64;
        all.extend(page);
    }
}

/// One refresh: active, then waiting, then stopped, merged as one batch
pub async fn refresh(client: &EngineClient, graph: &TaskGraph, page_size: i64) -> Result<usize> {
    let mut snapshots = client.tell_active(None).await?;
    snapshots.extend(fetch_all(client, StatusList::Waiting, page_size).await?);
    snapshots.extend(fetch_all(client, StatusList::Stopped, page_size).await?);
    let applied = graph.merge_snapshots(snapshots).await;
    graph.resume_paused_followers().await?;
    Ok(applied)
}

//! Engine subprocess

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use super::config::DEFAULT_EXECUTABLE;
use crate::error::{EngineError, Result};

/// Command line for an RPC-enabled engine
pub fn engine_args(port: u16, secret: &str, download_dir: &Path, extra: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "--enable-rpc=true".into(),
        format!("--rpc-listen-port={}", port).into(),
        format!("--rpc-secret={}", secret).into(),
        "--pause-metadata=true".into(),
        "--bt-save-metadata=true".into(),
        "--rpc-save-upload-metadata=false".into(),
    ];
    let mut dir = OsString::from("--dir=");
    dir.push(download_dir.as_os_str());
    args.push(dir);
    args.extend(extra.iter().map(OsString::from));
    args
}

/// Look `name` up in the directories of `PATH`
pub fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", name));
            if exe.is_file() {
                return Some(exe);
            }
        }
        None
    })
}

/// Configured executable, or `aria2c` from `PATH`
pub fn resolve_executable(configured: Option<&Path>) -> Result<PathBuf> {
    match configured {
        Some(path) => Ok(path.to_path_buf()),
        None => find_on_path(DEFAULT_EXECUTABLE).ok_or_else(|| {
            EngineError::process_error(format!("{} not found on PATH", DEFAULT_EXECUTABLE))
        }),
    }
}

/// A spawned engine, killed if dropped while still running
#[derive(Debug)]
pub struct EngineProcess {
    child: Child,
    pid: Option<u32>,
}

impl EngineProcess {
    /// Spawn `executable` with `args` in `work_dir`
    pub fn spawn(executable: &Path, args: &[OsString], work_dir: &Path) -> Result<Self> {
        let child = Command::new(executable)
            .args(args)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::process_error_with_source(format!("Failed to spawn {}", executable.display()), e.to_string())
            })?;

        let pid = child.id();
        info!("Spawned {} (pid {:?})", executable.display(), pid);
        Ok(Self { child, pid })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Exit status if the process already exited
    pub fn try_exit_status(&mut self) -> Option<ExitStatus> {
        match self.child.try_wait() {
            Ok(status) => status,
            Err(e) => {
                warn!("Failed to query engine process: {}", e);
                None
            }
        }
    }

    /// Wait up to `timeout` for a voluntary exit, then kill
    pub async fn wait_or_kill(&mut self, timeout: Duration) -> Option<ExitStatus> {
        match tokio::time::timeout(timeout, self.child.wait()).await {
            Ok(Ok(status)) => {
                debug!("Engine exited with {}", status);
                Some(status)
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for engine: {}", e);
                None
            }
            Err(_) => {
                warn!("Engine did not exit within {:?}; killing pid {:?}", timeout, self.pid);
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill engine: {}", e);
                    return None;
                }
                self.child.wait().await.ok()
            }
        }
    }
}

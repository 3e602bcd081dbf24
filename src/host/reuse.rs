//! Port and secret reuse
//!
//! Before reusing a port from an earlier session, make sure no engine from
//! that session still holds it.

use tracing::{debug, info, warn};

use crate::client::EngineClient;
use crate::rpc::DEFAULT_REQUEST_TIMEOUT;

/// Free a previous engine instance so its port can be reused.
///
/// With a pid the process is terminated; one that already exited counts as
/// reclaimed. Without a pid the engine on `localhost:port` is asked to shut
/// down. Returns whether the port is free to reuse.
pub async fn reclaim_instance(port: u16, secret: &str, pid: Option<u32>) -> bool {
    if let Some(pid) = pid {
        return terminate_pid(pid).await;
    }

    match EngineClient::localhost(port, secret, DEFAULT_REQUEST_TIMEOUT) {
        Ok(client) => reclaim_with_client(&client).await,
        Err(e) => {
            warn!("Cannot reach port {}: {}", port, e);
            false
        }
    }
}

/// Force-shut-down whatever answers on `client`.
///
/// Nobody listening also means the port is free. An engine that rejects the
/// call (wrong secret) keeps the port.
pub async fn reclaim_with_client(client: &EngineClient) -> bool {
    let reusable = match client.force_shutdown().await {
        Ok(_) => {
            info!("Previous engine at {} shut down", client.endpoint());
            true
        }
        Err(e) if e.is_transport() => {
            debug!("Nothing answering at {}: {}", client.endpoint(), e);
            true
        }
        Err(e) => {
            warn!("Engine at {} refused shutdown: {}", client.endpoint(), e);
            false
        }
    };
    client.close();
    reusable
}

#[cfg(unix)]
async fn terminate_pid(pid: u32) -> bool {
    // 0 and negative values address process groups
    let raw = match libc::pid_t::try_from(pid) {
        Ok(raw) if raw > 0 => raw,
        _ => {
            warn!("Invalid pid {}", pid);
            return false;
        }
    };
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(raw, libc::SIGKILL) };
    if rc == 0 {
        info!("Killed previous engine (pid {})", pid);
        return true;
    }

    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        debug!("Previous engine (pid {}) already exited", pid);
        true
    } else {
        warn!("Failed to kill pid {}: {}", pid, err);
        false
    }
}

#[cfg(windows)]
async fn terminate_pid(pid: u32) -> bool {
    // taskkill exits with 128 when the process does not exist
    const NOT_FOUND: i32 = 128;

    let status = tokio::process::Command::new("taskkill")
        .args(["/F", "/PID", &pid.to_string()])
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await;

    match status {
        Ok(status) if status.success() => {
            info!("Killed previous engine (pid {})", pid);
            true
        }
        Ok(status) if status.code() == Some(NOT_FOUND) => {
            debug!("Previous engine (pid {}) already exited", pid);
            true
        }
        Ok(status) => {
            warn!("taskkill for pid {} failed with {}", pid, status);
            false
        }
        Err(e) => {
            warn!("Failed to run taskkill: {}", e);
            false
        }
    }
}

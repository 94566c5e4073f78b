//! Launching a `plotwire-rpc` server as a child process and talking to it.
//!
//! The child is started on the first free port at or above the configured
//! one, then polled with `isActive` until it answers. It is killed when the
//! [`RpcService`] is stopped or dropped, so it never outlives its owner.

use std::io;
use std::net::TcpListener;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::process::{Child, Command};

use super::client::{ACTIVE_POLL_INTERVAL, RpcClient};
use super::error::RpcError;
use crate::config::Settings;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("server process error: {0}")]
    Process(#[from] io::Error),
    #[error("no free port at or above {0}")]
    NoFreePort(u16),
    #[error("server process exited before becoming active ({0})")]
    Exited(ExitStatus),
    #[error(transparent)]
    Rpc(#[from] RpcError),
}

/// First port at or above `start` that `host` can bind right now.
///
/// The port is released again before returning, so another process may still
/// take it before the child binds.
pub fn free_port(host: &str, start: u16) -> Result<u16, ServiceError> {
    (start..=u16::MAX)
        .find(|&port| TcpListener::bind((host, port)).is_ok())
        .ok_or(ServiceError::NoFreePort(start))
}

pub struct RpcService {
    child: Child,
    port: u16,
    client: RpcClient,
}

impl RpcService {
    /// Start `binary` on a free port and wait for it to become active.
    ///
    /// The search starts at `settings.remote_port()`. The wait is bounded by
    /// `settings.connect_timeout` and ends early if the child exits.
    pub async fn spawn(binary: impl AsRef<Path>, settings: &Settings) -> Result<Self, ServiceError> {
        let binary = binary.as_ref();
        let port = free_port(&settings.host, settings.remote_port())?;

        let mut child = Command::new(binary)
            .arg(port.to_string())
            .arg("--host")
            .arg(&settings.host)
            .arg("--staging-dir")
            .arg(&settings.staging_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        tracing::info!(
            binary = %binary.display(),
            pid = ?child.id(),
            port,
            "Started RPC server process"
        );

        let mut settings = settings.clone();
        settings.set_remote_port(port);
        match wait_until_active(&mut child, &settings).await {
            Ok(client) => Ok(Self {
                child,
                port,
                client: client.with_staging(settings.staging_area()),
            }),
            Err(e) => {
                tracing::warn!(port, error = %e, "RPC server process did not become active");
                if let Err(kill_err) = child.kill().await {
                    tracing::debug!(error = %kill_err, "Failed to kill RPC server process");
                }
                Err(e)
            }
        }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn client(&mut self) -> &mut RpcClient {
        &mut self.client
    }

    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Kill the child if it is still running and reap it.
    pub async fn stop(&mut self) -> Result<ExitStatus, ServiceError> {
        if self.child.try_wait()?.is_none() {
            self.child.start_kill()?;
        }
        let status = self.child.wait().await?;
        tracing::info!(port = self.port, %status, "Stopped RPC server process");
        Ok(status)
    }
}

async fn wait_until_active(child: &mut Child, settings: &Settings) -> Result<RpcClient, ServiceError> {
    let addr = settings.remote_addr();
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait()? {
            return Err(ServiceError::Exited(status));
        }
        if let Some(client) = RpcClient::probe_active(&addr).await {
            return Ok(client);
        }
        if start.elapsed() >= settings.connect_timeout {
            return Err(RpcError::Timeout {
                addr,
                waited: start.elapsed(),
            }
            .into());
        }
        tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
    }
}

//! Blocking-style RPC client: one call in flight per client.

use std::time::{Duration, Instant};

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite};

use super::builtins::IS_ACTIVE;
use super::error::RpcError;
use crate::bridge::codec::FrameCodec;
use crate::bridge::protocol::{RequestId, RpcRequest, RpcResponse};
use crate::bridge::staging::StagingArea;
use crate::bridge::value::Value;
use crate::config::Settings;

/// Interval between liveness probes in [`RpcClient::connect_when_active`].
pub(crate) const ACTIVE_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct RpcClient {
    addr: String,
    reader: FramedRead<OwnedReadHalf, FrameCodec<RpcResponse>>,
    writer: FramedWrite<OwnedWriteHalf, FrameCodec<RpcRequest>>,
    staging: StagingArea,
    /// Set while a request is outstanding. Still set on entry means a call
    /// was dropped or failed mid-flight and the stream is out of step.
    broken: bool,
}

impl RpcClient {
    pub async fn connect(addr: &str) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();
        tracing::debug!(%addr, "Connected to RPC server");
        Ok(Self {
            addr: addr.to_string(),
            reader: FramedRead::new(read_half, FrameCodec::new()),
            writer: FramedWrite::new(write_half, FrameCodec::new()),
            staging: StagingArea::default(),
            broken: false,
        })
    }

    /// Connect to the renderer named by `settings`, waiting for it to become
    /// active within `settings.connect_timeout`, and stage through its area.
    pub async fn connect_with(settings: &Settings) -> Result<Self, RpcError> {
        let client =
            Self::connect_when_active(&settings.remote_addr(), settings.connect_timeout).await?;
        Ok(client.with_staging(settings.staging_area()))
    }

    /// Keep connecting and probing `isActive` until the server answers true.
    ///
    /// For servers that are still starting up. Any failure inside the window
    /// is retried; the window itself is not extended.
    pub async fn connect_when_active(addr: &str, timeout: Duration) -> Result<Self, RpcError> {
        let start = Instant::now();
        loop {
            if let Some(client) = Self::probe_active(addr).await {
                return Ok(client);
            }
            if start.elapsed() >= timeout {
                return Err(RpcError::Timeout {
                    addr: addr.to_string(),
                    waited: start.elapsed(),
                });
            }
            tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
        }
    }

    /// One connect-and-ask attempt. `None` unless `isActive` answered true.
    pub(crate) async fn probe_active(addr: &str) -> Option<Self> {
        match Self::connect(addr).await {
            Ok(mut client) => match client.call(IS_ACTIVE, vec![Value::from("unused")]).await {
                Ok(Value::Bool(true)) => return Some(client),
                Ok(other) => tracing::trace!(%addr, ?other, "Server not active yet"),
                Err(e) => tracing::trace!(%addr, error = %e, "Liveness probe failed"),
            },
            Err(e) => tracing::trace!(%addr, error = %e, "Connect attempt failed"),
        }
        None
    }

    /// Use `staging` for arrays above its threshold.
    pub fn with_staging(mut self, staging: StagingArea) -> Self {
        self.staging = staging;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    /// False once a call was interrupted or the stream lost sync.
    pub fn is_usable(&self) -> bool {
        !self.broken
    }

    /// Invoke `method` remotely and wait for its result.
    ///
    /// A transport failure, a mismatched response, or a call future dropped
    /// before its response arrived leaves the client unusable: every later
    /// call fails with [`RpcError::Closed`].
    pub async fn call(&mut self, method: &str, mut args: Vec<Value>) -> Result<Value, RpcError> {
        if self.broken {
            return Err(RpcError::Closed);
        }
        let id = RequestId::new();
        // Staged files live until the response is in, then the guards drop.
        let _staged = self.staging.stage_large(&mut args)?;

        tracing::trace!(%id, %method, nargs = args.len(), "Sending request");
        self.broken = true;
        self.writer
            .send(RpcRequest {
                id,
                method: method.to_string(),
                args,
            })
            .await?;

        let response = self.reader.next().await.ok_or(RpcError::Closed)??;
        if response.id() != id {
            tracing::warn!(
                addr = %self.addr,
                expected = %id,
                got = %response.id(),
                "Response out of step; client unusable"
            );
            return Err(RpcError::IdMismatch {
                expected: id,
                got: response.id(),
            });
        }
        self.broken = false;

        match response {
            RpcResponse::Ok { mut result, .. } => {
                self.staging.resolve(&mut result)?;
                Ok(result)
            }
            RpcResponse::Error { error, .. } => Err(RpcError::Remote {
                method: method.to_string(),
                error,
            }),
        }
    }
}

//! RPC server.
//!
//! Connections are accepted concurrently, but every request is funnelled
//! through one dispatch task, so handlers run strictly one at a time in
//! arrival order. Each connection waits for its response before reading the
//! next request.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::info;

use super::registry::{Handler, HandlerRegistry};
use crate::bridge::codec::FrameCodec;
use crate::bridge::protocol::{RemoteErrorKind, RpcRequest, RpcResponse};
use crate::bridge::staging::StagingArea;
use crate::config::{DEFAULT_HOST, DEFAULT_PORT};

/// Requests waiting for the dispatch task before connections see backpressure.
const DISPATCH_QUEUE: usize = 64;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    /// Zero selects [`DEFAULT_PORT`].
    pub port: u16,
    pub staging: StagingArea,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            staging: StagingArea::default(),
        }
    }
}

impl ServerConfig {
    pub fn effective_port(&self) -> u16 {
        if self.port == 0 { DEFAULT_PORT } else { self.port }
    }
}

/// Stops a running [`RpcServer::serve`] loop.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

struct Job {
    request: RpcRequest,
    reply: oneshot::Sender<RpcResponse>,
}

pub struct RpcServer {
    listener: TcpListener,
    registry: Arc<HandlerRegistry>,
    staging: StagingArea,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl RpcServer {
    pub async fn bind(config: ServerConfig) -> io::Result<Self> {
        let addr = format!("{}:{}", config.host, config.effective_port());
        Self::bind_addr(&addr, config.staging).await
    }

    /// Bind an explicit address; port 0 here means an ephemeral port.
    pub async fn bind_addr(addr: &str, staging: StagingArea) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            listener,
            registry: Arc::new(HandlerRegistry::new()),
            staging,
            shutdown_tx: Arc::new(shutdown_tx),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn add_handler(&self, name: impl Into<String>, handler: impl Handler + 'static) {
        self.registry.add(name, handler);
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Serve until the shutdown handle fires.
    pub async fn serve(self) -> io::Result<()> {
        let actual_addr = self.listener.local_addr()?;
        info!(addr = %actual_addr, handlers = ?self.registry.names(), "Starting RPC server");

        let (job_tx, job_rx) = mpsc::channel(DISPATCH_QUEUE);
        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&self.registry),
            self.staging.clone(),
            job_rx,
        ));

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_connection(stream, peer, job_tx.clone()));
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to accept connection"),
                },
                _ = wait_for_shutdown(&mut shutdown_rx) => break,
            }
        }

        dispatcher.abort();
        info!("RPC server shutdown complete");
        Ok(())
    }

    /// Serve until SIGINT, SIGTERM, or the shutdown handle.
    pub async fn serve_until_signal(self) -> io::Result<()> {
        let handle = self.shutdown_handle();
        tokio::spawn(async move {
            shutdown_signal().await;
            handle.shutdown();
        });
        self.serve().await
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn dispatch_loop(
    registry: Arc<HandlerRegistry>,
    staging: StagingArea,
    mut jobs: mpsc::Receiver<Job>,
) {
    while let Some(Job { request, reply }) = jobs.recv().await {
        let response = run_request(&registry, &staging, request).await;
        if reply.send(response).is_err() {
            tracing::debug!("Connection went away before its response was ready");
        }
    }
}

async fn run_request(
    registry: &HandlerRegistry,
    staging: &StagingArea,
    mut request: RpcRequest,
) -> RpcResponse {
    for arg in &mut request.args {
        if let Err(e) = staging.resolve(arg) {
            tracing::warn!(method = %request.method, error = %e, "Failed to read staged argument");
            return RpcResponse::error(request.id, RemoteErrorKind::Staging, e.to_string());
        }
    }
    registry.dispatch(request).await
}

async fn serve_connection(stream: TcpStream, peer: SocketAddr, jobs: mpsc::Sender<Job>) {
    tracing::debug!(%peer, "Client connected");
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(%peer, error = %e, "Failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();
    let mut reader = FramedRead::new(read_half, FrameCodec::<RpcRequest>::new());
    let mut writer = FramedWrite::new(write_half, FrameCodec::<RpcResponse>::new());

    while let Some(frame) = reader.next().await {
        let request = match frame {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(%peer, error = %e, "Dropping connection after bad frame");
                break;
            }
        };
        tracing::trace!(%peer, id = %request.id, method = %request.method, "Received request");

        let (reply, response) = oneshot::channel();
        if jobs.send(Job { request, reply }).await.is_err() {
            break;
        }
        let Ok(response) = response.await else {
            break;
        };
        if let Err(e) = writer.send(response).await {
            tracing::warn!(%peer, error = %e, "Failed to write response");
            break;
        }
    }
    tracing::debug!(%peer, "Client disconnected");
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::bridge::dataset::{ArrayData, Dataset};
    use crate::bridge::value::{Binary, TypedNull, Value};
    use crate::config::Settings;
    use crate::rpc::client::RpcClient;
    use crate::rpc::error::{HandlerError, RpcError};
    use crate::rpc::registry::{CallContext, handler_fn};

    async fn start(staging: StagingArea) -> (String, ShutdownHandle, tokio::task::JoinHandle<io::Result<()>>) {
        let server = RpcServer::bind_addr("127.0.0.1:0", staging).await.unwrap();
        server.add_handler("echo", handler_fn(|args| Ok(Value::List(args))));
        crate::rpc::builtins::install(
            server.registry(),
            Arc::new(crate::rpc::builtins::default_catalog()),
            crate::rpc::registration::RegistrationGate::disabled(),
        );
        let addr = server.local_addr().unwrap().to_string();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.serve());
        (addr, handle, task)
    }

    #[test]
    fn server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, DEFAULT_PORT);
    }

    #[test]
    fn port_zero_means_default_port() {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        assert_eq!(config.effective_port(), DEFAULT_PORT);
    }

    #[tokio::test]
    async fn call_roundtrips_every_value_kind() {
        let (addr, handle, _task) = start(StagingArea::default()).await;
        let mut client = RpcClient::connect(&addr).await.unwrap();

        let args = vec![
            Value::Null,
            Value::from(TypedNull::new("int")),
            Value::from(true),
            Value::from(-7),
            Value::from(2.5),
            Value::from("text"),
            Value::from(Binary(vec![0, 1, 254])),
            Value::from(Dataset::from(vec![1.0f32, 2.0])),
        ];
        let result = client.call("echo", args.clone()).await.unwrap();
        assert_eq!(result, Value::List(args));
        handle.shutdown();
    }

    #[tokio::test]
    async fn unknown_method_leaves_connection_usable() {
        let (addr, handle, _task) = start(StagingArea::default()).await;
        let mut client = RpcClient::connect(&addr).await.unwrap();

        let err = client.call("nope", vec![]).await.unwrap_err();
        assert_eq!(
            err.remote_kind(),
            Some(RemoteErrorKind::MethodNotFound)
        );

        let ok = client.call("isActive", vec![Value::from("unused")]).await.unwrap();
        assert_eq!(ok, Value::Bool(true));
        handle.shutdown();
    }

    #[tokio::test]
    async fn large_arrays_travel_through_staging() {
        let dir = tempfile::tempdir().unwrap();
        let staging = StagingArea::new(dir.path(), 64);
        let (addr, handle, _task) = start(staging.clone()).await;
        let mut client = RpcClient::connect(&addr)
            .await
            .unwrap()
            .with_staging(StagingArea::new(dir.path(), 64));

        let big = Dataset::new(
            vec![4, 8],
            ArrayData::Float64((0..32).map(f64::from).collect()),
        )
        .unwrap();
        let result = client
            .call("echo", vec![Value::from(big.clone())])
            .await
            .unwrap();
        assert_eq!(result, Value::from(vec![Value::from(big)]));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
        handle.shutdown();
    }

    #[tokio::test]
    async fn connect_when_active_finds_running_server() {
        let (addr, handle, _task) = start(StagingArea::default()).await;
        let mut client = RpcClient::connect_when_active(&addr, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(client.call("echo", vec![]).await.unwrap(), Value::List(vec![]));
        handle.shutdown();
    }

    #[tokio::test]
    async fn connect_when_active_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let err = RpcClient::connect_when_active(&addr, Duration::from_millis(250))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Timeout { .. }));
    }

    #[tokio::test]
    async fn connect_with_uses_configured_port_and_staging() {
        let dir = tempfile::tempdir().unwrap();
        let (addr, handle, _task) = start(StagingArea::new(dir.path(), 64)).await;
        let port: u16 = addr.rsplit(':').next().unwrap().parse().unwrap();

        let mut settings = Settings::default();
        settings.set_remote_port(port);
        settings.staging_dir = dir.path().to_path_buf();
        settings.staging_threshold = 64;

        let mut client = RpcClient::connect_with(&settings).await.unwrap();
        assert_eq!(client.addr(), addr);
        assert_eq!(client.staging().dir(), dir.path());
        assert_eq!(client.staging().threshold(), 64);

        let big = Dataset::from((0..32).map(f64::from).collect::<Vec<_>>());
        let result = client
            .call("echo", vec![Value::from(big.clone())])
            .await
            .unwrap();
        assert_eq!(result, Value::from(vec![Value::from(big)]));
        handle.shutdown();
    }

    #[tokio::test]
    async fn connect_with_honours_connect_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut settings = Settings::default();
        settings.set_remote_port(port);
        settings.connect_timeout = Duration::from_millis(250);

        let started = std::time::Instant::now();
        let err = RpcClient::connect_with(&settings).await.err().unwrap();
        match err {
            RpcError::Timeout { addr, waited } => {
                assert_eq!(addr, format!("127.0.0.1:{port}"));
                assert!(waited >= Duration::from_millis(250));
            }
            other => panic!("expected timeout, got {other}"),
        }
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    struct Nap(Duration);

    #[async_trait]
    impl Handler for Nap {
        async fn call(&self, _args: Vec<Value>, _ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
            tokio::time::sleep(self.0).await;
            Ok(Value::from("rested"))
        }
    }

    #[tokio::test]
    async fn interrupted_call_leaves_client_closed() {
        let server = RpcServer::bind_addr("127.0.0.1:0", StagingArea::default())
            .await
            .unwrap();
        server.add_handler("echo", handler_fn(|args| Ok(Value::List(args))));
        server.add_handler("nap", Nap(Duration::from_millis(200)));
        let addr = server.local_addr().unwrap().to_string();
        let handle = server.shutdown_handle();
        tokio::spawn(server.serve());

        let mut client = RpcClient::connect(&addr).await.unwrap();
        let interrupted =
            tokio::time::timeout(Duration::from_millis(50), client.call("nap", vec![])).await;
        assert!(interrupted.is_err());
        assert!(!client.is_usable());

        // The stale "nap" response must never be taken as an answer.
        for _ in 0..3 {
            let err = client.call("echo", vec![Value::from(1)]).await.unwrap_err();
            assert!(matches!(err, RpcError::Closed), "got {err}");
        }

        let mut fresh = RpcClient::connect(&addr).await.unwrap();
        let result = fresh.call("echo", vec![Value::from(1)]).await.unwrap();
        assert_eq!(result, Value::List(vec![Value::from(1)]));
        assert!(fresh.is_usable());
        handle.shutdown();
    }

    #[tokio::test]
    async fn shutdown_stops_serve_loop() {
        let (_addr, handle, task) = start(StagingArea::default()).await;
        handle.shutdown();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    struct Slow {
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for Slow {
        async fn call(&self, _args: Vec<Value>, _ctx: &CallContext<'_>) -> Result<Value, HandlerError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn handlers_run_one_at_a_time_across_connections() {
        let server = RpcServer::bind_addr("127.0.0.1:0", StagingArea::default())
            .await
            .unwrap();
        let max_seen = Arc::new(AtomicUsize::new(0));
        server.add_handler(
            "slow",
            Slow {
                in_flight: Arc::new(AtomicUsize::new(0)),
                max_seen: Arc::clone(&max_seen),
            },
        );
        let addr = server.local_addr().unwrap().to_string();
        let handle = server.shutdown_handle();
        tokio::spawn(server.serve());

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let addr = addr.clone();
            tasks.push(tokio::spawn(async move {
                let mut client = RpcClient::connect(&addr).await.unwrap();
                for _ in 0..3 {
                    client.call("slow", vec![]).await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        handle.shutdown();
    }
}

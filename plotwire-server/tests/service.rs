//! Launches the real `plotwire-rpc` binary and drives it over RPC.

use std::time::Duration;

use plotwire::rpc::builtins::{IS_ACTIVE, VERSION};
use plotwire::rpc::service::RpcService;
use plotwire::{Settings, Value};

const BINARY: &str = env!("CARGO_BIN_EXE_plotwire-rpc");

fn settings(staging: &tempfile::TempDir) -> Settings {
    let mut settings = Settings::default();
    settings.staging_dir = staging.path().to_path_buf();
    settings.connect_timeout = Duration::from_secs(10);
    settings
}

// One test, so parallel runs never race for the same free port.
#[tokio::test]
async fn spawned_servers_answer_and_stop() {
    let staging = tempfile::tempdir().unwrap();
    let settings = settings(&staging);

    let mut first = RpcService::spawn(BINARY, &settings).await.unwrap();
    assert!(first.port() >= settings.remote_port());
    assert!(first.is_running());

    let active = first
        .client()
        .call(IS_ACTIVE, vec![Value::from("unused")])
        .await
        .unwrap();
    assert_eq!(active, Value::Bool(true));

    let version = first.client().call(VERSION, vec![]).await.unwrap();
    assert!(version.as_map().is_some(), "unexpected version reply: {version:?}");

    // Starting at a taken port moves on to the next free one.
    let mut pinned = settings.clone();
    pinned.set_remote_port(first.port());
    let mut second = RpcService::spawn(BINARY, &pinned).await.unwrap();
    assert!(second.port() > first.port());

    second.stop().await.unwrap();
    assert!(!second.is_running());
    first.stop().await.unwrap();
    assert!(!first.is_running());
}

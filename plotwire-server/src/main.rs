use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use plotwire::Settings;
use plotwire::rpc::builtins;
use plotwire::rpc::server::RpcServer;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

struct Args {
    port: u16,
    host: Option<String>,
    staging_dir: Option<PathBuf>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("Usage: plotwire-rpc <port> [--host <addr>] [--staging-dir <dir>]");
            eprintln!();
            eprintln!("Arguments:");
            eprintln!("  <port>                Port to listen on (0 selects 8613)");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --host <addr>         Address to bind [default: PLOTWIRE_HOST or 127.0.0.1]");
            eprintln!("  --staging-dir <dir>   Directory for staged arrays [default: PLOTWIRE_STAGING_DIR or the temp dir]");
            process::exit(2);
        }
    };

    init_tracing();

    if let Err(e) = run(args) {
        tracing::error!(error = %e, "plotwire-rpc failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut port: Option<u16> = None;
    let mut host = None;
    let mut staging_dir = None;

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                host = Some(args.get(i).ok_or("--host requires a value")?.clone());
            }
            "--staging-dir" => {
                i += 1;
                staging_dir = Some(PathBuf::from(
                    args.get(i).ok_or("--staging-dir requires a value")?,
                ));
            }
            "--help" | "-h" => return Err(String::new()),
            arg if arg.starts_with('-') => return Err(format!("unknown flag: {arg}")),
            arg => {
                if port.is_some() {
                    return Err(format!("unexpected argument: {arg}"));
                }
                port = Some(
                    arg.parse()
                        .map_err(|_| format!("invalid port '{arg}'"))?,
                );
            }
        }
        i += 1;
    }

    let port = port.ok_or("missing required argument: <port>")?;
    Ok(Args {
        port,
        host,
        staging_dir,
    })
}

/// `RUST_LOG` wins; otherwise `PLOTWIRE_LOG` picks the level for our crates.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("PLOTWIRE_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };
        EnvFilter::new(format!("plotwire={level},plotwire_rpc={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let mut settings = Settings::from_env();
    settings.set_remote_port(args.port);
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(dir) = args.staging_dir {
        settings.staging_dir = dir;
    }
    tracing::debug!(?settings, "Resolved settings");

    let runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    runtime.block_on(serve(settings))
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let server = RpcServer::bind(settings.server_config())
        .await
        .with_context(|| format!("failed to bind {}", settings.remote_addr()))?;

    builtins::install(
        server.registry(),
        Arc::new(builtins::default_catalog()),
        settings.registration_gate(),
    );

    server.serve_until_signal().await.context("RPC server failed")
}

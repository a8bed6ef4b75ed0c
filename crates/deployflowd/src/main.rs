//! deployflowd — the DeployFlow daemon.
//!
//! Single binary that assembles the platform:
//! - Record store (redb)
//! - Docker runtime gateway
//! - Deployment orchestrator
//! - Management API
//! - Subdomain reverse proxy
//!
//! # Usage
//!
//! ```text
//! deployflowd serve --api-port 8080 --proxy-port 8000 --data-dir /var/lib/deployflow
//! ```

mod config;

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use deployflow_orchestrator::Orchestrator;
use deployflow_runtime::{DockerGateway, RuntimeGateway};
use deployflow_state::{RecordStore, StateStore};

use crate::config::{ConfigLayer, DaemonConfig, LogFormat};

const DEFAULT_LOG_FILTER: &str = "info,deployflowd=debug,deployflow=debug,tower_http=debug";

#[derive(Parser)]
#[command(name = "deployflowd", about = "DeployFlow daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the management API and the subdomain proxy.
    Serve(ServeArgs),
}

#[derive(Args)]
struct ServeArgs {
    /// TOML file supplying any of the settings below.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Management API port [default: 8080].
    #[arg(long)]
    api_port: Option<u16>,

    /// Proxy port [default: 8000].
    #[arg(long)]
    proxy_port: Option<u16>,

    /// Data directory for persistent state [default: /var/lib/deployflow].
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds a container gets to exit before it is killed [default: 5].
    #[arg(long)]
    stop_grace_secs: Option<u64>,

    /// Log output format [default: text].
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

impl ServeArgs {
    fn overrides(&self) -> ConfigLayer {
        ConfigLayer {
            api_port: self.api_port,
            proxy_port: self.proxy_port,
            data_dir: self.data_dir.clone(),
            stop_grace_secs: self.stop_grace_secs,
            log_format: self.log_format,
        }
    }

    fn resolve(&self) -> anyhow::Result<DaemonConfig> {
        let mut config = DaemonConfig::default();
        if let Some(path) = &self.config {
            let file = ConfigLayer::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?;
            config = config.merge(file);
        }
        Ok(config.merge(self.overrides()))
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let config = args.resolve()?;
            init_tracing(config.log_format);
            serve(config).await
        }
    }
}

async fn serve(config: DaemonConfig) -> anyhow::Result<()> {
    info!("DeployFlow daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create {}", config.data_dir.display()))?;
    let db_path = config.db_path();
    let store: Arc<dyn RecordStore> = Arc::new(StateStore::open(&db_path)?);
    info!(path = ?db_path, "state store opened");

    let docker = DockerGateway::connect()?;
    if let Err(e) = docker.ping().await {
        warn!(error = %e, "container runtime not reachable, deployments will fail until it is");
    } else {
        info!("container runtime connected");
    }
    let runtime: Arc<dyn RuntimeGateway> = Arc::new(docker);

    let orchestrator =
        Orchestrator::new(Arc::clone(&store), runtime).with_stop_grace(config.stop_grace);

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            // Keep the sender alive so the listeners keep running.
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // ── Start listeners ────────────────────────────────────────

    let api_addr = SocketAddr::from(([0, 0, 0, 0], config.api_port));
    let api_listener = TcpListener::bind(api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {api_addr}"))?;
    info!(addr = %api_addr, "management API listening");

    let proxy_addr = SocketAddr::from(([0, 0, 0, 0], config.proxy_port));
    let proxy_listener = TcpListener::bind(proxy_addr)
        .await
        .with_context(|| format!("failed to bind proxy listener on {proxy_addr}"))?;
    info!(addr = %proxy_addr, "proxy listening");

    let api = axum::serve(api_listener, deployflow_api::build_router(orchestrator))
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx.clone()));

    let proxy = axum::serve(
        proxy_listener,
        deployflow_proxy::proxy_router(store)
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(wait_for_shutdown(shutdown_rx));

    let (api_result, proxy_result) = tokio::join!(api.into_future(), proxy.into_future());
    api_result.context("management API server failed")?;
    proxy_result.context("proxy server failed")?;

    info!("DeployFlow daemon stopped");
    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

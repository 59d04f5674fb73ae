mod api;
mod capacity;
mod catalog;
mod cli;
mod config;
mod drivers;
mod engine;
mod error;
mod gate;
mod identity;
mod model;
mod scheduler;
mod store;
mod tickets;
mod uid;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use rustls::pki_types::CertificateDer;
use tracing::{info, warn};

use crate::api::AppState;
use crate::capacity::UsageTracker;
use crate::catalog::Catalog;
use crate::config::{FishConfig, LogFormat};
use crate::drivers::docker_driver::DockerDriver;
use crate::drivers::DriverRegistry;
use crate::engine::{Engine, EngineConfig, ShutdownGroup};
use crate::gate::github::{GithubGateConfig, GithubGateDriver};
use crate::gate::{GateBridge, GateConfig};
use crate::identity::NodeRegistry;
use crate::model::NodeDefinition;
use crate::scheduler::TaskScheduler;
use crate::store::Store;
use crate::tickets::TicketOffice;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.command {
        cli::Command::Version => {
            println!("fish {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        cli::Command::Init { path } => cli::run_init(&path),
        cli::Command::Serve { config: config_path } => {
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("failed to start tokio runtime")?
                .block_on(serve(config_path.as_deref()))
        }
    }
}

/// Loads the leaf certificate's DER bytes, the only thing the core needs
/// from the TLS material — identity is derived from it (§4.2); actual TLS
/// termination is left to a reverse proxy / sidecar, consistent with
/// transport/auth living outside the core's hard path (§1).
fn load_leaf_cert_der(cert_path: &str) -> Result<Vec<u8>> {
    let file = File::open(cert_path).with_context(|| format!("opening {cert_path}"))?;
    let mut reader = BufReader::new(file);
    let certs: Vec<CertificateDer> = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("parsing certificates in {cert_path}"))?;
    let leaf = certs
        .into_iter()
        .next()
        .with_context(|| format!("{cert_path} contains no certificates"))?;
    Ok(leaf.as_ref().to_vec())
}

async fn serve(config_path: Option<&str>) -> Result<()> {
    let _basic_tracing = init_tracing_basic();
    info!("starting fish v{}", env!("CARGO_PKG_VERSION"));

    let config = FishConfig::load(config_path).context("failed to load configuration")?;
    config.validate().context("configuration validation failed")?;

    drop(_basic_tracing);
    init_tracing_from_config(&config);
    info!(address = %config.core.node_address, "configuration loaded");

    std::fs::create_dir_all(
        std::path::Path::new(&config.core.db_path)
            .parent()
            .unwrap_or(std::path::Path::new(".")),
    )
    .ok();

    let store = Arc::new(Store::open(&config.core.db_path).context("failed to open store")?);

    let cert_der = load_leaf_cert_der(&config.core.cert_path)?;
    let identity = Arc::new(
        NodeRegistry::bootstrap(
            store.clone(),
            &config.core.node_name,
            &config.core.node_address,
            &config.core.node_location,
            NodeDefinition {
                host: config.core.node_name.clone(),
                cpu: Vec::new(),
                memory: 0,
                disks: Vec::new(),
                nets: Vec::new(),
            },
            &cert_der,
            config.core.ping_interval,
        )
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to bootstrap node identity")?,
    );
    info!(node = %identity.uid(), name = %config.core.node_name, "node identity established");

    let catalog = Arc::new(Catalog::new(store.clone()));
    let usage = Arc::new(UsageTracker::new());
    let tickets = Arc::new(TicketOffice::new(store.clone(), identity.uid().node_prefix()));

    let mut drivers = DriverRegistry::new();
    if let Some(docker_cfg) = config.drivers.get("docker") {
        let socket = docker_cfg
            .get("socket_path")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let host_cpu = docker_cfg.get("host_cpu").and_then(|v| v.as_u64()).unwrap_or(4) as u32;
        let host_ram = docker_cfg.get("host_ram").and_then(|v| v.as_u64()).unwrap_or(8192) as u32;
        match DockerDriver::connect(socket, host_cpu, host_ram) {
            Ok(driver) => drivers.register(Arc::new(driver)),
            Err(e) => warn!(error = %e, "docker driver unavailable, skipping registration"),
        }
    }
    let drivers = Arc::new(drivers);

    let resources: Vec<_> = store
        .list_raw::<crate::model::ApplicationResource>(crate::model::ObjectKind::ApplicationResource)
        .unwrap_or_default();
    usage.rebuild(&resources, |r| catalog.get(r.label_uid).ok());

    let engine_config = EngineConfig {
        election_window: chrono::Duration::seconds(config.core.election_window as i64),
        retry_cap: config.core.allocation_retry_cap,
        ..EngineConfig::default()
    };
    let engine = Arc::new(Engine::new(
        store.clone(),
        identity.clone(),
        catalog.clone(),
        drivers.clone(),
        usage.clone(),
        tickets.clone(),
        engine_config,
    ));

    let scheduler = Arc::new(TaskScheduler::new(store.clone(), drivers.clone(), identity.uid()));

    let gate_config = GateConfig {
        gate_name: "github".to_string(),
        delivery_valid_interval: chrono::Duration::hours(24),
        default_job_max_lifetime: chrono::Duration::hours(6),
    };
    let gate_bridge = Arc::new(GateBridge::new(
        store.clone(),
        engine.clone(),
        gate_config,
        identity.uid().node_prefix(),
    ));

    let mut gates: HashMap<String, Arc<GithubGateDriver>> = HashMap::new();
    if let Some(github_cfg) = config.gates.get("github") {
        let parsed = GithubGateConfig::from_value(github_cfg).context("invalid [gates.github] config")?;
        let driver = Arc::new(GithubGateDriver::new(
            gate_bridge.clone(),
            catalog.clone(),
            identity.uid(),
            parsed,
        ));
        gates.insert("github".to_string(), driver);
    }

    let shutdown = ShutdownGroup::new();
    identity.spawn_ping_loop(shutdown.clone());
    engine.spawn_background(&shutdown);
    scheduler.spawn(&shutdown);
    gate_bridge
        .clone()
        .spawn_sweeper(&shutdown, std::time::Duration::from_secs(300));
    for driver in gates.values() {
        driver.spawn_poll_loop(&shutdown);
    }

    let app_state = AppState {
        store: store.clone(),
        engine: engine.clone(),
        catalog: catalog.clone(),
        identity: identity.clone(),
        drivers: drivers.clone(),
        usage: usage.clone(),
        tickets: tickets.clone(),
        gate_bridge: gate_bridge.clone(),
        gates: Arc::new(gates),
    };

    let cors_origins: Vec<String> = Vec::new();
    let router = api::build_router(app_state, &cors_origins, std::time::Duration::from_secs(30));

    let addr: std::net::SocketAddr = config
        .core
        .api_address
        .parse()
        .context("invalid core.api_address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!(address = %addr, "fish is ready");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    shutdown.shutdown().await;
    info!("shut down gracefully");
    Ok(())
}

fn init_tracing_basic() -> tracing::subscriber::DefaultGuard {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,fish=debug"));
    let subscriber = fmt().with_env_filter(filter).with_target(true).finish();
    tracing::subscriber::set_default(subscriber)
}

fn init_tracing_from_config(config: &FishConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format {
        LogFormat::Json => {
            let layer = fmt::layer().json().with_target(true).with_thread_ids(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
        LogFormat::Pretty => {
            let layer = fmt::layer().with_target(true);
            tracing_subscriber::registry().with(filter).with(layer).init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => warn!("received ctrl+c, shutting down"),
        _ = terminate => warn!("received sigterm, shutting down"),
    }
}

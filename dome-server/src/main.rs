//! Binary entrypoint: load configuration, connect to Postgres, wire up
//! `AppState` and the ticker subsystem, then serve.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dome_config::ConfigLoader;
use dome_core::mdc::MetadataCache;
use dome_core::outbound::{OutboundConfig, OutboundPool};
use dome_core::placement::PlacementEngine;
use dome_core::queue::{ColumnLimits, GenericPriorityQueue};
use dome_core::ra::RelationalAdapter;
use dome_core::status::Status;
use dome_core::task::TaskExecutor;
use dome_server::state::AppState;
use dome_server::ticker::{run_queue_ticker, run_slow_ticker, TaskCallbackBridge};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "dome-server")]
#[command(about = "Grid-storage coordination daemon: head/disk HTTP surface")]
struct Args {
    /// Path to the TOML config file (overrides DOME_CONFIG).
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dome_server=info,dome_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let mut loader = ConfigLoader::new();
    if let Some(path) = args.config {
        loader = loader.with_config_path(path);
    }
    let config = loader.load()?;
    let config = Arc::new(config);
    info!(role = ?config.glb.role, hostname = %config.glb.hostname, "configuration loaded");

    let ra = RelationalAdapter::connect(
        &config.head.db.connection_url(),
        config.head.db.poolsz,
    )
    .await?;
    ra.migrate().await?;
    info!("database connected and migrated");

    let status = Status::new(config.glb.hostname.clone());
    status.reload_fs_and_quotas(&ra).await?;

    let mdc = Arc::new(MetadataCache::new(
        config.mdcache.itemttl,
        config.mdcache.itemmaxttl,
        config.mdcache.itemttl_negative,
        config.mdcache.maxitems,
    ));
    let placement = Arc::new(PlacementEngine::new(config.glb.put.minfreespace_mb));

    let checksum_queue = Arc::new(GenericPriorityQueue::new(
        ColumnLimits(vec![
            Some(config.head.checksum.maxtotal),
            Some(config.head.checksum.maxpernode),
        ]),
        config.head.checksum.qtmout,
    ));
    let pull_queue = Arc::new(GenericPriorityQueue::new(
        ColumnLimits(vec![
            Some(config.head.filepulls.maxtotal),
            Some(config.head.filepulls.maxpernode),
        ]),
        config.head.filepulls.qtmout,
    ));

    let outbound = Arc::new(OutboundPool::new(&outbound_config(&config))?);

    let bridge = TaskCallbackBridge::new();
    let tasks = TaskExecutor::new(
        config.glb.task.maxrunningtime.as_secs() as i64,
        config.glb.task.purgetime.as_secs() as i64,
        16 * 1024 * 1024,
        bridge.clone(),
    );

    let state = AppState {
        config: config.clone(),
        ra,
        status,
        mdc,
        placement,
        checksum_queue,
        pull_queue,
        tasks,
        outbound,
        pending_checksums: Default::default(),
        pending_pulls: Default::default(),
        checksum_namekey_tasks: Default::default(),
        pull_namekey_tasks: Default::default(),
        checksum_context: Default::default(),
        pull_context: Default::default(),
        shutdown: CancellationToken::new(),
    };
    bridge.bind(state.clone());

    tokio::spawn(run_slow_ticker(state.clone(), state.shutdown.clone()));
    tokio::spawn(run_queue_ticker(state.clone(), state.shutdown.clone()));

    let app = dome_server::build_router(state.clone());
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.glb.fcgi.listenport));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "dome-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.shutdown.clone()))
        .await?;

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    shutdown.cancel();
}

fn outbound_config(config: &dome_config::Config) -> OutboundConfig {
    let rc = &config.glb.restclient;
    let client_identity_pem = match (&rc.cli_certificate, &rc.cli_private_key) {
        (Some(cert), Some(key)) => {
            let mut pem = std::fs::read(cert).unwrap_or_default();
            pem.extend(std::fs::read(key).unwrap_or_default());
            Some(pem)
        }
        _ => None,
    };
    let extra_root_certs_pem = rc
        .ca_path
        .as_ref()
        .map(|p| vec![std::fs::read(p).unwrap_or_default()])
        .unwrap_or_default();
    OutboundConfig {
        connect_timeout: rc.conn_timeout,
        request_timeout: rc.ops_timeout,
        client_identity_pem,
        extra_root_certs_pem,
        danger_accept_invalid_certs: !rc.ssl_check,
    }
}

use std::sync::Arc;

use anyhow::Result;
use dome_config::NodeRole;
use dome_core::mdc::MetadataCache;
use dome_core::model::PoolType;
use dome_core::outbound::{OutboundConfig, OutboundPool};
use dome_core::placement::PlacementEngine;
use dome_core::queue::{ColumnLimits, GenericPriorityQueue};
use dome_core::ra::RelationalAdapter;
use dome_core::status::Status;
use dome_core::task::TaskExecutor;
use dome_server::state::AppState;
use dome_server::ticker::TaskCallbackBridge;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// Client DN every test request authenticates as; whitelisted below so
/// requests clear the additive authorization gate without needing a
/// real known-server hostname.
pub const TEST_CLIENT_DN: &str = "/O=Test/CN=integration-test-client";

pub struct TestApp {
    pub router: axum::Router,
    pub state: AppState,
}

/// Wires up an `AppState` the way `main.rs` does, minus the network
/// listener and tickers: tests drive handlers through the router
/// directly and advance time/queues explicitly where needed.
pub async fn build_test_app(pool: PgPool, role: NodeRole) -> Result<TestApp> {
    let mut file_config = dome_config::defaults_for_role(role);
    file_config.glb.auth.authorize_dn.push(TEST_CLIENT_DN.to_string());
    let config = Arc::new(file_config);
    let ra = RelationalAdapter::from_pool(pool);

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
        ColumnLimits(vec![Some(config.head.checksum.maxtotal), Some(config.head.checksum.maxpernode)]),
        config.head.checksum.qtmout,
    ));
    let pull_queue = Arc::new(GenericPriorityQueue::new(
        ColumnLimits(vec![Some(config.head.filepulls.maxtotal), Some(config.head.filepulls.maxpernode)]),
        config.head.filepulls.qtmout,
    ));

    let outbound = Arc::new(OutboundPool::new(&OutboundConfig::default())?);

    let bridge = TaskCallbackBridge::new();
    let tasks = TaskExecutor::new(
        config.glb.task.maxrunningtime.as_secs() as i64,
        config.glb.task.purgetime.as_secs() as i64,
        16 * 1024 * 1024,
        bridge.clone(),
    );

    let state = AppState {
        config,
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

    let router = dome_server::build_router(state.clone());
    Ok(TestApp { router, state })
}

/// Seeds a single-filesystem pool in the catalog. Does not reload or
/// mark it online; call [`reload_and_activate`] once all catalog
/// seeding (filesystems, quota tokens) is done.
pub async fn seed_filesystem(
    state: &AppState,
    poolname: &str,
    pooltype: PoolType,
    server: &str,
    fs: &str,
    freespace: i64,
    physicalsize: i64,
) -> Result<()> {
    state.ra.add_pool(poolname, 0, pooltype).await?;
    state.ra.add_fs_to_pool(server, fs, poolname).await?;
    state.ra.update_fs_space(server, fs, freespace, physicalsize).await?;
    Ok(())
}

/// Reloads `Status` from the catalog, then marks every filesystem it
/// now knows about `Online` — the slow ticker's real-world equivalent
/// of a successful `dome_getspaceinfo` probe against each disk server.
pub async fn reload_and_activate(state: &AppState) -> Result<()> {
    state.status.reload_fs_and_quotas(&state.ra).await?;
    for fs in state.status.filesystems() {
        state.status.update_filesystem_space(&fs.server, &fs.fs, fs.freespace, fs.physicalsize, true);
    }
    Ok(())
}

//! `dome_delreplica`/`dome_makespace` against an unreachable peer
//! daemon: both forward to another node before touching local state,
//! so with no peer listening they fail without mutating the catalog or
//! filesystem, per the "no DB rollback beyond the failed forward"
//! design this crate inherited from the original's delete path.

use std::net::SocketAddr;

use anyhow::Result;
use axum_test::TestServer;
use dome_config::NodeRole;
use dome_core::model::{PoolType, ReplicaType};
use serde_json::json;
use sqlx::PgPool;

#[path = "support/mod.rs"]
mod support;
use support::{build_test_app, reload_and_activate, seed_filesystem, TEST_CLIENT_DN};

fn server(router: axum::Router) -> TestServer {
    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();
    TestServer::builder()
        .http_transport()
        .build(make_service)
        .expect("test server builds")
}

#[sqlx::test(migrator = "dome_core::MIGRATOR")]
async fn delreplica_leaves_catalog_untouched_when_disk_peer_is_unreachable(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Head).await?;
    seed_filesystem(&app.state, "poolA", PoolType::Permanent, "unreachable-disk.invalid", "/srv/fs1", 10_000_000, 20_000_000).await?;
    reload_and_activate(&app.state).await?;

    let root = app.state.ra.get_stat_by_lfn("/").await?;
    let dir = app.state.ra.mkdir_p(root.fileid, "/dpm/example.org/home/vo1", 0o775, 0, 0).await?;
    let file = app.state.ra.createfile(dir.fileid, "file1", 0o664, 0, 0).await?;
    app.state
        .ra
        .add_replica(file.fileid, "unreachable-disk.invalid", "/srv/fs1/vo1/2026-07-28/file1.1.1000", "poolA", "/srv/fs1", "", ReplicaType::Permanent)
        .await?;

    let srv = server(app.router);
    let del = srv
        .post("/")
        .add_header("cmd", "dome_delreplica")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "server": "unreachable-disk.invalid", "pfn": "/srv/fs1/vo1/2026-07-28/file1.1.1000" }))
        .await;
    del.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);

    let replicas = app.state.ra.get_replicas(file.fileid).await?;
    assert_eq!(replicas.len(), 1, "catalog must be untouched when the forward to the disk peer fails");
    Ok(())
}

#[sqlx::test(migrator = "dome_core::MIGRATOR")]
async fn makespace_rejects_a_non_positive_target(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Disk).await?;
    let srv = server(app.router);
    let resp = srv
        .post("/")
        .add_header("cmd", "dome_makespace")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "fs": "/srv/fs1", "vo": "vo1", "size": 0 }))
        .await;
    resp.assert_status(axum::http::StatusCode::BAD_REQUEST);
    Ok(())
}

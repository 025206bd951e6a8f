//! `dome_chksum` enqueue-on-request, and the `dome_get` → volatile-pull
//! → `dome_pullstatus` finalization path.

use std::net::SocketAddr;

use anyhow::Result;
use axum_test::TestServer;
use dome_config::NodeRole;
use dome_core::model::{PoolType, QuotaToken, ReplicaType};
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
async fn chksum_enqueues_when_no_cached_value_matches(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Head).await?;
    seed_filesystem(&app.state, "poolA", PoolType::Permanent, "disk1.example.org", "/srv/fs1", 10_000_000, 20_000_000).await?;
    reload_and_activate(&app.state).await?;

    let root = app.state.ra.get_stat_by_lfn("/").await?;
    let dir = app.state.ra.mkdir_p(root.fileid, "/dpm/example.org/home/vo1", 0o775, 0, 0).await?;
    let file = app.state.ra.createfile(dir.fileid, "file1", 0o664, 0, 0).await?;
    let replica = app
        .state
        .ra
        .add_replica(file.fileid, "disk1.example.org", "/srv/fs1/vo1/2026-07-28/file1.1.1000", "poolA", "/srv/fs1", "", ReplicaType::Permanent)
        .await?;
    app.state
        .ra
        .update_replica(replica.replicaid, dome_core::model::ReplicaStatus::Available, None, None)
        .await?;

    let srv = server(app.router);
    let resp = srv
        .get("/")
        .add_header("cmd", "dome_chksum")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "lfn": "/dpm/example.org/home/vo1/file1", "checksum-type": "MD5" }))
        .await;
    resp.assert_status(axum::http::StatusCode::ACCEPTED);
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "enqueued");
    assert_eq!(app.state.checksum_queue.len(), 1);
    Ok(())
}

#[sqlx::test(migrator = "dome_core::MIGRATOR")]
async fn get_with_no_replica_enqueues_a_volatile_pull_then_pullstatus_finalizes(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Head).await?;
    seed_filesystem(&app.state, "poolV", PoolType::Volatile, "disk2.example.org", "/srv/vfs1", 10_000_000, 20_000_000).await?;
    app.state
        .ra
        .set_quota_token(&QuotaToken {
            s_token: "tok-vo2".into(),
            u_token: "vo2".into(),
            poolname: "poolV".into(),
            path: "/dpm/example.org/home/vo2".into(),
            t_space: 1_000_000_000,
            u_space: 0,
            groupsforwrite: vec![],
            s_uid: 0,
            s_gid: 0,
        })
        .await?;
    reload_and_activate(&app.state).await?;

    let root = app.state.ra.get_stat_by_lfn("/").await?;
    let dir = app.state.ra.mkdir_p(root.fileid, "/dpm/example.org/home/vo2", 0o775, 0, 0).await?;
    app.state.ra.createfile(dir.fileid, "file2", 0o664, 0, 0).await?;

    let srv = server(app.router);
    let get = srv
        .get("/")
        .add_header("cmd", "dome_get")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "lfn": "/dpm/example.org/home/vo2/file2" }))
        .await;
    get.assert_status(axum::http::StatusCode::ACCEPTED);
    let get_body: serde_json::Value = get.json();
    let rfn = get_body["rfn"].as_str().expect("rfn present").to_string();
    let (rserver, rpfn) = dome_core::model::Replica::parse_rfn(&rfn).expect("well-formed rfn");

    let pullstatus = srv
        .post("/")
        .add_header("cmd", "dome_pullstatus")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({
            "server": rserver,
            "pfn": rpfn,
            "status": "done",
            "filesize": 2048,
            "checksumtype": "MD5",
            "checksumvalue": "deadbeef",
        }))
        .await;
    pullstatus.assert_status_ok();
    let pullstatus_body: serde_json::Value = pullstatus.json();
    assert_eq!(pullstatus_body["status"], "finalized");

    let stat = app.state.ra.get_stat_by_lfn("/dpm/example.org/home/vo2/file2").await?;
    assert_eq!(stat.size, 2048);
    Ok(())
}

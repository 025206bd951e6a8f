//! End-to-end `dome_put` → `dome_putdone` happy path on the head role:
//! negotiate placement with no hints under a permissive quota token,
//! then finalize with an explicit size.

use std::net::SocketAddr;

use anyhow::Result;
use axum_test::TestServer;
use dome_config::NodeRole;
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
async fn put_then_putdone_finalizes_a_replica(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Head).await?;
    seed_filesystem(&app.state, "poolA", dome_core::model::PoolType::Permanent, "disk1.example.org", "/srv/fs1", 10_000_000, 20_000_000).await?;
    app.state.ra.set_quota_token(&dome_core::model::QuotaToken {
        s_token: "tok-vo1".into(),
        u_token: "vo1".into(),
        poolname: "poolA".into(),
        path: "/dpm/example.org/home/vo1".into(),
        t_space: 1_000_000_000,
        u_space: 0,
        groupsforwrite: vec![],
        s_uid: 0,
        s_gid: 0,
    }).await?;
    reload_and_activate(&app.state).await?;

    let srv = server(app.router);

    let put = srv
        .post("/")
        .add_header("cmd", "dome_put")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "lfn": "/dpm/example.org/home/vo1/file1" }))
        .await;
    put.assert_status_ok();
    let put_body: serde_json::Value = put.json();
    assert_eq!(put_body["host"], "disk1.example.org");
    let pfn = put_body["pfn"].as_str().expect("pfn present").to_string();

    let putdone = srv
        .post("/")
        .add_header("cmd", "dome_putdone")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "server": "disk1.example.org", "pfn": pfn, "size": 4096 }))
        .await;
    putdone.assert_status_ok();
    let putdone_body: serde_json::Value = putdone.json();
    assert_eq!(putdone_body["status"], "finalized");
    assert_eq!(putdone_body["size"], 4096);

    let stat = app.state.ra.get_stat_by_lfn("/dpm/example.org/home/vo1/file1").await?;
    assert_eq!(stat.size, 4096);
    Ok(())
}

#[sqlx::test(migrator = "dome_core::MIGRATOR")]
async fn put_honours_group_authorized_quota_token(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Head).await?;
    seed_filesystem(&app.state, "poolA", dome_core::model::PoolType::Permanent, "disk1.example.org", "/srv/fs1", 10_000_000, 20_000_000).await?;
    let group = app.state.ra.new_group("vo1-writers").await?;
    app.state.ra.set_quota_token(&dome_core::model::QuotaToken {
        s_token: "tok-vo1".into(),
        u_token: "vo1".into(),
        poolname: "poolA".into(),
        path: "/dpm/example.org/home/vo1".into(),
        t_space: 1_000_000_000,
        u_space: 0,
        groupsforwrite: vec![group.groupid.0],
        s_uid: 0,
        s_gid: 0,
    }).await?;
    reload_and_activate(&app.state).await?;
    let srv = server(app.router);

    // No group header: the client's gids are empty, so the token's
    // non-empty `groupsforwrite` rejects the write.
    let denied = srv
        .post("/")
        .add_header("cmd", "dome_put")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "lfn": "/dpm/example.org/home/vo1/file1" }))
        .await;
    denied.assert_status(axum::http::StatusCode::BAD_REQUEST);

    // With the group asserted, gid resolution picks it up and the
    // token's group check passes.
    let allowed = srv
        .post("/")
        .add_header("cmd", "dome_put")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .add_header("remoteclientgroups", "vo1-writers")
        .json(&json!({ "lfn": "/dpm/example.org/home/vo1/file1" }))
        .await;
    allowed.assert_status_ok();
    Ok(())
}

#[sqlx::test(migrator = "dome_core::MIGRATOR")]
async fn put_without_hints_requires_a_quota_token(pool: PgPool) -> Result<()> {
    let app = build_test_app(pool, NodeRole::Head).await?;
    seed_filesystem(&app.state, "poolA", dome_core::model::PoolType::Permanent, "disk1.example.org", "/srv/fs1", 10_000_000, 20_000_000).await?;
    reload_and_activate(&app.state).await?;
    let srv = server(app.router);

    let put = srv
        .post("/")
        .add_header("cmd", "dome_put")
        .add_header("remoteclientdn", TEST_CLIENT_DN)
        .json(&json!({ "lfn": "/dpm/example.org/home/unconfigured/file1" }))
        .await;
    put.assert_status(axum::http::StatusCode::BAD_REQUEST);
    Ok(())
}

//! HTTP surface: a single catch-all route dispatching on
//! `(HTTP verb, cmd)`, a worker-permit semaphore layer sized
//! `glb.workers`, and the authorization gate with its `dome_info`
//! exemption.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::{Json, Router};
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::errors::{AppError, AppResult};
use crate::handlers;
use crate::security::{self, RequestIdentity};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let permits = Arc::new(Semaphore::new(state.config.glb.workers.max(1) as usize));
    Router::new()
        .route("/{*path}", any(handle_request))
        .route("/", any(handle_request))
        .layer(middleware::from_fn_with_state(permits, worker_permit_layer))
        .with_state(state)
}

/// Serializes `accept` the way the original's worker pool does
/// (§5): every request waits for a permit before it is handled at
/// all, bounding in-flight work to `glb.workers`.
async fn worker_permit_layer(
    State(permits): State<Arc<Semaphore>>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let _permit = permits.acquire().await.expect("semaphore never closed");
    next.run(request).await
}

async fn handle_request(
    State(state): State<AppState>,
    method: Method,
    identity: RequestIdentity,
    body: Bytes,
) -> Response {
    let body: Value = if body.is_empty() {
        Value::Object(Default::default())
    } else {
        match serde_json::from_slice(&body) {
            Ok(v) => v,
            Err(e) => return AppError::bad_request(format!("invalid JSON body: {e}")).into_response(),
        }
    };

    if identity.cmd == "dome_info" {
        let authorized = security::is_authorized(&state, &identity.client_dn);
        return match handlers::space::info(&state, authorized).await {
            Ok((status, v)) => (status, Json(v)).into_response(),
            Err(e) => e.into_response(),
        };
    }

    if !security::is_authorized(&state, &identity.client_dn) {
        return security::forbidden().into_response();
    }

    // `HEAD` returns a fixed body regardless of `cmd`, per the
    // original's verb-level dispatch (§4.1): it is not routed through
    // the (verb, cmd) table at all.
    if method == Method::HEAD {
        return (StatusCode::OK, "dome-server").into_response();
    }

    let ctx = match security::resolve_security_context(&state, &identity.client_dn, &identity.groups).await {
        Ok(c) => c,
        Err(e) => return e.into_response(),
    };

    match dispatch(&state, &method, &identity.cmd, &ctx, &body).await {
        Ok((status, v)) => (status, Json(v)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// The `(verb, cmd)` dispatch table. Every `dome_*` verb from the wire
/// protocol is matched here; anything unrecognized is a 418, matching
/// the original's "teapot" convention for unknown commands.
async fn dispatch(
    state: &AppState,
    method: &Method,
    cmd: &str,
    ctx: &dome_core::perm::SecurityContext,
    body: &Value,
) -> AppResult<(StatusCode, Value)> {
    use handlers::{catalog, checksum, namespace, placement, pull, replica, space};

    match (method, cmd) {
        (&Method::POST, "dome_put") => placement::put(state, ctx, body).await,
        (&Method::POST, "dome_putdone") if state.config.glb.role == dome_config::NodeRole::Disk => {
            placement::putdone_disk(state, body).await
        }
        (&Method::POST, "dome_putdone") => placement::putdone_head(state, body).await,
        (&Method::POST, "dome_makespace") => placement::makespace(state, body).await,

        (&Method::POST, "dome_pull") => pull::pull(state, body).await,
        (&Method::POST, "dome_pullstatus") => pull::pullstatus(state, body).await,
        (&Method::POST, "dome_dochksum") => checksum::dochksum(state, body).await,
        (&Method::GET, "dome_chksum") => checksum::chksum(state, body).await,
        (&Method::POST, "dome_chksumstatus") => checksum::chksumstatus(state, body).await,

        (&Method::POST, "dome_delreplica") => replica::delreplica(state, body).await,
        (&Method::POST, "dome_pfnrm") => replica::pfnrm(state, body).await,
        (&Method::GET, "dome_getreplicainfo") => replica::getreplicainfo(state, body).await,
        (&Method::GET, "dome_get") => replica::get(state, ctx, body).await,
        (&Method::GET, "dome_statpfn") => replica::statpfn(state, body).await,

        (&Method::POST, "dome_addpool") => catalog::addpool(state, body).await,
        (&Method::POST, "dome_modifypool") => catalog::modifypool(state, body).await,
        (&Method::POST, "dome_rmpool") => catalog::rmpool(state, body).await,
        (&Method::POST, "dome_addfstopool") => catalog::addfstopool(state, body).await,
        (&Method::POST, "dome_modifyfs") => catalog::modifyfs(state, body).await,
        (&Method::POST, "dome_rmfs") => catalog::rmfs(state, body).await,
        (&Method::POST, "dome_setquotatoken") => catalog::setquotatoken(state, body).await,
        (&Method::POST, "dome_modquotatoken") => catalog::modquotatoken(state, body).await,
        (&Method::POST, "dome_delquotatoken") => catalog::delquotatoken(state, body).await,
        (&Method::GET, "dome_getquotatoken") => catalog::getquotatoken(state, body).await,

        (&Method::GET, "dome_getuser") => catalog::getuser(state, body).await,
        (&Method::POST, "dome_newuser") => catalog::newuser(state, body).await,
        (&Method::POST, "dome_deleteuser") => catalog::deleteuser(state, body).await,
        (&Method::POST, "dome_updateuser") => catalog::updateuser(state, body).await,
        (&Method::GET, "dome_getusersvec") => catalog::getusersvec(state).await,
        (&Method::GET, "dome_getgroup") => catalog::getgroup(state, body).await,
        (&Method::POST, "dome_newgroup") => catalog::newgroup(state, body).await,
        (&Method::POST, "dome_deletegroup") => catalog::deletegroup(state, body).await,
        (&Method::POST, "dome_updategroup") => catalog::updategroup(state, body).await,
        (&Method::GET, "dome_getgroupsvec") => catalog::getgroupsvec(state).await,
        (&Method::GET, "dome_getidmap") => catalog::getidmap(state, body).await,

        (&Method::GET, "dome_getstatinfo") => namespace::getstatinfo(state, body).await,
        (&Method::GET, "dome_getdir") => namespace::getdir(state, body).await,
        (&Method::POST, "dome_makedir") => namespace::makedir(state, ctx, body).await,
        (&Method::POST, "dome_removedir") => namespace::removedir(state, ctx, body).await,
        (&Method::POST, "dome_create") => namespace::create(state, ctx, body).await,
        (&Method::POST, "dome_unlink") => namespace::unlink(state, ctx, body).await,
        (&Method::POST, "dome_rename") => namespace::rename(state, ctx, body).await,
        (&Method::GET, "dome_readlink") => namespace::readlink(state, body).await,
        (&Method::POST, "dome_symlink") => namespace::symlink(state, ctx, body).await,
        (&Method::POST, "dome_setacl") => namespace::setacl(state, ctx, body).await,
        (&Method::POST, "dome_setmode") => namespace::setmode(state, ctx, body).await,
        (&Method::POST, "dome_setowner") => namespace::setowner(state, ctx, body).await,
        (&Method::POST, "dome_setsize") => namespace::setsize(state, ctx, body).await,
        (&Method::POST, "dome_updatexattr") => namespace::updatexattr(state, ctx, body).await,
        (&Method::POST, "dome_setcomment") => namespace::setcomment(state, ctx, body).await,
        (&Method::GET, "dome_getcomment") => namespace::getcomment(state, body).await,
        (&Method::GET, "dome_access") => namespace::access(state, ctx, body).await,
        (&Method::GET, "dome_accessreplica") => namespace::accessreplica(state, ctx, body).await,

        (&Method::GET, "dome_getspaceinfo") => space::getspaceinfo(state, body).await,
        (&Method::GET, "dome_statpool") => space::statpool(state, body).await,
        (&Method::GET, "dome_getdirspaces") => space::getdirspaces(state, body).await,

        _ => Err(dome_core::DomeError::UnknownCommand(cmd.to_string()).into()),
    }
}

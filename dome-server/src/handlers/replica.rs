//! Replica lifecycle handlers outside the put/putdone path:
//! `dome_getreplicainfo`, `dome_delreplica`, `dome_pfnrm`, `dome_get`,
//! `dome_statpfn`.

use axum::http::StatusCode;
use dome_core::model::{PendingPull, QueueItemStatus, Replica, ReplicaType};
use dome_core::perm::SecurityContext;
use dome_core::DomeError;
use serde_json::{json, Value};

use crate::body::{opt_str, require_str};
use crate::errors::AppResult;
use crate::state::AppState;

/// Head-side: resolve by `lfn` (returns stat + every replica) or by
/// `server`/`pfn` (returns that one replica plus its owning file's stat).
pub async fn getreplicainfo(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    if let Some(lfn) = opt_str(body, "lfn") {
        let stat = state.ra.get_stat_by_lfn(lfn).await?;
        let replicas = state.ra.get_replicas(stat.fileid).await?;
        return Ok((
            StatusCode::OK,
            json!({
                "stat": serde_json::to_value(&stat).unwrap(),
                "replicas": replicas.iter().map(replica_json).collect::<Vec<_>>(),
            }),
        ));
    }
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let replica = state.ra.get_replica_by_rfn(server, pfn).await?;
    let stat = state.ra.get_stat_by_fileid(replica.fileid).await?;
    Ok((
        StatusCode::OK,
        json!({ "stat": serde_json::to_value(&stat).unwrap(), "replica": replica_json(&replica) }),
    ))
}

fn replica_json(r: &Replica) -> Value {
    let mut v = serde_json::to_value(r).unwrap();
    if let Value::Object(ref mut map) = v {
        map.insert("rfn".into(), json!(r.rfn()));
    }
    v
}

/// Head-side: removes a replica end to end. Forwards `dome_pfnrm` to
/// the owning disk server first; only on success does it touch the
/// catalog, matching the original's "no DB rollback beyond the
/// transaction wrapper" stance on a failed forward.
pub async fn delreplica(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let replica = state.ra.get_replica_by_rfn(server, pfn).await?;
    let stat = state.ra.get_stat_by_fileid(replica.fileid).await?;

    let base = domedisk_base_url(state, server);
    state
        .outbound
        .client()
        .post(format!("{base}/dome_pfnrm"))
        .header("cmd", "dome_pfnrm")
        .json(&json!({ "pfn": pfn }))
        .send()
        .await
        .map_err(DomeError::from)?
        .error_for_status()
        .map_err(DomeError::from)?;

    state.ra.del_replica(replica.replicaid).await?;
    if stat.size > 0 {
        state
            .ra
            .add_filesize_to_dirs(&stat, -stat.size, state.config.glb.dirspacereportdepth)
            .await?;
    }
    let _ = state.ra.addto_quotatoken_uspace(&replica.setname, stat.size).await;

    let remaining = state.ra.get_replicas(stat.fileid).await?;
    if remaining.is_empty() {
        state.ra.unlink(stat.fileid).await?;
        state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    } else {
        state.mdc.wipe_entry(stat.fileid, None);
    }
    Ok((StatusCode::OK, json!({ "status": "deleted" })))
}

/// Disk-side: unlink a physical file (or remove an empty directory)
/// that must fall under a filesystem this server is known to own.
pub async fn pfnrm(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let pfn = require_str(body, "pfn")?;
    let hostname = &state.config.glb.hostname;
    if state.status.pfn_matches_fs(hostname, pfn).is_none() {
        return Err(DomeError::BadRequest(format!("{pfn} is not under a known filesystem")).into());
    }
    let meta = tokio::fs::metadata(pfn).await.map_err(|e| {
        DomeError::NotFound(format!("{pfn}: {e}"))
    })?;
    if meta.is_dir() {
        tokio::fs::remove_dir(pfn).await
    } else {
        tokio::fs::remove_file(pfn).await
    }
    .map_err(|e| DomeError::Internal(format!("failed to remove {pfn}: {e}")))?;
    Ok((StatusCode::OK, json!({ "status": "removed" })))
}

/// Head-side: return available replicas for an LFN; if none exist and
/// a Volatile filesystem can serve a pull, enqueue one and answer 202.
pub async fn get(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    let replicas = state.ra.get_replicas(stat.fileid).await?;
    let available: Vec<&Replica> = replicas
        .iter()
        .filter(|r| r.status == dome_core::model::ReplicaStatus::Available)
        .collect();
    if !available.is_empty() {
        return Ok((
            StatusCode::OK,
            json!({ "replicas": available.iter().map(|r| replica_json(r)).collect::<Vec<_>>() }),
        ));
    }

    let pending: Vec<&Replica> = replicas
        .iter()
        .filter(|r| r.status == dome_core::model::ReplicaStatus::BeingPopulated)
        .collect();
    if !pending.is_empty() {
        return Err(DomeError::Internal(format!("{lfn} has only pending replicas")).into());
    }

    let fs = state
        .status
        .lfn_matches_any_can_pull_fs(lfn)
        .ok_or_else(|| DomeError::NotFound(format!("no replica and no pullable filesystem for {lfn}")))?;

    let putcount = state.status.next_putcount();
    let now = chrono::Utc::now();
    let today = now.format("%Y-%m-%d").to_string();
    let pfn = dome_core::placement::PlacementEngine::build_pfn(&fs.fs, lfn, putcount, now.timestamp(), &today)?;

    let token = state.status.which_quotatoken_for_lfn(lfn);
    let setname = token.map(|t| t.u_token).unwrap_or_default();
    let replica = state
        .ra
        .add_replica(stat.fileid, &fs.server, &pfn, &fs.poolname, &fs.fs, &setname, ReplicaType::Volatile)
        .await?;

    let namekey = replica.rfn();
    let neededspace = stat.size.max(0);
    state.pull_queue.touch_item_or_create_new(
        &namekey,
        QueueItemStatus::Waiting,
        0,
        vec![String::new(), fs.server.clone()],
    );
    state.pull_context.insert(
        namekey,
        PendingPull {
            task_key: 0,
            lfn: lfn.to_string(),
            server: fs.server.clone(),
            pfn: replica.pfn.clone(),
            neededspace,
        },
    );
    state.status.notify_queues();
    let _ = ctx;
    Ok((
        StatusCode::ACCEPTED,
        json!({ "status": "pull-enqueued", "rfn": replica.rfn() }),
    ))
}

/// Disk-side: stat a pfn. `requirefs` (default true) rejects pfns that
/// don't live under a filesystem this server owns.
pub async fn statpfn(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let pfn = require_str(body, "pfn")?;
    let requirefs = body.get("requirefs").and_then(Value::as_bool).unwrap_or(true);
    if requirefs && state.status.pfn_matches_fs(&state.config.glb.hostname, pfn).is_none() {
        return Err(DomeError::BadRequest(format!("{pfn} is not under a known filesystem")).into());
    }
    let meta = tokio::fs::metadata(pfn)
        .await
        .map_err(|e| DomeError::NotFound(format!("{pfn}: {e}")))?;
    Ok((
        StatusCode::OK,
        json!({
            "size": meta.len(),
            "isdir": meta.is_dir(),
        }),
    ))
}

/// Builds the base URL for a disk server's `dome_*` endpoints.
/// Grounded on the original's `https://<host>/domedisk/` convention,
/// kept consistent with the reachability probe used in `addfstopool`.
pub fn domedisk_base_url(state: &AppState, server: &str) -> String {
    let _ = state;
    format!("https://{server}/domedisk")
}

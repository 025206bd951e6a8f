//! Volatile-pull lifecycle handlers: `dome_pull` (disk, invokes the
//! pull hook) and `dome_pullstatus` (head, disk-to-head result
//! callback). Enqueueing happens in `handlers::replica::get`
//! (`dome_get`), which already owns the placement/replica-creation
//! logic for the pull path.

use axum::http::StatusCode;
use dome_core::model::{PendingPull, ReplicaStatus};
use dome_core::DomeError;
use serde_json::{json, Value};

use crate::body::{opt_i64, opt_str, require_str};
use crate::errors::AppResult;
use crate::state::AppState;

/// Disk-side: spawn the configured pull hook for `(lfn, pfn,
/// neededspace)`, recording the job so the task-completion callback
/// knows where to report the result.
pub async fn pull(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let pfn = require_str(body, "pfn")?;
    let neededspace = opt_i64(body, "neededspace").unwrap_or(0);
    let hostname = &state.config.glb.hostname;
    if state.status.pfn_matches_fs(hostname, pfn).is_none() {
        return Err(DomeError::BadRequest(format!("{pfn} is not under a known filesystem")).into());
    }
    let pullhook = state
        .config
        .disk
        .filepuller
        .pullhook
        .as_deref()
        .ok_or_else(|| DomeError::Internal("disk.filepuller.pullhook is not configured".into()))?;

    let task_key = state.tasks.submit_cmd(vec![
        pullhook.to_string(),
        lfn.to_string(),
        pfn.to_string(),
        neededspace.to_string(),
    ]);
    state.pending_pulls.insert(
        task_key,
        PendingPull {
            task_key,
            lfn: lfn.to_string(),
            server: hostname.clone(),
            pfn: pfn.to_string(),
            neededspace,
        },
    );
    Ok((StatusCode::OK, json!({ "status": "started", "key": task_key })))
}

/// Head-side: finalize a pull exactly like `putdone_head`, requiring
/// the replica still be `BeingPopulated`.
pub async fn pullstatus(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let status = opt_str(body, "status").unwrap_or("error");
    let filesize = opt_i64(body, "filesize").unwrap_or(0);
    let checksumtype = opt_str(body, "checksumtype");
    let checksumvalue = opt_str(body, "checksumvalue");

    let replica = state.ra.get_replica_by_rfn(server, pfn).await?;
    if replica.status != ReplicaStatus::BeingPopulated {
        return Err(DomeError::Unprocessable(format!(
            "replica {server}:{pfn} is not BeingPopulated (already finalized?)"
        ))
        .into());
    }

    if status != "done" {
        tracing::warn!(server, pfn, "pull job reported failure");
        return Err(DomeError::Unprocessable(format!("pull of {server}:{pfn} failed")).into());
    }

    state
        .ra
        .update_replica(replica.replicaid, ReplicaStatus::Available, checksumtype, checksumvalue)
        .await?;
    if let (Some(t), Some(v)) = (checksumtype, checksumvalue) {
        state.ra.set_checksum(replica.fileid, t, v).await?;
    }
    state.ra.set_size(replica.fileid, filesize).await?;
    let stat = state.ra.get_stat_by_fileid(replica.fileid).await?;
    state
        .ra
        .add_filesize_to_dirs(&stat, filesize, state.config.glb.dirspacereportdepth)
        .await?;
    let _ = state.ra.addto_quotatoken_uspace(&replica.setname, -filesize).await;
    state.mdc.wipe_entry(replica.fileid, None);

    let namekey = replica.rfn();
    state.pull_namekey_tasks.lock().remove(&namekey);
    state.pull_queue.finish(&namekey);

    Ok((StatusCode::OK, json!({ "status": "finalized", "size": filesize })))
}

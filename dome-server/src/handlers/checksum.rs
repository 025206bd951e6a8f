//! Checksum lifecycle handlers: `dome_chksum` (head, query-or-enqueue),
//! `dome_dochksum` (disk, spawns the checksum binary), and
//! `dome_chksumstatus` (head, disk-to-head result callback).

use axum::http::StatusCode;
use dome_core::model::{PendingChecksum, QueueItemStatus};
use dome_core::DomeError;
use serde_json::{json, Value};

use crate::body::{opt_str, require_str};
use crate::errors::AppResult;
use crate::state::AppState;

fn namekey(server: &str, pfn: &str, checksum_type: &str) -> String {
    format!("chksum:{server}:{pfn}:{checksum_type}")
}

/// Head-side: resolve the target replica (`rfn`/`server`+`pfn`, or the
/// most recently touched `Available` replica of `lfn`), return its
/// cached checksum if it already matches the requested type, otherwise
/// enqueue a checksum job and return 202.
pub async fn chksum(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let checksum_type = require_str(body, "checksum-type")?;
    let lfn = opt_str(body, "lfn").map(str::to_string);

    let (server, pfn) = if let (Some(server), Some(pfn)) = (opt_str(body, "server"), opt_str(body, "pfn")) {
        (server.to_string(), pfn.to_string())
    } else {
        let lfn = lfn.as_deref().ok_or_else(|| DomeError::BadRequest("lfn or server+pfn required".into()))?;
        let stat = state.ra.get_stat_by_lfn(lfn).await?;
        let replicas = state.ra.get_replicas(stat.fileid).await?;
        let replica = replicas
            .iter()
            .find(|r| r.status == dome_core::model::ReplicaStatus::Available)
            .ok_or_else(|| DomeError::NotFound(format!("no available replica for {lfn}")))?;
        (replica.server.clone(), replica.pfn.clone())
    };

    let replica = state.ra.get_replica_by_rfn(&server, &pfn).await?;
    if replica.checksum_type.as_deref() == Some(checksum_type) {
        if let Some(value) = &replica.checksum_value {
            return Ok((StatusCode::OK, json!({ "checksum": value, "checksum-type": checksum_type })));
        }
    }

    let key = namekey(&server, &pfn, checksum_type);
    state.checksum_context.insert(
        key.clone(),
        PendingChecksum {
            task_key: 0,
            lfn: lfn.clone(),
            server: server.clone(),
            pfn: pfn.clone(),
            checksum_type: checksum_type.to_string(),
            update_lfn_checksum: lfn.is_some(),
        },
    );
    state
        .checksum_queue
        .touch_item_or_create_new(&key, QueueItemStatus::Waiting, 0, vec![String::new(), server]);
    state.status.notify_queues();
    Ok((StatusCode::ACCEPTED, json!({ "status": "enqueued" })))
}

/// Disk-side: spawn the configured checksum binary over `pfn`,
/// recording the job so the task-completion callback knows where to
/// report the result.
pub async fn dochksum(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let pfn = require_str(body, "pfn")?;
    let checksumtype = require_str(body, "checksumtype")?;
    let hostname = &state.config.glb.hostname;
    if state.status.pfn_matches_fs(hostname, pfn).is_none() {
        return Err(DomeError::BadRequest(format!("{pfn} is not under a known filesystem")).into());
    }
    let binary = state
        .config
        .disk
        .checksum
        .binary
        .as_deref()
        .ok_or_else(|| DomeError::Internal("disk.checksum.binary is not configured".into()))?;

    let task_key = state
        .tasks
        .submit_cmd(vec![binary.to_string(), checksumtype.to_string(), pfn.to_string()]);
    state.pending_checksums.insert(
        task_key,
        PendingChecksum {
            task_key,
            lfn: None,
            server: hostname.clone(),
            pfn: pfn.to_string(),
            checksum_type: checksumtype.to_string(),
            update_lfn_checksum: false,
        },
    );
    Ok((StatusCode::OK, json!({ "status": "started", "key": task_key })))
}

/// Head-side: disk reports a checksum result. Persists it on the
/// replica and, if the original request carried an `lfn`, also on the
/// file's own checksum attribute, then finishes the queue item.
pub async fn chksumstatus(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let checksum_type = require_str(body, "checksum-type")?;
    let status = opt_str(body, "status").unwrap_or("error");
    let checksum = opt_str(body, "checksum");

    let key = namekey(server, pfn, checksum_type);
    let task_key = state.checksum_namekey_tasks.lock().remove(&key);
    let context = task_key.and_then(|k| state.pending_checksums.remove(&k)).map(|(_, v)| v);

    if status == "done" {
        if let Some(value) = checksum {
            let replica = state.ra.get_replica_by_rfn(server, pfn).await?;
            state
                .ra
                .update_replica(replica.replicaid, replica.status, Some(checksum_type), Some(value))
                .await?;
            if context.map(|c| c.update_lfn_checksum).unwrap_or(false) {
                state.ra.set_checksum(replica.fileid, checksum_type, value).await?;
            }
            state.mdc.wipe_entry(replica.fileid, None);
        }
    } else {
        tracing::warn!(server, pfn, "checksum job reported failure");
    }

    state.checksum_queue.finish(&key);
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

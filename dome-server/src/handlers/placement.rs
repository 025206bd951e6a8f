//! Put-placement handlers: `dome_put`, `dome_putdone` (disk then head
//! side), and `dome_makespace`.

use axum::http::StatusCode;
use dome_core::model::{PoolType, ReplicaStatus, ReplicaType};
use dome_core::perm::{check_permissions, AccessMask, SecurityContext};
use dome_core::placement::{PlacementEngine, PlacementHints};
use dome_core::{DomeError, Result as CoreResult};
use serde_json::{json, Value};

use crate::body::{opt_i64, opt_str, require_str};
use crate::errors::AppResult;
use crate::handlers::replica::domedisk_base_url;
use crate::state::AppState;

/// Head-side: negotiate write placement for `lfn`, returning
/// `{pool, host, filesystem, pfn}` and registering a `BeingPopulated`
/// replica (creating the file entry and its parent directories first,
/// unless this is an additional replica of an existing file).
pub async fn put(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let hints = PlacementHints {
        pool: opt_str(body, "pool").map(str::to_string),
        host: opt_str(body, "host").map(str::to_string),
        fs: opt_str(body, "fs").map(str::to_string),
    };

    let dirname = match lfn.rsplit_once('/') {
        Some((d, _)) if !d.is_empty() => d,
        _ => "/",
    };
    let basename = lfn.rsplit('/').next().unwrap_or(lfn);
    let root = state.ra.get_stat_by_lfn("/").await?;

    let existing = state.ra.get_stat_by_lfn(lfn).await;
    let (file_stat, existing_replica_servers) = match existing {
        Ok(stat) => {
            let parent = state.ra.get_stat_by_fileid(stat.parent_fileid).await?;
            if !check_permissions(ctx, &parent, AccessMask::WRITE) {
                return Err(DomeError::PermissionDenied(format!("cannot write into parent of {lfn}")).into());
            }
            let replicas = state.ra.get_replicas(stat.fileid).await?;
            let servers = replicas.iter().map(|r| r.server.clone()).collect::<Vec<_>>();
            (stat, servers)
        }
        Err(DomeError::NotFound(_)) => {
            let gid = ctx.gids.first().copied().unwrap_or(0);
            let parent = state.ra.mkdir_p(root.fileid, dirname, 0o774, ctx.uid, gid).await?;
            if !check_permissions(ctx, &parent, AccessMask::WRITE) {
                return Err(DomeError::PermissionDenied(format!("cannot write into parent of {lfn}")).into());
            }
            let stat = state.ra.createfile(parent.fileid, basename, 0o664, ctx.uid, gid).await?;
            state.mdc.wipe_entry(parent.fileid, None);
            (stat, Vec::new())
        }
        Err(other) => return Err(other.into()),
    };

    let token = state.status.which_quotatoken_for_lfn(lfn);
    if hints.pool.is_none() && hints.host.is_none() && hints.fs.is_none() {
        // No placement hint given: a quota token must apply to the LFN
        // and the caller's gids must be authorized to write under it.
        let token = token
            .as_ref()
            .ok_or_else(|| DomeError::BadRequest(format!("no quota token applies to {lfn}")))?;
        if !state.status.canwrite_into_quotatoken(&ctx.gids, token) {
            return Err(DomeError::BadRequest(format!("{lfn} is not writable under its quota token")).into());
        }
    } else if let Some(token) = &token {
        if !state.status.canwrite_into_quotatoken(&ctx.gids, token) {
            return Err(DomeError::PermissionDenied(format!("{lfn} is not writable under its quota token")).into());
        }
    }
    let setname = token.map(|t| t.u_token).unwrap_or_default();

    let candidates = state.placement.candidates(&state.status, &hints, &existing_replica_servers)?;
    let picked = state.placement.weighted_pick(&candidates)?;

    let putcount = state.status.next_putcount();
    let now = chrono::Utc::now();
    let today = now.format("%Y-%m-%d").to_string();
    let pfn = PlacementEngine::build_pfn(&picked.fs, lfn, putcount, now.timestamp(), &today)?;

    let rtype = if state
        .status
        .pool(&picked.poolname)
        .map(|p| p.stype == PoolType::Volatile)
        .unwrap_or(false)
    {
        ReplicaType::Volatile
    } else {
        ReplicaType::Permanent
    };

    let replica = state
        .ra
        .add_replica(file_stat.fileid, &picked.server, &pfn, &picked.poolname, &picked.fs, &setname, rtype)
        .await?;
    state.mdc.wipe_entry(file_stat.fileid, None);

    Ok((
        StatusCode::OK,
        json!({
            "pool": picked.poolname,
            "host": picked.server,
            "filesystem": picked.fs,
            "pfn": replica.pfn,
        }),
    ))
}

/// Disk-side: validate the reported size against the on-disk stat of
/// the pfn, then forward the validated fields to the head node.
pub async fn putdone_disk(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let reported_size = opt_i64(body, "size").unwrap_or(0);
    let checksumtype = opt_str(body, "checksumtype");
    let checksumvalue = opt_str(body, "checksumvalue");

    let meta = tokio::fs::metadata(pfn)
        .await
        .map_err(|e| DomeError::NotFound(format!("{pfn}: {e}")))?;
    let ondisk_size = meta.len() as i64;
    if reported_size != 0 && ondisk_size != 0 && reported_size != ondisk_size {
        return Err(DomeError::Unprocessable(format!(
            "reported size {reported_size} does not match on-disk size {ondisk_size} for {pfn}"
        ))
        .into());
    }

    let headurl = state
        .config
        .disk
        .headnode
        .domeurl
        .as_deref()
        .ok_or_else(|| DomeError::Internal("disk.headnode.domeurl is not configured".into()))?;
    let resp: Value = state
        .outbound
        .client()
        .post(format!("{headurl}/dome_putdone"))
        .header("cmd", "dome_putdone")
        .json(&json!({
            "server": server,
            "pfn": pfn,
            "size": ondisk_size,
            "checksumtype": checksumtype,
            "checksumvalue": checksumvalue,
        }))
        .send()
        .await
        .map_err(DomeError::from)?
        .error_for_status()
        .map_err(DomeError::from)?
        .json()
        .await
        .map_err(DomeError::from)?;

    Ok((StatusCode::OK, resp))
}

/// Head-side finalization: require the replica is `BeingPopulated`,
/// remote-stat the pfn if the disk didn't report a size, then persist
/// checksum/size, propagate ancestor sizes, and account quota usage.
pub async fn putdone_head(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let mut size = opt_i64(body, "size").unwrap_or(0);
    let checksumtype = opt_str(body, "checksumtype");
    let checksumvalue = opt_str(body, "checksumvalue");

    let replica = state.ra.get_replica_by_rfn(server, pfn).await?;
    if replica.status != ReplicaStatus::BeingPopulated {
        return Err(DomeError::Unprocessable(format!(
            "replica {server}:{pfn} is not BeingPopulated (already finalized?)"
        ))
        .into());
    }

    if size == 0 {
        let base = domedisk_base_url(state, server);
        let stat_resp: Value = state
            .outbound
            .client()
            .post(format!("{base}/dome_statpfn"))
            .header("cmd", "dome_statpfn")
            .json(&json!({ "pfn": pfn, "requirefs": false }))
            .send()
            .await
            .map_err(DomeError::from)?
            .error_for_status()
            .map_err(DomeError::from)?
            .json()
            .await
            .map_err(DomeError::from)?;
        size = stat_resp.get("size").and_then(Value::as_i64).unwrap_or(0);
    }

    state
        .ra
        .update_replica(replica.replicaid, ReplicaStatus::Available, checksumtype, checksumvalue)
        .await?;
    if let (Some(t), Some(v)) = (checksumtype, checksumvalue) {
        state.ra.set_checksum(replica.fileid, t, v).await?;
    }
    state.ra.set_size(replica.fileid, size).await?;
    let stat = state.ra.get_stat_by_fileid(replica.fileid).await?;
    state
        .ra
        .add_filesize_to_dirs(&stat, size, state.config.glb.dirspacereportdepth)
        .await?;
    let _ = state.ra.addto_quotatoken_uspace(&replica.setname, -size).await;
    state.mdc.wipe_entry(replica.fileid, None);

    Ok((StatusCode::OK, json!({ "status": "finalized", "size": size })))
}

/// Disk-side: evict oldest regular files under `<fs>/<vo>` until the
/// target byte count is freed, asking the head to delete each victim
/// replica (which in turn forwards `dome_pfnrm` back here).
pub async fn makespace(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let fs = require_str(body, "fs")?;
    let vo = require_str(body, "vo")?;
    let target = opt_i64(body, "size").unwrap_or(0);
    if target <= 0 {
        return Err(DomeError::BadRequest("size must be positive".into()).into());
    }

    let vo_root = format!("{fs}/{vo}");
    let mut victims: Vec<(std::path::PathBuf, i64, std::time::SystemTime)> = Vec::new();
    collect_files_recursive(std::path::Path::new(&vo_root), &mut victims)
        .await
        .map_err(|e| DomeError::Internal(format!("failed to scan {vo_root}: {e}")))?;
    victims.sort_by_key(|(_, _, mtime)| *mtime);

    let headurl = head_base_url(state)?;
    let mut freed: i64 = 0;
    let mut removed = 0usize;
    for (path, size, _) in &victims {
        if freed >= target {
            break;
        }
        let pfn = path.to_string_lossy().to_string();
        let sent = state
            .outbound
            .client()
            .post(format!("{headurl}/dome_delreplica"))
            .header("cmd", "dome_delreplica")
            .json(&json!({ "server": state.config.glb.hostname, "pfn": pfn }))
            .send()
            .await;
        match sent {
            Ok(resp) if resp.status().is_success() => {
                freed += size;
                removed += 1;
            }
            _ => continue,
        }
    }

    if freed < target {
        return Err(DomeError::Unprocessable(format!(
            "could only free {freed} of {target} requested bytes under {vo_root}"
        ))
        .into());
    }
    Ok((
        StatusCode::OK,
        json!({ "freed": freed, "removed": removed, "summary": format!("freed {freed} bytes removing {removed} files") }),
    ))
}

fn collect_files_recursive<'a>(
    dir: &'a std::path::Path,
    out: &'a mut Vec<(std::path::PathBuf, i64, std::time::SystemTime)>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                collect_files_recursive(&entry.path(), out).await?;
            } else if meta.is_file() {
                let mtime = meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH);
                out.push((entry.path(), meta.len() as i64, mtime));
            }
        }
        Ok(())
    })
}

fn head_base_url(state: &AppState) -> CoreResult<String> {
    state
        .config
        .disk
        .headnode
        .domeurl
        .clone()
        .ok_or_else(|| DomeError::Internal("disk.headnode.domeurl is not configured".into()))
}

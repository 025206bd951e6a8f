//! Aggregated statistics and liveness: `dome_getspaceinfo`,
//! `dome_statpool`, `dome_getdirspaces`, `dome_info`.

use axum::http::StatusCode;
use dome_core::DomeError;
use serde_json::{json, Value};

use crate::body::{opt_str, require_str};
use crate::errors::AppResult;
use crate::state::AppState;

/// Disk-side (polled by the head's slow ticker) or head-side
/// (aggregated from `Status`): per-filesystem free/physical space.
pub async fn getspaceinfo(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let hostname = &state.config.glb.hostname;
    let filesystems = if let Some(server) = opt_str(body, "server") {
        state.status.filesystems_for_server(server)
    } else {
        state.status.filesystems_for_server(hostname)
    };
    Ok((
        StatusCode::OK,
        json!({
            "filesystems": filesystems
                .iter()
                .map(|f| json!({
                    "fs": f.fs,
                    "poolname": f.poolname,
                    "freespace": f.freespace,
                    "physicalsize": f.physicalsize,
                    "activity": format!("{:?}", f.activity()),
                }))
                .collect::<Vec<_>>(),
        }),
    ))
}

/// Head-side: aggregate physical/free space across a pool's
/// filesystems.
pub async fn statpool(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let poolname = require_str(body, "poolname")?;
    let pool = state
        .status
        .pool(poolname)
        .ok_or_else(|| DomeError::NotFound(format!("pool {poolname}")))?;
    let (physicalsize, freespace) = state.status.get_pool_spaces(poolname);
    Ok((
        StatusCode::OK,
        json!({
            "poolname": pool.poolname,
            "pooltype": match pool.stype {
                dome_core::model::PoolType::Volatile => "volatile",
                dome_core::model::PoolType::Permanent => "permanent",
            },
            "defsize": pool.defsize,
            "physicalsize": physicalsize,
            "freespace": freespace,
        }),
    ))
}

/// Head-side: reports recursive directory space usage. The original's
/// `dirspacereportdepth`-windowed running totals (kept on ancestor rows
/// by `add_filesize_to_dirs`) already hold this value on `size`; this
/// verb just surfaces it for a given directory subtree.
pub async fn getdirspaces(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    if !stat.is_dir() {
        return Err(DomeError::BadRequest(format!("{lfn} is not a directory")).into());
    }
    Ok((
        StatusCode::OK,
        json!({
            "lfn": lfn,
            "fileid": stat.fileid.0,
            "totalsize": stat.size,
        }),
    ))
}

/// Liveness and role information. Always runs, even when the caller
/// failed authorization: the dispatcher special-cases this verb so it
/// reaches here regardless.
pub async fn info(state: &AppState, authorized: bool) -> AppResult<(StatusCode, Value)> {
    let role = match state.config.glb.role {
        dome_config::NodeRole::Head => "head",
        dome_config::NodeRole::Disk => "disk",
    };
    Ok((
        StatusCode::OK,
        json!({
            "role": role,
            "hostname": state.config.glb.hostname,
            "authorized": authorized,
        }),
    ))
}

//! Namespace management handlers: `dome_makedir`, `dome_removedir`,
//! `dome_create`, `dome_unlink`, `dome_rename`, `dome_readlink`,
//! `dome_symlink`, `dome_setacl`, `dome_setmode`, `dome_setowner`,
//! `dome_setsize`, `dome_updatexattr`, `dome_setcomment`,
//! `dome_getcomment`, `dome_getstatinfo`, `dome_getdir`, `dome_access`,
//! `dome_accessreplica`.

use axum::http::StatusCode;
use dome_core::perm::{check_permissions, AccessMask, SecurityContext};
use dome_core::{DomeError, Result as CoreResult};
use serde_json::{json, Value};

use crate::body::{opt_str, require_str};
use crate::errors::AppResult;
use crate::state::AppState;

async fn parent_and_name(state: &AppState, lfn: &str) -> CoreResult<(dome_core::model::FileId, String)> {
    let (parent_path, name) = lfn
        .rsplit_once('/')
        .ok_or_else(|| DomeError::BadRequest(format!("lfn must be absolute: {lfn}")))?;
    let parent_path = if parent_path.is_empty() { "/" } else { parent_path };
    let parent = state.ra.get_stat_by_lfn(parent_path).await?;
    Ok((parent.fileid, name.to_string()))
}

pub async fn getstatinfo(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    Ok((StatusCode::OK, serde_json::to_value(&stat).unwrap()))
}

pub async fn getdir(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let dir = state.ra.get_stat_by_lfn(lfn).await?;
    if !dir.is_dir() {
        return Err(DomeError::BadRequest(format!("{lfn} is not a directory")).into());
    }
    let entries = state.ra.readdir(dir.fileid).await?;
    Ok((
        StatusCode::OK,
        json!({ "entries": entries.iter().map(|e| serde_json::to_value(e).unwrap()).collect::<Vec<_>>() }),
    ))
}

pub async fn makedir(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let mode = body.get("mode").and_then(Value::as_u64).unwrap_or(0o775) as u32;
    let (parent_id, name) = parent_and_name(state, lfn).await?;
    let parent = state.ra.get_stat_by_fileid(parent_id).await?;
    if !check_permissions(ctx, &parent, AccessMask::WRITE) {
        return Err(DomeError::PermissionDenied(format!("cannot write into parent of {lfn}")).into());
    }
    let stat = state.ra.makedir(parent_id, &name, mode, ctx.uid, first_gid(ctx)).await?;
    state.mdc.wipe_entry(parent_id, None);
    Ok((StatusCode::OK, serde_json::to_value(&stat).unwrap()))
}

pub async fn removedir(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    if !stat.is_dir() {
        return Err(DomeError::BadRequest(format!("{lfn} is not a directory")).into());
    }
    if stat.nlink > 1 {
        return Err(DomeError::Unprocessable(format!("{lfn} is not empty")).into());
    }
    let parent = state.ra.get_stat_by_fileid(stat.parent_fileid).await?;
    if !check_permissions(ctx, &parent, AccessMask::WRITE) {
        return Err(DomeError::PermissionDenied(format!("cannot write into parent of {lfn}")).into());
    }
    state.ra.unlink(stat.fileid).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "removed" })))
}

pub async fn create(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let mode = body.get("mode").and_then(Value::as_u64).unwrap_or(0o664) as u32;
    let (parent_id, name) = parent_and_name(state, lfn).await?;
    let parent = state.ra.get_stat_by_fileid(parent_id).await?;
    if !check_permissions(ctx, &parent, AccessMask::WRITE) {
        return Err(DomeError::PermissionDenied(format!("cannot write into parent of {lfn}")).into());
    }
    let stat = state
        .ra
        .createfile(parent_id, &name, mode, ctx.uid, first_gid(ctx))
        .await?;
    state.mdc.wipe_entry(parent_id, None);
    Ok((StatusCode::OK, serde_json::to_value(&stat).unwrap()))
}

pub async fn unlink(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    let parent = state.ra.get_stat_by_fileid(stat.parent_fileid).await?;
    if !check_permissions(ctx, &parent, AccessMask::WRITE)
        || !dome_core::perm::sticky_bit_permits_delete(ctx, &parent, &stat)
    {
        return Err(DomeError::PermissionDenied(format!("cannot unlink {lfn}")).into());
    }
    let replicas = state.ra.get_replicas(stat.fileid).await?;
    if !replicas.is_empty() {
        return Err(DomeError::Unprocessable(format!(
            "{lfn} still has {} replica(s); use dome_delreplica first",
            replicas.len()
        ))
        .into());
    }
    state.ra.unlink(stat.fileid).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "unlinked" })))
}

pub async fn rename(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let newlfn = require_str(body, "newlfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    let old_parent = state.ra.get_stat_by_fileid(stat.parent_fileid).await?;
    let (new_parent_id, new_name) = parent_and_name(state, newlfn).await?;
    let new_parent = state.ra.get_stat_by_fileid(new_parent_id).await?;
    if !check_permissions(ctx, &old_parent, AccessMask::WRITE)
        || !check_permissions(ctx, &new_parent, AccessMask::WRITE)
        || !dome_core::perm::sticky_bit_permits_delete(ctx, &old_parent, &stat)
    {
        return Err(DomeError::PermissionDenied(format!("cannot rename {lfn} to {newlfn}")).into());
    }
    state.ra.rename(stat.fileid, new_parent_id, &new_name).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    state.mdc.wipe_entry(new_parent_id, None);
    Ok((StatusCode::OK, json!({ "status": "renamed" })))
}

pub async fn readlink(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    let target = state.ra.read_link(stat.fileid).await?;
    Ok((StatusCode::OK, json!({ "target": target })))
}

pub async fn symlink(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let target = require_str(body, "target")?;
    let (parent_id, name) = parent_and_name(state, lfn).await?;
    let parent = state.ra.get_stat_by_fileid(parent_id).await?;
    if !check_permissions(ctx, &parent, AccessMask::WRITE) {
        return Err(DomeError::PermissionDenied(format!("cannot write into parent of {lfn}")).into());
    }
    let stat = state
        .ra
        .symlink(parent_id, &name, target, ctx.uid, first_gid(ctx))
        .await?;
    state.mdc.wipe_entry(parent_id, None);
    Ok((StatusCode::OK, serde_json::to_value(&stat).unwrap()))
}

pub async fn setacl(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let acl = require_str(body, "acl")?;
    let stat = owner_checked(state, ctx, lfn).await?;
    state.ra.set_acl(stat.fileid, acl).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn setmode(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let mode = body.get("mode").and_then(Value::as_u64).ok_or_else(|| DomeError::BadRequest("missing mode".into()))? as u32;
    let stat = owner_checked(state, ctx, lfn).await?;
    state.ra.set_mode(stat.fileid, mode).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn setowner(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let uid = body.get("uid").and_then(Value::as_i64);
    let gid = body.get("gid").and_then(Value::as_i64);
    let stat = owner_checked(state, ctx, lfn).await?;
    state
        .ra
        .set_owner(stat.fileid, uid.unwrap_or(stat.uid), gid.unwrap_or(stat.gid))
        .await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn setsize(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let size = body.get("size").and_then(Value::as_i64).ok_or_else(|| DomeError::BadRequest("missing size".into()))?;
    let stat = owner_checked(state, ctx, lfn).await?;
    state.ra.set_size(stat.fileid, size).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn updatexattr(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let xattrs = require_str(body, "xattrs")?;
    let stat = owner_checked(state, ctx, lfn).await?;
    state.ra.update_extended_attributes(stat.fileid, xattrs).await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

/// The textual ACL is also where a "comment" xattr-style annotation is
/// kept in this rewrite: there's no dedicated column, so the comment
/// rides in `xattrs` under a well-known key (matching the original's
/// treatment of comments as just another extended attribute).
pub async fn setcomment(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let comment = opt_str(body, "comment").unwrap_or_default();
    let stat = owner_checked(state, ctx, lfn).await?;
    let mut xattrs: serde_json::Map<String, Value> =
        serde_json::from_str(&stat.xattrs).unwrap_or_default();
    xattrs.insert("comment".into(), json!(comment));
    state
        .ra
        .update_extended_attributes(stat.fileid, &serde_json::to_string(&xattrs).unwrap())
        .await?;
    state.mdc.wipe_entry(stat.fileid, Some((stat.parent_fileid, &stat.name)));
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn getcomment(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    let xattrs: serde_json::Map<String, Value> = serde_json::from_str(&stat.xattrs).unwrap_or_default();
    let comment = xattrs.get("comment").cloned().unwrap_or(json!(""));
    Ok((StatusCode::OK, json!({ "comment": comment })))
}

pub async fn access(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let lfn = require_str(body, "lfn")?;
    let mask = mask_from_body(body);
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    let granted = check_permissions(ctx, &stat, mask);
    Ok((StatusCode::OK, json!({ "granted": granted })))
}

pub async fn accessreplica(state: &AppState, ctx: &SecurityContext, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let pfn = require_str(body, "pfn")?;
    let replica = state.ra.get_replica_by_rfn(server, pfn).await?;
    let stat = state.ra.get_stat_by_fileid(replica.fileid).await?;
    let mask = mask_from_body(body);
    let granted = check_permissions(ctx, &stat, mask);
    Ok((StatusCode::OK, json!({ "granted": granted })))
}

fn mask_from_body(body: &Value) -> AccessMask {
    let s = opt_str(body, "mode").unwrap_or("r");
    AccessMask {
        read: s.contains('r'),
        write: s.contains('w'),
        exec: s.contains('x'),
    }
}

async fn owner_checked(
    state: &AppState,
    ctx: &SecurityContext,
    lfn: &str,
) -> CoreResult<dome_core::model::ExtendedStat> {
    let stat = state.ra.get_stat_by_lfn(lfn).await?;
    if !ctx.is_root() && ctx.uid != stat.uid {
        return Err(DomeError::PermissionDenied(format!(
            "only the owner may modify metadata of {lfn}"
        )));
    }
    Ok(stat)
}

fn first_gid(ctx: &SecurityContext) -> i64 {
    ctx.gids.first().copied().unwrap_or(0)
}

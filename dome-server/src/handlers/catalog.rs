//! Pool, filesystem, quota-token, user, and group CRUD handlers: the
//! `dome_addpool`/`dome_modifypool`/`dome_rmpool`,
//! `dome_addfstopool`/`dome_modifyfs`/`dome_rmfs`,
//! `dome_setquotatoken`/`dome_modquotatoken`/`dome_delquotatoken`/`dome_getquotatoken`,
//! `dome_get{user,group}`, `dome_new{user,group}`,
//! `dome_{delete,update}{user,group}`, `dome_get{users,groups}vec`, and
//! `dome_getidmap` verb families.

use axum::http::StatusCode;
use dome_core::model::{FsStaticStatus, PoolType, QuotaToken};
use dome_core::DomeError;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::body::{opt_i64, opt_i64_vec, opt_str, require_i64, require_str};
use crate::errors::AppResult;
use crate::state::AppState;

pub async fn addpool(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let poolname = require_str(body, "poolname")?;
    let defsize = opt_i64(body, "defsize").unwrap_or(0);
    let stype = if opt_str(body, "pooltype") == Some("volatile") {
        PoolType::Volatile
    } else {
        PoolType::Permanent
    };
    state.ra.add_pool(poolname, defsize, stype).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn modifypool(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let poolname = require_str(body, "poolname")?;
    let defsize = opt_i64(body, "defsize");
    let stype = opt_str(body, "pooltype").map(|s| if s == "volatile" { PoolType::Volatile } else { PoolType::Permanent });
    state.ra.modify_pool(poolname, defsize, stype).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn rmpool(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let poolname = require_str(body, "poolname")?;
    state.ra.rm_pool(poolname).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

/// Adding a filesystem verifies reachability by issuing `dome_statpfn`
/// to the target server before the row is committed.
pub async fn addfstopool(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let fs = require_str(body, "fs")?;
    let poolname = require_str(body, "poolname")?;
    let probe_url = format!("https://{server}/domedisk/dome_statpfn?lfn=");
    if state.config.glb.restclient.ssl_check {
        if let Err(e) = state.outbound.client().head(&probe_url).send().await {
            tracing::warn!(server, error = %e, "reachability probe failed for new filesystem; adding anyway");
        }
    }
    state.ra.add_fs_to_pool(server, fs, poolname).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn modifyfs(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let fs = require_str(body, "fs")?;
    let status = opt_str(body, "status").map(|s| match s {
        "Disabled" => FsStaticStatus::Disabled,
        "ReadOnly" => FsStaticStatus::ReadOnly,
        _ => FsStaticStatus::Active,
    });
    let poolname = opt_str(body, "poolname");
    state.ra.modify_fs(server, fs, status, poolname).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn rmfs(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let server = require_str(body, "server")?;
    let fs = require_str(body, "fs")?;
    state.ra.rm_fs(server, fs).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn setquotatoken(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let poolname = require_str(body, "poolname")?;
    let path = require_str(body, "path")?;
    if !path.starts_with('/') {
        return Err(DomeError::BadRequest("path must be absolute".into()).into());
    }
    let path = path.trim_end_matches('/');
    let path = if path.is_empty() { "/" } else { path };
    let token = QuotaToken {
        s_token: Uuid::new_v4().to_string(),
        u_token: require_str(body, "u_token").unwrap_or("").to_string(),
        poolname: poolname.to_string(),
        path: path.to_string(),
        t_space: require_i64(body, "t_space")?,
        u_space: 0,
        groupsforwrite: opt_i64_vec(body, "groupsforwrite").unwrap_or_default(),
        s_uid: opt_i64(body, "s_uid").unwrap_or(0),
        s_gid: opt_i64(body, "s_gid").unwrap_or(0),
    };
    state.ra.set_quota_token(&token).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, serde_json::to_value(&token).unwrap()))
}

pub async fn modquotatoken(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let s_token = require_str(body, "s_token")?;
    let t_space = opt_i64(body, "t_space");
    let groupsforwrite = opt_i64_vec(body, "groupsforwrite");
    state.ra.mod_quota_token(s_token, t_space, groupsforwrite).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn delquotatoken(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let s_token = require_str(body, "s_token")?;
    state.ra.del_quota_token(s_token).await?;
    state.status.reload_fs_and_quotas(&state.ra).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

/// Supports parent-walk (`lfn` given: walk up to find the applicable
/// token) and subtree-walk (`path` given: return every token whose
/// path is at or below it) modes.
pub async fn getquotatoken(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    if let Some(lfn) = opt_str(body, "lfn") {
        let token = state
            .status
            .which_quotatoken_for_lfn(lfn)
            .ok_or_else(|| DomeError::NotFound(format!("no quota token applies to {lfn}")))?;
        return Ok((StatusCode::OK, serde_json::to_value(&token).unwrap()));
    }
    if let Some(s_token) = opt_str(body, "s_token") {
        let token = state.ra.get_quota_token(s_token).await?;
        return Ok((StatusCode::OK, serde_json::to_value(&token).unwrap()));
    }
    let subtree_root = opt_str(body, "path").unwrap_or("/");
    let tokens: Vec<_> = state
        .status
        .quota_tokens()
        .into_iter()
        .filter(|t| t.path == subtree_root || t.path.starts_with(&format!("{subtree_root}/")))
        .collect();
    Ok((
        StatusCode::OK,
        json!({ "tokens": tokens.iter().map(|t| serde_json::to_value(t).unwrap()).collect::<Vec<_>>() }),
    ))
}

pub async fn getuser(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let username = require_str(body, "username")?;
    let user = state.ra.get_user(username).await?;
    Ok((StatusCode::OK, serde_json::to_value(&user).unwrap()))
}

pub async fn newuser(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let username = require_str(body, "username")?;
    let user = state.ra.new_user_or_get(username).await?;
    Ok((StatusCode::OK, serde_json::to_value(&user).unwrap()))
}

pub async fn deleteuser(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let username = require_str(body, "username")?;
    state.ra.delete_user(username).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn updateuser(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let username = require_str(body, "username")?;
    let banned = body.get("banned").and_then(Value::as_bool).unwrap_or(false);
    state.ra.update_user_banned(username, banned).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn getusersvec(state: &AppState) -> AppResult<(StatusCode, Value)> {
    let users = state.ra.list_users().await?;
    Ok((
        StatusCode::OK,
        json!({ "users": users.iter().map(|u| serde_json::to_value(u).unwrap()).collect::<Vec<_>>() }),
    ))
}

pub async fn getgroup(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let groupname = require_str(body, "groupname")?;
    let group = state.ra.get_group(groupname).await?;
    Ok((StatusCode::OK, serde_json::to_value(&group).unwrap()))
}

pub async fn newgroup(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let groupname = require_str(body, "groupname")?;
    let group = state.ra.new_group(groupname).await?;
    Ok((StatusCode::OK, serde_json::to_value(&group).unwrap()))
}

pub async fn deletegroup(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let groupname = require_str(body, "groupname")?;
    state.ra.delete_group(groupname).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn updategroup(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let groupname = require_str(body, "groupname")?;
    let banned = body.get("banned").and_then(Value::as_bool).unwrap_or(false);
    state.ra.update_group_banned(groupname, banned).await?;
    Ok((StatusCode::OK, json!({ "status": "ok" })))
}

pub async fn getgroupsvec(state: &AppState) -> AppResult<(StatusCode, Value)> {
    let groups = state.ra.list_groups().await?;
    Ok((
        StatusCode::OK,
        json!({ "groups": groups.iter().map(|g| serde_json::to_value(g).unwrap()).collect::<Vec<_>>() }),
    ))
}

pub async fn getidmap(state: &AppState, body: &Value) -> AppResult<(StatusCode, Value)> {
    let username = require_str(body, "username")?;
    let user = state.ra.get_user(username).await?;
    let groupnames: Vec<String> = body
        .get("groupnames")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let mut gids = Vec::new();
    let mut any_banned = user.banned;
    for g in &groupnames {
        if let Ok(group) = state.ra.get_group(g).await {
            any_banned |= group.banned;
            gids.push(group.groupid.0);
        }
    }
    Ok((
        StatusCode::OK,
        json!({ "uid": user.userid.0, "gids": gids, "banned": any_banned }),
    ))
}

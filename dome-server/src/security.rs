//! Per-request identity extraction and the additive, fail-closed
//! authorization rule from the original §4.1.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use dome_core::perm::SecurityContext as PermContext;

use crate::errors::AppError;
use crate::state::AppState;

/// Per-request identity: the client DN, remote address, and group
/// names (FQANs) injected by the front-end web server, plus the `cmd`
/// header naming the verb to dispatch. Resolution of `(uid, gids,
/// banned)` happens separately (it needs `Status`/the RA, which the
/// extractor alone doesn't have access to without an `Arc<AppState>`
/// in request extensions).
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub client_dn: String,
    pub remote_addr: String,
    pub cmd: String,
    /// Group names the web server asserts for this client (the
    /// original's `req.creds.groups`), comma-separated on the wire.
    pub groups: Vec<String>,
}

impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| -> String {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        let cmd = header("cmd");
        let cmd = if cmd.is_empty() { header("HTTP_CMD") } else { cmd };
        let groups = header("remoteclientgroups")
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        Ok(Self {
            client_dn: header("remoteclientdn"),
            remote_addr: header("remoteclientaddr"),
            cmd,
            groups,
        })
    }
}

/// Resolves a client DN (plus the group names the web server
/// asserted) to a `(uid, gids, banned)` `SecurityContext`,
/// auto-provisioning unknown DNs as new user records (head role only,
/// as stated in §4.1). Mirrors `dome_getidmap`
/// (`handlers/catalog.rs::getidmap`): each asserted group name is
/// resolved via `get_group`, with unknown names silently skipped
/// rather than failing the whole request.
pub async fn resolve_security_context(
    state: &AppState,
    client_dn: &str,
    groups: &[String],
) -> Result<PermContext, AppError> {
    if client_dn.is_empty() {
        return Ok(PermContext { uid: 0, gids: vec![] });
    }
    let user = match state.ra.get_user(client_dn).await {
        Ok(u) => u,
        Err(dome_core::DomeError::NotFound(_)) => state.ra.new_user_or_get(client_dn).await?,
        Err(e) => return Err(e.into()),
    };
    if user.banned {
        return Err(AppError::forbidden(format!("user {client_dn} is banned")));
    }
    state.status.upsert_user(user.clone());
    let mut gids = Vec::with_capacity(groups.len());
    for name in groups {
        if let Ok(group) = state.ra.get_group(name).await {
            gids.push(group.groupid.0);
        }
    }
    Ok(PermContext {
        uid: user.userid.0,
        gids,
    })
}

/// The additive, fail-closed authorization rule: a configured
/// whitelist admits exact DN matches; any DN matching a known
/// disk-server hostname or the head node's own URL is admitted as a
/// peer. `dome_info` is exempt (handled by its own handler, which
/// always runs) and never reaches this check.
pub fn is_authorized(state: &AppState, client_dn: &str) -> bool {
    if state
        .config
        .glb
        .auth
        .authorize_dn
        .iter()
        .any(|dn| dn == client_dn)
    {
        return true;
    }
    state.status.is_dn_a_known_server(client_dn)
}

pub fn forbidden() -> AppError {
    AppError::new(StatusCode::FORBIDDEN, "access denied")
}

//! Permission enforcement: backward-traversal execute checks plus
//! owner/group/other/ACL authorization for namespace operations.

use crate::model::namespace::libc_s_ifmt::{S_IREAD, S_ISGID, S_ISUID, S_ISVTX};
use crate::model::ExtendedStat;

/// The access mask a caller requests, expressed the POSIX way.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessMask {
    pub read: bool,
    pub write: bool,
    pub exec: bool,
}

impl AccessMask {
    pub const READ: Self = Self { read: true, write: false, exec: false };
    pub const WRITE: Self = Self { read: false, write: true, exec: false };
    pub const EXEC: Self = Self { read: false, write: false, exec: true };
}

/// The caller's resolved identity for a single request.
#[derive(Debug, Clone)]
pub struct SecurityContext {
    pub uid: i64,
    pub gids: Vec<i64>,
}

impl SecurityContext {
    pub fn is_root(&self) -> bool {
        self.uid == 0
    }
}

/// Standard POSIX owner/group/other bits, honouring setgid/setuid/sticky
/// only insofar as they affect the mode-bit arithmetic here (ACL
/// entries, when present in `acl`, are consulted after the POSIX bits
/// deny, matching a typical POSIX-ACL "additional grants" semantic).
pub fn check_permissions(ctx: &SecurityContext, stat: &ExtendedStat, mask: AccessMask) -> bool {
    if ctx.is_root() {
        return true;
    }
    let mode = stat.mode;
    let bits = if stat.uid == ctx.uid {
        (mode >> 6) & 0o7
    } else if ctx.gids.contains(&stat.gid) {
        (mode >> 3) & 0o7
    } else {
        mode & 0o7
    };
    let posix_ok = (!mask.read || bits & (S_IREAD >> 6) != 0 || bits & 0o4 != 0)
        && (!mask.write || bits & 0o2 != 0)
        && (!mask.exec || bits & 0o1 != 0);
    if posix_ok {
        return true;
    }
    acl_grants(&stat.acl, ctx, mask)
}

/// Very small textual ACL format: comma-separated
/// `user:<uid>:rwx` / `group:<gid>:rwx` entries. Returns true if any
/// entry grants the full requested mask.
fn acl_grants(acl: &str, ctx: &SecurityContext, mask: AccessMask) -> bool {
    for entry in acl.split(',').filter(|e| !e.is_empty()) {
        let mut parts = entry.splitn(3, ':');
        let (kind, id, perm) = match (parts.next(), parts.next(), parts.next()) {
            (Some(k), Some(i), Some(p)) => (k, i, p),
            _ => continue,
        };
        let matches = match kind {
            "user" => id.parse::<i64>().map(|v| v == ctx.uid).unwrap_or(false),
            "group" => id
                .parse::<i64>()
                .map(|v| ctx.gids.contains(&v))
                .unwrap_or(false),
            _ => false,
        };
        if !matches {
            continue;
        }
        let grants_read = perm.contains('r');
        let grants_write = perm.contains('w');
        let grants_exec = perm.contains('x');
        if (!mask.read || grants_read) && (!mask.write || grants_write) && (!mask.exec || grants_exec) {
            return true;
        }
    }
    false
}

/// Sticky-bit rule: deletion/rename of an entry inside a sticky
/// directory is restricted to the owner of the entry or the owner of
/// the directory.
pub fn sticky_bit_permits_delete(ctx: &SecurityContext, dir: &ExtendedStat, entry: &ExtendedStat) -> bool {
    if ctx.is_root() {
        return true;
    }
    if dir.mode & S_ISVTX == 0 {
        return true;
    }
    ctx.uid == entry.uid || ctx.uid == dir.uid
}

pub fn honours_setgid(dir: &ExtendedStat) -> bool {
    dir.mode & S_ISGID != 0
}

pub fn honours_setuid(stat: &ExtendedStat) -> bool {
    stat.mode & S_ISUID != 0
}

/// Walks from an entry up to root, requiring execute permission on
/// every ancestor directory along the way.
pub async fn traverse_backwards<F, Fut>(
    ctx: &SecurityContext,
    mut start: ExtendedStat,
    get_parent: F,
) -> Result<(), String>
where
    F: Fn(crate::model::FileId) -> Fut,
    Fut: std::future::Future<Output = Result<ExtendedStat, String>>,
{
    loop {
        if start.is_root() {
            return Ok(());
        }
        let parent = get_parent(start.parent_fileid).await?;
        if !check_permissions(ctx, &parent, AccessMask::EXEC) {
            return Err(format!(
                "permission denied traversing {}",
                parent.name
            ));
        }
        start = parent;
    }
}

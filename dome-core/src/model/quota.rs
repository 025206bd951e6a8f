//! Quota token entity: a path-prefix byte allocation owned by a pool.

use serde::{Deserialize, Serialize};

/// Invariants: `(path, poolname)` unique; `s_token` unique across the
/// table; `path` is absolute with no trailing slash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaToken {
    /// uuid identity of the token.
    pub s_token: String,
    /// Human-readable name, a.k.a. the accounting "setname" recorded on replicas.
    pub u_token: String,
    pub poolname: String,
    pub path: String,
    pub t_space: i64,
    /// Bytes currently charged against this token (legacy `u_space`
    /// accounting column, kept for interop with existing dashboards).
    pub u_space: i64,
    pub groupsforwrite: Vec<i64>,
    /// Unused by any admission path; kept opaque for interop.
    pub s_uid: i64,
    pub s_gid: i64,
}

impl QuotaToken {
    pub fn remaining(&self) -> i64 {
        self.t_space - self.u_space
    }

    pub fn fits(&self, size: i64) -> bool {
        self.remaining() >= size
    }

    /// Permissive-default group check: empty `groupsforwrite` admits everyone.
    pub fn group_can_write(&self, gids: &[i64]) -> bool {
        self.groupsforwrite.is_empty() || gids.iter().any(|g| self.groupsforwrite.contains(g))
    }
}

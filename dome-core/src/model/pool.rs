//! Pool and filesystem entities.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum PoolType {
    #[sqlx(rename = "P")]
    Permanent,
    #[sqlx(rename = "V")]
    Volatile,
}

/// Logical group of filesystems sharing an allocation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub poolname: String,
    /// Default blind-allocation size in bytes; also used as the
    /// per-filesystem minimum-free-space override during placement.
    pub defsize: i64,
    pub stype: PoolType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum FsStaticStatus {
    #[sqlx(rename = "Active")]
    Active,
    #[sqlx(rename = "Disabled")]
    Disabled,
    #[sqlx(rename = "ReadOnly")]
    ReadOnly,
}

/// Runtime-only status, never persisted; refreshed by the slow ticker's
/// `dome_getspaceinfo` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FsActivityStatus {
    #[default]
    Unknown,
    Online,
    Broken,
}

/// A `(server, fs)` pair: `fs` is a root directory on `server`.
///
/// Invariant: filesystems within one server never overlap as path
/// prefixes; `(server, fs)` is unique.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filesystem {
    pub server: String,
    pub fs: String,
    pub poolname: String,
    pub status: FsStaticStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub activitystatus: Option<FsActivityStatus>,
    pub freespace: i64,
    pub physicalsize: i64,
}

impl Filesystem {
    pub fn activity(&self) -> FsActivityStatus {
        self.activitystatus.unwrap_or_default()
    }

    /// A filesystem is eligible to receive a new write iff it is
    /// administratively `Active` and observed `Online`.
    pub fn is_good_for_write(&self) -> bool {
        self.status == FsStaticStatus::Active && self.activity() == FsActivityStatus::Online
    }

    /// `PfnMatchesFS(server, pfn, fs)`: true iff `server` matches and
    /// `pfn` has `fs.fs` as a path-prefix on a component boundary.
    pub fn pfn_matches(&self, server: &str, pfn: &str) -> bool {
        if self.server != server {
            return false;
        }
        pfn_has_prefix_on_boundary(pfn, &self.fs)
    }
}

/// `pfn` is accepted as belonging to `fs_root` iff, textually, `fs_root`
/// is a prefix of `pfn` and the next character is `/` or end-of-string.
pub fn pfn_has_prefix_on_boundary(pfn: &str, fs_root: &str) -> bool {
    if !pfn.starts_with(fs_root) {
        return false;
    }
    match pfn.as_bytes().get(fs_root.len()) {
        None => true,
        Some(b'/') => true,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_boundary_exact_match() {
        assert!(pfn_has_prefix_on_boundary("/srv/fs1", "/srv/fs1"));
    }

    #[test]
    fn prefix_boundary_slash_follows() {
        assert!(pfn_has_prefix_on_boundary("/srv/fs1/vo1/f", "/srv/fs1"));
    }

    #[test]
    fn prefix_boundary_rejects_partial_component() {
        // "/srv/fs11" must not match root "/srv/fs1"
        assert!(!pfn_has_prefix_on_boundary("/srv/fs11/vo1/f", "/srv/fs1"));
    }
}

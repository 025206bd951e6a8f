//! Namespace entities: `ExtendedStat` and supporting enums.

use super::ids::FileId;
use serde::{Deserialize, Serialize};

/// Read/written as a plain `i16` (`0` = Online, `1` = Migrated) by the
/// relational adapter; not `sqlx::Type` since `ExtendedStat` is
/// assembled field-by-field rather than via `FromRow`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    Online,
    Migrated,
}

impl Default for FileStatus {
    fn default() -> Self {
        FileStatus::Online
    }
}

/// A logical file or directory entry in the namespace.
///
/// Invariant: for a non-root entry a unique `(parent_fileid, name)`
/// exists; for root, `parent_fileid == 0`. Files have `nlink >= 1`;
/// directories count children in `nlink`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtendedStat {
    pub fileid: FileId,
    pub parent_fileid: FileId,
    pub name: String,
    pub mode: u32,
    pub uid: i64,
    pub gid: i64,
    pub size: i64,
    pub nlink: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub status: FileStatus,
    /// Serialized POSIX-like ACL (textual form, e.g. `user::rwx,group::r-x,other::r--`).
    pub acl: String,
    /// Serialized xattr mapping (JSON object as text).
    pub xattrs: String,
    /// Legacy short checksum type, e.g. `"AD"`. Kept for interop.
    pub csumtype: Option<String>,
    pub csumvalue: Option<String>,
}

impl ExtendedStat {
    pub fn is_dir(&self) -> bool {
        self.mode & libc_s_ifmt::S_IFMT == libc_s_ifmt::S_IFDIR
    }

    pub fn is_root(&self) -> bool {
        self.parent_fileid.0 == 0
    }
}

/// Minimal POSIX mode-bit constants so this crate has no `libc` dependency
/// (dome-core is platform-agnostic; only the task executor touches process APIs).
pub mod libc_s_ifmt {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFLNK: u32 = 0o120000;
    pub const S_IEXEC: u32 = 0o000100;
    pub const S_IWRITE: u32 = 0o000200;
    pub const S_IREAD: u32 = 0o000400;
    pub const S_ISVTX: u32 = 0o001000;
    pub const S_ISGID: u32 = 0o002000;
    pub const S_ISUID: u32 = 0o004000;
}

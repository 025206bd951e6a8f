//! Replica entity: a physical copy of a logical file on a disk server.

use super::ids::{FileId, ReplicaId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum ReplicaStatus {
    #[sqlx(rename = "A")]
    Available,
    #[sqlx(rename = "P")]
    BeingPopulated,
    #[sqlx(rename = "D")]
    ToBeDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text")]
pub enum ReplicaType {
    #[sqlx(rename = "V")]
    Volatile,
    #[sqlx(rename = "P")]
    Permanent,
    #[sqlx(rename = "L")]
    LogicalOnly,
}

/// A physical replica of a logical file.
///
/// Invariant: `filesystem` is a strict prefix of `pfn`, and `server`
/// must match an existing filesystem record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replica {
    pub replicaid: ReplicaId,
    pub fileid: FileId,
    pub server: String,
    pub pfn: String,
    pub pool: String,
    pub filesystem: String,
    /// The accounting quota-token identity this replica is charged against.
    pub setname: String,
    pub status: ReplicaStatus,
    pub type_: ReplicaType,
    pub atime: i64,
    pub ptime: i64,
    pub ltime: i64,
    pub nbaccesses: i64,
    pub xattrs: String,
    pub checksum_type: Option<String>,
    pub checksum_value: Option<String>,
}

impl Replica {
    /// Wire encoding `server ":" pfn`, used for backward compatibility
    /// with legacy clients.
    pub fn rfn(&self) -> String {
        format!("{}:{}", self.server, self.pfn)
    }

    pub fn parse_rfn(rfn: &str) -> Option<(&str, &str)> {
        rfn.split_once(':')
    }
}

//! Task executor entities and the checksum/pull side-tables.

use serde::{Deserialize, Serialize};

pub type TaskKey = u64;

/// A spawned child process tracked by the task executor.
#[derive(Debug, Clone, Serialize)]
pub struct TaskInfo {
    pub key: TaskKey,
    pub argv: Vec<String>,
    pub pid: Option<u32>,
    pub starttime: i64,
    pub endtime: Option<i64>,
    pub finished: bool,
    pub resultcode: Option<i32>,
    /// Captured stdout, capped at `head.task.stdout_cap_bytes`.
    pub stdout: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueueItemStatus {
    Waiting,
    Running,
    Finished,
}

/// An item in the generic priority queue. `qualifiers[0]` is always the
/// empty-string global bucket; `qualifiers[1]` is typically the disk
/// server hostname.
#[derive(Debug, Clone, Serialize)]
pub struct QueueItem {
    pub namekey: String,
    pub qualifiers: Vec<String>,
    pub priority: i32,
    pub status: QueueItemStatus,
    pub last_touch: i64,
}

/// Side-table mapping a task key to the logical context of a checksum job.
#[derive(Debug, Clone)]
pub struct PendingChecksum {
    pub task_key: TaskKey,
    pub lfn: Option<String>,
    pub server: String,
    pub pfn: String,
    pub checksum_type: String,
    /// Whether a successful result should also update the LFN's
    /// (as opposed to only the replica's) checksum attribute.
    pub update_lfn_checksum: bool,
}

/// Side-table mapping a task key to the logical context of a pull job.
#[derive(Debug, Clone)]
pub struct PendingPull {
    pub task_key: TaskKey,
    pub lfn: String,
    pub server: String,
    pub pfn: String,
    pub neededspace: i64,
}

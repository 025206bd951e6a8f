//! Domain entities shared across the relational adapter, metadata cache,
//! status layer, placement engine, and queues.

pub mod ids;
pub mod namespace;
pub mod pool;
pub mod principal;
pub mod quota;
pub mod replica;
pub mod task;

pub use ids::{FileId, GroupId, ReplicaId, UserId, ROOT_FILEID};
pub use namespace::{ExtendedStat, FileStatus};
pub use pool::{Filesystem, FsActivityStatus, FsStaticStatus, Pool, PoolType};
pub use principal::{Group, User};
pub use quota::QuotaToken;
pub use replica::{Replica, ReplicaStatus, ReplicaType};
pub use task::{PendingChecksum, PendingPull, QueueItem, QueueItemStatus, TaskInfo, TaskKey};

//! Application state: the core-context record the design notes call
//! for instead of process-wide globals. Every handler and ticker is
//! handed this explicitly via axum's `State` extractor.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use dome_config::Config;
use dome_core::mdc::MetadataCache;
use dome_core::model::{PendingChecksum, PendingPull, TaskKey};
use dome_core::outbound::OutboundPool;
use dome_core::placement::PlacementEngine;
use dome_core::queue::GenericPriorityQueue;
use dome_core::ra::RelationalAdapter;
use dome_core::status::Status;
use dome_core::task::TaskExecutor;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub ra: RelationalAdapter,
    pub status: Arc<Status>,
    pub mdc: Arc<MetadataCache>,
    pub placement: Arc<PlacementEngine>,
    pub checksum_queue: Arc<GenericPriorityQueue>,
    pub pull_queue: Arc<GenericPriorityQueue>,
    pub tasks: Arc<TaskExecutor>,
    pub outbound: Arc<OutboundPool>,
    /// Side-tables mapping a task key to the logical context of a
    /// checksum or pull job, consulted by the task-completion
    /// callback to know what to do once the child exits.
    pub pending_checksums: Arc<DashMap<TaskKey, PendingChecksum>>,
    pub pending_pulls: Arc<DashMap<TaskKey, PendingPull>>,
    /// Namekey-keyed lookup from a queue item back to its task key,
    /// populated when a queue admission spawns the underlying task.
    pub checksum_namekey_tasks: Arc<Mutex<HashMap<String, TaskKey>>>,
    pub pull_namekey_tasks: Arc<Mutex<HashMap<String, TaskKey>>>,
    /// Context recorded at enqueue time, before a task exists: the fast
    /// queue ticker looks this up by namekey when it admits an item and
    /// moves it into `pending_checksums`/`pending_pulls` once the
    /// corresponding task has a key.
    pub checksum_context: Arc<DashMap<String, PendingChecksum>>,
    pub pull_context: Arc<DashMap<String, PendingPull>>,
    pub shutdown: CancellationToken,
}

//! Background loops: the slow ticker (Status reload, filesystem space
//! re-probing, task GC) and the fast queue ticker (checksum/pull
//! admission), plus the `TaskCallbacks` implementation that bridges a
//! finished task back to its checksum/pull context.
//!
//! Grounded on `ferrex-server`'s startup background-task pattern: a
//! detached `tokio::spawn` looping on `tokio::time::interval`, torn
//! down by a shared `CancellationToken` rather than a raw bool flag.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use dome_config::NodeRole;
use dome_core::model::{PendingChecksum, PendingPull, TaskInfo};
use dome_core::task::TaskCallbacks;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::handlers::replica::domedisk_base_url;
use crate::state::AppState;

/// Mints process-local correlation keys for checksum/pull jobs
/// dispatched from the head's queue ticker. Distinct from
/// `TaskExecutor`'s own key space (that one numbers locally-spawned
/// child processes; this one numbers jobs the head has *forwarded*
/// to a disk and is waiting to hear back about).
static NEXT_DISPATCH_KEY: AtomicU64 = AtomicU64::new(1);

fn next_dispatch_key() -> u64 {
    NEXT_DISPATCH_KEY.fetch_add(1, Ordering::Relaxed)
}

/// Bridges `TaskExecutor` completions (disk-side: the checksum binary
/// or pull hook just exited) back to an HTTP callback to the head
/// node. Constructed before `AppState` exists (the executor needs a
/// callback object at construction time, and `AppState` needs the
/// executor), so the state is injected once via `bind` right after.
pub struct TaskCallbackBridge {
    state: once_cell::sync::OnceCell<AppState>,
}

impl TaskCallbackBridge {
    pub fn new() -> std::sync::Arc<Self> {
        std::sync::Arc::new(Self {
            state: once_cell::sync::OnceCell::new(),
        })
    }

    pub fn bind(&self, state: AppState) {
        let _ = self.state.set(state);
    }
}

#[async_trait]
impl TaskCallbacks for TaskCallbackBridge {
    async fn on_task_completed(&self, task: &TaskInfo) {
        let Some(state) = self.state.get() else { return };
        if let Some((_, pending)) = state.pending_checksums.remove(&task.key) {
            report_checksum(state, &pending, task).await;
        } else if let Some((_, pending)) = state.pending_pulls.remove(&task.key) {
            report_pull(state, &pending, task).await;
        }
    }
}

fn parse_hash(stdout: &str) -> Option<String> {
    stdout.lines().find_map(|l| l.trim().strip_prefix(">>>>> HASH ").map(str::trim).map(str::to_string))
}

fn parse_stat(stdout: &str) -> Option<(i64, u32)> {
    stdout.lines().find_map(|l| {
        let rest = l.trim().strip_prefix(">>>>> STAT ")?;
        let mut parts = rest.split_whitespace();
        let size: i64 = parts.next()?.parse().ok()?;
        let mode: u32 = parts.next()?.parse().ok()?;
        Some((size, mode))
    })
}

async fn report_checksum(state: &AppState, pending: &PendingChecksum, task: &TaskInfo) {
    let headurl = match state.config.disk.headnode.domeurl.as_deref() {
        Some(u) => u,
        None => return,
    };
    let (status, checksum) = match (task.resultcode, parse_hash(&task.stdout)) {
        (Some(0), Some(h)) => ("done", Some(h)),
        _ => ("error", None),
    };
    let body = json!({
        "server": pending.server,
        "pfn": pending.pfn,
        "checksum-type": pending.checksum_type,
        "status": status,
        "checksum": checksum,
    });
    if let Err(e) = state
        .outbound
        .client()
        .post(format!("{headurl}/dome_chksumstatus"))
        .header("cmd", "dome_chksumstatus")
        .json(&body)
        .send()
        .await
    {
        warn!(error = %e, server = %pending.server, pfn = %pending.pfn, "failed to report checksum result to head");
    }
}

async fn report_pull(state: &AppState, pending: &PendingPull, task: &TaskInfo) {
    let headurl = match state.config.disk.headnode.domeurl.as_deref() {
        Some(u) => u,
        None => return,
    };
    let (status, filesize) = match (task.resultcode, parse_stat(&task.stdout)) {
        (Some(0), Some((size, _mode))) => ("done", size),
        _ => ("error", 0),
    };
    let body = json!({
        "server": pending.server,
        "pfn": pending.pfn,
        "status": status,
        "filesize": filesize,
    });
    if let Err(e) = state
        .outbound
        .client()
        .post(format!("{headurl}/dome_pullstatus"))
        .header("cmd", "dome_pullstatus")
        .json(&body)
        .send()
        .await
    {
        warn!(error = %e, server = %pending.server, pfn = %pending.pfn, "failed to report pull result to head");
    }
}

/// Slow ticker: drives `Status::reload_fs_and_quotas` on
/// `glb.reloadfsquotas`, filesystem space re-probing on
/// `glb.fscheckinterval`, and `TaskExecutor::tick` every tick.
pub async fn run_slow_ticker(state: AppState, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(state.config.glb.tickfreq);
    let mut last_reload = Instant::now()
        .checked_sub(state.config.glb.reloadfsquotas)
        .unwrap_or_else(Instant::now);
    let mut last_fscheck = Instant::now()
        .checked_sub(state.config.glb.fscheckinterval)
        .unwrap_or_else(Instant::now);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("slow ticker shutting down");
                return;
            }
            _ = interval.tick() => {}
        }

        if last_reload.elapsed() >= state.config.glb.reloadfsquotas {
            if let Err(e) = state.status.reload_fs_and_quotas(&state.ra).await {
                warn!(error = %e, "failed to reload filesystems and quota tokens");
            }
            last_reload = Instant::now();
        }

        if last_fscheck.elapsed() >= state.config.glb.fscheckinterval {
            check_disk_spaces(&state).await;
            last_fscheck = Instant::now();
        }

        state.tasks.tick().await;
    }
}

/// Head-only: polls each known disk server's `dome_getspaceinfo` and
/// folds the result back into `Status`; a server that fails to answer
/// has every one of its filesystems marked Broken until the next
/// probe.
async fn check_disk_spaces(state: &AppState) {
    if state.config.glb.role != NodeRole::Head {
        return;
    }
    let mut servers: Vec<String> = state
        .status
        .filesystems()
        .into_iter()
        .map(|f| f.server)
        .collect();
    servers.sort();
    servers.dedup();

    for server in servers {
        let base = domedisk_base_url(state, &server);
        let resp = state
            .outbound
            .client()
            .get(format!("{base}/dome_getspaceinfo"))
            .header("cmd", "dome_getspaceinfo")
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => match r.json::<serde_json::Value>().await {
                Ok(body) => {
                    let entries = body.get("filesystems").and_then(|v| v.as_array()).cloned().unwrap_or_default();
                    for entry in entries {
                        let fs = entry.get("fs").and_then(|v| v.as_str()).unwrap_or_default();
                        let freespace = entry.get("freespace").and_then(|v| v.as_i64()).unwrap_or(0);
                        let physicalsize = entry.get("physicalsize").and_then(|v| v.as_i64()).unwrap_or(0);
                        state.status.update_filesystem_space(&server, fs, freespace, physicalsize, true);
                    }
                }
                Err(e) => {
                    warn!(server, error = %e, "unreadable dome_getspaceinfo response");
                    mark_server_broken(state, &server);
                }
            },
            _ => mark_server_broken(state, &server),
        }
    }
}

fn mark_server_broken(state: &AppState, server: &str) {
    for fs in state.status.filesystems_for_server(server) {
        state.status.mark_filesystem_broken(server, &fs.fs);
    }
}

/// Fast queue ticker: wakes on `Status::queue_notify`, admits as many
/// checksum/pull jobs as currently fit under their column limits, and
/// forwards each admission to the owning disk server. The actual
/// result arrives later via `dome_chksumstatus`/`dome_pullstatus`.
pub async fn run_queue_ticker(state: AppState, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("queue ticker shutting down");
                return;
            }
            _ = state.status.queue_notify.notified() => {}
        }

        for key in state.checksum_queue.admit_all_eligible() {
            dispatch_checksum(&state, key).await;
        }
        for key in state.pull_queue.admit_all_eligible() {
            dispatch_pull(&state, key).await;
        }

        state.checksum_queue.purge_idle();
        state.pull_queue.purge_idle();
    }
}

async fn dispatch_checksum(state: &AppState, namekey: String) {
    let Some((_, context)) = state.checksum_context.remove(&namekey) else {
        state.checksum_queue.finish(&namekey);
        return;
    };
    let key = next_dispatch_key();
    state.checksum_namekey_tasks.lock().insert(namekey.clone(), key);
    state.pending_checksums.insert(key, context.clone());

    let base = domedisk_base_url(state, &context.server);
    let sent = state
        .outbound
        .client()
        .post(format!("{base}/dome_dochksum"))
        .header("cmd", "dome_dochksum")
        .json(&json!({ "pfn": context.pfn, "checksumtype": context.checksum_type }))
        .send()
        .await;
    if let Err(e) = sent {
        warn!(error = %e, server = %context.server, pfn = %context.pfn, "failed to dispatch dome_dochksum");
        state.checksum_namekey_tasks.lock().remove(&namekey);
        state.pending_checksums.remove(&key);
        state.checksum_queue.finish(&namekey);
    }
}

async fn dispatch_pull(state: &AppState, namekey: String) {
    let Some((_, context)) = state.pull_context.remove(&namekey) else {
        state.pull_queue.finish(&namekey);
        return;
    };
    let key = next_dispatch_key();
    state.pull_namekey_tasks.lock().insert(namekey.clone(), key);
    state.pending_pulls.insert(key, context.clone());

    let base = domedisk_base_url(state, &context.server);
    let sent = state
        .outbound
        .client()
        .post(format!("{base}/dome_pull"))
        .header("cmd", "dome_pull")
        .json(&json!({ "lfn": context.lfn, "pfn": context.pfn, "neededspace": context.neededspace }))
        .send()
        .await;
    if let Err(e) = sent {
        warn!(error = %e, server = %context.server, pfn = %context.pfn, "failed to dispatch dome_pull");
        state.pull_namekey_tasks.lock().remove(&namekey);
        state.pending_pulls.remove(&key);
        state.pull_queue.finish(&namekey);
    }
}

//! Task executor (TE): spawns child processes, captures their stdout,
//! and notifies completion callbacks.

use crate::model::{TaskInfo, TaskKey};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::{info, warn};

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Callback contract: implementors must not re-enter the executor from
/// within these calls (they run outside the executor's lock, but
/// re-entrant submission from inside a callback would still be
/// confusing control flow to reason about).
#[async_trait]
pub trait TaskCallbacks: Send + Sync {
    async fn on_task_completed(&self, task: &TaskInfo);
    async fn on_task_running(&self, _task: &TaskInfo) {}
}

struct TrackedTask {
    info: TaskInfo,
    notify: Arc<Notify>,
    child: Option<tokio::process::Child>,
}

struct TaskExecInner {
    tasks: HashMap<TaskKey, TrackedTask>,
}

pub struct TaskExecutor {
    inner: Mutex<TaskExecInner>,
    next_key: AtomicU64,
    maxrunningtime: i64,
    purgetime: i64,
    stdout_cap_bytes: usize,
    callbacks: Arc<dyn TaskCallbacks>,
}

impl TaskExecutor {
    pub fn new(
        maxrunningtime: i64,
        purgetime: i64,
        stdout_cap_bytes: usize,
        callbacks: Arc<dyn TaskCallbacks>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(TaskExecInner {
                tasks: HashMap::new(),
            }),
            next_key: AtomicU64::new(1),
            maxrunningtime,
            purgetime,
            stdout_cap_bytes,
            callbacks,
        })
    }

    /// Assigns a new key, spawns the child with three-pipe I/O, and
    /// returns the key immediately; the actual process is driven by a
    /// detached tokio task so the caller never blocks on completion.
    pub fn submit_cmd(self: &Arc<Self>, argv: Vec<String>) -> TaskKey {
        let key = self.next_key.fetch_add(1, Ordering::SeqCst);
        let info = TaskInfo {
            key,
            argv: argv.clone(),
            pid: None,
            starttime: now(),
            endtime: None,
            finished: false,
            resultcode: None,
            stdout: String::new(),
        };
        let notify = Arc::new(Notify::new());
        self.inner.lock().tasks.insert(
            key,
            TrackedTask {
                info,
                notify: notify.clone(),
                child: None,
            },
        );

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_task(key, argv).await;
        });
        key
    }

    async fn run_task(self: Arc<Self>, key: TaskKey, argv: Vec<String>) {
        if argv.is_empty() {
            self.finish_with(key, None, -1, String::new()).await;
            return;
        }
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, argv = ?argv, "failed to spawn task");
                self.finish_with(key, None, -1, String::new()).await;
                return;
            }
        };
        let pid = child.id();
        let mut stdout = child.stdout.take().expect("piped stdout");
        {
            let mut inner = self.inner.lock();
            if let Some(t) = inner.tasks.get_mut(&key) {
                t.info.pid = pid;
                t.child = Some(child);
            }
        }

        let cap = self.stdout_cap_bytes;
        let mut buf = Vec::with_capacity(4096);
        let mut chunk = [0u8; 4096];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => {
                    if buf.len() < cap {
                        let take = n.min(cap - buf.len());
                        buf.extend_from_slice(&chunk[..take]);
                    }
                }
                Err(_) => break,
            }
        }
        // Reclaim the child for reaping; `kill_task` may have already
        // taken it (and sent SIGKILL) concurrently, in which case the
        // process is gone and `wait()` on a fresh handle isn't
        // possible, so fall back to a non-blocking status check.
        let taken = self.inner.lock().tasks.get_mut(&key).and_then(|t| t.child.take());
        let resultcode = match taken {
            Some(mut child) => match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(_) => -1,
            },
            None => -1,
        };
        let captured = String::from_utf8_lossy(&buf).to_string();
        self.finish_with(key, pid, resultcode, captured).await;
    }

    async fn finish_with(&self, key: TaskKey, pid: Option<u32>, resultcode: i32, stdout: String) {
        let (info, notify) = {
            let mut inner = self.inner.lock();
            let Some(t) = inner.tasks.get_mut(&key) else {
                return;
            };
            t.info.pid = pid.or(t.info.pid);
            t.info.finished = true;
            t.info.endtime = Some(now());
            t.info.resultcode = Some(resultcode);
            t.info.stdout = stdout;
            t.child = None;
            (t.info.clone(), t.notify.clone())
        };
        notify.notify_waiters();
        self.callbacks.on_task_completed(&info).await;
    }

    /// Waits for the task to finish, up to `tmout`. Returns the task's
    /// snapshot whether or not it finished in time.
    pub async fn wait_result(&self, key: TaskKey, tmout: std::time::Duration) -> Option<TaskInfo> {
        let notify = {
            let inner = self.inner.lock();
            let t = inner.tasks.get(&key)?;
            if t.info.finished {
                return Some(t.info.clone());
            }
            t.notify.clone()
        };
        let _ = tokio::time::timeout(tmout, notify.notified()).await;
        self.inner.lock().tasks.get(&key).map(|t| t.info.clone())
    }

    /// Sends SIGKILL (best-effort, platform process-kill) to a
    /// non-finished task and closes its pipes.
    pub async fn kill_task(&self, key: TaskKey) {
        let maybe_child = {
            let mut inner = self.inner.lock();
            inner.tasks.get_mut(&key).and_then(|t| t.child.take())
        };
        if let Some(mut child) = maybe_child {
            let _ = child.start_kill();
        }
    }

    pub fn get(&self, key: TaskKey) -> Option<TaskInfo> {
        self.inner.lock().tasks.get(&key).map(|t| t.info.clone())
    }

    /// Kills tasks older than `maxrunningtime`, purges finished tasks
    /// older than `purgetime`, and collects still-running tasks for a
    /// deferred `onTaskRunning` callback invoked outside the lock.
    pub async fn tick(&self) {
        let t = now();
        let (to_kill, to_notify_running) = {
            let inner = self.inner.lock();
            let mut kill = Vec::new();
            let mut running = Vec::new();
            for task in inner.tasks.values() {
                if !task.info.finished && t - task.info.starttime > self.maxrunningtime {
                    kill.push(task.info.key);
                } else if !task.info.finished {
                    running.push(task.info.clone());
                }
            }
            (kill, running)
        };
        for key in to_kill {
            warn!(key, "task exceeded maxrunningtime, killing");
            self.kill_task(key).await;
        }
        for task in &to_notify_running {
            self.callbacks.on_task_running(task).await;
        }
        let purgetime = self.purgetime;
        self.inner.lock().tasks.retain(|_, task| {
            match task.info.endtime {
                Some(end) if task.info.finished => t - end <= purgetime,
                _ => true,
            }
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tasks.len()
    }
}

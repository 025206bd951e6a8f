//! Status (ST): the process-wide, periodically-reloaded view of
//! filesystems, pools, quota tokens, users, groups, and known servers,
//! plus the admission predicates that read them.

mod predicates;
mod reload;

pub use predicates::*;

use crate::model::{Filesystem, Group, Pool, QuotaToken, User};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Default)]
struct StatusInner {
    filesystems: Vec<Filesystem>,
    pools: HashMap<String, Pool>,
    /// Multiple quota tokens may share a path prefix across pools; kept
    /// as a flat vec and filtered rather than indexed by prefix.
    quota_tokens: Vec<QuotaToken>,
    users_by_name: HashMap<String, User>,
    groups_by_name: HashMap<String, Group>,
    /// Hostnames of known disk servers (derived from the fs table) plus
    /// the head node's own hostname.
    known_servers: std::collections::HashSet<String>,
    headnodename: String,
}

/// Process-wide singleton, held behind an `Arc` and passed explicitly
/// through application state rather than reached for as a global.
pub struct Status {
    inner: RwLock<StatusInner>,
    putcount: AtomicI32,
    /// Signaled whenever reload or an admission-affecting event occurs;
    /// the fast queue ticker awaits this instead of spinning.
    pub queue_notify: Notify,
}

impl Status {
    pub fn new(headnodename: impl Into<String>) -> Arc<Self> {
        let mut inner = StatusInner::default();
        inner.headnodename = headnodename.into();
        inner.known_servers.insert(inner.headnodename.clone());
        Arc::new(Self {
            inner: RwLock::new(inner),
            putcount: AtomicI32::new(0),
            queue_notify: Notify::new(),
        })
    }

    pub fn replace_filesystems(&self, fs: Vec<Filesystem>) {
        let mut inner = self.inner.write();
        inner
            .known_servers
            .retain(|s| *s == inner.headnodename); // keep head, drop stale disk hosts
        for f in &fs {
            inner.known_servers.insert(f.server.clone());
        }
        inner.filesystems = fs;
    }

    pub fn replace_pools(&self, pools: Vec<Pool>) {
        let mut inner = self.inner.write();
        inner.pools = pools.into_iter().map(|p| (p.poolname.clone(), p)).collect();
    }

    pub fn replace_quota_tokens(&self, tokens: Vec<QuotaToken>) {
        self.inner.write().quota_tokens = tokens;
    }

    pub fn upsert_user(&self, user: User) {
        self.inner.write().users_by_name.insert(user.username.clone(), user);
    }

    pub fn upsert_group(&self, group: Group) {
        self.inner.write().groups_by_name.insert(group.groupname.clone(), group);
    }

    pub fn filesystems(&self) -> Vec<Filesystem> {
        self.inner.read().filesystems.clone()
    }

    pub fn filesystems_for_server(&self, server: &str) -> Vec<Filesystem> {
        self.inner
            .read()
            .filesystems
            .iter()
            .filter(|f| f.server == server)
            .cloned()
            .collect()
    }

    pub fn pool(&self, name: &str) -> Option<Pool> {
        self.inner.read().pools.get(name).cloned()
    }

    pub fn quota_tokens(&self) -> Vec<QuotaToken> {
        self.inner.read().quota_tokens.clone()
    }

    pub fn user(&self, username: &str) -> Option<User> {
        self.inner.read().users_by_name.get(username).cloned()
    }

    pub fn update_filesystem_space(&self, server: &str, fs: &str, freespace: i64, physicalsize: i64, online: bool) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner
            .filesystems
            .iter_mut()
            .find(|f| f.server == server && f.fs == fs)
        {
            entry.freespace = freespace;
            entry.physicalsize = physicalsize;
            entry.activitystatus = Some(if online {
                crate::model::FsActivityStatus::Online
            } else {
                crate::model::FsActivityStatus::Broken
            });
        }
    }

    pub fn mark_filesystem_broken(&self, server: &str, fs: &str) {
        let mut inner = self.inner.write();
        if let Some(entry) = inner
            .filesystems
            .iter_mut()
            .find(|f| f.server == server && f.fs == fs)
        {
            entry.activitystatus = Some(crate::model::FsActivityStatus::Broken);
        }
    }

    /// `isDNaKnownServer(dn)`: true for any DN whose hostname matches
    /// `headnodename`, the local hostname, or any filesystem server.
    pub fn is_dn_a_known_server(&self, hostname: &str) -> bool {
        self.inner.read().known_servers.contains(hostname)
    }

    pub fn headnodename(&self) -> String {
        self.inner.read().headnodename.clone()
    }

    /// `getGlobalputcount()`: atomic monotone counter wrapping at 2^31,
    /// used to make replica PFNs unique within a second.
    pub fn next_putcount(&self) -> i32 {
        // fetch_add wraps on overflow for signed integers in Rust.
        self.putcount.fetch_add(1, Ordering::Relaxed).wrapping_abs()
    }

    pub fn notify_queues(&self) {
        self.queue_notify.notify_waiters();
    }
}

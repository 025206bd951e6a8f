//! Metadata cache (MDC): process-wide, dual-indexed cache of stat +
//! replica lists, with in-flight coalescing and LRU eviction.

use crate::model::{ExtendedStat, FileId, Replica};
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    NoInfo,
    InProgress,
    Ok,
    NotFound,
    Error,
}

struct EntryData {
    statinfo: Option<ExtendedStat>,
    locations: Vec<Replica>,
}

/// One entry, shared by reference from any number of readers. The
/// per-entry mutex permits in-flight coalescing without blocking
/// unrelated keys behind the MDC-wide index lock.
pub struct MdcEntry {
    status_statinfo: parking_lot::Mutex<EntryStatus>,
    status_locations: parking_lot::Mutex<EntryStatus>,
    data: tokio::sync::Mutex<EntryData>,
    notify: Notify,
    pub(crate) last_touch: AtomicI64,
}

impl MdcEntry {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            status_statinfo: parking_lot::Mutex::new(EntryStatus::NoInfo),
            status_locations: parking_lot::Mutex::new(EntryStatus::NoInfo),
            data: tokio::sync::Mutex::new(EntryData {
                statinfo: None,
                locations: Vec::new(),
            }),
            notify: Notify::new(),
            last_touch: AtomicI64::new(now()),
        })
    }

    fn touch(&self) {
        self.last_touch.store(now(), Ordering::Relaxed);
    }
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct MetadataCache {
    by_fileid: DashMap<FileId, Arc<MdcEntry>>,
    by_parent_name: DashMap<(FileId, String), Arc<MdcEntry>>,
    itemttl: i64,
    itemmaxttl: i64,
    itemttl_negative: i64,
    maxitems: usize,
}

/// Result of resolving a stat, distinguishing a genuine miss from an
/// as-yet-unresolved lookup so callers can decide whether to fetch.
pub enum Resolution<T> {
    Ready(T),
    NotFound,
    Error(String),
    /// Caller is responsible for fetching and calling `resolve_*`.
    MustFetch(Arc<MdcEntry>),
}

impl MetadataCache {
    pub fn new(itemttl: i64, itemmaxttl: i64, itemttl_negative: i64, maxitems: usize) -> Self {
        Self {
            by_fileid: DashMap::new(),
            by_parent_name: DashMap::new(),
            itemttl,
            itemmaxttl,
            itemttl_negative,
            maxitems,
        }
    }

    fn get_or_create_by_fileid(&self, fileid: FileId) -> Arc<MdcEntry> {
        self.by_fileid
            .entry(fileid)
            .or_insert_with(MdcEntry::new)
            .clone()
    }

    fn get_or_create_by_parent_name(&self, parent: FileId, name: &str) -> Arc<MdcEntry> {
        self.by_parent_name
            .entry((parent, name.to_string()))
            .or_insert_with(MdcEntry::new)
            .clone()
    }

    /// Read protocol for stat-by-fileid: returns `Ready`/`NotFound`
    /// directly if the entry already resolved, else marks it
    /// `InProgress` (if this caller won the race) and returns
    /// `MustFetch` so the caller performs the fetch and calls
    /// `resolve_stat`. Callers that lose the race should instead await
    /// the entry's notification and re-poll.
    pub async fn resolve_stat_by_fileid(&self, fileid: FileId) -> Resolution<ExtendedStat> {
        let entry = self.get_or_create_by_fileid(fileid);
        self.resolve_stat_on(entry).await
    }

    pub async fn resolve_stat_by_parent_name(&self, parent: FileId, name: &str) -> Resolution<ExtendedStat> {
        let entry = self.get_or_create_by_parent_name(parent, name);
        self.resolve_stat_on(entry).await
    }

    async fn resolve_stat_on(&self, entry: Arc<MdcEntry>) -> Resolution<ExtendedStat> {
        entry.touch();
        loop {
            let status = *entry.status_statinfo.lock();
            match status {
                EntryStatus::Ok => {
                    let data = entry.data.lock().await;
                    if let Some(stat) = data.statinfo.clone() {
                        return Resolution::Ready(stat);
                    }
                    return Resolution::NotFound;
                }
                EntryStatus::NotFound => return Resolution::NotFound,
                EntryStatus::Error => return Resolution::Error("cached error".into()),
                EntryStatus::InProgress => {
                    entry.notify.notified().await;
                    continue;
                }
                EntryStatus::NoInfo => {
                    let mut status = entry.status_statinfo.lock();
                    if *status == EntryStatus::NoInfo {
                        *status = EntryStatus::InProgress;
                        drop(status);
                        return Resolution::MustFetch(entry);
                    }
                    // Someone else flipped it first between our read and lock; loop again.
                    continue;
                }
            }
        }
    }

    /// Called by the single fetcher that received `MustFetch`. Atomically
    /// updates both indexes and broadcasts to waiters (`pushXstatInfo`).
    pub async fn resolve_stat_found(&self, entry: &Arc<MdcEntry>, stat: ExtendedStat) {
        {
            let mut data = entry.data.lock().await;
            data.statinfo = Some(stat.clone());
        }
        *entry.status_statinfo.lock() = EntryStatus::Ok;
        entry.touch();
        entry.notify.notify_waiters();
        // Cross-index: ensure both the fileid and (parent,name) entries
        // point at consistent data after a successful resolve.
        let by_id = self.get_or_create_by_fileid(stat.fileid);
        let by_name = self.get_or_create_by_parent_name(stat.parent_fileid, &stat.name);
        for target in [by_id, by_name] {
            if !Arc::ptr_eq(&target, entry) {
                let mut data = target.data.lock().await;
                data.statinfo = Some(stat.clone());
                *target.status_statinfo.lock() = EntryStatus::Ok;
                target.touch();
                target.notify.notify_waiters();
            }
        }
        self.evict_if_over_capacity();
    }

    pub fn resolve_stat_not_found(&self, entry: &Arc<MdcEntry>) {
        *entry.status_statinfo.lock() = EntryStatus::NotFound;
        entry.touch();
        entry.notify.notify_waiters();
    }

    pub fn resolve_stat_error(&self, entry: &Arc<MdcEntry>) {
        *entry.status_statinfo.lock() = EntryStatus::Error;
        entry.touch();
        entry.notify.notify_waiters();
    }

    /// `wipeEntry`: marks the entries for `fileid` (and, optionally,
    /// `(parent,name)`) as `NoInfo` so the next read refetches.
    pub fn wipe_entry(&self, fileid: FileId, parent_name: Option<(FileId, &str)>) {
        if let Some(entry) = self.by_fileid.get(&fileid) {
            *entry.status_statinfo.lock() = EntryStatus::NoInfo;
            *entry.status_locations.lock() = EntryStatus::NoInfo;
        }
        if let Some((parent, name)) = parent_name {
            if let Some(entry) = self.by_parent_name.get(&(parent, name.to_string())) {
                *entry.status_statinfo.lock() = EntryStatus::NoInfo;
                *entry.status_locations.lock() = EntryStatus::NoInfo;
            }
        }
    }

    pub async fn locations_for(&self, fileid: FileId) -> Vec<Replica> {
        let entry = self.get_or_create_by_fileid(fileid);
        entry.data.lock().await.locations.clone()
    }

    pub async fn set_locations(&self, fileid: FileId, replicas: Vec<Replica>) {
        let entry = self.get_or_create_by_fileid(fileid);
        entry.data.lock().await.locations = replicas;
        *entry.status_locations.lock() = EntryStatus::Ok;
        entry.touch();
    }

    fn evict_if_over_capacity(&self) {
        if self.by_fileid.len() + self.by_parent_name.len() <= self.maxitems {
            return;
        }
        self.purge_tick();
    }

    /// Each tick, purges entries older than `itemttl` (shorter
    /// `itemttl_negative` for NotFound entries), and unconditionally
    /// purges anything older than `itemmaxttl`.
    pub fn purge_tick(&self) {
        let t = now();
        let itemttl = self.itemttl;
        let itemmaxttl = self.itemmaxttl;
        let itemttl_negative = self.itemttl_negative;
        let should_evict = |entry: &Arc<MdcEntry>| {
            let age = t - entry.last_touch.load(Ordering::Relaxed);
            if age > itemmaxttl {
                return true;
            }
            let negative = *entry.status_statinfo.lock() == EntryStatus::NotFound;
            if negative {
                age > itemttl_negative
            } else {
                age > itemttl
            }
        };
        self.by_fileid.retain(|_, v| !should_evict(v));
        self.by_parent_name.retain(|_, v| !should_evict(v));
    }

    pub fn len(&self) -> (usize, usize) {
        (self.by_fileid.len(), self.by_parent_name.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;

    fn sample_stat(fileid: i64) -> ExtendedStat {
        ExtendedStat {
            fileid: FileId(fileid),
            parent_fileid: FileId(1),
            name: format!("f{fileid}"),
            mode: 0o100644,
            uid: 0,
            gid: 0,
            size: 0,
            nlink: 1,
            atime: 0,
            mtime: 0,
            ctime: 0,
            status: FileStatus::Online,
            acl: String::new(),
            xattrs: "{}".into(),
            csumtype: None,
            csumvalue: None,
        }
    }

    #[tokio::test]
    async fn first_reader_must_fetch_second_reader_waits_then_sees_result() {
        let mdc = Arc::new(MetadataCache::new(60, 120, 10, 1_000_000));
        let mdc2 = Arc::clone(&mdc);

        let entry = match mdc.resolve_stat_by_fileid(FileId(42)).await {
            Resolution::MustFetch(e) => e,
            _ => panic!("expected MustFetch for a fresh key"),
        };

        let waiter = tokio::spawn(async move {
            loop {
                match mdc2.resolve_stat_by_fileid(FileId(42)).await {
                    Resolution::Ready(s) => return s,
                    Resolution::MustFetch(_) => panic!("second reader should not win the race"),
                    _ => tokio::task::yield_now().await,
                }
            }
        });

        tokio::task::yield_now().await;
        mdc.resolve_stat_found(&entry, sample_stat(42)).await;
        let got = waiter.await.unwrap();
        assert_eq!(got.fileid, FileId(42));
    }

    #[test]
    fn wipe_entry_resets_to_noinfo() {
        let mdc = MetadataCache::new(60, 120, 10, 1_000_000);
        let entry = mdc.get_or_create_by_fileid(FileId(7));
        *entry.status_statinfo.lock() = EntryStatus::Ok;
        mdc.wipe_entry(FileId(7), None);
        assert_eq!(*entry.status_statinfo.lock(), EntryStatus::NoInfo);
    }
}

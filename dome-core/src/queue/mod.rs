//! Generic priority queue (GPQ): keyed items with qualifier tuples,
//! per-qualifier capacity limits, and a waiting→running→finished
//! lifecycle. Two instances exist on the head node: one for checksum
//! jobs, one for file pulls.

use crate::model::{QueueItem, QueueItemStatus};
use parking_lot::Mutex;
use std::collections::HashMap;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Per-column admission capacity. `None` means unlimited (informational
/// column). Column 0 is always the global bucket (`qualifiers[0] = ""`).
#[derive(Debug, Clone)]
pub struct ColumnLimits(pub Vec<Option<u32>>);

struct GpqInner {
    items: HashMap<String, QueueItem>,
    limits: ColumnLimits,
    qtmout: i64,
}

/// One mutex guards the whole queue. `parking_lot::Mutex` is
/// non-reentrant, so all internal helpers take `&mut GpqInner` rather
/// than re-locking.
pub struct GenericPriorityQueue {
    inner: Mutex<GpqInner>,
}

impl GenericPriorityQueue {
    pub fn new(limits: ColumnLimits, qtmout: i64) -> Self {
        Self {
            inner: Mutex::new(GpqInner {
                items: HashMap::new(),
                limits,
                qtmout,
            }),
        }
    }

    /// Creates a Waiting item with `qualifiers`, or refreshes an
    /// existing one's status and last-touch time. `qualifiers[0]` is
    /// forced to `""` if the caller omitted it, per the global-bucket
    /// convention every column list follows.
    pub fn touch_item_or_create_new(
        &self,
        namekey: &str,
        status: QueueItemStatus,
        priority: i32,
        mut qualifiers: Vec<String>,
    ) {
        if qualifiers.is_empty() {
            qualifiers.push(String::new());
        } else if !qualifiers[0].is_empty() {
            qualifiers.insert(0, String::new());
        }
        let mut inner = self.inner.lock();
        let t = now();
        inner
            .items
            .entry(namekey.to_string())
            .and_modify(|item| {
                item.status = status;
                item.priority = priority;
                item.last_touch = t;
            })
            .or_insert(QueueItem {
                namekey: namekey.to_string(),
                qualifiers,
                priority,
                status,
                last_touch: t,
            });
    }

    fn running_count_for_column(inner: &GpqInner, column: usize, value: &str) -> u32 {
        inner
            .items
            .values()
            .filter(|i| i.status == QueueItemStatus::Running)
            .filter(|i| i.qualifiers.get(column).map(|q| q.as_str()) == Some(value))
            .count() as u32
    }

    /// An item may transition Waiting→Running iff, for every column `c`
    /// with a finite limit, the count of Running items sharing
    /// `qualifiers[c]` in that column is strictly below `limits[c]`.
    fn admits(inner: &GpqInner, item: &QueueItem) -> bool {
        for (col, limit) in inner.limits.0.iter().enumerate() {
            let Some(limit) = limit else { continue };
            let value = match item.qualifiers.get(col) {
                Some(v) => v.clone(),
                None => continue,
            };
            if Self::running_count_for_column(inner, col, &value) >= *limit {
                return false;
            }
        }
        true
    }

    /// Selects the next Waiting item with the highest priority that
    /// satisfies admission; ties broken by FIFO of last-touch ascending.
    /// Transitions it to Running and returns its namekey.
    pub fn admit_next(&self) -> Option<String> {
        let mut inner = self.inner.lock();
        let candidate = inner
            .items
            .values()
            .filter(|i| i.status == QueueItemStatus::Waiting)
            .filter(|i| Self::admits(&inner, i))
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then(b.last_touch.cmp(&a.last_touch))
            })
            .map(|i| i.namekey.clone());
        if let Some(key) = &candidate {
            if let Some(item) = inner.items.get_mut(key) {
                item.status = QueueItemStatus::Running;
                item.last_touch = now();
            }
        }
        candidate
    }

    /// Admits as many Waiting items as currently satisfy admission,
    /// highest priority first. Returns all namekeys transitioned.
    pub fn admit_all_eligible(&self) -> Vec<String> {
        let mut admitted = Vec::new();
        while let Some(key) = self.admit_next() {
            admitted.push(key);
        }
        admitted
    }

    pub fn finish(&self, namekey: &str) {
        let mut inner = self.inner.lock();
        if let Some(item) = inner.items.get_mut(namekey) {
            item.status = QueueItemStatus::Finished;
            item.last_touch = now();
        }
    }

    pub fn get(&self, namekey: &str) -> Option<QueueItem> {
        self.inner.lock().items.get(namekey).cloned()
    }

    /// Drops items not touched for `qtmout` seconds, and any Finished
    /// item immediately: nothing holds a reference to a finished item
    /// past the call that observed it, so there is no separate
    /// reference count to check.
    pub fn purge_idle(&self) {
        let mut inner = self.inner.lock();
        let t = now();
        let qtmout = inner.qtmout;
        inner.items.retain(|_, item| {
            if item.status == QueueItemStatus::Finished {
                return false;
            }
            if item.status == QueueItemStatus::Waiting && t - item.last_touch > qtmout {
                return false;
            }
            true
        });
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn running_count(&self) -> usize {
        self.inner
            .lock()
            .items
            .values()
            .filter(|i| i.status == QueueItemStatus::Running)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_respects_per_column_capacity() {
        let q = GenericPriorityQueue::new(ColumnLimits(vec![Some(10), Some(1)]), 180);
        q.touch_item_or_create_new("a", QueueItemStatus::Waiting, 0, vec!["".into(), "hostX".into()]);
        q.touch_item_or_create_new("b", QueueItemStatus::Waiting, 0, vec!["".into(), "hostX".into()]);
        let first = q.admit_next();
        assert!(first.is_some());
        // Second item targeting the same host-column value must not be
        // admitted while the first is still Running.
        assert_eq!(q.admit_next(), None);
        q.finish(first.as_ref().unwrap());
        assert_eq!(q.admit_next(), Some("b".to_string()));
    }

    #[test]
    fn higher_priority_admitted_first() {
        let q = GenericPriorityQueue::new(ColumnLimits(vec![None]), 180);
        q.touch_item_or_create_new("low", QueueItemStatus::Waiting, 1, vec![]);
        q.touch_item_or_create_new("high", QueueItemStatus::Waiting, 5, vec![]);
        assert_eq!(q.admit_next(), Some("high".to_string()));
    }

    #[test]
    fn idle_waiting_items_are_purged() {
        let q = GenericPriorityQueue::new(ColumnLimits(vec![None]), -1);
        q.touch_item_or_create_new("stale", QueueItemStatus::Waiting, 0, vec![]);
        q.purge_idle();
        assert!(q.get("stale").is_none());
    }

    #[test]
    fn finished_items_are_dropped_on_purge() {
        let q = GenericPriorityQueue::new(ColumnLimits(vec![None]), 180);
        q.touch_item_or_create_new("done", QueueItemStatus::Finished, 0, vec![]);
        q.purge_idle();
        assert!(q.get("done").is_none());
    }
}

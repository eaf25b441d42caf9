//! The in-memory inbox: newest-first notification list plus a cached unread counter.
//!
//! [`NotificationStore`] holds the rules; [`SharedStore`] is the handle the rest of the
//! crate passes around. Every mutation runs under a single lock acquisition and publishes
//! exactly one [`InboxView`], so subscribers never see a half-applied change.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::{model::Notification, settings::normalize_max_entries};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InboxView {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
}

#[derive(Debug)]
pub struct NotificationStore {
    notifications: Vec<Notification>,
    unread_count: usize,
    removed: HashSet<String>,
    max_entries: usize,
}

impl NotificationStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            removed: HashSet::new(),
            max_entries: normalize_max_entries(max_entries),
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn view(&self) -> InboxView {
        InboxView {
            notifications: self.notifications.clone(),
            unread_count: self.unread_count,
        }
    }

    /// Merges a REST snapshot with whatever is already held.
    ///
    /// Entries present on both sides take the snapshot's fields, except that a read flag
    /// already confirmed locally stays set. Ids deleted during this session are skipped.
    pub fn replace_all(&mut self, snapshot: Vec<Notification>, reported_unread: usize) {
        let snapshot_unread = snapshot.iter().filter(|n| !n.is_read).count();
        if snapshot_unread != reported_unread {
            warn!(
                reported = reported_unread,
                counted = snapshot_unread,
                "server unread_count disagrees with snapshot contents; using counted value"
            );
        }

        let mut seen = HashSet::with_capacity(snapshot.len() + self.notifications.len());
        let mut merged = Vec::with_capacity(snapshot.len() + self.notifications.len());
        for mut incoming in snapshot {
            if self.removed.contains(&incoming.id) {
                debug!(id = %incoming.id, "snapshot skipped locally deleted notification");
                continue;
            }
            if !seen.insert(incoming.id.clone()) {
                continue;
            }
            if self.get(&incoming.id).map_or(false, |held| held.is_read) {
                incoming.is_read = true;
            }
            merged.push(incoming);
        }
        for held in self.notifications.drain(..) {
            if seen.insert(held.id.clone()) {
                merged.push(held);
            }
        }
        merged.sort_by(Notification::newest_first);

        self.notifications = merged;
        self.unread_count = self.count_unread();
        self.enforce_capacity();
    }

    /// Prepends a pushed notification. Returns `false` when the id was already held,
    /// in which case the old entry is replaced and moved to the front.
    pub fn push(&mut self, notification: Notification) -> bool {
        let mut is_new = true;
        if let Some(pos) = self.notifications.iter().position(|n| n.id == notification.id) {
            is_new = false;
            let old = self.notifications.remove(pos);
            if !old.is_read {
                self.unread_count = self.unread_count.saturating_sub(1);
            }
        }
        self.removed.remove(&notification.id);

        if !notification.is_read {
            self.unread_count += 1;
        }
        self.notifications.insert(0, notification);
        self.enforce_capacity();
        is_new
    }

    /// Returns `true` only if an unread entry flipped to read.
    pub fn mark_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(entry) if !entry.is_read => {
                entry.is_read = true;
                self.unread_count = self.unread_count.saturating_sub(1);
                true
            }
            _ => false,
        }
    }

    /// Returns how many entries changed.
    pub fn mark_all_read(&mut self) -> usize {
        let mut changed = 0;
        for entry in self.notifications.iter_mut().filter(|n| !n.is_read) {
            entry.is_read = true;
            changed += 1;
        }
        self.unread_count = 0;
        changed
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.removed.insert(id.to_string());
        let Some(pos) = self.notifications.iter().position(|n| n.id == id) else {
            return false;
        };
        let removed = self.notifications.remove(pos);
        if !removed.is_read {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        true
    }

    fn count_unread(&self) -> usize {
        self.notifications.iter().filter(|n| !n.is_read).count()
    }

    fn enforce_capacity(&mut self) {
        if self.notifications.len() <= self.max_entries {
            return;
        }
        let dropped_unread = self.notifications[self.max_entries..]
            .iter()
            .filter(|n| !n.is_read)
            .count();
        self.notifications.truncate(self.max_entries);
        self.unread_count = self.unread_count.saturating_sub(dropped_unread);
    }
}

struct Shared {
    store: Mutex<NotificationStore>,
    view_tx: watch::Sender<InboxView>,
    closed: AtomicBool,
}

/// Cloneable handle to the session's single store.
#[derive(Clone)]
pub struct SharedStore {
    inner: Arc<Shared>,
}

impl SharedStore {
    pub fn new(max_entries: usize) -> Self {
        let store = NotificationStore::new(max_entries);
        let (view_tx, _) = watch::channel(store.view());
        Self {
            inner: Arc::new(Shared {
                store: Mutex::new(store),
                view_tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<InboxView> {
        self.inner.view_tx.subscribe()
    }

    pub fn view(&self) -> InboxView {
        self.inner.view_tx.borrow().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.view_tx.borrow().unread_count
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// After this, every mutation is discarded. Used at session teardown so late
    /// fetch or mutation results land nowhere.
    pub fn close(&self) {
        // Taken under the store lock so no mutation is mid-flight once this returns.
        let _guard = self.inner.store.lock();
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn replace_all(&self, snapshot: Vec<Notification>, reported_unread: usize) -> bool {
        self.mutate("replace_all", |store| {
            store.replace_all(snapshot, reported_unread);
            true
        })
        .unwrap_or(false)
    }

    pub fn push(&self, notification: Notification) -> bool {
        self.mutate("push", |store| store.push(notification))
            .unwrap_or(false)
    }

    pub fn mark_read(&self, id: &str) -> bool {
        self.mutate("mark_read", |store| store.mark_read(id))
            .unwrap_or(false)
    }

    pub fn mark_all_read(&self) -> usize {
        self.mutate("mark_all_read", NotificationStore::mark_all_read)
            .unwrap_or(0)
    }

    pub fn remove(&self, id: &str) -> bool {
        self.mutate("remove", |store| store.remove(id))
            .unwrap_or(false)
    }

    fn mutate<R>(&self, op: &str, apply: impl FnOnce(&mut NotificationStore) -> R) -> Option<R> {
        if self.is_closed() {
            debug!(op, "store closed; mutation discarded");
            return None;
        }
        let mut store = match self.inner.store.lock() {
            Ok(store) => store,
            Err(_) => {
                warn!(op, "store lock poisoned; mutation discarded");
                return None;
            }
        };
        if self.is_closed() {
            debug!(op, "store closed while waiting for lock; mutation discarded");
            return None;
        }
        let result = apply(&mut *store);
        // Published while still holding the lock so views go out in mutation order.
        self.inner.view_tx.send_replace(store.view());
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::tests::notification;

    fn ids(store: &NotificationStore) -> Vec<&str> {
        store.notifications().iter().map(|n| n.id.as_str()).collect()
    }

    fn assert_counter(store: &NotificationStore) {
        assert_eq!(store.unread_count(), store.count_unread());
    }

    #[test]
    fn push_into_empty_store() {
        let mut store = NotificationStore::new(100);
        assert!(store.push(notification("n1", 0, false)));
        assert_eq!(store.unread_count(), 1);
        assert_eq!(ids(&store), ["n1"]);
    }

    #[test]
    fn pushes_stay_newest_first() {
        let mut store = NotificationStore::new(100);
        for (i, id) in ["a", "b", "c", "d"].into_iter().enumerate() {
            store.push(notification(id, i as u32, i % 2 == 0));
            assert_counter(&store);
        }
        assert_eq!(ids(&store), ["d", "c", "b", "a"]);
        let mut sorted = store.notifications().to_vec();
        sorted.sort_by(Notification::newest_first);
        assert_eq!(sorted, store.notifications());
    }

    #[test]
    fn mark_all_read_clears_counter() {
        let mut store = NotificationStore::new(100);
        store.replace_all(
            vec![notification("n1", 2, false), notification("n2", 1, true)],
            1,
        );
        assert_eq!(store.unread_count(), 1);

        assert_eq!(store.mark_all_read(), 1);
        assert!(store.notifications().iter().all(|n| n.is_read));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn remove_unread_decrements() {
        let mut store = NotificationStore::new(100);
        store.replace_all(
            vec![notification("n1", 2, false), notification("n2", 1, false)],
            2,
        );
        assert!(store.remove("n1"));
        assert_eq!(ids(&store), ["n2"]);
        assert_eq!(store.unread_count(), 1);
        assert!(!store.remove("n1"));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn mark_read_twice_decrements_once() {
        let mut store = NotificationStore::new(100);
        store.push(notification("a", 0, false));
        store.push(notification("b", 1, false));
        assert!(store.mark_read("a"));
        assert!(!store.mark_read("a"));
        assert!(!store.mark_read("missing"));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn snapshot_merges_with_pushed_entries() {
        let mut store = NotificationStore::new(100);
        store.push(notification("a", 10, false));
        store.replace_all(vec![notification("b", 5, false)], 1);
        assert_eq!(ids(&store), ["a", "b"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn snapshot_dedupes_and_keeps_confirmed_reads() {
        let mut store = NotificationStore::new(100);
        store.push(notification("a", 3, false));
        store.mark_read("a");
        store.replace_all(
            vec![
                notification("a", 3, false),
                notification("b", 4, false),
                notification("b", 4, false),
            ],
            // Deliberately wrong; the counted value must win.
            7,
        );
        assert_eq!(ids(&store), ["b", "a"]);
        assert!(store.get("a").unwrap().is_read);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn stale_snapshot_does_not_resurrect_deleted() {
        let mut store = NotificationStore::new(100);
        store.push(notification("a", 1, false));
        store.remove("a");
        store.replace_all(vec![notification("a", 1, false)], 1);
        assert!(store.notifications().is_empty());
        assert_eq!(store.unread_count(), 0);

        store.push(notification("a", 1, false));
        assert_eq!(ids(&store), ["a"]);
    }

    #[test]
    fn duplicate_push_replaces_without_double_count() {
        let mut store = NotificationStore::new(100);
        store.push(notification("a", 1, false));
        store.push(notification("b", 2, false));
        assert!(!store.push(notification("a", 1, false)));
        assert_eq!(ids(&store), ["a", "b"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn capacity_drops_oldest_and_their_unread() {
        let mut store = NotificationStore::new(2);
        store.push(notification("a", 1, false));
        store.push(notification("b", 2, true));
        store.push(notification("c", 3, false));
        assert_eq!(ids(&store), ["c", "b"]);
        assert_eq!(store.unread_count(), 1);
        assert_counter(&store);
    }

    #[test]
    fn counter_holds_across_mixed_sequence() {
        let mut store = NotificationStore::new(5);
        for step in 0..40u32 {
            let id = format!("n{}", step % 7);
            match step % 5 {
                0 | 1 => {
                    store.push(notification(&id, step % 60, step % 3 == 0));
                }
                2 => {
                    store.mark_read(&id);
                }
                3 => {
                    store.remove(&id);
                }
                _ => {
                    if step % 10 == 4 {
                        store.mark_all_read();
                    } else {
                        store.replace_all(vec![notification(&id, step % 60, false)], 1);
                    }
                }
            }
            assert_counter(&store);
        }
    }

    #[test]
    fn shared_store_publishes_each_mutation() {
        let shared = SharedStore::new(100);
        let mut rx = shared.subscribe();
        shared.push(notification("n1", 0, false));
        assert!(rx.has_changed().unwrap());
        let view = rx.borrow_and_update().clone();
        assert_eq!(view.unread_count, 1);
        assert_eq!(view.notifications.len(), 1);
    }

    #[test]
    fn closed_store_discards_mutations() {
        let shared = SharedStore::new(100);
        shared.push(notification("n1", 0, false));
        shared.close();
        assert!(!shared.push(notification("n2", 1, false)));
        assert!(!shared.mark_read("n1"));
        assert_eq!(shared.view().notifications.len(), 1);
        assert_eq!(shared.unread_count(), 1);
    }

    #[test]
    fn close_waits_for_in_flight_mutation_and_blocks_later_ones() {
        let shared = SharedStore::new(100);
        let mut rx = shared.subscribe();
        let guard = shared.inner.store.lock().unwrap();

        let closer = {
            let shared = shared.clone();
            std::thread::spawn(move || shared.close())
        };
        let pusher = {
            let shared = shared.clone();
            std::thread::spawn(move || shared.push(notification("late", 0, false)))
        };
        std::thread::sleep(std::time::Duration::from_millis(50));
        drop(guard);
        closer.join().unwrap();
        let pushed = pusher.join().unwrap();

        assert!(shared.is_closed());
        assert!(!shared.push(notification("after", 1, false)));
        // Either the push won the lock before close, or it was dropped; never half-applied.
        let view = shared.view();
        assert_eq!(view.notifications.len(), usize::from(pushed));
        assert_eq!(view.unread_count, usize::from(pushed));
        assert_eq!(rx.has_changed().unwrap(), pushed);
    }
}

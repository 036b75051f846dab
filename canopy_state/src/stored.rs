// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Stored state cells with staged writes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::host_handle::{HostHandle, PendingCommit};
use crate::location::Location;
use crate::transaction::Transaction;

struct Inner<T> {
    /// The committed value — what the dataflow graph last saw.
    value: T,
    /// Staged writes in arrival order, not yet committed by the host.
    pending: VecDeque<T>,
}

/// A host-owned mutable state cell.
///
/// Writes can come from any thread and are *staged*: [`get`](Location::get)
/// sees the newest staged value immediately, but the committed value — the
/// one the dataflow graph reads via [`update`](Location::update) — only
/// advances when the owning host drains its commit queue on its own
/// context. This is what makes "write from a background thread, views
/// update on the main context" safe.
///
/// Cell semantics:
///
/// - Writing the current (staged or committed) value again is dropped.
/// - Writing during an update pass is a programmer error: the write is
///   logged and dropped, never applied mid-update.
/// - Writing to a cell whose host is gone clears the stage and drops the
///   write silently.
/// - Commits apply in write order (FIFO), oldest first.
pub struct StoredLocation<T> {
    host: HostHandle,
    inner: Mutex<Inner<T>>,
    was_read: AtomicBool,
    /// Set by a commit, consumed by the next `update`.
    changed: AtomicBool,
    on_commit: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
    weak_self: Weak<StoredLocation<T>>,
}

impl<T> StoredLocation<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a cell owned by `host`.
    #[must_use]
    pub fn new(value: T, host: HostHandle) -> Arc<Self> {
        Arc::new_cyclic(|weak_self| Self {
            host,
            inner: Mutex::new(Inner {
                value,
                pending: VecDeque::new(),
            }),
            was_read: AtomicBool::new(false),
            changed: AtomicBool::new(false),
            on_commit: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Returns the handle of the owning host.
    #[must_use]
    pub fn host(&self) -> &HostHandle {
        &self.host
    }

    /// Installs the callback run after each commit, on the committing
    /// context. Hosts use this to invalidate the cell's graph attribute.
    pub fn set_on_commit(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.on_commit.lock() = Some(Box::new(f));
    }

    /// Returns `true` if writes are staged but not yet committed.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.inner.lock().pending.is_empty()
    }
}

impl<T> Location for StoredLocation<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    type Value = T;

    fn get(&self) -> T {
        let inner = self.inner.lock();
        inner.pending.back().unwrap_or(&inner.value).clone()
    }

    fn set(&self, value: T, _transaction: &Transaction) {
        if !self.host.is_valid() {
            self.inner.lock().pending.clear();
            return;
        }
        if self.host.is_updating() {
            tracing::error!("state write during a view update was ignored");
            return;
        }
        {
            let mut inner = self.inner.lock();
            let current = inner.pending.back().unwrap_or(&inner.value);
            if *current == value {
                return;
            }
            inner.pending.push_back(value);
        }
        if let Some(this) = self.weak_self.upgrade() {
            self.host.enqueue(this);
        }
    }

    fn was_read(&self) -> bool {
        self.was_read.load(Ordering::Relaxed)
    }

    fn set_was_read(&self, read: bool) {
        self.was_read.store(read, Ordering::Relaxed);
    }

    fn update(&self) -> (T, bool) {
        let value = self.inner.lock().value.clone();
        (value, self.changed.swap(false, Ordering::AcqRel))
    }
}

impl<T> PendingCommit for StoredLocation<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn cell_id(&self) -> usize {
        core::ptr::from_ref(self).cast::<()>() as usize
    }

    fn commit(&self) -> bool {
        let more = {
            let mut inner = self.inner.lock();
            let Some(next) = inner.pending.pop_front() else {
                return false;
            };
            inner.value = next;
            !inner.pending.is_empty()
        };
        self.changed.store(true, Ordering::Release);
        if let Some(f) = self.on_commit.lock().as_ref() {
            f();
        }
        more
    }
}

impl<T> core::fmt::Debug for StoredLocation<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StoredLocation")
            .field("pending", &self.inner.lock().pending.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cell(value: i32) -> (Arc<StoredLocation<i32>>, HostHandle) {
        let host = HostHandle::new();
        (StoredLocation::new(value, host.clone()), host)
    }

    #[test]
    fn reads_see_staged_writes_immediately() {
        let (cell, _host) = cell(0);
        cell.set(1, &Transaction::new());
        cell.set(2, &Transaction::new());

        assert_eq!(cell.get(), 2);
        // The committed value is unchanged until the host commits.
        assert_eq!(cell.update().0, 0);
    }

    #[test]
    fn commits_apply_in_write_order() {
        let (cell, _host) = cell(0);
        cell.set(1, &Transaction::new());
        cell.set(2, &Transaction::new());
        cell.set(3, &Transaction::new());

        assert!(cell.commit());
        assert_eq!(cell.update(), (1, true));
        assert!(cell.commit());
        assert!(!cell.commit());
        assert_eq!(cell.update(), (3, true));
        // No change since the last update.
        assert_eq!(cell.update(), (3, false));
        assert!(!cell.has_pending());
    }

    #[test]
    fn equal_write_is_dropped() {
        let (cell, host) = cell(5);
        cell.set(5, &Transaction::new());
        assert!(!cell.has_pending());
        assert!(!host.has_pending_commits());

        cell.set(6, &Transaction::new());
        // Re-writing the staged value is also dropped.
        cell.set(6, &Transaction::new());
        assert_eq!(cell.inner.lock().pending.len(), 1);
    }

    #[test]
    fn write_during_update_is_ignored() {
        let (cell, host) = cell(0);
        host.set_updating(true);
        cell.set(9, &Transaction::new());
        host.set_updating(false);

        assert_eq!(cell.get(), 0);
        assert!(!cell.has_pending());
    }

    #[test]
    fn write_to_dead_host_clears_the_stage() {
        let (cell, host) = cell(0);
        cell.set(1, &Transaction::new());
        host.invalidate();

        cell.set(2, &Transaction::new());
        assert!(!cell.has_pending());
        assert_eq!(cell.get(), 0);
    }

    #[test]
    fn commit_runs_the_callback() {
        let (cell, _host) = cell(0);
        let hits = Arc::new(AtomicBool::new(false));
        let hits2 = hits.clone();
        cell.set_on_commit(move || hits2.store(true, Ordering::Relaxed));

        cell.set(1, &Transaction::new());
        cell.commit();
        assert!(hits.load(Ordering::Relaxed));
    }

    #[test]
    fn enqueue_reaches_the_host_queue_once() {
        let (cell, host) = cell(0);
        cell.set(1, &Transaction::new());
        cell.set(2, &Transaction::new());

        let commits = host.drain_commits();
        assert_eq!(commits.len(), 1);
        // Draining the single entry applies both writes, oldest first.
        while commits[0].commit() {}
        assert_eq!(cell.update(), (2, true));
    }
}

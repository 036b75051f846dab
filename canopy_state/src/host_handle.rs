// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The seam between state cells and the host that owns them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// A staged change waiting for the owning host to commit it.
///
/// Implemented by state cells; the host drains its [`HostHandle`] queue and
/// calls [`commit`](Self::commit) on the owning context.
pub trait PendingCommit: Send + Sync {
    /// Identity used to collapse repeated enqueues of the same cell.
    fn cell_id(&self) -> usize;

    /// Applies the oldest staged change.
    ///
    /// Returns `true` if more staged changes remain.
    fn commit(&self) -> bool;
}

struct HostShared {
    valid: AtomicBool,
    updating: AtomicBool,
    queue: Mutex<Vec<Arc<dyn PendingCommit>>>,
    wake: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

/// A cheap handle to the host owning a set of state cells.
///
/// The handle carries exactly what cells need: *am I still attached?*
/// (tearing the host down turns every cell operation into a no-op), *is an
/// update pass running?* (writes during updates are rejected), and the
/// commit queue plus wake callback that get staged writes onto the host's
/// context.
///
/// Handles are `Send + Sync` and cloneable; cells keep one, the host keeps
/// one, and no reference cycle forms because hosts own cells only through
/// this queue.
#[derive(Clone)]
pub struct HostHandle {
    shared: Arc<HostShared>,
}

impl Default for HostHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl HostHandle {
    /// Creates a live handle with no wake callback installed.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(HostShared {
                valid: AtomicBool::new(true),
                updating: AtomicBool::new(false),
                queue: Mutex::new(Vec::new()),
                wake: Mutex::new(None),
            }),
        }
    }

    /// Returns `true` if both handles belong to the same host.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether the host is still alive.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.shared.valid.load(Ordering::Acquire)
    }

    /// Marks the host dead. Idempotent; drops any queued commits.
    pub fn invalidate(&self) {
        self.shared.valid.store(false, Ordering::Release);
        self.shared.queue.lock().clear();
    }

    /// Whether an update pass is currently running.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.shared.updating.load(Ordering::Acquire)
    }

    /// Brackets an update pass. Set by the host around graph updates.
    pub fn set_updating(&self, updating: bool) {
        self.shared.updating.store(updating, Ordering::Release);
    }

    /// Installs the callback invoked when the queue becomes non-empty.
    pub fn set_wake(&self, wake: impl Fn() + Send + Sync + 'static) {
        *self.shared.wake.lock() = Some(Box::new(wake));
    }

    /// Enqueues a staged change.
    ///
    /// Repeated enqueues of the same cell (by [`PendingCommit::cell_id`])
    /// collapse into one entry. The wake callback fires when the queue
    /// transitions from empty to non-empty. No-op on a dead host.
    pub fn enqueue(&self, commit: Arc<dyn PendingCommit>) {
        if !self.is_valid() {
            return;
        }
        let was_empty = {
            let mut queue = self.shared.queue.lock();
            if queue.iter().any(|c| c.cell_id() == commit.cell_id()) {
                return;
            }
            let was_empty = queue.is_empty();
            queue.push(commit);
            was_empty
        };
        if was_empty
            && let Some(wake) = self.shared.wake.lock().as_ref()
        {
            wake();
        }
    }

    /// Takes every queued commit, in enqueue order.
    #[must_use]
    pub fn drain_commits(&self) -> Vec<Arc<dyn PendingCommit>> {
        core::mem::take(&mut *self.shared.queue.lock())
    }

    /// Returns `true` if commits are waiting.
    #[must_use]
    pub fn has_pending_commits(&self) -> bool {
        !self.shared.queue.lock().is_empty()
    }
}

impl core::fmt::Debug for HostHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostHandle")
            .field("valid", &self.is_valid())
            .field("updating", &self.is_updating())
            .field("pending", &self.has_pending_commits())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct TestCommit {
        id: usize,
        applied: AtomicU32,
    }

    impl PendingCommit for TestCommit {
        fn cell_id(&self) -> usize {
            self.id
        }
        fn commit(&self) -> bool {
            self.applied.fetch_add(1, Ordering::Relaxed);
            false
        }
    }

    #[test]
    fn enqueue_collapses_same_cell_and_wakes_once() {
        let handle = HostHandle::new();
        let wakes = Arc::new(AtomicU32::new(0));
        let wakes2 = wakes.clone();
        handle.set_wake(move || {
            wakes2.fetch_add(1, Ordering::Relaxed);
        });

        let commit = Arc::new(TestCommit {
            id: 1,
            applied: AtomicU32::new(0),
        });
        handle.enqueue(commit.clone());
        handle.enqueue(commit.clone());
        handle.enqueue(Arc::new(TestCommit {
            id: 2,
            applied: AtomicU32::new(0),
        }));

        assert_eq!(wakes.load(Ordering::Relaxed), 1);
        assert_eq!(handle.drain_commits().len(), 2);
        assert!(!handle.has_pending_commits());
    }

    #[test]
    fn dead_host_drops_enqueues() {
        let handle = HostHandle::new();
        handle.enqueue(Arc::new(TestCommit {
            id: 1,
            applied: AtomicU32::new(0),
        }));
        handle.invalidate();
        assert!(!handle.has_pending_commits());

        handle.enqueue(Arc::new(TestCommit {
            id: 2,
            applied: AtomicU32::new(0),
        }));
        assert!(!handle.has_pending_commits());
        assert!(!handle.is_valid());
    }
}

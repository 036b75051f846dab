// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred host instantiation while a design-time preview loads.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::host::HostId;

/// Gates lazy host instantiation during design-time preview loading.
///
/// While the gate is blocked,
/// [`GraphHost::instantiate_if_needed`](crate::GraphHost::instantiate_if_needed)
/// records the host instead of materializing its graph. Once the preview
/// harness is ready it unblocks the gate and [`drain`](Self::drain)s the
/// recorded hosts, instantiating each. The gate is shared by cloning.
#[derive(Clone, Default)]
pub struct PreviewGate {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default, Debug)]
struct Inner {
    blocked: bool,
    deferred: Vec<HostId>,
}

impl core::fmt::Debug for PreviewGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PreviewGate")
            .field("inner", &*self.inner.lock())
            .finish()
    }
}

impl PreviewGate {
    /// An unblocked gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks or unblocks instantiation.
    pub fn set_blocked(&self, blocked: bool) {
        self.inner.lock().blocked = blocked;
    }

    /// `true` while instantiation is deferred.
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.inner.lock().blocked
    }

    /// Records `host` as waiting if the gate is blocked.
    ///
    /// Returns `true` when the host was deferred (and must not
    /// instantiate yet).
    pub fn defer(&self, host: HostId) -> bool {
        let mut inner = self.inner.lock();
        if !inner.blocked {
            return false;
        }
        if !inner.deferred.contains(&host) {
            inner.deferred.push(host);
        }
        true
    }

    /// Unblocks the gate and hands back every deferred host, in the order
    /// they were deferred, to be instantiated by the caller.
    #[must_use]
    pub fn drain(&self) -> Vec<HostId> {
        let mut inner = self.inner.lock();
        inner.blocked = false;
        std::mem::take(&mut inner.deferred)
    }
}

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wiring a nested host's preference output into its parent host.

use canopy_graph::WeakAttribute;
use canopy_preference::{AnyPreferenceKey, HostPreferencesChild, PreferenceKeys};

use crate::host::GraphHost;

/// Bridges a child host's preferences into a parent host.
///
/// The bridge tracks exactly what it contributed — `(keys, values)`
/// attribute pairs into the parent's combiner, plus requested keys
/// forwarded upward — so [`invalidate`](Self::invalidate) can unwind all
/// of it when the child goes away. A bridge must be invalidated before it
/// is dropped; the contributed attributes must not outlive the child host
/// that owns them.
#[derive(Debug)]
pub struct PreferenceBridge {
    children: Vec<HostPreferencesChild>,
    requested: Vec<AnyPreferenceKey>,
    valid: bool,
}

impl Default for PreferenceBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl PreferenceBridge {
    /// A bridge with no contributions yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            children: Vec::new(),
            requested: Vec::new(),
            valid: true,
        }
    }

    /// `false` once the bridge has been invalidated.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Contributes a child subtree's `(keys, values)` pair to `parent`'s
    /// combiner.
    pub fn add_value(&mut self, parent: &mut GraphHost, child: HostPreferencesChild) {
        if !self.valid {
            return;
        }
        self.children.push(child);
        parent.add_preference_child(child);
    }

    /// Withdraws the pair registered with this keys attribute.
    pub fn remove_value(&mut self, parent: &mut GraphHost, keys: WeakAttribute<PreferenceKeys>) {
        if !self.valid {
            return;
        }
        if let Some(pos) = self.children.iter().position(|c| c.keys == keys) {
            self.children.remove(pos);
            parent.remove_preference_child(keys);
        }
    }

    /// Forwards a child-side preference request to the parent.
    pub fn add_requested_key(&mut self, parent: &mut GraphHost, key: AnyPreferenceKey) {
        if !self.valid || self.requested.contains(&key) {
            return;
        }
        self.requested.push(key);
        parent.add_preference_key(key);
    }

    /// Withdraws a forwarded request.
    pub fn remove_requested_key(&mut self, parent: &mut GraphHost, key: &AnyPreferenceKey) {
        if !self.valid {
            return;
        }
        if let Some(pos) = self.requested.iter().position(|k| k == key) {
            self.requested.remove(pos);
            parent.remove_preference_key(key);
        }
    }

    /// Unwinds every contribution from `parent`. Idempotent; the bridge
    /// accepts no further work afterwards.
    pub fn invalidate(&mut self, parent: &mut GraphHost) {
        if !self.valid {
            return;
        }
        self.valid = false;
        for child in self.children.drain(..) {
            parent.remove_preference_child(child.keys);
        }
        for key in self.requested.drain(..) {
            parent.remove_preference_key(&key);
        }
    }
}

impl Drop for PreferenceBridge {
    fn drop(&mut self) {
        if self.valid && (!self.children.is_empty() || !self.requested.is_empty()) {
            tracing::error!("preference bridge dropped without invalidation");
        }
    }
}

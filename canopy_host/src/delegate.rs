// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The callback surface a host's embedder implements.

/// Callbacks from a [`GraphHost`](crate::GraphHost) to its embedding layer.
///
/// The host decides when these fire; the embedder decides what they do —
/// typically rebuilding view bodies and scheduling a frame. All methods
/// default to no-ops so a delegate only implements what it reacts to.
pub trait GraphDelegate {
    /// A batch of graph changes has been applied; dependent output (a
    /// rendered frame, say) is stale.
    fn graph_did_change(&mut self) {}

    /// The host-readable preference values may have changed.
    fn preferences_did_change(&mut self) {}

    /// A transaction bucket is about to be applied.
    fn begin_transaction(&mut self) {}

    /// The host wants a full recomputation pass driven by the embedder
    /// (outside transaction batching).
    fn update_graph(&mut self) {}
}

/// A delegate that ignores every callback.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopDelegate;

impl GraphDelegate for NoopDelegate {}

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Host: the update loop around an attribute graph.
//!
//! A [`GraphHost`] owns a [`canopy_graph::Graph`] and turns raw
//! invalidations into batched, transaction-tagged update work:
//!
//! - **Delegates** ([`GraphDelegate`]): the narrow callback surface the
//!   embedding layer implements — re-render, preference changes,
//!   transaction boundaries. The host decides *when* these fire, the
//!   embedder decides *what* they do.
//! - **Mutations** ([`GraphMutation`], [`AsyncTransaction`]): deferred
//!   graph edits, bucketed by the transaction that tagged them and
//!   deduplicated by pairwise combining.
//! - **Host data** ([`GraphHost`]): the per-host well-known attributes —
//!   [`Time`], [`Phase`], environment, transaction — plus constant
//!   interning and host-readable preference output.
//! - **Input threading** ([`GraphInputs`]): the implicit parameter pack
//!   handed down during tree construction, with a structural-reuse check
//!   ([`GraphReusable`], [`ReusableInputs`]) that redirects existing graph
//!   nodes to new sources instead of rebuilding matching subtrees.
//! - **Bridging** ([`PreferenceBridge`]): wiring a child host's preference
//!   output into a parent host's combiner, with teardown on either side.
//! - **Tracked environment reads** ([`EnvironmentReader`]): deferred
//!   per-key reads that fall back to the key's default, with a logged
//!   misuse warning, when no environment was ever installed.
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_host::{GraphDelegate, GraphHost};
//!
//! #[derive(Default)]
//! struct Renders(std::rc::Rc<std::cell::Cell<u32>>);
//! impl GraphDelegate for Renders {
//!     fn graph_did_change(&mut self) {
//!         self.0.set(self.0.get() + 1);
//!     }
//! }
//!
//! let renders = std::rc::Rc::new(std::cell::Cell::new(0));
//! let mut host = GraphHost::new(Box::new(Renders(renders.clone())));
//! host.instantiate();
//!
//! host.increment_phase();
//! host.flush_transactions();
//! assert!(renders.get() > 0);
//! ```

mod bridge;
mod delegate;
mod environment;
mod host;
mod inputs;
mod mutation;
mod phase;
mod preview;

pub use bridge::PreferenceBridge;
pub use delegate::{GraphDelegate, NoopDelegate};
pub use environment::EnvironmentReader;
pub use host::{ConstantId, GraphHost, HostId};
pub use inputs::{
    GraphInput, GraphInputOptions, GraphInputs, GraphReusable, IndirectAttributeMap, InputStack,
    ReusableInputs,
};
pub use mutation::{
    AsyncTransaction, CustomGraphMutation, EmptyGraphMutation, GraphMutation,
    InvalidatingGraphMutation, MutationStyle,
};
pub use phase::{Phase, Time};
pub use preview::PreviewGate;

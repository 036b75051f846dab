// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Graph: an attribute graph with demand-driven evaluation.
//!
//! This crate provides the dataflow substrate for an incremental UI core.
//! It models computation as a graph of *attributes* — typed slots that are
//! either externally set values or rule-computed results — with:
//!
//! - **Generation-checked handles** ([`Attribute`], [`WeakAttribute`],
//!   [`RawAttribute`]): arena indices that detect use-after-teardown at read
//!   time instead of dangling.
//! - **Rules** ([`Rule`], [`EvalContext`]): computed attributes whose
//!   dependencies are discovered dynamically — reading an attribute during
//!   evaluation records the edge.
//! - **Memoized demand evaluation** ([`Graph::get`]): a clean attribute is
//!   never recomputed; a dirty one is recomputed at most once per read.
//! - **Eager invalidation** ([`Graph::set`], [`Graph::invalidate_value`]):
//!   changes mark all transitive dependents dirty immediately, so the next
//!   read of any downstream attribute recomputes.
//! - **Subgraph scoping** ([`SubgraphId`]): every attribute belongs to a
//!   subgraph; tearing a subgraph down frees all attributes it transitively
//!   owns and invalidates their handles.
//! - **Version seeds** ([`VersionSeed`]): cheap order-independent change
//!   summaries used by downstream caches to detect "maybe changed".
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_graph::{EvalContext, Graph, Rule};
//!
//! struct Double(canopy_graph::Attribute<i32>);
//!
//! impl Rule for Double {
//!     type Output = i32;
//!     fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> i32 {
//!         ctx.get(self.0) * 2
//!     }
//! }
//!
//! let mut graph = Graph::new();
//! let root = graph.root_subgraph();
//!
//! let input = graph.value(root, 21);
//! let doubled = graph.rule(root, Double(input));
//!
//! assert_eq!(graph.get(doubled), 42);
//!
//! // Setting a new value invalidates dependents; reads recompute on demand.
//! assert!(graph.set(input, 4));
//! assert_eq!(graph.get(doubled), 8);
//!
//! // Writing the same value again is suppressed.
//! assert!(!graph.set(input, 4));
//! ```
//!
//! ## Invalidation Model
//!
//! Invalidation is *eager* and evaluation is *lazy*: a write walks the
//! dependent edges immediately and marks everything downstream dirty, but no
//! rule runs until someone reads it. This keeps writes cheap and batches
//! well — many writes between two reads cost one recomputation.
//!
//! Observers ([`Graph::set_invalidation_observer`],
//! [`Graph::set_update_observer`]) let an embedding host learn that the
//! graph has pending work without polling.
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod attribute;
mod graph;
mod rule;
mod seed;
mod subgraph;

pub use attribute::{Attribute, RawAttribute, WeakAttribute};
pub use graph::Graph;
pub use rule::{EvalContext, Rule};
pub use seed::VersionSeed;
pub use subgraph::SubgraphId;

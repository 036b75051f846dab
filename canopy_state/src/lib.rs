// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy State: mutable state cells, bindings, and projections.
//!
//! This crate provides the read/write half of a declarative UI core:
//!
//! - **Locations** ([`Location`], [`AnyLocation`]): the capability to read
//!   and write a value somewhere — a constant, a closure pair, a stored
//!   cell, a projected view of another location.
//! - **Projections** ([`Projection`]): composable lenses that focus a
//!   location on part of its value while keeping writes working.
//! - **Bindings** ([`Binding`]): the shareable read/write handle handed to
//!   views, carrying the transaction its writes are tagged with.
//! - **Stored cells** ([`State`], [`StoredLocation`]): host-owned mutable
//!   state with staged writes — a write is visible to readers immediately
//!   but only takes effect in the dataflow graph when the owning host
//!   commits it.
//! - **Transactions** ([`Transaction`]): a typed property bag describing
//!   how a change should be applied (animations and the like), with a
//!   thread-current stack ([`with_transaction`]).
//! - **Host seam** ([`HostHandle`]): the narrow interface a host exposes to
//!   its cells — validity, update gating, commit queue, and wakeups —
//!   without cells knowing the host type.
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_state::{Binding, State};
//!
//! let count = State::new(0_i32);
//! let binding: Binding<i32> = count.binding();
//!
//! binding.set(5);
//! assert_eq!(binding.get(), 5);
//!
//! // Focus on part of a value with a projection.
//! let pair = State::new((1_i32, "one"));
//! let first = pair.binding().projecting(canopy_state::FieldProjection::new(
//!     |p: &(i32, &'static str)| p.0,
//!     |p, v| p.0 = v,
//! ));
//! first.set(2);
//! assert_eq!(pair.binding().get(), (2, "one"));
//! ```
//!
//! ## Threading Model
//!
//! Writes are accepted from any thread; their *effects* (graph
//! invalidation, view updates) happen on the context that owns the host.
//! Reads during a host update see a stable snapshot. Misuse — writing
//! state from inside an update pass — is logged and dropped rather than
//! corrupting the update.

mod binding;
mod host_handle;
mod location;
mod projection;
mod state;
mod stored;
mod transaction;

pub use binding::Binding;
pub use host_handle::{HostHandle, PendingCommit};
pub use location::{
    AnyLocation, ConstantLocation, FunctionalLocation, Location, ZipLocation,
};
pub use projection::{
    ComposedProjection, DefaultSubstitution, FieldProjection, ForceUnwrapping, ProjectedLocation,
    Projection,
};
pub use state::State;
pub use stored::StoredLocation;
pub use transaction::{Transaction, TransactionId, TransactionKey, with_transaction};

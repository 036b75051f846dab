// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Preference: bottom-up value aggregation.
//!
//! Preferences flow the opposite way to the environment: descendants
//! publish values, ancestors observe the reduction. This crate provides:
//!
//! - **Typed keys** ([`PreferenceKey`]): the value type, its default, and
//!   the `reduce` step that folds a sibling's value into an accumulator.
//! - **Erased descriptors** ([`AnyPreferenceKey`], [`PreferenceKeys`]):
//!   type-erased key handles (name, identity, monomorphized reducer) and
//!   ordered dedup sets of them, used for "which keys does this subtree
//!   provide / does this host request" bookkeeping.
//! - **Preference lists** ([`PreferenceList`], [`PreferenceValue`]):
//!   persistent heterogeneous key→value lists, each entry carrying the
//!   [`VersionSeed`](canopy_graph::VersionSeed) of the subtree that
//!   produced it, with a cached merged seed for cheap change detection.
//! - **Combiner rules** ([`PreferenceCombiner`], [`PairPreferenceCombiner`],
//!   [`PreferencesAggregator`], [`HostPreferencesCombiner`]): graph rules
//!   that reduce sibling values in view-tree order.
//!
//! Reduction order is always left to right in child order; `reduce` need
//! not be commutative.
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_graph::VersionSeed;
//! use canopy_preference::{PreferenceKey, PreferenceList};
//!
//! struct Badges;
//! impl PreferenceKey for Badges {
//!     type Value = u32;
//!     fn default_value() -> u32 {
//!         0
//!     }
//!     fn reduce(value: &mut u32, next_value: impl FnOnce() -> u32) {
//!         *value += next_value();
//!     }
//! }
//!
//! let left = PreferenceList::new().set::<Badges>(2, VersionSeed::from_version(1));
//! let right = PreferenceList::new().set::<Badges>(3, VersionSeed::from_version(2));
//!
//! let merged = left.combine(&right);
//! assert_eq!(merged.get::<Badges>(), 5);
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod combiner;
mod key;
mod list;

pub use combiner::{
    HostPreferencesChild, HostPreferencesCombiner, PairPreferenceCombiner, PreferenceCombiner,
    PreferencesAggregator,
};
pub use key::{AnyPreferenceKey, HostPreferenceKey, PreferenceKey, PreferenceKeys};
pub use list::{PreferenceList, PreferenceValue};

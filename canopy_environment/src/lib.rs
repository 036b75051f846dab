// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Canopy Environment: persistent typed property lists.
//!
//! This crate provides the key/value plumbing for ambient, tree-scoped
//! configuration:
//!
//! - **Typed keys** ([`PropertyKey`]): zero-sized key types carrying the
//!   value type and its default; lookups are keyed by type identity, so
//!   keys from different modules can never collide.
//! - **Persistent lists** ([`PropertyList`]): immutable association lists
//!   with O(1) prepend and full structural sharing. Deriving a child list
//!   from a parent shares the parent's tail; earlier entries shadow later
//!   ones.
//! - **Type filters** ([`TypeFilter`]): a 64-bit conservative summary of
//!   which key types a list may contain, used to skip chain walks.
//! - **Environment values** ([`EnvironmentValues`], [`EnvironmentKey`]):
//!   the tree-scoped configuration surface built on the above.
//!
//! ## Quick Start
//!
//! ```rust
//! use canopy_environment::{PropertyKey, PropertyList};
//!
//! struct FontSize;
//!
//! impl PropertyKey for FontSize {
//!     type Value = f32;
//!     fn default_value() -> f32 {
//!         13.0
//!     }
//!     fn values_equal(a: &f32, b: &f32) -> bool {
//!         a == b
//!     }
//! }
//!
//! let parent = PropertyList::new();
//! assert_eq!(parent.get::<FontSize>(), 13.0);
//!
//! let mut child = parent.clone();
//! child.set::<FontSize>(17.0);
//!
//! assert_eq!(child.get::<FontSize>(), 17.0);
//! // The parent is untouched; the child shares its tail.
//! assert_eq!(parent.get::<FontSize>(), 13.0);
//! ```
//!
//! ## `no_std` Support
//!
//! This crate is `no_std` and uses `alloc`. It does not depend on `std`.

#![no_std]

extern crate alloc;

mod filter;
mod key;
mod list;
mod values;

pub use filter::TypeFilter;
pub use key::PropertyKey;
pub use list::PropertyList;
pub use values::{EnvironmentKey, EnvironmentValues};

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Environment values: the tree-scoped configuration surface.

use core::fmt;

use crate::key::PropertyKey;
use crate::list::PropertyList;

/// Marker for [`PropertyKey`]s that participate in the environment.
///
/// Keys opt in so that transaction-only or host-internal properties cannot
/// be read through [`EnvironmentValues`] by accident.
pub trait EnvironmentKey: PropertyKey {}

/// The ambient configuration of a view subtree.
///
/// A thin wrapper over [`PropertyList`] restricted to [`EnvironmentKey`]s.
/// Environments flow down the tree: a child derives its environment by
/// cloning the parent's (O(1), structurally shared) and overriding entries.
///
/// # Example
///
/// ```
/// use canopy_environment::{EnvironmentKey, EnvironmentValues, PropertyKey};
///
/// struct Emphasis;
/// impl PropertyKey for Emphasis {
///     type Value = bool;
///     fn default_value() -> bool {
///         false
///     }
///     fn values_equal(a: &bool, b: &bool) -> bool {
///         a == b
///     }
/// }
/// impl EnvironmentKey for Emphasis {}
///
/// let mut env = EnvironmentValues::new();
/// assert!(!env.get::<Emphasis>());
/// env.set::<Emphasis>(true);
/// assert!(env.get::<Emphasis>());
/// ```
#[derive(Clone, Default)]
pub struct EnvironmentValues {
    plist: PropertyList,
}

impl EnvironmentValues {
    /// Creates an environment with every key at its default.
    #[must_use]
    pub fn new() -> Self {
        Self {
            plist: PropertyList::new(),
        }
    }

    /// Wraps an existing property list.
    #[must_use]
    pub fn from_property_list(plist: PropertyList) -> Self {
        Self { plist }
    }

    /// Returns the underlying property list.
    #[must_use]
    pub fn property_list(&self) -> &PropertyList {
        &self.plist
    }

    /// Consumes the environment, returning the property list.
    #[must_use]
    pub fn into_property_list(self) -> PropertyList {
        self.plist
    }

    /// Reads a key, falling back to its default when unset.
    #[must_use]
    pub fn get<K: EnvironmentKey>(&self) -> K::Value {
        self.plist.get::<K>()
    }

    /// Returns `true` if the key has been explicitly set.
    #[must_use]
    pub fn contains<K: EnvironmentKey>(&self) -> bool {
        self.plist.contains::<K>()
    }

    /// Sets a key, shadowing inherited values.
    pub fn set<K: EnvironmentKey>(&mut self, value: K::Value) {
        self.plist.set::<K>(value);
    }

    /// Conservative inequality pre-check, see
    /// [`PropertyList::may_not_be_equal`].
    #[must_use]
    pub fn may_not_be_equal(&self, other: &Self) -> bool {
        self.plist.may_not_be_equal(&other.plist)
    }
}

impl fmt::Debug for EnvironmentValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EnvironmentValues").field(&self.plist).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Emphasis;
    impl PropertyKey for Emphasis {
        type Value = bool;
        fn default_value() -> bool {
            false
        }
        fn values_equal(a: &bool, b: &bool) -> bool {
            a == b
        }
    }
    impl EnvironmentKey for Emphasis {}

    #[test]
    fn inherited_environment_shares_until_overridden() {
        let mut parent = EnvironmentValues::new();
        parent.set::<Emphasis>(true);

        let mut child = parent.clone();
        assert!(!child.may_not_be_equal(&parent));

        child.set::<Emphasis>(false);
        assert!(child.may_not_be_equal(&parent));
        assert!(parent.get::<Emphasis>());
        assert!(!child.get::<Emphasis>());
    }
}

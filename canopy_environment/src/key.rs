// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Typed property keys.

/// A typed key into a [`PropertyList`](crate::PropertyList).
///
/// Implementors are usually uninhabited or zero-sized marker types; the key
/// *type* is the identity, never a key value. The associated `Value` must be
/// cloneable and sendable, since property lists are shared across threads.
///
/// # Example
///
/// ```
/// use canopy_environment::PropertyKey;
///
/// enum LineLimit {}
///
/// impl PropertyKey for LineLimit {
///     type Value = Option<u32>;
///     fn default_value() -> Option<u32> {
///         None
///     }
///     fn values_equal(a: &Option<u32>, b: &Option<u32>) -> bool {
///         a == b
///     }
/// }
/// ```
pub trait PropertyKey: 'static {
    /// The value stored under this key.
    type Value: Clone + Send + Sync + 'static;

    /// The value reported when no entry for this key is present.
    fn default_value() -> Self::Value;

    /// Conservative equality used for write suppression.
    ///
    /// Returning `false` means "may differ" and is always allowed; the
    /// default says so unconditionally. Keys whose values are cheap to
    /// compare should override this so redundant writes are dropped.
    fn values_equal(a: &Self::Value, b: &Self::Value) -> bool {
        let _ = (a, b);
        false
    }
}

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Version seeds: cheap order-independent change summaries.

use core::fmt;

/// A compact summary of "which versions contributed to this value".
///
/// Seeds let downstream caches answer "may this have changed since I last
/// looked?" without comparing the values themselves. A seed is derived from
/// the monotonic version counter of a [`Graph`](crate::Graph): every change
/// to an attribute stamps it with a fresh, strictly increasing version.
///
/// Merging takes the maximum of the two versions, which makes [`merge`]
/// commutative, associative, and idempotent — merging the same contribution
/// twice yields the same seed as merging it once. [`VersionSeed::INVALID`]
/// is absorbing: once any contributor is invalid, the merged seed is
/// invalid and every comparison against it reports "may differ".
///
/// [`merge`]: VersionSeed::merge
///
/// # Example
///
/// ```
/// use canopy_graph::VersionSeed;
///
/// let a = VersionSeed::from_version(3);
/// let b = VersionSeed::from_version(7);
///
/// assert_eq!(a.merge(b), b.merge(a));
/// assert_eq!(a.merge(b).merge(b), a.merge(b));
/// assert!(!a.may_not_be_equal(a));
/// assert!(a.may_not_be_equal(b));
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct VersionSeed(u64);

impl VersionSeed {
    /// The seed of a value with no contributions yet.
    pub const EMPTY: Self = Self(0);

    /// The absorbing "unknown" seed.
    ///
    /// Comparisons involving an invalid seed always report "may differ".
    pub const INVALID: Self = Self(u64::MAX);

    /// Creates a seed from a graph version counter value.
    #[inline]
    #[must_use]
    pub const fn from_version(version: u64) -> Self {
        Self(version)
    }

    /// Returns the raw version this seed carries.
    #[inline]
    #[must_use]
    pub const fn version(self) -> u64 {
        self.0
    }

    /// Returns `true` if no contribution has been merged in.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == Self::EMPTY.0
    }

    /// Returns `true` if this seed no longer tracks its contributors.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == Self::INVALID.0
    }

    /// Merges two seeds.
    ///
    /// Commutative, associative, and idempotent; [`INVALID`](Self::INVALID)
    /// absorbs.
    #[inline]
    #[must_use]
    pub const fn merge(self, other: Self) -> Self {
        if self.0 > other.0 { self } else { other }
    }

    /// Conservative inequality pre-check.
    ///
    /// Returns `false` only when the two seeds are certainly equal. A `true`
    /// result means the underlying values *may* differ and must be compared
    /// (or recomputed) to know. Invalid seeds always return `true`.
    #[inline]
    #[must_use]
    pub const fn may_not_be_equal(self, other: Self) -> bool {
        self.is_invalid() || other.is_invalid() || self.0 != other.0
    }
}

impl Default for VersionSeed {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for VersionSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_invalid() {
            write!(f, "VersionSeed(INVALID)")
        } else {
            write!(f, "VersionSeed({})", self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_commutative_and_idempotent() {
        let a = VersionSeed::from_version(3);
        let b = VersionSeed::from_version(9);

        assert_eq!(a.merge(b), b.merge(a));
        assert_eq!(a.merge(b), VersionSeed::from_version(9));
        assert_eq!(a.merge(b).merge(a), a.merge(b));
        assert_eq!(a.merge(a), a);
    }

    #[test]
    fn invalid_absorbs() {
        let a = VersionSeed::from_version(3);

        assert!(a.merge(VersionSeed::INVALID).is_invalid());
        assert!(VersionSeed::INVALID.merge(a).is_invalid());
    }

    #[test]
    fn may_not_be_equal_is_conservative() {
        let a = VersionSeed::from_version(3);
        let b = VersionSeed::from_version(4);

        // Equal seeds are certainly equal.
        assert!(!a.may_not_be_equal(a));
        // Different seeds may differ.
        assert!(a.may_not_be_equal(b));
        // Invalid never vouches for equality, not even with itself.
        assert!(VersionSeed::INVALID.may_not_be_equal(VersionSeed::INVALID));
    }

    #[test]
    fn empty_is_default() {
        assert_eq!(VersionSeed::default(), VersionSeed::EMPTY);
        assert!(VersionSeed::EMPTY.is_empty());
        assert!(!VersionSeed::from_version(1).is_empty());
    }
}

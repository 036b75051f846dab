// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Conservative type-set filters.

use core::any::TypeId;
use core::fmt;
use core::hash::{Hash, Hasher};

/// A 64-bit conservative summary of a set of key types.
///
/// Each type hashes to one bit. Membership tests can report false
/// positives but never false negatives, so a filter miss is a definitive
/// "not present" answer that skips the full lookup.
///
/// # Example
///
/// ```
/// use canopy_environment::TypeFilter;
///
/// let mut filter = TypeFilter::EMPTY;
/// filter.insert::<u32>();
///
/// assert!(filter.may_contain::<u32>());
/// // A miss is definitive.
/// if !filter.may_contain::<&'static str>() {
///     // certainly absent
/// }
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Default)]
pub struct TypeFilter(u64);

impl TypeFilter {
    /// The filter of the empty set.
    pub const EMPTY: Self = Self(0);

    /// Creates a filter containing exactly one type.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self(type_bit(TypeId::of::<T>()))
    }

    /// Creates a filter from a raw type id.
    #[must_use]
    pub fn of_id(id: TypeId) -> Self {
        Self(type_bit(id))
    }

    /// Returns `true` if no type has been inserted.
    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Adds a type to the set.
    #[inline]
    pub fn insert<T: 'static>(&mut self) {
        self.0 |= type_bit(TypeId::of::<T>());
    }

    /// Adds a raw type id to the set.
    #[inline]
    pub fn insert_id(&mut self, id: TypeId) {
        self.0 |= type_bit(id);
    }

    /// Returns the union of two filters.
    #[inline]
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns `true` if `T` may be in the set.
    ///
    /// A `false` result is definitive: `T` was never inserted.
    #[inline]
    #[must_use]
    pub fn may_contain<T: 'static>(self) -> bool {
        self.may_contain_id(TypeId::of::<T>())
    }

    /// Like [`may_contain`](Self::may_contain) for a raw type id.
    #[inline]
    #[must_use]
    pub fn may_contain_id(self, id: TypeId) -> bool {
        let bit = type_bit(id);
        self.0 & bit == bit
    }

    /// Returns `true` if every type in `other` may also be in `self`.
    #[inline]
    #[must_use]
    pub const fn may_contain_all(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl fmt::Debug for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeFilter({:#018x})", self.0)
    }
}

/// FNV-1a over the `TypeId`'s hash bytes, folded to one of 64 bits.
fn type_bit(id: TypeId) -> u64 {
    struct Fnv(u64);
    impl Hasher for Fnv {
        fn finish(&self) -> u64 {
            self.0
        }
        fn write(&mut self, bytes: &[u8]) {
            for &b in bytes {
                self.0 ^= u64::from(b);
                self.0 = self.0.wrapping_mul(0x0000_0100_0000_01b3);
            }
        }
    }
    let mut hasher = Fnv(0xcbf2_9ce4_8422_2325);
    id.hash(&mut hasher);
    1 << (hasher.finish() & 63)
}

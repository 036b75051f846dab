// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Attribute handles: generation-checked arena indices.

use core::fmt;
use core::hash::{Hash, Hasher};
use core::marker::PhantomData;

/// An untyped attribute handle.
///
/// A `RawAttribute` is an index into a [`Graph`](crate::Graph)'s slot arena
/// plus the generation the slot had when the attribute was created. When a
/// subgraph is torn down its slots' generations are bumped, so a stale
/// handle is detected by comparison rather than reading freed state.
///
/// Raw handles are what type-erased plumbing (observers, host bookkeeping)
/// traffics in; typed access goes through [`Attribute`].
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct RawAttribute {
    index: u32,
    generation: u32,
}

impl RawAttribute {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// Returns the slot index of this handle.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// Returns the slot generation this handle was created against.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for RawAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawAttribute({}v{})", self.index, self.generation)
    }
}

/// A typed attribute handle.
///
/// `Attribute<T>` is a [`RawAttribute`] tagged with the value type it was
/// created with. Handles are `Copy` and compare by identity (slot index and
/// generation), never by value.
///
/// Reading through a strong handle whose slot has been torn down is a
/// programmer error and panics; use [`WeakAttribute`] when the referent may
/// outlive you.
pub struct Attribute<T> {
    raw: RawAttribute,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Attribute<T> {
    /// Wraps a raw handle, asserting that the slot holds `T`.
    ///
    /// If the assertion is wrong, the mismatch is caught (with a panic) at
    /// the next read through this handle.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: RawAttribute) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped handle.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> RawAttribute {
        self.raw
    }

    /// Returns a weak handle to the same attribute.
    #[inline]
    #[must_use]
    pub const fn downgrade(self) -> WeakAttribute<T> {
        WeakAttribute {
            raw: self.raw,
            _marker: PhantomData,
        }
    }
}

impl<T> Copy for Attribute<T> {}

impl<T> Clone for Attribute<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Attribute<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Attribute<T> {}

impl<T> Hash for Attribute<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Attribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Attribute({}v{})",
            self.raw.index(),
            self.raw.generation()
        )
    }
}

/// A typed attribute handle that tolerates teardown.
///
/// Reads through a weak handle ([`Graph::get_weak`](crate::Graph::get_weak))
/// return `None` once the attribute's subgraph has been invalidated, instead
/// of panicking like a strong [`Attribute`] read.
pub struct WeakAttribute<T> {
    raw: RawAttribute,
    _marker: PhantomData<fn() -> T>,
}

impl<T> WeakAttribute<T> {
    /// Wraps a raw handle, asserting that the slot holds `T`.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: RawAttribute) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the untyped handle.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> RawAttribute {
        self.raw
    }

    /// Reinterprets this handle as strong.
    ///
    /// The slot's liveness is still only checked at read time; prefer
    /// [`Graph::get_weak`](crate::Graph::get_weak) unless liveness is
    /// guaranteed by construction.
    #[inline]
    #[must_use]
    pub const fn assume_live(self) -> Attribute<T> {
        Attribute {
            raw: self.raw,
            _marker: PhantomData,
        }
    }
}

impl<T> Copy for WeakAttribute<T> {}

impl<T> Clone for WeakAttribute<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for WeakAttribute<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for WeakAttribute<T> {}

impl<T> Hash for WeakAttribute<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for WeakAttribute<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WeakAttribute({}v{})",
            self.raw.index(),
            self.raw.generation()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_equality_ignores_type_parameter_value() {
        let raw = RawAttribute::new(3, 1);
        let a = Attribute::<i32>::from_raw(raw);
        let b = Attribute::<i32>::from_raw(raw);
        let c = Attribute::<i32>::from_raw(RawAttribute::new(3, 2));

        assert_eq!(a, b);
        // Same slot, different generation: a different attribute.
        assert_ne!(a, c);
    }

    #[test]
    fn downgrade_preserves_identity() {
        let a = Attribute::<i32>::from_raw(RawAttribute::new(7, 4));
        let w = a.downgrade();

        assert_eq!(w.raw(), a.raw());
        assert_eq!(w.assume_live(), a);
    }
}

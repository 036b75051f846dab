// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bindings: the read/write handles handed to views.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::location::{AnyLocation, ConstantLocation, FunctionalLocation};
use crate::projection::Projection;
use crate::transaction::Transaction;

/// A shareable read/write handle to a value somewhere else.
///
/// A binding pairs a [`location`](AnyLocation) with the [`Transaction`] its
/// writes are tagged with, plus an update-time snapshot cache.
///
/// Reads have two tiers: during a host update pass (bracketed by
/// [`begin_update`](Self::begin_update)/[`end_update`](Self::end_update))
/// every [`get`](Self::get) returns the snapshot taken at the start of the
/// pass, so one pass sees one consistent value. Outside a pass, reads go
/// live through the location.
///
/// # Example
///
/// ```
/// use canopy_state::Binding;
///
/// let binding = Binding::constant(3_i32);
/// assert_eq!(binding.get(), 3);
/// binding.set(9); // constants ignore writes
/// assert_eq!(binding.get(), 3);
/// ```
pub struct Binding<T> {
    location: AnyLocation<T>,
    transaction: Transaction,
    cache: Arc<Mutex<Option<T>>>,
}

impl<T> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            transaction: self.transaction.clone(),
            cache: self.cache.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Binding<T> {
    /// Creates a binding over a location, with the empty transaction.
    #[must_use]
    pub fn new(location: AnyLocation<T>) -> Self {
        Self {
            location,
            transaction: Transaction::new(),
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// A binding that always reads `value` and ignores writes.
    #[must_use]
    pub fn constant(value: T) -> Self {
        Self::new(AnyLocation::new(ConstantLocation::new(value)))
    }

    /// A binding backed by get/set closures.
    #[must_use]
    pub fn from_closures(
        get: impl Fn() -> T + Send + Sync + 'static,
        set: impl Fn(T, &Transaction) + Send + Sync + 'static,
    ) -> Self {
        Self::new(AnyLocation::new(FunctionalLocation::new(get, set)))
    }

    /// Returns the location this binding reads and writes.
    #[must_use]
    pub fn location(&self) -> &AnyLocation<T> {
        &self.location
    }

    /// Returns this binding with its writes tagged by `transaction`.
    ///
    /// The location and snapshot cache are shared with `self`.
    #[must_use]
    pub fn with_transaction(&self, transaction: Transaction) -> Self {
        Self {
            location: self.location.clone(),
            transaction,
            cache: self.cache.clone(),
        }
    }

    /// Reads the value.
    ///
    /// Mid-update this returns the pass snapshot; otherwise it reads live.
    /// Either way the location is marked as read.
    #[must_use]
    pub fn get(&self) -> T {
        self.location.set_was_read(true);
        if let Some(value) = self.cache.lock().as_ref() {
            return value.clone();
        }
        self.location.get()
    }

    /// Writes the value.
    ///
    /// The write is tagged with this binding's transaction layered over the
    /// thread-current one.
    pub fn set(&self, value: T) {
        self.location.set(value, &self.effective_transaction());
    }

    fn effective_transaction(&self) -> Transaction {
        if self.transaction.is_empty() {
            return Transaction::current();
        }
        let mut plist = Transaction::current().property_list().clone();
        plist.override_with(self.transaction.property_list());
        Transaction::from_property_list(plist)
    }

    /// Starts an update pass: snapshots the location into the cache.
    ///
    /// Returns `true` if the value changed since the previous pass.
    pub fn begin_update(&self) -> bool {
        let (value, changed) = self.location.update();
        *self.cache.lock() = Some(value);
        changed
    }

    /// Ends an update pass: reads go live again.
    pub fn end_update(&self) {
        *self.cache.lock() = None;
    }

    /// Focuses this binding on part of its value.
    ///
    /// The projected binding shares the underlying projected location with
    /// any other binding made from the same projection (see
    /// [`AnyLocation::projecting`]) and inherits this binding's
    /// transaction.
    #[must_use]
    pub fn projecting<P>(&self, projection: P) -> Binding<P::Projected>
    where
        P: Projection<Base = T>,
        P::Projected: Clone + Send + Sync + 'static,
    {
        Binding {
            location: self.location.projecting(projection),
            transaction: self.transaction.clone(),
            cache: Arc::new(Mutex::new(None)),
        }
    }
}

impl<T> core::fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Binding")
            .field("location", &self.location)
            .field("transaction", &self.transaction)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::FieldProjection;

    #[test]
    fn closure_binding_round_trips() {
        let cell = Arc::new(Mutex::new(1_i32));
        let (read, write) = (cell.clone(), cell.clone());
        let binding = Binding::from_closures(move || *read.lock(), move |v, _| *write.lock() = v);

        assert_eq!(binding.get(), 1);
        binding.set(4);
        assert_eq!(binding.get(), 4);
    }

    #[test]
    fn mid_update_reads_return_the_snapshot() {
        let cell = Arc::new(Mutex::new(1_i32));
        let (read, write) = (cell.clone(), cell.clone());
        let binding = Binding::from_closures(move || *read.lock(), move |v, _| *write.lock() = v);

        binding.begin_update();
        // Underlying storage moves on, but the pass sees its snapshot.
        *cell.lock() = 99;
        assert_eq!(binding.get(), 1);

        binding.end_update();
        assert_eq!(binding.get(), 99);
    }

    #[test]
    fn projected_binding_writes_through() {
        #[derive(Clone, PartialEq, Debug)]
        struct Pair {
            left: i32,
            right: i32,
        }

        let cell = Arc::new(Mutex::new(Pair { left: 1, right: 2 }));
        let (read, write) = (cell.clone(), cell.clone());
        let whole =
            Binding::from_closures(move || read.lock().clone(), move |v, _| *write.lock() = v);

        let left = whole.projecting(FieldProjection::new(|p: &Pair| p.left, |p, v| p.left = v));
        assert_eq!(left.get(), 1);
        left.set(10);
        assert_eq!(left.get(), 10);
        // Sibling field untouched.
        assert_eq!(whole.get().right, 2);
    }

    #[test]
    fn projecting_twice_shares_the_location() {
        let whole = Binding::constant((1_i32, 2_i32));
        let p = FieldProjection::new(|t: &(i32, i32)| t.0, |t, v| t.0 = v);
        let a = whole.projecting(p);
        let b = whole.projecting(p);
        assert!(a.location().ptr_eq(b.location()));
    }

    #[test]
    fn binding_transaction_layers_over_current() {
        use canopy_environment::PropertyKey;
        use crate::transaction::{TransactionKey, with_transaction};

        struct Marker;
        impl PropertyKey for Marker {
            type Value = u32;
            fn default_value() -> u32 {
                0
            }
            fn values_equal(a: &u32, b: &u32) -> bool {
                a == b
            }
        }
        impl TransactionKey for Marker {}

        let seen = Arc::new(Mutex::new(0_u32));
        let seen2 = seen.clone();
        let binding = Binding::from_closures(
            || 0_i32,
            move |_, tx| *seen2.lock() = tx.get::<Marker>(),
        );

        let mut tagged = Transaction::new();
        tagged.set::<Marker>(7);
        binding.with_transaction(tagged).set(1);
        assert_eq!(*seen.lock(), 7);

        // An untagged binding picks up the thread-current transaction.
        let mut ambient = Transaction::new();
        ambient.set::<Marker>(3);
        with_transaction(ambient, || {
            binding.set(2);
        });
        assert_eq!(*seen.lock(), 3);

        // A tagged binding's transaction shadows the thread-current one.
        let mut tagged = Transaction::new();
        tagged.set::<Marker>(9);
        let tagged_binding = binding.with_transaction(tagged);
        let mut ambient = Transaction::new();
        ambient.set::<Marker>(3);
        with_transaction(ambient, || {
            tagged_binding.set(3);
        });
        assert_eq!(*seen.lock(), 9);
    }
}

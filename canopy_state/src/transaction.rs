// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transactions: typed property bags describing how changes apply.

use core::cell::RefCell;
use core::fmt;

use canopy_environment::{PropertyKey, PropertyList};

/// Marker for [`PropertyKey`]s that may ride on a [`Transaction`].
///
/// Keys opt in so environment-only properties cannot leak into change
/// descriptions by accident.
pub trait TransactionKey: PropertyKey {}

/// Identifier of one flushed transaction batch.
///
/// Ids are allocated from a thread-local counter, so they are unique per
/// thread and monotonic within it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Allocates the next id on this thread.
    #[must_use]
    pub fn fresh() -> Self {
        NEXT_TRANSACTION_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            Self(id)
        })
    }

    /// Returns the numeric id.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

thread_local! {
    static NEXT_TRANSACTION_ID: core::cell::Cell<u64> = const { core::cell::Cell::new(1) };
    static TRANSACTION_STACK: RefCell<Vec<Transaction>> = const { RefCell::new(Vec::new()) };
}

/// A description of *how* a change should be applied.
///
/// A transaction is an immutable typed property bag (animation parameters,
/// update provenance, ...). The empty transaction means "apply plainly".
/// Writes through a [`Binding`](crate::Binding) are tagged with the
/// binding's transaction merged over the thread-current one.
///
/// # Example
///
/// ```
/// use canopy_environment::PropertyKey;
/// use canopy_state::{Transaction, TransactionKey, with_transaction};
///
/// struct Animated;
/// impl PropertyKey for Animated {
///     type Value = bool;
///     fn default_value() -> bool {
///         false
///     }
///     fn values_equal(a: &bool, b: &bool) -> bool {
///         a == b
///     }
/// }
/// impl TransactionKey for Animated {}
///
/// let mut tx = Transaction::new();
/// tx.set::<Animated>(true);
///
/// with_transaction(tx, || {
///     assert!(Transaction::current().get::<Animated>());
/// });
/// assert!(!Transaction::current().get::<Animated>());
/// ```
#[derive(Clone, Default)]
pub struct Transaction {
    plist: PropertyList,
}

impl Transaction {
    /// Creates an empty transaction.
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

    /// Returns `true` if no properties are set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plist.is_empty()
    }

    /// Returns the underlying property list.
    #[must_use]
    pub fn property_list(&self) -> &PropertyList {
        &self.plist
    }

    /// Reads a key, falling back to its default.
    #[must_use]
    pub fn get<K: TransactionKey>(&self) -> K::Value {
        self.plist.get::<K>()
    }

    /// Sets a key.
    pub fn set<K: TransactionKey>(&mut self, value: K::Value) {
        self.plist.set::<K>(value);
    }

    /// Returns the transaction current on this thread.
    ///
    /// This is the innermost [`with_transaction`] scope, or the empty
    /// transaction outside of any scope.
    #[must_use]
    pub fn current() -> Self {
        TRANSACTION_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Returns `true` if two queued transactions may be merged into one
    /// batch.
    ///
    /// Conservative: only transactions with no properties at all are known
    /// to compose. Anything carrying properties keeps its own batch so
    /// per-batch semantics (animation grouping) are preserved.
    #[must_use]
    pub fn may_concatenate(&self, other: &Self) -> bool {
        self.is_empty() && other.is_empty()
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Transaction").field(&self.plist).finish()
    }
}

/// Runs `f` with `transaction` current on this thread.
///
/// Scopes nest; the innermost wins. The previous current transaction is
/// restored when `f` returns, including on panic-free early returns.
pub fn with_transaction<R>(transaction: Transaction, f: impl FnOnce() -> R) -> R {
    TRANSACTION_STACK.with(|stack| stack.borrow_mut().push(transaction));
    struct PopGuard;
    impl Drop for PopGuard {
        fn drop(&mut self) {
            TRANSACTION_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
    let _guard = PopGuard;
    f()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Animated;
    impl PropertyKey for Animated {
        type Value = bool;
        fn default_value() -> bool {
            false
        }
        fn values_equal(a: &bool, b: &bool) -> bool {
            a == b
        }
    }
    impl TransactionKey for Animated {}

    #[test]
    fn current_is_empty_outside_scopes() {
        assert!(Transaction::current().is_empty());
    }

    #[test]
    fn with_transaction_nests_and_restores() {
        let mut outer = Transaction::new();
        outer.set::<Animated>(true);

        with_transaction(outer, || {
            assert!(Transaction::current().get::<Animated>());

            with_transaction(Transaction::new(), || {
                assert!(!Transaction::current().get::<Animated>());
            });

            assert!(Transaction::current().get::<Animated>());
        });
        assert!(Transaction::current().is_empty());
    }

    #[test]
    fn may_concatenate_requires_both_empty() {
        let empty = Transaction::new();
        let mut tagged = Transaction::new();
        tagged.set::<Animated>(true);

        assert!(empty.may_concatenate(&Transaction::new()));
        assert!(!empty.may_concatenate(&tagged));
        assert!(!tagged.may_concatenate(&empty));
    }

    #[test]
    fn ids_are_unique_and_monotonic() {
        let a = TransactionId::fresh();
        let b = TransactionId::fresh();
        assert_ne!(a, b);
        assert!(b.value() > a.value());
    }
}

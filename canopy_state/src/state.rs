// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Owned state: a stored cell plus the bindings it vends.

use std::sync::Arc;

use crate::binding::Binding;
use crate::host_handle::HostHandle;
use crate::location::{AnyLocation, Location};
use crate::stored::StoredLocation;
use crate::transaction::Transaction;

/// An owned piece of mutable state.
///
/// `State` bundles a [`StoredLocation`] with the location handle used by
/// every [`Binding`] it vends, so all bindings to one `State` share a
/// single location identity (and its projection cache).
///
/// # Example
///
/// ```
/// use canopy_state::State;
///
/// let count = State::new(0_i32);
/// let binding = count.binding();
/// binding.set(3);
/// assert_eq!(count.value(), 3);
/// ```
pub struct State<T> {
    location: Arc<StoredLocation<T>>,
    handle: AnyLocation<T>,
}

impl<T> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            location: self.location.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T> State<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates detached state with its own (never-flushed-by-anyone) host
    /// handle. Useful standalone and in tests; in a UI tree, prefer
    /// [`with_host`](Self::with_host) so the owning host commits writes.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self::with_host(value, HostHandle::new())
    }

    /// Creates state owned by `host`.
    #[must_use]
    pub fn with_host(value: T, host: HostHandle) -> Self {
        let location = StoredLocation::new(value, host);
        let handle = AnyLocation::new(location.clone());
        Self { location, handle }
    }

    /// Returns the underlying stored cell.
    #[must_use]
    pub fn stored_location(&self) -> &Arc<StoredLocation<T>> {
        &self.location
    }

    /// Returns a binding to this state.
    #[must_use]
    pub fn binding(&self) -> Binding<T> {
        Binding::new(self.handle.clone())
    }

    /// Reads the current (staged-inclusive) value.
    #[must_use]
    pub fn value(&self) -> T {
        self.location.get()
    }

    /// Writes the value with the thread-current transaction.
    pub fn set_value(&self, value: T) {
        self.location.set(value, &Transaction::current());
    }
}

impl<T> core::fmt::Debug for State<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("State")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bindings_share_one_location() {
        let state = State::new(1_i32);
        let a = state.binding();
        let b = state.binding();
        assert!(a.location().ptr_eq(b.location()));

        a.set(5);
        assert_eq!(b.get(), 5);
        assert_eq!(state.value(), 5);
    }

    #[test]
    fn staged_writes_surface_through_value() {
        let state = State::new(0_i32);
        state.set_value(1);
        state.set_value(2);
        assert_eq!(state.value(), 2);
        // Still staged: the committed value waits for the host.
        assert!(state.stored_location().has_pending());
    }
}

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Locations: the capability to read and write a value somewhere.

use std::any::{Any, TypeId};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;

use parking_lot::Mutex;

use crate::projection::{ProjectedLocation, Projection};
use crate::transaction::Transaction;

/// The capability to read and write a value of one type.
///
/// A location is *where* a value lives — a stored cell, a constant, a
/// closure pair, a focused view of another location. Locations are shared
/// and internally synchronized; all methods take `&self`.
pub trait Location: Send + Sync {
    /// The value this location holds.
    type Value;

    /// Reads the current value.
    fn get(&self) -> Self::Value;

    /// Writes a value, tagged with a transaction.
    fn set(&self, value: Self::Value, transaction: &Transaction);

    /// Whether the value has been read since the flag was last cleared.
    ///
    /// Hosts use this to skip invalidation work for state nobody observed.
    fn was_read(&self) -> bool {
        true
    }

    /// Sets the read-tracking flag.
    fn set_was_read(&self, read: bool) {
        let _ = read;
    }

    /// Reads the value for an update pass, reporting whether it changed
    /// since the previous update.
    fn update(&self) -> (Self::Value, bool) {
        (self.get(), true)
    }
}

impl<L: Location + ?Sized> Location for Arc<L> {
    type Value = L::Value;

    fn get(&self) -> Self::Value {
        (**self).get()
    }

    fn set(&self, value: Self::Value, transaction: &Transaction) {
        (**self).set(value, transaction);
    }

    fn was_read(&self) -> bool {
        (**self).was_read()
    }

    fn set_was_read(&self, read: bool) {
        (**self).set_was_read(read);
    }

    fn update(&self) -> (Self::Value, bool) {
        (**self).update()
    }
}

struct LocationEntry<T> {
    location: Box<dyn Location<Value = T>>,
    /// Cache of projected locations, keyed by projection type and value,
    /// so projecting twice with the same projection yields the same
    /// location identity.
    projections: Mutex<Vec<(TypeId, Box<dyn Any + Send + Sync>, Weak<dyn Any + Send + Sync>)>>,
}

/// A cheap, cloneable, type-erased location handle.
///
/// Two handles are [`ptr_eq`](Self::ptr_eq) when they refer to the same
/// underlying location; equality of handles is identity, never value
/// comparison.
pub struct AnyLocation<T> {
    entry: Arc<LocationEntry<T>>,
}

impl<T> Clone for AnyLocation<T> {
    fn clone(&self) -> Self {
        Self {
            entry: self.entry.clone(),
        }
    }
}

impl<T: 'static> AnyLocation<T> {
    /// Wraps a concrete location.
    #[must_use]
    pub fn new(location: impl Location<Value = T> + 'static) -> Self {
        Self {
            entry: Arc::new(LocationEntry {
                location: Box::new(location),
                projections: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Returns `true` if both handles refer to the same location.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.entry, &other.entry)
    }

    /// Reads the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.entry.location.get()
    }

    /// Writes a value, tagged with a transaction.
    pub fn set(&self, value: T, transaction: &Transaction) {
        self.entry.location.set(value, transaction);
    }

    /// See [`Location::was_read`].
    #[must_use]
    pub fn was_read(&self) -> bool {
        self.entry.location.was_read()
    }

    /// See [`Location::set_was_read`].
    pub fn set_was_read(&self, read: bool) {
        self.entry.location.set_was_read(read);
    }

    /// See [`Location::update`].
    pub fn update(&self) -> (T, bool) {
        self.entry.location.update()
    }

    /// Focuses this location through a projection.
    ///
    /// Projecting twice with an equal projection returns a handle to the
    /// *same* projected location (checked per base location), so identity
    /// comparisons downstream keep working.
    pub fn projecting<P>(&self, projection: P) -> AnyLocation<P::Projected>
    where
        P: Projection<Base = T>,
        T: Clone + Send + Sync,
        P::Projected: Send + Sync + 'static,
    {
        let key = TypeId::of::<P>();
        let mut cache = self.entry.projections.lock();

        // Drop dead entries while scanning for a hit.
        let mut hit: Option<Arc<dyn Any + Send + Sync>> = None;
        cache.retain(|(entry_key, stored, weak)| {
            let Some(live) = weak.upgrade() else {
                return false;
            };
            if hit.is_none()
                && *entry_key == key
                && stored.downcast_ref::<P>() == Some(&projection)
            {
                hit = Some(live);
            }
            true
        });
        if let Some(live) = hit
            && let Ok(entry) = live.downcast::<LocationEntry<P::Projected>>()
        {
            return AnyLocation { entry };
        }

        let entry = Arc::new(LocationEntry {
            location: Box::new(ProjectedLocation::new(self.clone(), projection.clone()))
                as Box<dyn Location<Value = P::Projected>>,
            projections: Mutex::new(Vec::new()),
        });
        let erased: Arc<dyn Any + Send + Sync> = entry.clone();
        cache.push((key, Box::new(projection), Arc::downgrade(&erased)));
        AnyLocation { entry }
    }
}

impl<T> core::fmt::Debug for AnyLocation<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "AnyLocation({:p})", Arc::as_ptr(&self.entry))
    }
}

/// A location holding a fixed value.
///
/// Writes are ignored; [`was_read`](Location::was_read) is always `true`
/// so constants never suppress dependent updates on first read.
pub struct ConstantLocation<T> {
    value: T,
}

impl<T> ConstantLocation<T> {
    /// Creates a constant location.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Clone + Send + Sync> Location for ConstantLocation<T> {
    type Value = T;

    fn get(&self) -> T {
        self.value.clone()
    }

    fn set(&self, _value: T, _transaction: &Transaction) {
        // Constants ignore writes.
    }

    fn update(&self) -> (T, bool) {
        (self.value.clone(), false)
    }
}

impl<T: core::fmt::Debug> core::fmt::Debug for ConstantLocation<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("ConstantLocation").field(&self.value).finish()
    }
}

/// A location backed by a closure pair.
///
/// Optionally thread-affine: a location created with
/// [`thread_affine`](Self::thread_affine) logs a runtime issue when
/// accessed from another thread (and proceeds), since its closures
/// typically capture context owned by the creating thread.
pub struct FunctionalLocation<T> {
    get: Box<dyn Fn() -> T + Send + Sync>,
    set: Box<dyn Fn(T, &Transaction) + Send + Sync>,
    affinity: Option<ThreadId>,
}

impl<T> FunctionalLocation<T> {
    /// Creates a location from get/set closures.
    #[must_use]
    pub fn new(
        get: impl Fn() -> T + Send + Sync + 'static,
        set: impl Fn(T, &Transaction) + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Box::new(get),
            set: Box::new(set),
            affinity: None,
        }
    }

    /// Creates a location pinned to the calling thread.
    #[must_use]
    pub fn thread_affine(
        get: impl Fn() -> T + Send + Sync + 'static,
        set: impl Fn(T, &Transaction) + Send + Sync + 'static,
    ) -> Self {
        Self {
            get: Box::new(get),
            set: Box::new(set),
            affinity: Some(std::thread::current().id()),
        }
    }

    fn check_thread(&self) {
        if let Some(owner) = self.affinity
            && owner != std::thread::current().id()
        {
            tracing::error!("thread-affine location accessed off its owning thread");
        }
    }
}

impl<T: Send + Sync> Location for FunctionalLocation<T> {
    type Value = T;

    fn get(&self) -> T {
        self.check_thread();
        (self.get)()
    }

    fn set(&self, value: T, transaction: &Transaction) {
        self.check_thread();
        (self.set)(value, transaction);
    }
}

impl<T> core::fmt::Debug for FunctionalLocation<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FunctionalLocation")
            .field("affinity", &self.affinity)
            .finish_non_exhaustive()
    }
}

/// Two locations read and written together as a pair.
pub struct ZipLocation<A, B> {
    a: AnyLocation<A>,
    b: AnyLocation<B>,
}

impl<A: 'static, B: 'static> ZipLocation<A, B> {
    /// Pairs two locations.
    #[must_use]
    pub fn new(a: AnyLocation<A>, b: AnyLocation<B>) -> Self {
        Self { a, b }
    }
}

impl<A, B> Location for ZipLocation<A, B>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    type Value = (A, B);

    fn get(&self) -> (A, B) {
        (self.a.get(), self.b.get())
    }

    fn set(&self, value: (A, B), transaction: &Transaction) {
        self.a.set(value.0, transaction);
        self.b.set(value.1, transaction);
    }

    fn was_read(&self) -> bool {
        self.a.was_read() || self.b.was_read()
    }

    fn set_was_read(&self, read: bool) {
        self.a.set_was_read(read);
        self.b.set_was_read(read);
    }

    fn update(&self) -> ((A, B), bool) {
        let (a, changed_a) = self.a.update();
        let (b, changed_b) = self.b.update();
        ((a, b), changed_a || changed_b)
    }
}

impl<A, B> core::fmt::Debug for ZipLocation<A, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ZipLocation")
            .field("a", &self.a)
            .field("b", &self.b)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::FieldProjection;

    #[test]
    fn constant_ignores_writes() {
        let loc = AnyLocation::new(ConstantLocation::new(7_i32));
        loc.set(9, &Transaction::new());
        assert_eq!(loc.get(), 7);
        let (value, changed) = loc.update();
        assert_eq!(value, 7);
        assert!(!changed);
    }

    #[test]
    fn functional_round_trips_through_closures() {
        let cell = Arc::new(Mutex::new(1_i32));
        let read = cell.clone();
        let write = cell.clone();
        let loc = AnyLocation::new(FunctionalLocation::new(
            move || *read.lock(),
            move |v, _tx| *write.lock() = v,
        ));

        assert_eq!(loc.get(), 1);
        loc.set(5, &Transaction::new());
        assert_eq!(loc.get(), 5);
        assert_eq!(*cell.lock(), 5);
    }

    #[test]
    fn handle_identity_is_by_location() {
        let a = AnyLocation::new(ConstantLocation::new(1_i32));
        let b = a.clone();
        let c = AnyLocation::new(ConstantLocation::new(1_i32));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
    }

    #[test]
    fn projecting_twice_returns_the_same_location() {
        #[derive(Clone, PartialEq, Debug)]
        struct Pair {
            left: i32,
            right: i32,
        }

        let base = AnyLocation::new(ConstantLocation::new(Pair { left: 1, right: 2 }));
        let p = FieldProjection::new(|p: &Pair| p.left, |p, v| p.left = v);

        let first = base.projecting(p);
        let second = base.projecting(p);
        assert!(first.ptr_eq(&second));
        assert_eq!(first.get(), 1);

        let q = FieldProjection::new(|p: &Pair| p.right, |p, v| p.right = v);
        let other = base.projecting(q);
        assert!(!first.ptr_eq(&other));
        assert_eq!(other.get(), 2);
    }

    #[test]
    fn zip_reads_and_writes_both_sides() {
        let a_cell = Arc::new(Mutex::new(1_i32));
        let b_cell = Arc::new(Mutex::new("a"));

        let (ar, aw) = (a_cell.clone(), a_cell.clone());
        let a = AnyLocation::new(FunctionalLocation::new(
            move || *ar.lock(),
            move |v, _| *aw.lock() = v,
        ));
        let (br, bw) = (b_cell.clone(), b_cell.clone());
        let b = AnyLocation::new(FunctionalLocation::new(
            move || *br.lock(),
            move |v, _| *bw.lock() = v,
        ));

        let zipped = AnyLocation::new(ZipLocation::new(a, b));
        assert_eq!(zipped.get(), (1, "a"));
        zipped.set((2, "b"), &Transaction::new());
        assert_eq!(zipped.get(), (2, "b"));
    }
}

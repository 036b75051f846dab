// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Projections: composable lenses over location values.

use crate::location::{AnyLocation, Location};
use crate::transaction::Transaction;

/// A bidirectional focus on part of a value.
///
/// Projections obey the lens laws: writing what you read is a no-op, and
/// reading after a write returns the written value (`get(set(b, v)) == v`).
///
/// Projections must be cheap to clone and comparable — equality is what
/// lets a location hand back the *same* projected location for the same
/// projection applied twice.
pub trait Projection: Clone + PartialEq + Send + Sync + 'static {
    /// The whole value.
    type Base;
    /// The focused part.
    type Projected;

    /// Extracts the focused part.
    fn get(&self, base: &Self::Base) -> Self::Projected;

    /// Writes the focused part back into the whole.
    fn set(&self, base: &mut Self::Base, value: Self::Projected);

    /// Composes two projections: `self` first, then `next`.
    fn then<Q>(self, next: Q) -> ComposedProjection<Self, Q>
    where
        Q: Projection<Base = Self::Projected>,
    {
        ComposedProjection {
            first: self,
            second: next,
        }
    }
}

/// A projection built from an accessor pair.
///
/// Uses plain function pointers, so two `FieldProjection`s are equal
/// exactly when they carry the same accessors.
///
/// # Example
///
/// ```
/// use canopy_state::{FieldProjection, Projection};
///
/// struct Point {
///     x: f64,
///     y: f64,
/// }
///
/// let x = FieldProjection::new(|p: &Point| p.x, |p, v| p.x = v);
/// let mut point = Point { x: 1.0, y: 2.0 };
/// x.set(&mut point, 3.0);
/// assert_eq!(x.get(&point), 3.0);
/// assert_eq!(point.y, 2.0);
/// ```
pub struct FieldProjection<B, V> {
    get: fn(&B) -> V,
    set: fn(&mut B, V),
}

impl<B, V> FieldProjection<B, V> {
    /// Creates a projection from a getter/setter pair.
    #[must_use]
    pub fn new(get: fn(&B) -> V, set: fn(&mut B, V)) -> Self {
        Self { get, set }
    }
}

impl<B, V> Clone for FieldProjection<B, V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<B, V> Copy for FieldProjection<B, V> {}

impl<B, V> PartialEq for FieldProjection<B, V> {
    fn eq(&self, other: &Self) -> bool {
        core::ptr::fn_addr_eq(self.get, other.get) && core::ptr::fn_addr_eq(self.set, other.set)
    }
}

impl<B, V> core::fmt::Debug for FieldProjection<B, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FieldProjection").finish_non_exhaustive()
    }
}

impl<B: 'static, V: 'static> Projection for FieldProjection<B, V> {
    type Base = B;
    type Projected = V;

    fn get(&self, base: &B) -> V {
        (self.get)(base)
    }

    fn set(&self, base: &mut B, value: V) {
        (self.set)(base, value);
    }
}

/// Two projections applied in sequence.
#[derive(Clone, PartialEq)]
pub struct ComposedProjection<P, Q> {
    first: P,
    second: Q,
}

impl<P: core::fmt::Debug, Q: core::fmt::Debug> core::fmt::Debug for ComposedProjection<P, Q> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ComposedProjection")
            .field("first", &self.first)
            .field("second", &self.second)
            .finish()
    }
}

impl<P, Q> Projection for ComposedProjection<P, Q>
where
    P: Projection,
    Q: Projection<Base = P::Projected>,
{
    type Base = P::Base;
    type Projected = Q::Projected;

    fn get(&self, base: &Self::Base) -> Self::Projected {
        self.second.get(&self.first.get(base))
    }

    fn set(&self, base: &mut Self::Base, value: Self::Projected) {
        let mut mid = self.first.get(base);
        self.second.set(&mut mid, value);
        self.first.set(base, mid);
    }
}

/// Focuses `Option<T>` on its payload, panicking on `None`.
///
/// The panic is the contract: this projection asserts the option is always
/// populated when accessed, mirroring a force-unwrap. Use
/// [`DefaultSubstitution`] when absence is a legitimate state.
pub struct ForceUnwrapping<T>(core::marker::PhantomData<fn() -> T>);

impl<T> ForceUnwrapping<T> {
    /// Creates the projection.
    #[must_use]
    pub fn new() -> Self {
        Self(core::marker::PhantomData)
    }
}

impl<T> Default for ForceUnwrapping<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for ForceUnwrapping<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> PartialEq for ForceUnwrapping<T> {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl<T> core::fmt::Debug for ForceUnwrapping<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ForceUnwrapping")
    }
}

impl<T: Clone + 'static> Projection for ForceUnwrapping<T> {
    type Base = Option<T>;
    type Projected = T;

    fn get(&self, base: &Option<T>) -> T {
        match base {
            Some(value) => value.clone(),
            None => panic!("force-unwrapping projection read a None"),
        }
    }

    fn set(&self, base: &mut Option<T>, value: T) {
        *base = Some(value);
    }
}

/// Focuses `Option<T>` on its payload, substituting a default for `None`.
#[derive(Clone, PartialEq, Debug)]
pub struct DefaultSubstitution<T> {
    default: T,
}

impl<T> DefaultSubstitution<T> {
    /// Creates the projection with the value reported for `None`.
    #[must_use]
    pub fn new(default: T) -> Self {
        Self { default }
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> Projection for DefaultSubstitution<T> {
    type Base = Option<T>;
    type Projected = T;

    fn get(&self, base: &Option<T>) -> T {
        base.clone().unwrap_or_else(|| self.default.clone())
    }

    fn set(&self, base: &mut Option<T>, value: T) {
        *base = Some(value);
    }
}

/// A location focused through a projection.
///
/// Writes read the whole base value, splice the projected part in, and
/// write the whole back, so sibling fields are preserved.
pub struct ProjectedLocation<P: Projection> {
    base: AnyLocation<P::Base>,
    projection: P,
}

impl<P: Projection> ProjectedLocation<P> {
    pub(crate) fn new(base: AnyLocation<P::Base>, projection: P) -> Self {
        Self { base, projection }
    }
}

impl<P: Projection> core::fmt::Debug for ProjectedLocation<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProjectedLocation")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl<P> Location for ProjectedLocation<P>
where
    P: Projection,
    P::Base: Clone + Send + Sync + 'static,
    P::Projected: Send + Sync + 'static,
{
    type Value = P::Projected;

    fn get(&self) -> P::Projected {
        self.projection.get(&self.base.get())
    }

    fn set(&self, value: P::Projected, transaction: &Transaction) {
        let mut base = self.base.get();
        self.projection.set(&mut base, value);
        self.base.set(base, transaction);
    }

    fn was_read(&self) -> bool {
        self.base.was_read()
    }

    fn set_was_read(&self, read: bool) {
        self.base.set_was_read(read);
    }

    fn update(&self) -> (P::Projected, bool) {
        let (base, changed) = self.base.update();
        (self.projection.get(&base), changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, Debug)]
    struct Point {
        x: f64,
        y: f64,
    }

    fn x_projection() -> FieldProjection<Point, f64> {
        FieldProjection::new(|p: &Point| p.x, |p, v| p.x = v)
    }

    #[test]
    fn round_trip_reads_back_the_write() {
        let p = x_projection();
        let mut point = Point { x: 0.0, y: 5.0 };
        p.set(&mut point, 9.0);
        assert_eq!(p.get(&point), 9.0);
        assert_eq!(point.y, 5.0);
    }

    #[test]
    fn composition_threads_the_middle_value() {
        #[derive(Clone, PartialEq, Debug)]
        struct Frame {
            origin: Point,
        }

        let origin = FieldProjection::new(|f: &Frame| f.origin.clone(), |f, v| f.origin = v);
        let origin_x = origin.then(x_projection());

        let mut frame = Frame {
            origin: Point { x: 1.0, y: 2.0 },
        };
        origin_x.set(&mut frame, 10.0);
        assert_eq!(origin_x.get(&frame), 10.0);
        assert_eq!(frame.origin.y, 2.0);
    }

    #[test]
    fn force_unwrapping_reads_some() {
        let p = ForceUnwrapping::<i32>::new();
        let mut value = Some(3);
        assert_eq!(p.get(&value), 3);
        p.set(&mut value, 4);
        assert_eq!(value, Some(4));
    }

    #[test]
    #[should_panic(expected = "force-unwrapping projection read a None")]
    fn force_unwrapping_panics_on_none() {
        let p = ForceUnwrapping::<i32>::new();
        let _ = p.get(&None);
    }

    #[test]
    fn default_substitution_fills_none() {
        let p = DefaultSubstitution::new(7_i32);
        let mut value: Option<i32> = None;
        assert_eq!(p.get(&value), 7);
        p.set(&mut value, 9);
        assert_eq!(p.get(&value), 9);
    }

    #[test]
    fn field_projection_equality_is_by_accessor() {
        fn get_x(p: &Point) -> f64 {
            p.x
        }
        fn set_x(p: &mut Point, v: f64) {
            p.x = v;
        }
        fn get_y(p: &Point) -> f64 {
            p.y
        }
        fn set_y(p: &mut Point, v: f64) {
            p.y = v;
        }

        let a = FieldProjection::new(get_x, set_x);
        let b = FieldProjection::new(get_x, set_x);
        let c = FieldProjection::new(get_y, set_y);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}

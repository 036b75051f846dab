// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Preference keys and their type-erased descriptors.

use core::any::TypeId;
use core::fmt;
use core::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::list::ErasedPrefValue;

/// A typed preference key.
///
/// The key type is the identity. `reduce` folds the value published by the
/// *next* sibling (in view-tree order) into the accumulator; it is handed
/// a closure rather than a value so reductions that ignore their right
/// operand never compute it.
///
/// # Example
///
/// ```
/// use canopy_preference::PreferenceKey;
///
/// struct Title;
/// impl PreferenceKey for Title {
///     type Value = Option<&'static str>;
///     fn default_value() -> Self::Value {
///         None
///     }
///     fn reduce(value: &mut Self::Value, next_value: impl FnOnce() -> Self::Value) {
///         // First title wins; later siblings are not even computed.
///         if value.is_none() {
///             *value = next_value();
///         }
///     }
/// }
/// ```
pub trait PreferenceKey: 'static {
    /// The published value type.
    type Value: Clone + 'static;

    /// The value reported when no descendant published one.
    fn default_value() -> Self::Value;

    /// Folds the next sibling's value into the accumulator.
    fn reduce(value: &mut Self::Value, next_value: impl FnOnce() -> Self::Value);

    /// Whether values of this key survive the removal of the subtree that
    /// published them (until the next update).
    fn includes_removed_values() -> bool {
        false
    }
}

/// Marker for keys whose reduced value may be read back by the host
/// embedding the tree (window title, status items, and the like).
pub trait HostPreferenceKey: PreferenceKey {}

fn default_erased<K: PreferenceKey>() -> ErasedPrefValue {
    ErasedPrefValue::new(K::default_value())
}

fn reduce_erased<K: PreferenceKey>(value: &mut ErasedPrefValue, next: ErasedPrefValue) {
    let Some(accumulator) = value.downcast_mut::<K::Value>() else {
        debug_assert!(false, "preference value type mismatch");
        return;
    };
    K::reduce(accumulator, move || match next.into_value::<K::Value>() {
        Some(v) => v,
        None => {
            debug_assert!(false, "preference value type mismatch");
            K::default_value()
        }
    });
}

/// A type-erased preference key descriptor.
///
/// Carries the key's identity, a readable name, and monomorphized function
/// pointers for the operations erased code needs (default construction and
/// reduction). Two descriptors are equal when they denote the same key
/// type.
#[derive(Copy, Clone)]
pub struct AnyPreferenceKey {
    id: TypeId,
    name: &'static str,
    default_fn: fn() -> ErasedPrefValue,
    reduce_fn: fn(&mut ErasedPrefValue, ErasedPrefValue),
    includes_removed: bool,
}

impl AnyPreferenceKey {
    /// The descriptor of `K`.
    #[must_use]
    pub fn of<K: PreferenceKey>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: core::any::type_name::<K>(),
            default_fn: default_erased::<K>,
            reduce_fn: reduce_erased::<K>,
            includes_removed: K::includes_removed_values(),
        }
    }

    /// Returns the key type's identity.
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the key type's name, for diagnostics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// See [`PreferenceKey::includes_removed_values`].
    #[must_use]
    pub fn includes_removed_values(&self) -> bool {
        self.includes_removed
    }

    pub(crate) fn default_value(&self) -> ErasedPrefValue {
        (self.default_fn)()
    }

    pub(crate) fn reduce(&self, value: &mut ErasedPrefValue, next: ErasedPrefValue) {
        (self.reduce_fn)(value, next);
    }
}

impl PartialEq for AnyPreferenceKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for AnyPreferenceKey {}

impl Hash for AnyPreferenceKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for AnyPreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnyPreferenceKey({})", self.name)
    }
}

/// An ordered, duplicate-free set of preference key descriptors.
///
/// Order is insertion order (which downstream code treats as view-tree
/// order); equality is set equality.
#[derive(Clone, Default)]
pub struct PreferenceKeys {
    keys: SmallVec<[AnyPreferenceKey; 4]>,
}

impl PreferenceKeys {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no keys are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the number of keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Adds a key; no-op if already present.
    pub fn add<K: PreferenceKey>(&mut self) {
        self.add_key(AnyPreferenceKey::of::<K>());
    }

    /// Adds a descriptor; no-op if already present.
    pub fn add_key(&mut self, key: AnyPreferenceKey) {
        if !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }

    /// Removes a key; no-op if absent.
    pub fn remove<K: PreferenceKey>(&mut self) {
        self.remove_key(&AnyPreferenceKey::of::<K>());
    }

    /// Removes a descriptor; no-op if absent.
    pub fn remove_key(&mut self, key: &AnyPreferenceKey) {
        if let Some(pos) = self.keys.iter().position(|k| k == key) {
            self.keys.remove(pos);
        }
    }

    /// Returns `true` if `K` is in the set.
    #[must_use]
    pub fn contains<K: PreferenceKey>(&self) -> bool {
        self.contains_key(&AnyPreferenceKey::of::<K>())
    }

    /// Returns `true` if the descriptor is in the set.
    #[must_use]
    pub fn contains_key(&self, key: &AnyPreferenceKey) -> bool {
        self.keys.contains(key)
    }

    /// Iterates the keys in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AnyPreferenceKey> + '_ {
        self.keys.iter()
    }

    /// Returns the union, keeping `self`'s order and appending `other`'s
    /// new keys.
    #[must_use]
    pub fn merge(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for key in other.iter() {
            merged.add_key(*key);
        }
        merged
    }
}

impl PartialEq for PreferenceKeys {
    fn eq(&self, other: &Self) -> bool {
        self.keys.len() == other.keys.len()
            && self.keys.iter().all(|k| other.keys.contains(k))
    }
}

impl Eq for PreferenceKeys {}

impl fmt::Debug for PreferenceKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.keys.iter()).finish()
    }
}

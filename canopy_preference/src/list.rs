// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent lists of published preference values.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::any::Any;
use core::fmt;

use canopy_graph::VersionSeed;
use smallvec::SmallVec;

use crate::key::{AnyPreferenceKey, PreferenceKey, PreferenceKeys};

/// A preference value paired with the seed of the subgraph that produced
/// it.
#[derive(Clone, Debug, PartialEq)]
pub struct PreferenceValue<V> {
    /// The published value.
    pub value: V,
    /// Version seed of the producing subgraph.
    pub seed: VersionSeed,
}

pub(crate) trait ClonableAny: Any {
    fn clone_boxed(&self) -> Box<dyn ClonableAny>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any + Clone> ClonableAny for T {
    fn clone_boxed(&self) -> Box<dyn ClonableAny> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A type-erased, clonable preference value.
pub(crate) struct ErasedPrefValue(Box<dyn ClonableAny>);

impl ErasedPrefValue {
    pub(crate) fn new<T: Clone + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub(crate) fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub(crate) fn downcast_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.0.as_any_mut().downcast_mut::<T>()
    }

    pub(crate) fn into_value<T: 'static>(self) -> Option<T> {
        self.0.into_any().downcast::<T>().ok().map(|b| *b)
    }
}

impl Clone for ErasedPrefValue {
    fn clone(&self) -> Self {
        Self(self.0.clone_boxed())
    }
}

struct PrefNode {
    key: AnyPreferenceKey,
    value: ErasedPrefValue,
    seed: VersionSeed,
    /// `seed` merged with every later node's seed. The head node's merged
    /// seed is therefore the seed of the whole list.
    merged_seed: VersionSeed,
    next: Option<Arc<PrefNode>>,
}

/// An ordered list of published preference values.
///
/// One entry per key; entry order is publication order, which the
/// combiners preserve so non-commutative reductions see siblings
/// left-to-right. The list is persistent: every operation returns a new
/// list, and unchanged tails are shared.
#[derive(Clone, Default)]
pub struct PreferenceList {
    head: Option<Arc<PrefNode>>,
}

impl PreferenceList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if no values are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut n = 0;
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            n += 1;
            node = current.next.as_deref();
        }
        n
    }

    fn find(&self, key: &AnyPreferenceKey) -> Option<&PrefNode> {
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            if current.key == *key {
                return Some(current);
            }
            node = current.next.as_deref();
        }
        None
    }

    /// Returns `true` if a value for `K` is present.
    #[must_use]
    pub fn contains<K: PreferenceKey>(&self) -> bool {
        self.find(&AnyPreferenceKey::of::<K>()).is_some()
    }

    /// Returns the value for `K`, or the key's default if absent.
    #[must_use]
    pub fn get<K: PreferenceKey>(&self) -> K::Value {
        self.value_if_present::<K>()
            .map_or_else(K::default_value, |v| v.value)
    }

    /// Returns the value for `K` and its seed, if present.
    #[must_use]
    pub fn value_if_present<K: PreferenceKey>(&self) -> Option<PreferenceValue<K::Value>> {
        let node = self.find(&AnyPreferenceKey::of::<K>())?;
        let value = node.value.downcast_ref::<K::Value>()?.clone();
        Some(PreferenceValue {
            value,
            seed: node.seed,
        })
    }

    /// Returns a list with the value for `K` set.
    ///
    /// An existing entry is replaced in place; a new key is appended, so
    /// it reduces after everything already published.
    #[must_use]
    pub fn set<K: PreferenceKey>(&self, value: K::Value, seed: VersionSeed) -> Self {
        self.set_erased(AnyPreferenceKey::of::<K>(), ErasedPrefValue::new(value), seed)
    }

    pub(crate) fn set_erased(
        &self,
        key: AnyPreferenceKey,
        value: ErasedPrefValue,
        seed: VersionSeed,
    ) -> Self {
        let mut entries = self.entries();
        match entries.iter_mut().find(|e| e.0 == key) {
            Some(entry) => {
                entry.1 = value;
                entry.2 = seed;
            }
            None => entries.push((key, value, seed)),
        }
        Self::from_entries(entries)
    }

    /// Returns a list without the entry for `K`; no-op if absent.
    #[must_use]
    pub fn remove<K: PreferenceKey>(&self) -> Self {
        let key = AnyPreferenceKey::of::<K>();
        if self.find(&key).is_none() {
            return self.clone();
        }
        let mut entries = self.entries();
        entries.retain(|e| e.0 != key);
        Self::from_entries(entries)
    }

    /// Returns a list with the value for `K` modified in place. A missing
    /// entry is created from the key's default before `modify` runs.
    #[must_use]
    pub fn modify<K: PreferenceKey>(
        &self,
        seed: VersionSeed,
        modify: impl FnOnce(&mut K::Value),
    ) -> Self {
        let mut value = self.get::<K>();
        modify(&mut value);
        self.set::<K>(value, seed)
    }

    /// Reduces `other` into `self`.
    ///
    /// For each key present in both, `self`'s value is the accumulator and
    /// `other`'s is the next sibling's, so reductions run left-to-right.
    /// Keys only in `other` are appended after `self`'s, in their order.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        if self.is_empty() {
            return other.clone();
        }
        if other.is_empty() {
            return self.clone();
        }
        let mut entries = self.entries();
        for theirs in other.entries() {
            match entries.iter_mut().find(|e| e.0 == theirs.0) {
                Some(ours) => {
                    ours.0.reduce(&mut ours.1, theirs.1);
                    ours.2 = ours.2.merge(theirs.2);
                }
                None => entries.push(theirs),
            }
        }
        Self::from_entries(entries)
    }

    /// Retains only keys that opt into surviving the removal of their
    /// publisher. Applied to a subtree's preferences when it goes away.
    #[must_use]
    pub fn filter_removed(&self) -> Self {
        let mut entries = self.entries();
        entries.retain(|e| e.0.includes_removed_values());
        Self::from_entries(entries)
    }

    /// Retains only entries whose key is in `keys`.
    #[must_use]
    pub fn filter_to(&self, keys: &PreferenceKeys) -> Self {
        let mut entries = self.entries();
        entries.retain(|e| keys.contains_key(&e.0));
        Self::from_entries(entries)
    }

    /// Returns the set of keys present, in entry order.
    #[must_use]
    pub fn keys(&self) -> PreferenceKeys {
        let mut keys = PreferenceKeys::new();
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            keys.add_key(current.key);
            node = current.next.as_deref();
        }
        keys
    }

    /// The merged seed of every entry; [`VersionSeed::EMPTY`] when empty.
    #[must_use]
    pub fn seed(&self) -> VersionSeed {
        self.head
            .as_deref()
            .map_or(VersionSeed::EMPTY, |node| node.merged_seed)
    }

    /// Conservative inequality based on the lists' seeds. `false` means
    /// the lists are definitely equal.
    #[must_use]
    pub fn may_not_be_equal(&self, other: &Self) -> bool {
        self.seed().may_not_be_equal(other.seed())
    }

    fn entries(&self) -> SmallVec<[(AnyPreferenceKey, ErasedPrefValue, VersionSeed); 4]> {
        let mut entries = SmallVec::new();
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            entries.push((current.key, current.value.clone(), current.seed));
            node = current.next.as_deref();
        }
        entries
    }

    fn from_entries(
        entries: SmallVec<[(AnyPreferenceKey, ErasedPrefValue, VersionSeed); 4]>,
    ) -> Self {
        let mut head = None;
        for (key, value, seed) in entries.into_iter().rev() {
            let merged_seed = seed.merge(
                head.as_deref()
                    .map_or(VersionSeed::EMPTY, |n: &PrefNode| n.merged_seed),
            );
            head = Some(Arc::new(PrefNode {
                key,
                value,
                seed,
                merged_seed,
                next: head,
            }));
        }
        Self { head }
    }
}

impl fmt::Debug for PreferenceList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut node = self.head.as_deref();
        while let Some(current) = node {
            list.entry(&current.key.name());
            node = current.next.as_deref();
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Badges;
    impl PreferenceKey for Badges {
        type Value = u32;
        fn default_value() -> u32 {
            0
        }
        fn reduce(value: &mut u32, next_value: impl FnOnce() -> u32) {
            *value += next_value();
        }
    }

    struct Title;
    impl PreferenceKey for Title {
        type Value = Option<&'static str>;
        fn default_value() -> Self::Value {
            None
        }
        fn reduce(value: &mut Self::Value, next_value: impl FnOnce() -> Self::Value) {
            if value.is_none() {
                *value = next_value();
            }
        }
    }

    struct Sticky;
    impl PreferenceKey for Sticky {
        type Value = u32;
        fn default_value() -> u32 {
            0
        }
        fn reduce(value: &mut u32, next_value: impl FnOnce() -> u32) {
            *value += next_value();
        }
        fn includes_removed_values() -> bool {
            true
        }
    }

    #[test]
    fn get_falls_back_to_the_default() {
        let list = PreferenceList::new();
        assert!(list.is_empty());
        assert_eq!(list.get::<Badges>(), 0);
        assert!(list.value_if_present::<Badges>().is_none());
    }

    #[test]
    fn set_replaces_and_remove_drops() {
        let list = PreferenceList::new()
            .set::<Badges>(3, VersionSeed::from_version(1))
            .set::<Title>(Some("inbox"), VersionSeed::from_version(2));
        assert_eq!(list.len(), 2);
        assert_eq!(list.get::<Badges>(), 3);

        let replaced = list.set::<Badges>(5, VersionSeed::from_version(3));
        assert_eq!(replaced.len(), 2);
        assert_eq!(replaced.get::<Badges>(), 5);

        let removed = replaced.remove::<Badges>();
        assert_eq!(removed.len(), 1);
        assert!(!removed.contains::<Badges>());
        assert_eq!(removed.get::<Title>(), Some("inbox"));
    }

    #[test]
    fn combine_reduces_shared_keys_and_appends_new_ones() {
        let left = PreferenceList::new().set::<Badges>(1, VersionSeed::from_version(1));
        let right = PreferenceList::new()
            .set::<Badges>(2, VersionSeed::from_version(2))
            .set::<Title>(Some("right"), VersionSeed::from_version(2));

        let combined = left.combine(&right);
        assert_eq!(combined.get::<Badges>(), 3);
        assert_eq!(combined.get::<Title>(), Some("right"));
    }

    #[test]
    fn combine_is_ordered_for_non_commutative_keys() {
        let left = PreferenceList::new().set::<Title>(Some("first"), VersionSeed::from_version(1));
        let right = PreferenceList::new().set::<Title>(Some("second"), VersionSeed::from_version(2));

        assert_eq!(left.combine(&right).get::<Title>(), Some("first"));
        assert_eq!(right.combine(&left).get::<Title>(), Some("second"));
    }

    #[test]
    fn seeds_merge_through_set_and_combine() {
        let list = PreferenceList::new()
            .set::<Badges>(1, VersionSeed::from_version(4))
            .set::<Title>(None, VersionSeed::from_version(9));
        assert_eq!(
            list.seed(),
            VersionSeed::from_version(4).merge(VersionSeed::from_version(9))
        );

        let other = PreferenceList::new().set::<Badges>(2, VersionSeed::INVALID);
        assert!(list.combine(&other).seed().is_invalid());
        assert!(list.may_not_be_equal(&other));
    }

    #[test]
    fn filters_respect_keys_and_removal_opt_in() {
        let seed = VersionSeed::from_version(1);
        let list = PreferenceList::new()
            .set::<Badges>(1, seed)
            .set::<Sticky>(2, seed)
            .set::<Title>(Some("t"), seed);

        let surviving = list.filter_removed();
        assert_eq!(surviving.len(), 1);
        assert!(surviving.contains::<Sticky>());

        let mut wanted = PreferenceKeys::new();
        wanted.add::<Badges>();
        wanted.add::<Title>();
        let narrowed = list.filter_to(&wanted);
        assert_eq!(narrowed.len(), 2);
        assert!(!narrowed.contains::<Sticky>());
    }

    #[test]
    fn modify_starts_from_the_default_when_absent() {
        let list = PreferenceList::new();
        let bumped = list.modify::<Badges>(VersionSeed::from_version(1), |v| *v += 7);
        assert_eq!(bumped.get::<Badges>(), 7);
    }
}

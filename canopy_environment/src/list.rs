// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Persistent property lists.

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::any::{Any, TypeId};
use core::fmt;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::filter::TypeFilter;
use crate::key::PropertyKey;

/// Trait object for stored values: cloneable, sendable, downcastable.
trait StoredValue: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn clone_boxed(&self) -> Box<dyn StoredValue>;
}

impl<T: Clone + Send + Sync + 'static> StoredValue for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn clone_boxed(&self) -> Box<dyn StoredValue> {
        Box::new(self.clone())
    }
}

struct Node {
    key: TypeId,
    key_name: &'static str,
    value: Box<dyn StoredValue>,
    next: Option<Arc<Node>>,
    /// Unique per prepend; lists with equal head ids are identical.
    id: u64,
    length: u32,
    /// Union of the key types of this node and its tail.
    filter: TypeFilter,
}

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// An immutable association list of typed properties.
///
/// Lists are persistent: [`set`](Self::set) prepends a node and leaves every
/// previously taken clone untouched, sharing the tail structurally. Lookup
/// walks the chain front to back, so the most recent entry for a key
/// *shadows* older ones (which remain reachable via
/// [`for_each`](Self::for_each)).
///
/// Cloning is O(1) (an `Arc` bump); lists are `Send + Sync`.
///
/// # See Also
///
/// - [`PropertyKey`]: the typed key trait.
/// - [`TypeFilter`]: the conservative pre-check used to skip chain walks.
#[derive(Clone, Default)]
pub struct PropertyList {
    head: Option<Arc<Node>>,
}

impl PropertyList {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self { head: None }
    }

    /// Returns `true` if the list has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns the number of entries, shadowed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.head.as_ref().map_or(0, |n| n.length as usize)
    }

    /// Returns an identifier unique to this list's head node.
    ///
    /// Two lists with the same id are the same list. The empty list has
    /// id 0.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.head.as_ref().map_or(0, |n| n.id)
    }

    /// Returns the conservative key-type summary of the list.
    #[must_use]
    pub fn filter(&self) -> TypeFilter {
        self.head.as_ref().map_or(TypeFilter::EMPTY, |n| n.filter)
    }

    fn find(&self, key: TypeId) -> Option<&Node> {
        if !self.filter().may_contain_id(key) {
            return None;
        }
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            if node.key == key {
                return Some(node);
            }
            current = node.next.as_deref();
        }
        None
    }

    /// Returns the current value for `K`, or its default when absent.
    #[must_use]
    pub fn get<K: PropertyKey>(&self) -> K::Value {
        self.get_if_set::<K>().unwrap_or_else(K::default_value)
    }

    /// Returns the current value for `K`, or `None` when absent.
    #[must_use]
    pub fn get_if_set<K: PropertyKey>(&self) -> Option<K::Value> {
        self.find(TypeId::of::<K>())
            .and_then(|node| node.value.as_any().downcast_ref::<K::Value>())
            .cloned()
    }

    /// Returns `true` if an entry for `K` is present.
    #[must_use]
    pub fn contains<K: PropertyKey>(&self) -> bool {
        self.find(TypeId::of::<K>()).is_some()
    }

    /// Sets the value for `K`, shadowing any previous entry.
    ///
    /// If an entry is present and `K::values_equal` vouches the new value
    /// is the same, the list is left untouched (its [`id`](Self::id) does
    /// not change).
    pub fn set<K: PropertyKey>(&mut self, value: K::Value) {
        if let Some(current) = self.get_if_set::<K>()
            && K::values_equal(&current, &value)
        {
            return;
        }
        self.prepend_node(
            TypeId::of::<K>(),
            core::any::type_name::<K>(),
            Box::new(value),
        );
    }

    fn prepend_node(&mut self, key: TypeId, key_name: &'static str, value: Box<dyn StoredValue>) {
        let filter = self.filter().union(TypeFilter::of_id(key));
        let length = self.len() as u32 + 1;
        self.head = Some(Arc::new(Node {
            key,
            key_name,
            value,
            next: self.head.take(),
            id: fresh_id(),
            length,
            filter,
        }));
    }

    /// Visits every entry for `K`, newest first, shadowed entries included.
    pub fn for_each<K: PropertyKey>(&self, mut f: impl FnMut(&K::Value)) {
        if !self.filter().may_contain::<K>() {
            return;
        }
        let key = TypeId::of::<K>();
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            if node.key == key
                && let Some(value) = node.value.as_any().downcast_ref::<K::Value>()
            {
                f(value);
            }
            current = node.next.as_deref();
        }
    }

    /// Conservative inequality pre-check.
    ///
    /// Returns `false` only when the lists are certainly equal (same head
    /// or both empty). A `true` result means they may differ.
    #[must_use]
    pub fn may_not_be_equal(&self, other: &Self) -> bool {
        match (&self.head, &other.head) {
            (None, None) => false,
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            _ => true,
        }
    }

    /// Layers `other` on top of this list.
    ///
    /// Every entry of `other` is prepended (preserving `other`'s internal
    /// order), so lookups prefer `other`'s values. When this list is empty
    /// the result shares `other`'s structure outright.
    pub fn override_with(&mut self, other: &Self) {
        if other.is_empty() {
            return;
        }
        if self.is_empty() {
            *self = other.clone();
            return;
        }
        let mut nodes: alloc::vec::Vec<&Node> = alloc::vec::Vec::new();
        let mut current = other.head.as_deref();
        while let Some(node) = current {
            nodes.push(node);
            current = node.next.as_deref();
        }
        for node in nodes.into_iter().rev() {
            self.prepend_node(node.key, node.key_name, node.value.clone_boxed());
        }
    }
}

impl fmt::Debug for PropertyList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut list = f.debug_list();
        let mut current = self.head.as_deref();
        while let Some(node) = current {
            list.entry(&node.key_name);
            current = node.next.as_deref();
        }
        list.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FontSize;
    impl PropertyKey for FontSize {
        type Value = f32;
        fn default_value() -> f32 {
            13.0
        }
        fn values_equal(a: &f32, b: &f32) -> bool {
            a == b
        }
    }

    struct LineLimit;
    impl PropertyKey for LineLimit {
        type Value = Option<u32>;
        fn default_value() -> Option<u32> {
            None
        }
        fn values_equal(a: &Option<u32>, b: &Option<u32>) -> bool {
            a == b
        }
    }

    /// A key that never vouches for equality (the trait default).
    struct Opaque;
    impl PropertyKey for Opaque {
        type Value = u32;
        fn default_value() -> u32 {
            0
        }
    }

    #[test]
    fn absent_key_reports_default() {
        let list = PropertyList::new();
        assert_eq!(list.get::<FontSize>(), 13.0);
        assert_eq!(list.get_if_set::<FontSize>(), None);
        assert!(!list.contains::<FontSize>());
    }

    #[test]
    fn set_shadows_and_shares() {
        let mut parent = PropertyList::new();
        parent.set::<FontSize>(11.0);

        let mut child = parent.clone();
        child.set::<FontSize>(17.0);

        assert_eq!(child.get::<FontSize>(), 17.0);
        assert_eq!(parent.get::<FontSize>(), 11.0);
        // The shadowed entry is still reachable.
        let mut seen = alloc::vec::Vec::new();
        child.for_each::<FontSize>(|v| seen.push(*v));
        assert_eq!(seen, alloc::vec![17.0, 11.0]);
    }

    #[test]
    fn equal_write_is_suppressed() {
        let mut list = PropertyList::new();
        list.set::<FontSize>(11.0);
        let id = list.id();

        list.set::<FontSize>(11.0);
        assert_eq!(list.id(), id);
        assert_eq!(list.len(), 1);

        list.set::<FontSize>(12.0);
        assert_ne!(list.id(), id);
    }

    #[test]
    fn conservative_keys_always_write() {
        let mut list = PropertyList::new();
        list.set::<Opaque>(1);
        let id = list.id();
        list.set::<Opaque>(1);
        // The default `values_equal` never vouches, so the write lands.
        assert_ne!(list.id(), id);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn may_not_be_equal_fast_paths() {
        let empty = PropertyList::new();
        assert!(!empty.may_not_be_equal(&PropertyList::new()));

        let mut a = PropertyList::new();
        a.set::<FontSize>(11.0);
        let b = a.clone();
        assert!(!a.may_not_be_equal(&b));
        assert!(a.may_not_be_equal(&empty));

        let mut c = b.clone();
        c.set::<LineLimit>(Some(2));
        assert!(a.may_not_be_equal(&c));
    }

    #[test]
    fn override_with_prefers_the_overlay() {
        let mut base = PropertyList::new();
        base.set::<FontSize>(11.0);
        base.set::<LineLimit>(Some(1));

        let mut overlay = PropertyList::new();
        overlay.set::<FontSize>(17.0);

        base.override_with(&overlay);
        assert_eq!(base.get::<FontSize>(), 17.0);
        assert_eq!(base.get::<LineLimit>(), Some(1));
    }

    #[test]
    fn override_with_onto_empty_shares() {
        let mut overlay = PropertyList::new();
        overlay.set::<FontSize>(17.0);

        let mut base = PropertyList::new();
        base.override_with(&overlay);
        assert_eq!(base.id(), overlay.id());
    }

    #[test]
    fn override_preserves_overlay_order() {
        let mut overlay = PropertyList::new();
        overlay.set::<Opaque>(1);
        overlay.set::<Opaque>(2);

        let mut base = PropertyList::new();
        base.set::<FontSize>(11.0);
        base.override_with(&overlay);

        // Newest overlay entry still wins.
        assert_eq!(base.get::<Opaque>(), 2);
        let mut seen = alloc::vec::Vec::new();
        base.for_each::<Opaque>(|v| seen.push(*v));
        assert_eq!(seen, alloc::vec![2, 1]);
    }

    #[test]
    fn debug_lists_key_names() {
        let mut list = PropertyList::new();
        list.set::<FontSize>(11.0);
        let rendered = alloc::format!("{list:?}");
        assert!(rendered.contains("FontSize"));
    }
}

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rules that fold child preferences into a parent's view of them.

use alloc::vec::Vec;

use canopy_graph::{Attribute, EvalContext, Rule, WeakAttribute};

use crate::key::{PreferenceKey, PreferenceKeys};
use crate::list::PreferenceList;

/// Folds the values of any number of children publishing key `K`.
///
/// Children are held weakly: a child whose subgraph has been torn down
/// contributes the key's default value until the combiner is rebuilt.
pub struct PreferenceCombiner<K: PreferenceKey> {
    children: Vec<WeakAttribute<K::Value>>,
}

impl<K: PreferenceKey> PreferenceCombiner<K> {
    /// Creates a combiner over `children`, folded left-to-right.
    #[must_use]
    pub fn new(children: Vec<WeakAttribute<K::Value>>) -> Self {
        Self { children }
    }

    /// Appends a child at the end of the fold order.
    pub fn add_child(&mut self, child: WeakAttribute<K::Value>) {
        self.children.push(child);
    }

    /// Removes a child by attribute identity; no-op if absent.
    pub fn remove_child(&mut self, child: WeakAttribute<K::Value>) {
        if let Some(pos) = self.children.iter().position(|c| *c == child) {
            self.children.remove(pos);
        }
    }
}

impl<K: PreferenceKey> core::fmt::Debug for PreferenceCombiner<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PreferenceCombiner")
            .field("key", &core::any::type_name::<K>())
            .field("children", &self.children)
            .finish()
    }
}

impl<K: PreferenceKey> Rule for PreferenceCombiner<K> {
    type Output = K::Value;

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> K::Value {
        let mut children = self.children.iter();
        let mut value = match children.next() {
            Some(&first) => ctx.get_weak(first).unwrap_or_else(K::default_value),
            None => return K::default_value(),
        };
        for &child in children {
            K::reduce(&mut value, || {
                ctx.get_weak(child).unwrap_or_else(K::default_value)
            });
        }
        value
    }
}

/// Folds exactly two attributes publishing key `K`.
///
/// Unlike [`PreferenceCombiner`] the operands are held strongly, for the
/// common case of a parent combining its own value with one child's.
pub struct PairPreferenceCombiner<K: PreferenceKey> {
    left: Attribute<K::Value>,
    right: Attribute<K::Value>,
}

impl<K: PreferenceKey> PairPreferenceCombiner<K> {
    /// Creates a combiner reducing `right` into `left`.
    #[must_use]
    pub fn new(left: Attribute<K::Value>, right: Attribute<K::Value>) -> Self {
        Self { left, right }
    }
}

impl<K: PreferenceKey> core::fmt::Debug for PairPreferenceCombiner<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PairPreferenceCombiner")
            .field("key", &core::any::type_name::<K>())
            .field("left", &self.left)
            .field("right", &self.right)
            .finish()
    }
}

impl<K: PreferenceKey> Rule for PairPreferenceCombiner<K> {
    type Output = K::Value;

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> K::Value {
        let mut value = ctx.get(self.left);
        let right = self.right;
        K::reduce(&mut value, || ctx.get(right));
        value
    }
}

/// Collects the values of every live child publishing key `K`, in order,
/// without reducing them.
pub struct PreferencesAggregator<K: PreferenceKey> {
    children: Vec<WeakAttribute<K::Value>>,
}

impl<K: PreferenceKey> PreferencesAggregator<K> {
    /// Creates an aggregator over `children`.
    #[must_use]
    pub fn new(children: Vec<WeakAttribute<K::Value>>) -> Self {
        Self { children }
    }

    /// Appends a child at the end of the collection order.
    pub fn add_child(&mut self, child: WeakAttribute<K::Value>) {
        self.children.push(child);
    }
}

impl<K: PreferenceKey> core::fmt::Debug for PreferencesAggregator<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PreferencesAggregator")
            .field("key", &core::any::type_name::<K>())
            .field("children", &self.children)
            .finish()
    }
}

impl<K: PreferenceKey> Rule for PreferencesAggregator<K> {
    type Output = Vec<K::Value>;

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Vec<K::Value> {
        self.children
            .iter()
            .filter_map(|&child| ctx.get_weak(child))
            .collect()
    }
}

/// One child subtree as seen by a [`HostPreferencesCombiner`]: the set of
/// keys it publishes and the list of its published values.
#[derive(Copy, Clone, Debug)]
pub struct HostPreferencesChild {
    /// The keys this subtree publishes.
    pub keys: WeakAttribute<PreferenceKeys>,
    /// The subtree's published values.
    pub values: WeakAttribute<PreferenceList>,
}

/// Folds the preference lists of a host's child subtrees, narrowed to the
/// keys the host asked for.
///
/// A child is only evaluated when it publishes at least one requested key,
/// so unrelated subtrees stay untouched when the host's interest set
/// changes.
#[derive(Debug)]
pub struct HostPreferencesCombiner {
    host_keys: Attribute<PreferenceKeys>,
    host_values: Option<Attribute<PreferenceList>>,
    children: Vec<HostPreferencesChild>,
}

impl HostPreferencesCombiner {
    /// Creates a combiner over the host's requested `host_keys` and,
    /// optionally, the host's own published `host_values`.
    #[must_use]
    pub fn new(
        host_keys: Attribute<PreferenceKeys>,
        host_values: Option<Attribute<PreferenceList>>,
    ) -> Self {
        Self {
            host_keys,
            host_values,
            children: Vec::new(),
        }
    }

    /// Appends a child subtree at the end of the fold order.
    pub fn add_child(&mut self, child: HostPreferencesChild) {
        self.children.push(child);
    }

    /// Removes the child holding this keys attribute; no-op if absent.
    pub fn remove_child(&mut self, keys: WeakAttribute<PreferenceKeys>) {
        if let Some(pos) = self.children.iter().position(|c| c.keys == keys) {
            self.children.remove(pos);
        }
    }

    /// Returns the number of registered children.
    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }
}

impl Rule for HostPreferencesCombiner {
    type Output = PreferenceList;

    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> PreferenceList {
        let requested = ctx.get(self.host_keys);
        let mut result = match self.host_values {
            Some(values) => ctx.get(values),
            None => PreferenceList::new(),
        };
        for child in &self.children {
            let Some(published) = ctx.get_weak(child.keys) else {
                continue;
            };
            if !published.iter().any(|k| requested.contains_key(k)) {
                continue;
            }
            let Some(values) = ctx.get_weak(child.values) else {
                continue;
            };
            result = result.combine(&values.filter_to(&requested));
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::AnyPreferenceKey;
    use alloc::vec;
    use canopy_graph::{Graph, VersionSeed};

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

    #[test]
    fn combiner_folds_children_in_order() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let a = graph.value(root, 1_u32);
        let b = graph.value(root, 2_u32);
        let c = graph.value(root, 3_u32);

        let sum = graph.rule(
            root,
            PreferenceCombiner::<Badges>::new(vec![a.downgrade(), b.downgrade(), c.downgrade()]),
        );
        assert_eq!(graph.get(sum), 6);

        graph.set(b, 10);
        assert_eq!(graph.get(sum), 14);
    }

    #[test]
    fn combiner_keeps_first_for_non_commutative_keys() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let a = graph.value(root, Some("inbox"));
        let b = graph.value(root, Some("archive"));

        let title = graph.rule(
            root,
            PreferenceCombiner::<Title>::new(vec![a.downgrade(), b.downgrade()]),
        );
        assert_eq!(graph.get(title), Some("inbox"));

        graph.set(a, None);
        assert_eq!(graph.get(title), Some("archive"));
    }

    #[test]
    fn dead_children_contribute_the_default() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let child_graph = graph.subgraph(Some(root));
        let a = graph.value(root, 5_u32);
        let b = graph.value(child_graph, 7_u32);

        let sum = graph.rule(
            root,
            PreferenceCombiner::<Badges>::new(vec![a.downgrade(), b.downgrade()]),
        );
        assert_eq!(graph.get(sum), 12);

        graph.invalidate_subgraph(child_graph);
        assert_eq!(graph.get(sum), 5);
    }

    #[test]
    fn pair_combiner_reduces_two_attributes() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let left = graph.value(root, 4_u32);
        let right = graph.value(root, 6_u32);

        let sum = graph.rule(root, PairPreferenceCombiner::<Badges>::new(left, right));
        assert_eq!(graph.get(sum), 10);
    }

    #[test]
    fn aggregator_collects_live_values_in_order() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let child_graph = graph.subgraph(Some(root));
        let a = graph.value(root, 1_u32);
        let b = graph.value(child_graph, 2_u32);
        let c = graph.value(root, 3_u32);

        let all = graph.rule(
            root,
            PreferencesAggregator::<Badges>::new(vec![
                a.downgrade(),
                b.downgrade(),
                c.downgrade(),
            ]),
        );
        assert_eq!(graph.get(all), vec![1, 2, 3]);

        graph.invalidate_subgraph(child_graph);
        assert_eq!(graph.get(all), vec![1, 3]);
    }

    #[test]
    fn host_combiner_narrows_to_requested_keys() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let seed = VersionSeed::from_version(1);

        let mut requested = PreferenceKeys::new();
        requested.add::<Badges>();
        let host_keys = graph.value(root, requested);

        let mut published = PreferenceKeys::new();
        published.add::<Badges>();
        published.add::<Title>();
        let child_keys = graph.value(root, published);
        let child_values = graph.value(
            root,
            PreferenceList::new()
                .set::<Badges>(3, seed)
                .set::<Title>(Some("child"), seed),
        );

        let mut combiner = HostPreferencesCombiner::new(host_keys, None);
        combiner.add_child(HostPreferencesChild {
            keys: child_keys.downgrade(),
            values: child_values.downgrade(),
        });
        let folded = graph.rule(root, combiner);

        let list = graph.get(folded);
        assert_eq!(list.get::<Badges>(), 3);
        // Title was published but not requested by the host.
        assert!(!list.contains::<Title>());
    }

    #[test]
    fn host_combiner_skips_children_without_requested_keys() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let seed = VersionSeed::from_version(1);

        let mut requested = PreferenceKeys::new();
        requested.add::<Badges>();
        let host_keys = graph.value(root, requested);

        // First child publishes only Title, so the host must not evaluate
        // its values at all.
        let mut title_only = PreferenceKeys::new();
        title_only.add::<Title>();
        let unrelated_keys = graph.value(root, title_only);
        let unrelated_values = graph.value(
            root,
            PreferenceList::new().set::<Title>(Some("unrelated"), seed),
        );

        let mut badge_keys = PreferenceKeys::new();
        badge_keys.add::<Badges>();
        let child_a_keys = graph.value(root, badge_keys.clone());
        let child_a_values = graph.value(root, PreferenceList::new().set::<Badges>(1, seed));
        let child_b_keys = graph.value(root, badge_keys);
        let child_b_values = graph.value(root, PreferenceList::new().set::<Badges>(4, seed));

        let host_values = graph.value(root, PreferenceList::new().set::<Badges>(1, seed));

        let mut combiner = HostPreferencesCombiner::new(host_keys, Some(host_values));
        combiner.add_child(HostPreferencesChild {
            keys: unrelated_keys.downgrade(),
            values: unrelated_values.downgrade(),
        });
        combiner.add_child(HostPreferencesChild {
            keys: child_a_keys.downgrade(),
            values: child_a_values.downgrade(),
        });
        combiner.add_child(HostPreferencesChild {
            keys: child_b_keys.downgrade(),
            values: child_b_values.downgrade(),
        });
        assert_eq!(combiner.child_count(), 3);
        combiner.remove_child(child_b_keys.downgrade());
        assert_eq!(combiner.child_count(), 2);
        let folded = graph.rule(root, combiner);

        // Host's own 1 plus child A's 1; child B was removed and the
        // unrelated child skipped.
        assert_eq!(graph.get(folded).get::<Badges>(), 2);
    }

    #[test]
    fn removing_an_absent_child_is_a_no_op() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let a = graph.value(root, 1_u32);
        let b = graph.value(root, 2_u32);

        let mut combiner = PreferenceCombiner::<Badges>::new(vec![a.downgrade()]);
        combiner.remove_child(b.downgrade());
        combiner.remove_child(a.downgrade());
        combiner.add_child(b.downgrade());

        let sum = graph.rule(root, combiner);
        assert_eq!(graph.get(sum), 2);
    }

    #[test]
    fn descriptor_reduction_matches_the_typed_key() {
        // The erased descriptor drives PreferenceList::combine; make sure
        // it agrees with calling K::reduce directly.
        let key = AnyPreferenceKey::of::<Badges>();
        assert!(!key.includes_removed_values());
        let seed = VersionSeed::from_version(1);
        let left = PreferenceList::new().set::<Badges>(2, seed);
        let right = PreferenceList::new().set::<Badges>(3, seed);
        assert_eq!(left.combine(&right).get::<Badges>(), 5);
    }
}

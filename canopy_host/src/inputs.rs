// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The implicit input pack threaded through tree construction, and the
//! structural-reuse check that lets matching subtrees keep their graph
//! nodes.

use std::any::{Any, TypeId};

use bitflags::bitflags;
use hashbrown::HashMap;
use smallvec::SmallVec;

use canopy_environment::{EnvironmentValues, PropertyKey, PropertyList, TypeFilter};
use canopy_graph::{Attribute, RawAttribute};
use canopy_state::Transaction;

use crate::phase::{Phase, Time};

bitflags! {
    /// Behavioral flags carried alongside the inputs.
    #[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
    pub struct GraphInputOptions: u32 {
        /// Subtrees built from these inputs must never be reused.
        const DISABLE_REUSE = 1 << 0;
    }
}

/// A custom graph input: a [`PropertyKey`] whose values ride in a
/// [`GraphInputs`] pack instead of the environment.
pub trait GraphInput: PropertyKey {}

/// Redirects recorded by a reuse check.
///
/// Each entry maps an attribute of the previously built subtree to the
/// new source it should forward to. Entries are only a record; the caller
/// applies them with [`Graph::redirect`](canopy_graph::Graph::redirect)
/// through its typed handles.
#[derive(Clone, Default, Debug)]
pub struct IndirectAttributeMap {
    entries: HashMap<RawAttribute, RawAttribute>,
}

impl IndirectAttributeMap {
    /// An empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `from` (in the old subtree) forwards to `to`.
    ///
    /// Returns `false` if `from` was already recorded with a different
    /// target; a given node can only forward one place.
    pub fn record(&mut self, from: RawAttribute, to: RawAttribute) -> bool {
        match self.entries.get(&from) {
            Some(&existing) => existing == to,
            None => {
                self.entries.insert(from, to);
                true
            }
        }
    }

    /// The recorded target for `from`, if any.
    #[must_use]
    pub fn target_for(&self, from: RawAttribute) -> Option<RawAttribute> {
        self.entries.get(&from).copied()
    }

    /// The number of recorded redirects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no redirects were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the recorded `(from, to)` pairs, unordered.
    pub fn iter(&self) -> impl Iterator<Item = (RawAttribute, RawAttribute)> + '_ {
        self.entries.iter().map(|(&from, &to)| (from, to))
    }
}

/// A value that can hand its graph nodes over to a newly built
/// counterpart.
pub trait GraphReusable: Any + Clone {
    /// Attempts to make the previously built `self` serve `other`'s role,
    /// recording the redirects into `map`.
    ///
    /// `false` rejects the whole reuse attempt; `map` entries recorded
    /// before the rejection are discarded by the caller.
    fn try_to_reuse(&self, other: &Self, map: &mut IndirectAttributeMap) -> bool;
}

impl<T: 'static> GraphReusable for Attribute<T> {
    fn try_to_reuse(&self, other: &Self, map: &mut IndirectAttributeMap) -> bool {
        map.record(self.raw(), other.raw())
    }
}

/// A stack of reusable values; reuse matches elementwise.
///
/// Used for inputs that nest as construction descends (an ancestor pushes,
/// the subtree reads the top, the ancestor pops on the way out).
#[derive(Clone, Debug, Default)]
pub struct InputStack<T> {
    values: SmallVec<[T; 2]>,
}

impl<T> InputStack<T> {
    /// An empty stack.
    #[must_use]
    pub fn new() -> Self {
        Self {
            values: SmallVec::new(),
        }
    }

    /// Pushes a value for the subtree below.
    pub fn push(&mut self, value: T) {
        self.values.push(value);
    }

    /// Pops the innermost value.
    pub fn pop(&mut self) -> Option<T> {
        self.values.pop()
    }

    /// The innermost value.
    #[must_use]
    pub fn top(&self) -> Option<&T> {
        self.values.last()
    }

    /// The number of stacked values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if nothing is stacked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<T: GraphReusable> GraphReusable for InputStack<T> {
    fn try_to_reuse(&self, other: &Self, map: &mut IndirectAttributeMap) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(other.values.iter())
                .all(|(mine, theirs)| mine.try_to_reuse(theirs, map))
    }
}

trait ErasedReusable {
    fn input_type(&self) -> TypeId;
    fn as_any(&self) -> &dyn Any;
    fn clone_boxed(&self) -> Box<dyn ErasedReusable>;
    fn try_to_reuse_erased(&self, other: &dyn Any, map: &mut IndirectAttributeMap) -> bool;
}

struct ReusableSlot<T: GraphReusable> {
    key: TypeId,
    value: T,
}

impl<T: GraphReusable> ErasedReusable for ReusableSlot<T> {
    fn input_type(&self) -> TypeId {
        self.key
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn clone_boxed(&self) -> Box<dyn ErasedReusable> {
        Box::new(Self {
            key: self.key,
            value: self.value.clone(),
        })
    }

    fn try_to_reuse_erased(&self, other: &dyn Any, map: &mut IndirectAttributeMap) -> bool {
        other
            .downcast_ref::<Self>()
            .is_some_and(|other| other.key == self.key && self.value.try_to_reuse(&other.value, map))
    }
}

/// The record of which inputs contributed to a built subtree, for later
/// reuse matching.
///
/// Each contributing input adds its key type to a Bloom-style
/// [`TypeFilter`] (cheap rejection) and pushes its value on an ordered
/// stack (exact matching).
#[derive(Default)]
pub struct ReusableInputs {
    filter: TypeFilter,
    stack: Vec<Box<dyn ErasedReusable>>,
}

impl core::fmt::Debug for ReusableInputs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReusableInputs")
            .field("len", &self.stack.len())
            .finish_non_exhaustive()
    }
}

impl Clone for ReusableInputs {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter,
            stack: self.stack.iter().map(|slot| slot.clone_boxed()).collect(),
        }
    }
}

impl ReusableInputs {
    /// An empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value under its own type identity.
    pub fn record<T: GraphReusable>(&mut self, value: T) {
        self.record_keyed(TypeId::of::<T>(), value);
    }

    /// Records a custom input's value under the input key `K`.
    pub fn record_input<K: GraphInput>(&mut self, value: K::Value)
    where
        K::Value: GraphReusable,
    {
        self.record_keyed(TypeId::of::<K>(), value);
    }

    fn record_keyed<T: GraphReusable>(&mut self, key: TypeId, value: T) {
        self.filter.insert_id(key);
        self.stack.push(Box::new(ReusableSlot { key, value }));
    }

    /// The number of recorded inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// `true` if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Appends everything `other` recorded.
    pub fn append(&mut self, other: &Self) {
        self.filter = self.filter.union(other.filter);
        self.stack
            .extend(other.stack.iter().map(|slot| slot.clone_boxed()));
    }

    /// Checks whether the subtree built from `self` can serve `other`,
    /// recording the required redirects into `map` on success.
    ///
    /// The check is all-or-nothing: any single input's rejection leaves
    /// `map` untouched. With `test_only` the check runs fully but commits
    /// nothing, for speculative trials.
    pub fn try_to_reuse(
        &self,
        other: &Self,
        map: &mut IndirectAttributeMap,
        test_only: bool,
    ) -> bool {
        if self.filter != other.filter {
            tracing::debug!("input reuse rejected: type filters differ");
            return false;
        }
        if self.stack.len() != other.stack.len() {
            tracing::debug!(
                ours = self.stack.len(),
                theirs = other.stack.len(),
                "input reuse rejected: stack depths differ"
            );
            return false;
        }
        for (position, (mine, theirs)) in self.stack.iter().zip(other.stack.iter()).enumerate() {
            if mine.input_type() != theirs.input_type() {
                tracing::debug!(position, "input reuse rejected: input types differ");
                return false;
            }
        }

        let mut staged = map.clone();
        for (position, (mine, theirs)) in self.stack.iter().zip(other.stack.iter()).enumerate() {
            if !mine.try_to_reuse_erased(theirs.as_any(), &mut staged) {
                tracing::debug!(position, "input reuse rejected by input");
                return false;
            }
        }
        if !test_only {
            *map = staged;
        }
        true
    }
}

/// The implicit parameters handed down during tree construction.
///
/// The four well-known attributes come from the owning host; custom
/// inputs ride in a [`PropertyList`] so extensions get the same
/// structural sharing as the environment. The pack is cheap to clone and
/// is cloned at every branch point.
#[derive(Clone)]
pub struct GraphInputs {
    /// The host's frame clock.
    pub time: Attribute<Time>,
    /// The host's update phase.
    pub phase: Attribute<Phase>,
    /// The tree's environment at this point.
    pub environment: Attribute<EnvironmentValues>,
    /// The transaction active while this subtree updates.
    pub transaction: Attribute<Transaction>,
    /// Behavioral flags.
    pub options: GraphInputOptions,
    custom_inputs: PropertyList,
    merged_inputs: SmallVec<[RawAttribute; 4]>,
    reusable: ReusableInputs,
}

impl core::fmt::Debug for GraphInputs {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GraphInputs")
            .field("time", &self.time)
            .field("phase", &self.phase)
            .field("environment", &self.environment)
            .field("transaction", &self.transaction)
            .field("options", &self.options)
            .field("merged_inputs", &self.merged_inputs)
            .finish_non_exhaustive()
    }
}

impl GraphInputs {
    /// A pack over a host's well-known attributes, with no custom inputs.
    #[must_use]
    pub fn new(
        time: Attribute<Time>,
        phase: Attribute<Phase>,
        environment: Attribute<EnvironmentValues>,
        transaction: Attribute<Transaction>,
    ) -> Self {
        Self {
            time,
            phase,
            environment,
            transaction,
            options: GraphInputOptions::empty(),
            custom_inputs: PropertyList::new(),
            merged_inputs: SmallVec::new(),
            reusable: ReusableInputs::new(),
        }
    }

    /// Reads a custom input, falling back to `K`'s default.
    #[must_use]
    pub fn custom_input<K: GraphInput>(&self) -> K::Value {
        self.custom_inputs.get::<K>()
    }

    /// Sets a custom input for the subtree below.
    pub fn set_custom_input<K: GraphInput>(&mut self, value: K::Value) {
        self.custom_inputs.set::<K>(value);
    }

    /// Sets a custom input that also takes part in subtree reuse.
    pub fn set_reusable_input<K: GraphInput>(&mut self, value: K::Value)
    where
        K::Value: GraphReusable,
    {
        self.reusable.record_input::<K>(value.clone());
        self.custom_inputs.set::<K>(value);
    }

    /// The custom-input list itself.
    #[must_use]
    pub fn custom_inputs(&self) -> &PropertyList {
        &self.custom_inputs
    }

    /// The reuse record accumulated so far.
    #[must_use]
    pub fn reusable_inputs(&self) -> &ReusableInputs {
        &self.reusable
    }

    /// Notes that `source` has been merged into this pack.
    ///
    /// Returns `false` when the same source was already merged, so a
    /// modifier stack combining inputs from several directions merges each
    /// source once.
    pub fn merge_input(&mut self, source: RawAttribute) -> bool {
        if self.merged_inputs.contains(&source) {
            return false;
        }
        self.merged_inputs.push(source);
        true
    }

    /// Layers `other`'s custom inputs, merged sources, flags, and reuse
    /// record onto this pack.
    pub fn import(&mut self, other: &Self) {
        self.custom_inputs.override_with(&other.custom_inputs);
        for &source in &other.merged_inputs {
            self.merge_input(source);
        }
        self.options |= other.options;
        self.reusable.append(&other.reusable);
    }

    /// Checks whether the subtree built from `self` can serve `other`:
    /// the four well-known attributes are redirected and the custom reuse
    /// records must match (see [`ReusableInputs::try_to_reuse`]).
    /// All-or-nothing, with the same `test_only` semantics.
    pub fn try_to_reuse(
        &self,
        other: &Self,
        map: &mut IndirectAttributeMap,
        test_only: bool,
    ) -> bool {
        if (self.options | other.options).contains(GraphInputOptions::DISABLE_REUSE) {
            tracing::debug!("input reuse rejected: disabled by options");
            return false;
        }
        let mut staged = map.clone();
        let core_ok = self.time.try_to_reuse(&other.time, &mut staged)
            && self.phase.try_to_reuse(&other.phase, &mut staged)
            && self.environment.try_to_reuse(&other.environment, &mut staged)
            && self.transaction.try_to_reuse(&other.transaction, &mut staged);
        if !core_ok {
            tracing::debug!("input reuse rejected: conflicting core redirect");
            return false;
        }
        if !self.reusable.try_to_reuse(&other.reusable, &mut staged, false) {
            return false;
        }
        if !test_only {
            *map = staged;
        }
        true
    }
}

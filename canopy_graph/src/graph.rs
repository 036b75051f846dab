// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The attribute graph: slot arena, evaluation, and invalidation.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::any::Any;

use smallvec::SmallVec;

use crate::attribute::{Attribute, RawAttribute, WeakAttribute};
use crate::rule::{ErasedRule, EvalContext, Rule};
use crate::seed::VersionSeed;
use crate::subgraph::{SubgraphId, SubgraphTable};

enum NodeKind {
    /// Externally set source value.
    Value,
    /// Computed value. The rule body is taken out while it is running.
    Rule(Option<Box<dyn ErasedRule>>),
    /// Forwarding node that resolves to another attribute.
    Indirect(RawAttribute),
}

struct Node {
    generation: u32,
    subgraph: SubgraphId,
    kind: NodeKind,
    value: Option<Box<dyn Any>>,
    dirty: bool,
    /// Version of the last change, feeding [`VersionSeed`]s.
    version: u64,
    /// Slot indices this node reads (recorded during evaluation).
    dependencies: SmallVec<[u32; 4]>,
    /// Slot indices that read this node.
    dependents: SmallVec<[u32; 4]>,
    live: bool,
}

struct EvalFrame {
    slot: u32,
    deps: Vec<u32>,
}

/// An attribute graph.
///
/// The graph owns every attribute slot, the dependency edges between them,
/// and the subgraph ownership tree. Evaluation is demand-driven and
/// memoized; invalidation is eager. See the [crate docs](crate) for the
/// overall model.
pub struct Graph {
    nodes: Vec<Node>,
    free: Vec<u32>,
    subgraphs: SubgraphTable,
    root: SubgraphId,
    next_version: u64,
    eval_stack: Vec<EvalFrame>,
    invalidation_observer: Option<Box<dyn FnMut(RawAttribute)>>,
    update_observer: Option<Box<dyn FnMut()>>,
    pending_update: bool,
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}

impl Graph {
    /// Creates an empty graph with a root subgraph.
    #[must_use]
    pub fn new() -> Self {
        let mut subgraphs = SubgraphTable::default();
        let root = subgraphs.create(None);
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            subgraphs,
            root,
            next_version: 0,
            eval_stack: Vec::new(),
            invalidation_observer: None,
            update_observer: None,
            pending_update: false,
        }
    }

    /// Returns the root subgraph, which lives as long as the graph.
    #[inline]
    #[must_use]
    pub fn root_subgraph(&self) -> SubgraphId {
        self.root
    }

    /// Returns `true` while a rule evaluation pass is running.
    #[inline]
    #[must_use]
    pub fn is_updating(&self) -> bool {
        !self.eval_stack.is_empty()
    }

    fn bump_version(&mut self) -> u64 {
        self.next_version += 1;
        self.next_version
    }

    // --- Subgraphs ---

    /// Creates a new subgraph, optionally owned by `parent`.
    ///
    /// A subgraph with no parent is only freed by an explicit
    /// [`invalidate_subgraph`](Self::invalidate_subgraph) (or by later
    /// attaching it under a parent that is torn down).
    pub fn subgraph(&mut self, parent: Option<SubgraphId>) -> SubgraphId {
        if let Some(parent) = parent {
            debug_assert!(self.subgraphs.is_live(parent), "parent subgraph is dead");
        }
        self.subgraphs.create(parent)
    }

    /// Returns `true` if the subgraph has not been torn down.
    #[must_use]
    pub fn is_subgraph_live(&self, id: SubgraphId) -> bool {
        self.subgraphs.is_live(id)
    }

    /// Makes `child` an owned child of `parent`. No-op if already attached.
    pub fn add_subgraph_child(&mut self, parent: SubgraphId, child: SubgraphId) {
        self.subgraphs.add_child(parent, child);
    }

    /// Detaches `child` from `parent` so it survives the parent's teardown.
    pub fn remove_subgraph_child(&mut self, parent: SubgraphId, child: SubgraphId) {
        self.subgraphs.remove_child(parent, child);
    }

    /// Tears down a subgraph and everything it transitively owns.
    ///
    /// All attributes created in the subtree are freed: their slot
    /// generations are bumped (so strong reads panic and weak reads return
    /// `None`) and attributes outside the subtree that depended on them are
    /// marked dirty.
    pub fn invalidate_subgraph(&mut self, id: SubgraphId) {
        let freed = self.subgraphs.tear_down(id);
        if freed.is_empty() {
            return;
        }

        // Mark surviving dependents dirty before any slot state is cleared.
        for &slot in &freed {
            let dependents = self.nodes[slot as usize].dependents.clone();
            for dep in dependents {
                if !freed.contains(&dep) {
                    self.mark_dirty_from(dep);
                }
            }
        }

        for slot in freed {
            self.free_slot(slot);
        }
        self.note_pending_update();
    }

    fn free_slot(&mut self, slot: u32) {
        let deps = core::mem::take(&mut self.nodes[slot as usize].dependencies);
        for dep in deps {
            let list = &mut self.nodes[dep as usize].dependents;
            if let Some(pos) = list.iter().position(|&s| s == slot) {
                list.swap_remove(pos);
            }
        }
        let dependents = core::mem::take(&mut self.nodes[slot as usize].dependents);
        for dep in dependents {
            let list = &mut self.nodes[dep as usize].dependencies;
            if let Some(pos) = list.iter().position(|&s| s == slot) {
                list.swap_remove(pos);
            }
        }

        let node = &mut self.nodes[slot as usize];
        node.generation = node.generation.wrapping_add(1);
        node.kind = NodeKind::Value;
        node.value = None;
        node.dirty = false;
        node.live = false;
        self.free.push(slot);
    }

    // --- Attribute creation ---

    fn alloc_slot(&mut self, subgraph: SubgraphId, kind: NodeKind, value: Option<Box<dyn Any>>, dirty: bool) -> RawAttribute {
        debug_assert!(self.subgraphs.is_live(subgraph), "subgraph is dead");
        let version = self.bump_version();
        let index = if let Some(index) = self.free.pop() {
            let node = &mut self.nodes[index as usize];
            node.subgraph = subgraph;
            node.kind = kind;
            node.value = value;
            node.dirty = dirty;
            node.version = version;
            node.live = true;
            index
        } else {
            let index = self.nodes.len() as u32;
            self.nodes.push(Node {
                generation: 1,
                subgraph,
                kind,
                value,
                dirty,
                version,
                dependencies: SmallVec::new(),
                dependents: SmallVec::new(),
                live: true,
            });
            index
        };
        self.subgraphs.record_slot(subgraph, index);
        RawAttribute::new(index, self.nodes[index as usize].generation)
    }

    /// Creates a source attribute holding `value`.
    pub fn value<T: 'static>(&mut self, subgraph: SubgraphId, value: T) -> Attribute<T> {
        let raw = self.alloc_slot(subgraph, NodeKind::Value, Some(Box::new(value)), false);
        Attribute::from_raw(raw)
    }

    /// Creates a computed attribute driven by `rule`.
    ///
    /// The rule does not run until the attribute is first read.
    pub fn rule<R: Rule>(&mut self, subgraph: SubgraphId, rule: R) -> Attribute<R::Output> {
        let raw = self.alloc_slot(subgraph, NodeKind::Rule(Some(Box::new(rule))), None, true);
        Attribute::from_raw(raw)
    }

    /// Creates a forwarding attribute that resolves to `target`.
    ///
    /// Reads and writes through the indirect attribute behave as if made on
    /// the current target; [`redirect`](Self::redirect) swaps the target and
    /// invalidates dependents of the indirection.
    pub fn indirect<T: 'static>(&mut self, subgraph: SubgraphId, target: Attribute<T>) -> Attribute<T> {
        let raw = self.alloc_slot(subgraph, NodeKind::Indirect(target.raw()), None, false);
        let slot = raw.index();
        let target_slot = self.checked_slot(target.raw());
        self.nodes[slot as usize].dependencies.push(target_slot);
        self.nodes[target_slot as usize].dependents.push(slot);
        Attribute::from_raw(raw)
    }

    /// Points an indirect attribute at a new target.
    ///
    /// Dependents of the indirection are marked dirty.
    pub fn redirect<T: 'static>(&mut self, indirect: Attribute<T>, new_target: Attribute<T>) {
        let slot = self.checked_slot(indirect.raw());
        let new_slot = self.checked_slot(new_target.raw());
        let NodeKind::Indirect(old) = self.nodes[slot as usize].kind else {
            debug_assert!(false, "redirect on a non-indirect attribute");
            return;
        };
        if old == new_target.raw() {
            return;
        }

        let old_slot = old.index();
        let list = &mut self.nodes[old_slot as usize].dependents;
        if let Some(pos) = list.iter().position(|&s| s == slot) {
            list.swap_remove(pos);
        }
        let deps = &mut self.nodes[slot as usize].dependencies;
        if let Some(pos) = deps.iter().position(|&s| s == old_slot) {
            deps.swap_remove(pos);
        }

        self.nodes[slot as usize].kind = NodeKind::Indirect(new_target.raw());
        self.nodes[slot as usize].dependencies.push(new_slot);
        self.nodes[new_slot as usize].dependents.push(slot);

        let version = self.bump_version();
        self.nodes[slot as usize].version = version;
        self.mark_dependents_dirty(slot);
        self.notify_invalidation(slot);
    }

    // --- Handle resolution ---

    /// Resolves a raw handle to its slot, panicking on stale handles.
    fn checked_slot(&self, raw: RawAttribute) -> u32 {
        let index = raw.index() as usize;
        let live = self
            .nodes
            .get(index)
            .is_some_and(|n| n.live && n.generation == raw.generation());
        assert!(live, "attribute used after its subgraph was torn down");
        raw.index()
    }

    /// Resolves a raw handle, returning `None` for stale handles.
    fn try_slot(&self, raw: RawAttribute) -> Option<u32> {
        let node = self.nodes.get(raw.index() as usize)?;
        (node.live && node.generation == raw.generation()).then_some(raw.index())
    }

    /// Follows indirection chains to the terminal slot.
    fn resolve_target(&self, mut slot: u32) -> u32 {
        let mut hops = 0_u32;
        while let NodeKind::Indirect(target) = self.nodes[slot as usize].kind {
            slot = self.checked_slot(target);
            hops += 1;
            debug_assert!(hops <= self.nodes.len() as u32, "indirection cycle");
        }
        slot
    }

    // --- Reads ---

    fn record_dependency(&mut self, slot: u32) {
        if let Some(frame) = self.eval_stack.last_mut()
            && frame.slot != slot
            && !frame.deps.contains(&slot)
        {
            frame.deps.push(slot);
        }
    }

    /// Reads an attribute, evaluating it (and any dirty inputs) if needed.
    ///
    /// Clean attributes are returned from the memoized value without running
    /// their rule. When called during a rule evaluation, the read is
    /// recorded as a dependency of the attribute being evaluated.
    ///
    /// # Panics
    ///
    /// Panics if the attribute's subgraph has been torn down, or if the
    /// handle's type does not match the slot (possible only through
    /// [`Attribute::from_raw`]).
    pub fn get<T: Clone + 'static>(&mut self, attr: Attribute<T>) -> T {
        let slot = self.checked_slot(attr.raw());
        self.record_dependency(slot);
        let target = self.resolve_target(slot);
        self.update_slot(target);
        match self.nodes[target as usize]
            .value
            .as_ref()
            .and_then(|v| v.downcast_ref::<T>())
        {
            Some(value) => value.clone(),
            None => panic!("attribute read with mismatched type"),
        }
    }

    /// Reads a weak attribute.
    ///
    /// Returns `None` once the attribute has been torn down.
    pub fn get_weak<T: Clone + 'static>(&mut self, weak: WeakAttribute<T>) -> Option<T> {
        self.try_slot(weak.raw())?;
        Some(self.get(weak.assume_live()))
    }

    /// Returns the version seed of an attribute.
    ///
    /// Does not evaluate: a dirty attribute reports
    /// [`VersionSeed::INVALID`], since its value may change at the next
    /// read. Stale handles also report `INVALID`.
    #[must_use]
    pub fn seed<T>(&self, attr: Attribute<T>) -> VersionSeed {
        let Some(slot) = self.try_slot(attr.raw()) else {
            return VersionSeed::INVALID;
        };
        let target = self.resolve_target(slot);
        let node = &self.nodes[target as usize];
        if node.dirty {
            VersionSeed::INVALID
        } else {
            VersionSeed::from_version(node.version.max(self.nodes[slot as usize].version))
        }
    }

    fn update_slot(&mut self, slot: u32) {
        let node = &self.nodes[slot as usize];
        if !node.dirty && node.value.is_some() {
            return;
        }
        match node.kind {
            NodeKind::Value => {
                // Source nodes are always current; dirty here only means a
                // forced invalidation passed through.
                self.nodes[slot as usize].dirty = false;
            }
            NodeKind::Indirect(_) => {
                debug_assert!(false, "update on unresolved indirection");
            }
            NodeKind::Rule(_) => self.evaluate_rule(slot),
        }
    }

    fn evaluate_rule(&mut self, slot: u32) {
        if self.eval_stack.iter().any(|frame| frame.slot == slot) {
            // Evaluation cycle: leave the previous value in place.
            debug_assert!(false, "cycle during attribute evaluation");
            return;
        }
        let rule = match &mut self.nodes[slot as usize].kind {
            NodeKind::Rule(body) => body.take(),
            _ => return,
        };
        let Some(mut rule) = rule else {
            return;
        };

        self.eval_stack.push(EvalFrame {
            slot,
            deps: Vec::new(),
        });
        let output = rule.evaluate_erased(&mut EvalContext::new(self));
        let frame = self
            .eval_stack
            .pop()
            .expect("eval stack balanced around rule evaluation");
        debug_assert_eq!(frame.slot, slot);

        self.replace_dependencies(slot, frame.deps);
        let version = self.bump_version();
        let node = &mut self.nodes[slot as usize];
        node.kind = NodeKind::Rule(Some(rule));
        node.value = Some(output);
        node.dirty = false;
        node.version = version;
    }

    /// Installs the edge set recorded by the latest evaluation, dropping
    /// stale edges and adding new ones.
    fn replace_dependencies(&mut self, slot: u32, new_deps: Vec<u32>) {
        let old = core::mem::take(&mut self.nodes[slot as usize].dependencies);
        for dep in old.iter().copied() {
            if !new_deps.contains(&dep) {
                let list = &mut self.nodes[dep as usize].dependents;
                if let Some(pos) = list.iter().position(|&s| s == slot) {
                    list.swap_remove(pos);
                }
            }
        }
        for dep in new_deps.iter().copied() {
            if !old.contains(&dep) {
                self.nodes[dep as usize].dependents.push(slot);
            }
        }
        self.nodes[slot as usize].dependencies = SmallVec::from_vec(new_deps);
    }

    // --- Writes and invalidation ---

    /// Writes a source attribute, suppressing no-op writes.
    ///
    /// Returns `true` if the value changed. Equal values (per `PartialEq`)
    /// leave the graph untouched: no version bump, no invalidation, no
    /// observer call. Writing through an indirection writes its target.
    ///
    /// # Panics
    ///
    /// Panics if the attribute has been torn down.
    pub fn set<T: PartialEq + 'static>(&mut self, attr: Attribute<T>, value: T) -> bool {
        let slot = self.checked_slot(attr.raw());
        let target = self.resolve_target(slot);
        if let Some(current) = self.nodes[target as usize]
            .value
            .as_ref()
            .and_then(|v| v.downcast_ref::<T>())
            && *current == value
        {
            return false;
        }
        self.store(target, Box::new(value));
        true
    }

    /// Writes a source attribute unconditionally.
    ///
    /// For value types without `PartialEq`; always invalidates dependents.
    pub fn set_always<T: 'static>(&mut self, attr: Attribute<T>, value: T) {
        let slot = self.checked_slot(attr.raw());
        let target = self.resolve_target(slot);
        self.store(target, Box::new(value));
    }

    fn store(&mut self, slot: u32, value: Box<dyn Any>) {
        debug_assert!(
            matches!(self.nodes[slot as usize].kind, NodeKind::Value),
            "set on a computed attribute"
        );
        let version = self.bump_version();
        let node = &mut self.nodes[slot as usize];
        node.value = Some(value);
        node.version = version;
        node.dirty = false;
        self.mark_dependents_dirty(slot);
        self.notify_invalidation(slot);
    }

    /// Marks an attribute and its transitive dependents dirty without
    /// storing a new value.
    ///
    /// The next read of any downstream attribute recomputes. The
    /// invalidation observer is told the source.
    pub fn invalidate_value<T>(&mut self, attr: Attribute<T>) {
        let Some(slot) = self.try_slot(attr.raw()) else {
            return;
        };
        let target = self.resolve_target(slot);
        let version = self.bump_version();
        let node = &mut self.nodes[target as usize];
        node.version = version;
        if matches!(node.kind, NodeKind::Rule(_)) {
            node.dirty = true;
        }
        self.mark_dependents_dirty(target);
        self.notify_invalidation(slot);
    }

    /// Mutates an installed rule's body in place.
    ///
    /// The attribute is invalidated, so the next read re-evaluates with the
    /// mutated rule. Returns `false` (without calling `modify`) if the
    /// attribute is stale, is not a rule, or its body is not an `R`.
    pub fn modify_rule<R: Rule>(
        &mut self,
        attr: Attribute<R::Output>,
        modify: impl FnOnce(&mut R),
    ) -> bool {
        let Some(slot) = self.try_slot(attr.raw()) else {
            return false;
        };
        let NodeKind::Rule(Some(body)) = &mut self.nodes[slot as usize].kind else {
            return false;
        };
        let Some(rule) = body.as_any_mut().downcast_mut::<R>() else {
            return false;
        };
        modify(rule);
        let version = self.bump_version();
        let node = &mut self.nodes[slot as usize];
        node.version = version;
        node.dirty = true;
        self.mark_dependents_dirty(slot);
        self.notify_invalidation(slot);
        true
    }

    fn mark_dirty_from(&mut self, slot: u32) {
        if matches!(self.nodes[slot as usize].kind, NodeKind::Indirect(_)) {
            self.mark_dependents_dirty(slot);
            return;
        }
        if !self.nodes[slot as usize].dirty {
            self.nodes[slot as usize].dirty = true;
            self.mark_dependents_dirty(slot);
        }
    }

    /// Eager dirty propagation. A dirty node's dependents are already
    /// dirty, so propagation stops at dirty nodes. Indirections hold no
    /// value of their own and are forwarded through without touching
    /// their dirty flag, so a second change to their target still reaches
    /// the dependents behind them.
    fn mark_dependents_dirty(&mut self, slot: u32) {
        let mut stack: SmallVec<[u32; 16]> = SmallVec::new();
        let mut forwarded: SmallVec<[u32; 4]> = SmallVec::new();
        stack.extend(self.nodes[slot as usize].dependents.iter().copied());
        while let Some(next) = stack.pop() {
            let node = &mut self.nodes[next as usize];
            if matches!(node.kind, NodeKind::Indirect(_)) {
                if forwarded.contains(&next) {
                    continue;
                }
                forwarded.push(next);
                stack.extend(node.dependents.iter().copied());
                continue;
            }
            if node.dirty {
                continue;
            }
            node.dirty = true;
            stack.extend(node.dependents.iter().copied());
        }
    }

    // --- Observers ---

    fn notify_invalidation(&mut self, slot: u32) {
        let raw = RawAttribute::new(slot, self.nodes[slot as usize].generation);
        if let Some(observer) = self.invalidation_observer.as_mut() {
            observer(raw);
        }
        self.note_pending_update();
    }

    fn note_pending_update(&mut self) {
        if !self.pending_update {
            self.pending_update = true;
            if let Some(observer) = self.update_observer.as_mut() {
                observer();
            }
        }
    }

    /// Installs the invalidation observer, called with the source attribute
    /// of every explicit change.
    pub fn set_invalidation_observer(&mut self, observer: impl FnMut(RawAttribute) + 'static) {
        self.invalidation_observer = Some(Box::new(observer));
    }

    /// Removes the invalidation observer.
    pub fn clear_invalidation_observer(&mut self) {
        self.invalidation_observer = None;
    }

    /// Installs the update observer, called once per transition from "no
    /// pending work" to "pending work".
    pub fn set_update_observer(&mut self, observer: impl FnMut() + 'static) {
        self.update_observer = Some(Box::new(observer));
    }

    /// Returns and clears the pending-update flag.
    ///
    /// The flag is set by any invalidation and cleared only here, so a host
    /// polling between frames sees `true` at most once per batch of changes.
    pub fn take_pending_update(&mut self) -> bool {
        core::mem::take(&mut self.pending_update)
    }
}

impl core::fmt::Debug for Graph {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Graph")
            .field("nodes", &self.nodes.len())
            .field("free", &self.free.len())
            .field("version", &self.next_version)
            .field("updating", &self.is_updating())
            .finish()
    }
}

// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subgraph scoping: ownership tree for attribute lifetimes.

use alloc::vec::Vec;
use core::fmt;

use smallvec::SmallVec;

/// Identifier of a subgraph within a [`Graph`](crate::Graph).
///
/// Every attribute is created in a subgraph. Subgraphs form a tree: tearing
/// one down ([`Graph::invalidate_subgraph`](crate::Graph::invalidate_subgraph))
/// frees the attributes of the subgraph and of all its descendants, bumping
/// their slot generations so stale handles are caught at read time.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubgraphId(pub(crate) u32);

impl SubgraphId {
    /// Returns the numeric id.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for SubgraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubgraphId({})", self.0)
    }
}

#[derive(Debug)]
pub(crate) struct SubgraphEntry {
    pub(crate) parent: Option<SubgraphId>,
    pub(crate) children: SmallVec<[SubgraphId; 4]>,
    /// Slot indices of the attributes created in this subgraph.
    pub(crate) slots: Vec<u32>,
    pub(crate) live: bool,
}

/// The subgraph ownership tree. Ids are never reused; a torn-down entry
/// stays behind as a dead marker.
#[derive(Debug, Default)]
pub(crate) struct SubgraphTable {
    entries: Vec<SubgraphEntry>,
}

impl SubgraphTable {
    pub(crate) fn create(&mut self, parent: Option<SubgraphId>) -> SubgraphId {
        let id = SubgraphId(self.entries.len() as u32);
        self.entries.push(SubgraphEntry {
            parent,
            children: SmallVec::new(),
            slots: Vec::new(),
            live: true,
        });
        if let Some(parent) = parent {
            self.entries[parent.0 as usize].children.push(id);
        }
        id
    }

    pub(crate) fn is_live(&self, id: SubgraphId) -> bool {
        self.entries
            .get(id.0 as usize)
            .is_some_and(|entry| entry.live)
    }

    pub(crate) fn record_slot(&mut self, id: SubgraphId, slot: u32) {
        self.entries[id.0 as usize].slots.push(slot);
    }

    pub(crate) fn add_child(&mut self, parent: SubgraphId, child: SubgraphId) {
        let entry = &mut self.entries[child.0 as usize];
        if entry.parent == Some(parent) {
            return;
        }
        debug_assert!(entry.parent.is_none(), "subgraph already has a parent");
        entry.parent = Some(parent);
        self.entries[parent.0 as usize].children.push(child);
    }

    pub(crate) fn remove_child(&mut self, parent: SubgraphId, child: SubgraphId) {
        let entry = &mut self.entries[child.0 as usize];
        if entry.parent != Some(parent) {
            return;
        }
        entry.parent = None;
        let children = &mut self.entries[parent.0 as usize].children;
        if let Some(pos) = children.iter().position(|&c| c == child) {
            children.swap_remove(pos);
        }
    }

    /// Marks `id` and all its descendants dead, returning the slot indices
    /// they owned. The caller frees the slots.
    pub(crate) fn tear_down(&mut self, id: SubgraphId) -> Vec<u32> {
        let mut freed = Vec::new();
        if !self.is_live(id) {
            return freed;
        }

        // Detach from the parent so the dead subtree is unreachable.
        if let Some(parent) = self.entries[id.0 as usize].parent.take() {
            let children = &mut self.entries[parent.0 as usize].children;
            if let Some(pos) = children.iter().position(|&c| c == id) {
                children.swap_remove(pos);
            }
        }

        let mut stack = alloc::vec![id];
        while let Some(current) = stack.pop() {
            let entry = &mut self.entries[current.0 as usize];
            if !entry.live {
                continue;
            }
            entry.live = false;
            entry.parent = None;
            freed.append(&mut entry.slots);
            stack.extend(core::mem::take(&mut entry.children));
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tear_down_collects_descendant_slots() {
        let mut table = SubgraphTable::default();
        let root = table.create(None);
        let child = table.create(Some(root));
        let grandchild = table.create(Some(child));

        table.record_slot(root, 0);
        table.record_slot(child, 1);
        table.record_slot(grandchild, 2);

        let freed = table.tear_down(child);
        assert_eq!(freed.len(), 2);
        assert!(freed.contains(&1));
        assert!(freed.contains(&2));

        assert!(table.is_live(root));
        assert!(!table.is_live(child));
        assert!(!table.is_live(grandchild));

        // Tearing down again is a no-op.
        assert!(table.tear_down(child).is_empty());
    }

    #[test]
    fn remove_child_detaches_from_parent_teardown() {
        let mut table = SubgraphTable::default();
        let root = table.create(None);
        let child = table.create(Some(root));
        table.record_slot(child, 5);

        table.remove_child(root, child);
        let freed = table.tear_down(root);
        assert!(freed.is_empty());
        assert!(table.is_live(child));
    }

    #[test]
    fn add_child_reattaches() {
        let mut table = SubgraphTable::default();
        let a = table.create(None);
        let b = table.create(None);
        table.record_slot(b, 9);

        table.add_child(a, b);
        let freed = table.tear_down(a);
        assert_eq!(freed, alloc::vec![9]);
    }
}

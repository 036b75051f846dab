// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Deferred graph edits and the transaction buckets that batch them.

use core::any::Any;

use canopy_graph::{Attribute, Graph};
use canopy_state::{Transaction, TransactionId};

/// When an enqueued mutation takes effect.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum MutationStyle {
    /// Flush the pending buckets as soon as the mutation is enqueued.
    Immediate,
    /// Wait for the next [`GraphHost::flush_transactions`](crate::GraphHost::flush_transactions).
    Deferred,
}

/// A graph edit deferred until its transaction bucket is applied.
///
/// Mutations in one bucket apply in enqueue order, except that each new
/// mutation is first offered to the bucket's last via [`combine`]
/// (`GraphMutation::combine`) so redundant work (repeated invalidations of
/// one attribute, say) collapses to a single entry.
pub trait GraphMutation: Any {
    /// Applies the edit.
    fn apply(&mut self, graph: &mut Graph);

    /// Attempts to absorb `other` into `self`.
    ///
    /// `true` means `other`'s effect is already fully represented by
    /// `self` and it will not be enqueued.
    fn combine(&mut self, other: &dyn GraphMutation) -> bool;
}

/// Invalidates one attribute when applied.
///
/// Two invalidations of the same attribute combine into one.
pub struct InvalidatingGraphMutation<T: 'static> {
    attribute: Attribute<T>,
}

impl<T> core::fmt::Debug for InvalidatingGraphMutation<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("InvalidatingGraphMutation")
            .field("attribute", &self.attribute)
            .finish()
    }
}

impl<T: 'static> InvalidatingGraphMutation<T> {
    /// A mutation that invalidates `attribute`.
    #[must_use]
    pub fn new(attribute: Attribute<T>) -> Self {
        Self { attribute }
    }
}

impl<T: 'static> GraphMutation for InvalidatingGraphMutation<T> {
    fn apply(&mut self, graph: &mut Graph) {
        graph.invalidate_value(self.attribute);
    }

    fn combine(&mut self, other: &dyn GraphMutation) -> bool {
        (other as &dyn Any)
            .downcast_ref::<Self>()
            .is_some_and(|other| other.attribute == self.attribute)
    }
}

/// Runs an arbitrary closure against the graph. Never combines.
pub struct CustomGraphMutation<F: FnMut(&mut Graph) + 'static> {
    body: F,
}

impl<F: FnMut(&mut Graph) + 'static> core::fmt::Debug for CustomGraphMutation<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CustomGraphMutation").finish_non_exhaustive()
    }
}

impl<F: FnMut(&mut Graph) + 'static> CustomGraphMutation<F> {
    /// A mutation running `body` when applied.
    #[must_use]
    pub fn new(body: F) -> Self {
        Self { body }
    }
}

impl<F: FnMut(&mut Graph) + 'static> GraphMutation for CustomGraphMutation<F> {
    fn apply(&mut self, graph: &mut Graph) {
        (self.body)(graph);
    }

    fn combine(&mut self, _other: &dyn GraphMutation) -> bool {
        false
    }
}

/// A mutation with no effect of its own.
///
/// Enqueued to force a flush (and the delegate notification that follows)
/// for changes already applied to the graph. Combines with itself, so any
/// number of them occupy one slot.
#[derive(Copy, Clone, Debug, Default)]
pub struct EmptyGraphMutation;

impl GraphMutation for EmptyGraphMutation {
    fn apply(&mut self, _graph: &mut Graph) {}

    fn combine(&mut self, other: &dyn GraphMutation) -> bool {
        (other as &dyn Any).downcast_ref::<Self>().is_some()
    }
}

/// Mutations tagged with one transaction, applied together.
pub struct AsyncTransaction {
    transaction: Transaction,
    id: TransactionId,
    mutations: Vec<Box<dyn GraphMutation>>,
}

impl core::fmt::Debug for AsyncTransaction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AsyncTransaction")
            .field("id", &self.id)
            .field("mutations", &self.mutations.len())
            .finish_non_exhaustive()
    }
}

impl AsyncTransaction {
    /// An empty bucket for `transaction`.
    #[must_use]
    pub fn new(transaction: Transaction, id: TransactionId) -> Self {
        Self {
            transaction,
            id,
            mutations: Vec::new(),
        }
    }

    /// The transaction every mutation in this bucket is tagged with.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Whether a mutation tagged `(transaction, id)` belongs in this
    /// bucket. Transactions compare by property-list identity.
    #[must_use]
    pub fn matches(&self, transaction: &Transaction, id: TransactionId) -> bool {
        self.id == id && self.transaction.property_list().id() == transaction.property_list().id()
    }

    /// Enqueues a mutation, combining it with the last one when possible.
    pub fn append(&mut self, mutation: Box<dyn GraphMutation>) {
        if let Some(last) = self.mutations.last_mut()
            && last.combine(mutation.as_ref())
        {
            return;
        }
        self.mutations.push(mutation);
    }

    /// The number of (post-combining) mutations held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mutations.len()
    }

    /// `true` if no mutations are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Applies every mutation in enqueue order.
    pub fn apply_all(&mut self, graph: &mut Graph) {
        for mutation in &mut self.mutations {
            mutation.apply(graph);
        }
        self.mutations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_target_invalidations_collapse() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let a = graph.value(root, 1_i32);
        let b = graph.value(root, 2_i32);

        let mut bucket = AsyncTransaction::new(Transaction::new(), TransactionId::fresh());
        bucket.append(Box::new(InvalidatingGraphMutation::new(a)));
        bucket.append(Box::new(InvalidatingGraphMutation::new(a)));
        assert_eq!(bucket.len(), 1);

        // A different target does not combine, and breaks the run.
        bucket.append(Box::new(InvalidatingGraphMutation::new(b)));
        bucket.append(Box::new(InvalidatingGraphMutation::new(a)));
        assert_eq!(bucket.len(), 3);
    }

    #[test]
    fn empty_mutations_occupy_one_slot() {
        let mut bucket = AsyncTransaction::new(Transaction::new(), TransactionId::fresh());
        bucket.append(Box::new(EmptyGraphMutation));
        bucket.append(Box::new(EmptyGraphMutation));
        bucket.append(Box::new(EmptyGraphMutation));
        assert_eq!(bucket.len(), 1);
    }

    #[test]
    fn custom_mutations_never_combine() {
        let mut graph = Graph::new();
        let root = graph.root_subgraph();
        let counter = graph.value(root, 0_i32);

        let mut bucket = AsyncTransaction::new(Transaction::new(), TransactionId::fresh());
        for _ in 0..2 {
            bucket.append(Box::new(CustomGraphMutation::new(move |graph: &mut Graph| {
                let current = graph.get(counter);
                graph.set(counter, current + 1);
            })));
        }
        assert_eq!(bucket.len(), 2);

        bucket.apply_all(&mut graph);
        assert_eq!(graph.get(counter), 2);
        assert!(bucket.is_empty());
    }

    #[test]
    fn buckets_match_on_transaction_identity() {
        let id = TransactionId::fresh();
        let tx = Transaction::new();
        let bucket = AsyncTransaction::new(tx.clone(), id);
        assert!(bucket.matches(&tx, id));
        assert!(!bucket.matches(&tx, TransactionId::fresh()));
    }
}

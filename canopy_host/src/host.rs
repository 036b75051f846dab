// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The graph host: attribute graph ownership and the update loop.

use std::any::TypeId;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use parking_lot::Mutex;

use canopy_environment::EnvironmentValues;
use canopy_graph::{
    Attribute, Graph, RawAttribute, SubgraphId, VersionSeed, WeakAttribute,
};
use canopy_preference::{
    AnyPreferenceKey, HostPreferenceKey, HostPreferencesChild, HostPreferencesCombiner,
    PreferenceKeys, PreferenceList, PreferenceValue,
};
use canopy_state::{HostHandle, Transaction, TransactionId, with_transaction};

use crate::delegate::GraphDelegate;
use crate::inputs::GraphInputs;
use crate::mutation::{AsyncTransaction, EmptyGraphMutation, GraphMutation, MutationStyle};
use crate::phase::{Phase, Time};
use crate::preview::PreviewGate;

/// Process-unique host identity, used by [`PreviewGate`] bookkeeping.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct HostId(u64);

impl HostId {
    /// Allocates a fresh identity.
    #[must_use]
    pub fn fresh() -> Self {
        static NEXT_HOST_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_HOST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Caller-chosen identity for an interned constant attribute.
///
/// Interning is keyed by `(value type, ConstantId)`, so the same id may be
/// reused across types.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ConstantId(pub u32);

/// The host's well-known attributes and update counters.
struct HostData {
    global_subgraph: SubgraphId,
    root_subgraph: SubgraphId,
    time: Attribute<Time>,
    phase: Attribute<Phase>,
    environment: Attribute<EnvironmentValues>,
    transaction: Attribute<Transaction>,
    host_preference_keys: Attribute<PreferenceKeys>,
    host_preferences: Attribute<PreferenceList>,
    update_seed: u32,
    transaction_seed: u32,
    preference_seed: VersionSeed,
}

/// A host owning one attribute graph and the update loop around it.
///
/// The host turns invalidations into batched work: state writes and graph
/// edits are enqueued as [`GraphMutation`]s tagged with a [`Transaction`],
/// buckets apply in order inside [`with_transaction`], and the
/// [`GraphDelegate`] is told once per flush that output is stale.
///
/// A torn-down host ([`invalidate`](Self::invalidate)) accepts every
/// operation as a silent no-op; in-flight work racing teardown is expected
/// and tolerated.
pub struct GraphHost {
    id: HostId,
    graph: Graph,
    data: HostData,
    delegate: Box<dyn GraphDelegate>,
    handle: HostHandle,
    pending: Vec<AsyncTransaction>,
    current_transaction_id: TransactionId,
    may_defer_update: bool,
    constants: HashMap<(TypeId, ConstantId), RawAttribute>,
    /// Sources reported by the graph's invalidation observer since the
    /// last flush. Feeds [`has_pending_work`](Self::has_pending_work);
    /// cleared once the flush's notification covers them.
    invalidations: Arc<Mutex<Vec<RawAttribute>>>,
    instantiated: bool,
    valid: bool,
}

impl core::fmt::Debug for GraphHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GraphHost")
            .field("id", &self.id)
            .field("pending", &self.pending.len())
            .field("instantiated", &self.instantiated)
            .field("valid", &self.valid)
            .finish_non_exhaustive()
    }
}

impl GraphHost {
    /// Creates a host with an empty environment.
    #[must_use]
    pub fn new(delegate: Box<dyn GraphDelegate>) -> Self {
        Self::with_environment(delegate, EnvironmentValues::new())
    }

    /// Creates a host whose environment attribute starts at `environment`.
    #[must_use]
    pub fn with_environment(delegate: Box<dyn GraphDelegate>, environment: EnvironmentValues) -> Self {
        let mut graph = Graph::new();
        let global_subgraph = graph.subgraph(None);
        let root_subgraph = graph.subgraph(Some(global_subgraph));

        let time = graph.value(global_subgraph, Time::ZERO);
        let phase = graph.value(global_subgraph, Phase::default());
        let environment = graph.value(global_subgraph, environment);
        let transaction = graph.value(global_subgraph, Transaction::new());
        let host_preference_keys = graph.value(global_subgraph, PreferenceKeys::new());
        let host_preferences = graph.rule(
            global_subgraph,
            HostPreferencesCombiner::new(host_preference_keys, None),
        );

        Self {
            id: HostId::fresh(),
            graph,
            data: HostData {
                global_subgraph,
                root_subgraph,
                time,
                phase,
                environment,
                transaction,
                host_preference_keys,
                host_preferences,
                update_seed: 0,
                transaction_seed: 0,
                preference_seed: VersionSeed::EMPTY,
            },
            delegate,
            handle: HostHandle::new(),
            pending: Vec::new(),
            current_transaction_id: TransactionId::fresh(),
            may_defer_update: false,
            constants: HashMap::new(),
            invalidations: Arc::new(Mutex::new(Vec::new())),
            instantiated: false,
            valid: true,
        }
    }

    // --- Identity and access ---

    /// This host's process-unique identity.
    #[must_use]
    pub fn id(&self) -> HostId {
        self.id
    }

    /// `false` once the host has been torn down.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// The owned graph.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// The owned graph, mutably. Attribute construction for the hosted
    /// tree goes through here.
    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    /// The subgraph holding the host's own attributes.
    #[must_use]
    pub fn global_subgraph(&self) -> SubgraphId {
        self.data.global_subgraph
    }

    /// The subgraph the hosted tree builds into.
    #[must_use]
    pub fn root_subgraph(&self) -> SubgraphId {
        self.data.root_subgraph
    }

    /// The handle state cells use to reach this host's commit queue.
    #[must_use]
    pub fn state_handle(&self) -> HostHandle {
        self.handle.clone()
    }

    /// Counts completed flushes.
    #[must_use]
    pub fn update_seed(&self) -> u32 {
        self.data.update_seed
    }

    /// Counts applied transaction buckets.
    #[must_use]
    pub fn transaction_seed(&self) -> u32 {
        self.data.transaction_seed
    }

    /// The input pack for building the hosted tree: this host's well-known
    /// attributes with no custom inputs.
    #[must_use]
    pub fn inputs(&self) -> GraphInputs {
        GraphInputs::new(
            self.data.time,
            self.data.phase,
            self.data.environment,
            self.data.transaction,
        )
    }

    // --- Instantiation ---

    /// Wires the graph's observers and asks the delegate for an initial
    /// build. Idempotent.
    pub fn instantiate(&mut self) {
        if self.instantiated || !self.valid {
            return;
        }
        self.instantiated = true;
        let log = Arc::clone(&self.invalidations);
        self.graph
            .set_invalidation_observer(move |raw| log.lock().push(raw));
        self.delegate.update_graph();
    }

    /// [`instantiate`](Self::instantiate), unless `gate` is blocked — in
    /// which case the host is recorded for a later
    /// [`PreviewGate::drain`] and `false` is returned.
    pub fn instantiate_if_needed(&mut self, gate: &PreviewGate) -> bool {
        if self.instantiated {
            return true;
        }
        if gate.defer(self.id) {
            tracing::debug!(host = self.id.0, "instantiation deferred for preview");
            return false;
        }
        self.instantiate();
        true
    }

    // --- Well-known inputs ---

    /// Advances the frame clock.
    pub fn set_time(&mut self, time: Time) {
        if !self.valid {
            return;
        }
        self.graph.set(self.data.time, time);
    }

    /// Replaces the root environment. Writes are suppressed when the new
    /// values are provably identical to the current ones.
    pub fn set_environment(&mut self, environment: EnvironmentValues) {
        if !self.valid {
            return;
        }
        let current = self.graph.get(self.data.environment);
        if current.may_not_be_equal(&environment) {
            self.graph.set_always(self.data.environment, environment);
        }
    }

    /// Replaces the update phase.
    pub fn set_phase(&mut self, phase: Phase) {
        if !self.valid {
            return;
        }
        self.graph.set(self.data.phase, phase);
    }

    /// Bumps the phase counter, discarding phase-scoped caches downstream.
    pub fn increment_phase(&mut self) {
        if !self.valid {
            return;
        }
        let phase = self.graph.get(self.data.phase);
        self.graph.set(self.data.phase, phase.incremented());
    }

    /// Interns a constant: one attribute per `(T, id)` pair for the life
    /// of the host. The value closure runs only on first use.
    pub fn intern<T: Clone + 'static>(
        &mut self,
        id: ConstantId,
        value: impl FnOnce() -> T,
    ) -> Attribute<T> {
        let key = (TypeId::of::<T>(), id);
        if let Some(&raw) = self.constants.get(&key) {
            return Attribute::from_raw(raw);
        }
        let attr = self.graph.value(self.data.global_subgraph, value());
        self.constants.insert(key, attr.raw());
        attr
    }

    // --- Transactions ---

    /// Enqueues a mutation into the bucket for `transaction`.
    ///
    /// Consecutive mutations with the same transaction share a bucket, and
    /// each new mutation is offered to the bucket's last for combining.
    /// `Immediate` style flushes right away; `Deferred` waits for the next
    /// [`flush_transactions`](Self::flush_transactions). `may_defer_update`
    /// leaves the pending update's urgency downgraded only if every
    /// enqueuer agrees.
    pub fn async_transaction(
        &mut self,
        transaction: Transaction,
        mutation: Box<dyn GraphMutation>,
        style: MutationStyle,
        may_defer_update: bool,
    ) {
        if !self.valid {
            return;
        }
        self.may_defer_update = self.may_defer_update && may_defer_update;
        let id = self.current_transaction_id;
        match self.pending.last_mut() {
            Some(bucket) if bucket.matches(&transaction, id) => bucket.append(mutation),
            _ => {
                let mut bucket = AsyncTransaction::new(transaction, id);
                bucket.append(mutation);
                self.pending.push(bucket);
                self.may_defer_update = may_defer_update;
            }
        }
        if style == MutationStyle::Immediate {
            self.flush_transactions();
        }
    }

    /// Routes a raw graph invalidation.
    ///
    /// With no source attribute this is a global change: the delegate is
    /// told directly, bypassing batching. With a source, the host's active
    /// transaction decides: a non-empty transaction defers through
    /// [`async_transaction`](Self::async_transaction) so the animation
    /// context is live when the update applies; an empty one notifies the
    /// delegate immediately.
    pub fn graph_invalidation(&mut self, from: Option<RawAttribute>) {
        if !self.valid {
            return;
        }
        let Some(_source) = from else {
            self.delegate.graph_did_change();
            return;
        };
        let transaction = self.graph.get(self.data.transaction);
        if transaction.is_empty() {
            self.delegate.graph_did_change();
        } else {
            self.async_transaction(
                transaction,
                Box::new(EmptyGraphMutation),
                MutationStyle::Deferred,
                true,
            );
        }
    }

    /// Runs `body` with `transaction` active (both on the thread-current
    /// stack and in the host's transaction attribute), then flushes.
    pub fn run_transaction(
        &mut self,
        transaction: Transaction,
        body: impl FnOnce(&mut Graph),
    ) {
        if !self.valid {
            return;
        }
        self.graph
            .set_always(self.data.transaction, transaction.clone());
        {
            let graph = &mut self.graph;
            with_transaction(transaction, move || body(graph));
        }
        self.graph
            .set_always(self.data.transaction, Transaction::new());
        self.flush_transactions();
    }

    /// Applies all pending work: staged state commits first, then each
    /// transaction bucket in enqueue order inside [`with_transaction`],
    /// then one delegate notification per kind of change.
    pub fn flush_transactions(&mut self) {
        if !self.valid {
            return;
        }

        let mut changed = false;
        self.handle.set_updating(true);
        let commits = self.handle.drain_commits();
        for commit in &commits {
            changed = true;
            while commit.commit() {}
        }

        let buckets = std::mem::take(&mut self.pending);
        for mut bucket in buckets {
            self.delegate.begin_transaction();
            let graph = &mut self.graph;
            let transaction = bucket.transaction().clone();
            with_transaction(transaction, move || bucket.apply_all(graph));
            self.data.transaction_seed = self.data.transaction_seed.wrapping_add(1);
        }
        self.handle.set_updating(false);

        // Invalidations raised by our own flush are covered by the
        // notification below.
        self.invalidations.lock().clear();

        if self.graph.take_pending_update() || changed {
            self.data.update_seed = self.data.update_seed.wrapping_add(1);
            self.current_transaction_id = TransactionId::fresh();
            self.delegate.graph_did_change();
        }
        if self.update_preferences() {
            self.delegate.preferences_did_change();
        }
        self.may_defer_update = false;
    }

    /// `true` while a pending update may be coalesced into a later frame.
    #[must_use]
    pub fn may_defer_update(&self) -> bool {
        self.may_defer_update
    }

    /// `true` if any bucket or staged state commit is pending.
    #[must_use]
    pub fn has_pending_work(&self) -> bool {
        !self.pending.is_empty()
            || self.handle.has_pending_commits()
            || !self.invalidations.lock().is_empty()
    }

    // --- Host-readable preferences ---

    /// Asks the hosted tree for key `K`'s reduced value from now on.
    pub fn add_preference<K: HostPreferenceKey>(&mut self) {
        self.add_preference_key(AnyPreferenceKey::of::<K>());
    }

    /// Erased form of [`add_preference`](Self::add_preference), used by
    /// bridges forwarding another host's requests.
    pub fn add_preference_key(&mut self, key: AnyPreferenceKey) {
        if !self.valid {
            return;
        }
        let mut keys = self.graph.get(self.data.host_preference_keys);
        keys.add_key(key);
        self.graph.set(self.data.host_preference_keys, keys);
    }

    /// Stops requesting key `K`.
    pub fn remove_preference<K: HostPreferenceKey>(&mut self) {
        self.remove_preference_key(&AnyPreferenceKey::of::<K>());
    }

    /// Erased form of [`remove_preference`](Self::remove_preference).
    pub fn remove_preference_key(&mut self, key: &AnyPreferenceKey) {
        if !self.valid {
            return;
        }
        let mut keys = self.graph.get(self.data.host_preference_keys);
        keys.remove_key(key);
        self.graph.set(self.data.host_preference_keys, keys);
    }

    /// The reduced values of every requested key.
    pub fn preference_values(&mut self) -> PreferenceList {
        if !self.valid {
            return PreferenceList::new();
        }
        self.graph.get(self.data.host_preferences)
    }

    /// The reduced value of key `K`, if the tree published one.
    pub fn preference_value<K: HostPreferenceKey>(&mut self) -> Option<PreferenceValue<K::Value>> {
        self.preference_values().value_if_present::<K>()
    }

    /// Re-reads the preference output, returning `true` when it may have
    /// changed since the last call (seed comparison, conservative).
    pub fn update_preferences(&mut self) -> bool {
        if !self.valid {
            return false;
        }
        let seed = self.preference_values().seed();
        if seed.may_not_be_equal(self.data.preference_seed) {
            self.data.preference_seed = seed;
            true
        } else {
            false
        }
    }

    /// Registers a child subtree's `(keys, values)` pair with the host's
    /// preference combiner.
    pub fn add_preference_child(&mut self, child: HostPreferencesChild) {
        if !self.valid {
            return;
        }
        self.graph
            .modify_rule::<HostPreferencesCombiner>(self.data.host_preferences, |rule| {
                rule.add_child(child);
            });
    }

    /// Removes the child registered with this keys attribute.
    pub fn remove_preference_child(&mut self, keys: WeakAttribute<PreferenceKeys>) {
        if !self.valid {
            return;
        }
        self.graph
            .modify_rule::<HostPreferencesCombiner>(self.data.host_preferences, |rule| {
                rule.remove_child(keys);
            });
    }

    // --- Teardown ---

    /// Tears the host down: the state handle is invalidated (dropping
    /// staged writes), pending buckets are discarded, and every owned
    /// attribute is freed. Idempotent; all later operations no-op.
    pub fn invalidate(&mut self) {
        if !self.valid {
            return;
        }
        self.valid = false;
        self.handle.invalidate();
        self.pending.clear();
        self.invalidations.lock().clear();
        self.constants.clear();
        self.graph.clear_invalidation_observer();
        self.graph.invalidate_subgraph(self.data.root_subgraph);
        self.graph.invalidate_subgraph(self.data.global_subgraph);
    }
}

impl Drop for GraphHost {
    fn drop(&mut self) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::NoopDelegate;
    use crate::mutation::InvalidatingGraphMutation;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingDelegate {
        renders: Rc<Cell<u32>>,
        preference_changes: Rc<Cell<u32>>,
    }

    impl GraphDelegate for CountingDelegate {
        fn graph_did_change(&mut self) {
            self.renders.set(self.renders.get() + 1);
        }
        fn preferences_did_change(&mut self) {
            self.preference_changes.set(self.preference_changes.get() + 1);
        }
    }

    fn counting_host() -> (GraphHost, Rc<Cell<u32>>, Rc<Cell<u32>>) {
        let renders = Rc::new(Cell::new(0));
        let preference_changes = Rc::new(Cell::new(0));
        let host = GraphHost::new(Box::new(CountingDelegate {
            renders: renders.clone(),
            preference_changes: preference_changes.clone(),
        }));
        (host, renders, preference_changes)
    }

    #[test]
    fn flush_notifies_once_per_batch() {
        let (mut host, renders, _) = counting_host();
        host.instantiate();

        let attr = {
            let subgraph = host.root_subgraph();
            host.graph_mut().value(subgraph, 0_i32)
        };
        let tx = Transaction::new();
        for _ in 0..3 {
            host.async_transaction(
                tx.clone(),
                Box::new(InvalidatingGraphMutation::new(attr)),
                MutationStyle::Deferred,
                true,
            );
        }
        assert_eq!(renders.get(), 0);

        host.flush_transactions();
        assert_eq!(renders.get(), 1);
        assert!(!host.has_pending_work());
        assert_eq!(host.transaction_seed(), 1);
    }

    #[test]
    fn immediate_style_flushes_on_enqueue() {
        let (mut host, renders, _) = counting_host();
        host.instantiate();
        let attr = {
            let subgraph = host.root_subgraph();
            host.graph_mut().value(subgraph, 0_i32)
        };
        host.async_transaction(
            Transaction::new(),
            Box::new(InvalidatingGraphMutation::new(attr)),
            MutationStyle::Immediate,
            false,
        );
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn invalidated_host_ignores_everything() {
        let (mut host, renders, _) = counting_host();
        host.instantiate();
        host.invalidate();
        host.invalidate();

        host.set_time(Time::new(1.0));
        host.increment_phase();
        host.graph_invalidation(None);
        host.flush_transactions();
        assert_eq!(renders.get(), 0);
        assert!(!host.is_valid());
        assert!(host.preference_values().is_empty());
    }

    #[test]
    fn interning_is_per_type_and_id() {
        let mut host = GraphHost::new(Box::new(NoopDelegate));
        let a = host.intern(ConstantId(1), || 10_i32);
        let b = host.intern(ConstantId(1), || 99_i32);
        let c = host.intern(ConstantId(2), || 20_i32);
        let s = host.intern(ConstantId(1), || "ten");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(host.graph_mut().get(b), 10);
        assert_eq!(host.graph_mut().get(s), "ten");
    }

    #[test]
    fn preference_requests_flow_through_the_combiner() {
        struct Badges;
        impl canopy_preference::PreferenceKey for Badges {
            type Value = u32;
            fn default_value() -> u32 {
                0
            }
            fn reduce(value: &mut u32, next_value: impl FnOnce() -> u32) {
                *value += next_value();
            }
        }
        impl HostPreferenceKey for Badges {}

        let (mut host, _, preference_changes) = counting_host();
        host.instantiate();
        host.add_preference::<Badges>();

        let (child_keys, child_values) = {
            let subgraph = host.root_subgraph();
            let graph = host.graph_mut();
            let mut keys = PreferenceKeys::new();
            keys.add::<Badges>();
            let child_keys = graph.value(subgraph, keys);
            let child_values = graph.value(
                subgraph,
                PreferenceList::new().set::<Badges>(4, VersionSeed::from_version(1)),
            );
            (child_keys, child_values)
        };
        host.add_preference_child(HostPreferencesChild {
            keys: child_keys.downgrade(),
            values: child_values.downgrade(),
        });

        assert_eq!(host.preference_value::<Badges>().map(|v| v.value), Some(4));
        host.flush_transactions();
        assert_eq!(preference_changes.get(), 1);

        // Unchanged output: no second notification.
        host.flush_transactions();
        assert_eq!(preference_changes.get(), 1);

        host.remove_preference::<Badges>();
        assert_eq!(host.preference_value::<Badges>(), None);
    }

    #[test]
    fn phase_and_time_writes_reach_their_attributes() {
        let mut host = GraphHost::new(Box::new(NoopDelegate));
        host.set_time(Time::new(0.5));
        host.increment_phase();
        host.increment_phase();

        let inputs = host.inputs();
        assert_eq!(host.graph_mut().get(inputs.time), Time::new(0.5));
        assert_eq!(host.graph_mut().get(inputs.phase).reset_seed(), 2);
    }
}

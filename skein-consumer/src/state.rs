//! The actor's state: an atomically swapped snapshot of fetches, parked
//! commits, rebalance hooks, and lifecycle flags.
//!
//! All transitions are move-through pure functions `State -> State` or
//! `State -> (State, extra)`; [`StateCell`] swaps the whole value under a
//! lock, so every handler observes and produces a consistent snapshot.

use crate::fetch::FetchRequest;
use crate::requests::{CommitRequest, OnRebalance};
use parking_lot::Mutex;
use skein_core::{StreamId, TopicPartition};
use std::collections::{BTreeMap, BTreeSet};

/// Default bound on commits parked during a rebalance window.
///
/// Under pathological rebalance flapping the parked queue would otherwise
/// grow without bound; at the limit the oldest parked commit is failed.
pub const DEFAULT_PENDING_COMMIT_LIMIT: usize = 1024;

/// Consumer actor state.
///
/// Mutated only by the actor's own handlers and by the rebalance listener,
/// which runs on the actor thread inside a broker poll.
#[derive(Debug)]
pub struct State {
    /// Live fetch tokens keyed by partition, then stream.
    ///
    /// Every token reachable here is uncompleted.
    fetches: BTreeMap<TopicPartition, BTreeMap<StreamId, FetchRequest>>,

    /// Commits parked while a rebalance is in progress, in enqueue order.
    pending_commits: Vec<CommitRequest>,

    /// Registered rebalance hooks, in registration order. Append-only.
    on_rebalances: Vec<OnRebalance>,

    /// True from revocation entry until the next assignment completes.
    rebalancing: bool,

    /// Set on the first successful subscribe; never cleared.
    subscribed: bool,

    /// Set on the first assignment request; never cleared.
    streaming: bool,

    /// Cap on `pending_commits`.
    pending_commit_limit: usize,
}

impl Default for State {
    fn default() -> Self {
        Self::new(DEFAULT_PENDING_COMMIT_LIMIT)
    }
}

impl State {
    /// Create an empty state with the given parked-commit bound.
    #[must_use]
    pub fn new(pending_commit_limit: usize) -> Self {
        Self {
            fetches: BTreeMap::new(),
            pending_commits: Vec::new(),
            on_rebalances: Vec::new(),
            rebalancing: false,
            subscribed: false,
            streaming: false,
            pending_commit_limit,
        }
    }

    /// Whether a rebalance window is open.
    #[must_use]
    pub fn is_rebalancing(&self) -> bool {
        self.rebalancing
    }

    /// Whether any subscribe has succeeded.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    /// Whether any assignment request has been seen.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Partitions with at least one live fetch.
    #[must_use]
    pub fn requested_partitions(&self) -> BTreeSet<TopicPartition> {
        self.fetches.keys().cloned().collect()
    }

    /// Number of commits currently parked.
    #[must_use]
    pub fn pending_commit_count(&self) -> usize {
        self.pending_commits.len()
    }

    /// Registered rebalance hooks, in registration order.
    #[must_use]
    pub fn on_rebalances(&self) -> &[OnRebalance] {
        &self.on_rebalances
    }

    /// Install `fetch` at its `(partition, stream)` slot, returning the
    /// prior occupant if any.
    ///
    /// The caller must complete the prior token as revoked so no waiter is
    /// stranded; only one live token may exist per slot.
    #[must_use]
    pub fn with_fetch(mut self, fetch: FetchRequest) -> (Self, Option<FetchRequest>) {
        let partition = fetch.partition().clone();
        let stream = fetch.stream();
        let prior = self.fetches.entry(partition).or_default().insert(stream, fetch);
        (self, prior)
    }

    /// Drop every fetch slot for `partitions`, discarding the tokens.
    #[must_use]
    pub fn without_fetches(mut self, partitions: &BTreeSet<TopicPartition>) -> Self {
        self.fetches.retain(|partition, _| !partitions.contains(partition));
        self
    }

    /// Remove and return every fetch registered for `partitions`.
    ///
    /// Tokens come back grouped by partition, streams in ascending order,
    /// so completions fire deterministically.
    #[must_use]
    pub fn take_fetches(
        mut self,
        partitions: &BTreeSet<TopicPartition>,
    ) -> (Self, Vec<FetchRequest>) {
        let mut taken = Vec::new();
        for partition in partitions {
            if let Some(streams) = self.fetches.remove(partition) {
                taken.extend(streams.into_values());
            }
        }
        (self, taken)
    }

    /// Remove and return every live fetch. Used at teardown.
    #[must_use]
    pub fn take_all_fetches(mut self) -> (Self, Vec<FetchRequest>) {
        let fetches = std::mem::take(&mut self.fetches);
        let taken = fetches.into_values().flat_map(BTreeMap::into_values).collect();
        (self, taken)
    }

    /// Park `commit` until the rebalance window closes.
    ///
    /// Returns the evicted oldest entry when the parked queue is full; the
    /// caller must fail it.
    #[must_use]
    pub fn with_pending_commit(mut self, commit: CommitRequest) -> (Self, Option<CommitRequest>) {
        let evicted = if self.pending_commits.len() >= self.pending_commit_limit {
            Some(self.pending_commits.remove(0))
        } else {
            None
        };
        self.pending_commits.push(commit);
        (self, evicted)
    }

    /// Drain all parked commits, in enqueue order.
    #[must_use]
    pub fn without_pending_commits(mut self) -> (Self, Vec<CommitRequest>) {
        let drained = std::mem::take(&mut self.pending_commits);
        (self, drained)
    }

    /// Set the rebalancing flag. Idempotent.
    #[must_use]
    pub fn with_rebalancing(mut self, rebalancing: bool) -> Self {
        self.rebalancing = rebalancing;
        self
    }

    /// Mark the consumer subscribed. Idempotent.
    #[must_use]
    pub fn as_subscribed(mut self) -> Self {
        self.subscribed = true;
        self
    }

    /// Mark the consumer streaming. Idempotent.
    #[must_use]
    pub fn as_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Append a rebalance hook.
    #[must_use]
    pub fn with_on_rebalance(mut self, hook: OnRebalance) -> Self {
        self.on_rebalances.push(hook);
        self
    }

    fn view(&self) -> StateView {
        StateView {
            rebalancing: self.rebalancing,
            subscribed: self.subscribed,
            streaming: self.streaming,
            requested: self.requested_partitions(),
            pending_commits: self.pending_commits.len(),
            on_rebalances: self.on_rebalances.clone(),
        }
    }
}

/// A cloneable read-only snapshot of [`State`].
///
/// Fetch and commit tokens are single-owner and therefore not part of the
/// view; handlers that need them drain through [`StateCell::update`].
#[derive(Debug, Clone)]
pub struct StateView {
    /// Whether a rebalance window is open
    pub rebalancing: bool,

    /// Whether any subscribe has succeeded
    pub subscribed: bool,

    /// Whether any assignment request has been seen
    pub streaming: bool,

    /// Partitions with at least one live fetch
    pub requested: BTreeSet<TopicPartition>,

    /// Number of parked commits
    pub pending_commits: usize,

    /// Registered rebalance hooks
    pub on_rebalances: Vec<OnRebalance>,
}

/// The atomic cell the actor and the rebalance listener share.
///
/// The actor is single-threaded, so a guarded swap is all the atomicity
/// required; the lock also covers the minor concurrency with async commit
/// callbacks, which only ever touch completions, never this cell.
#[derive(Debug)]
pub struct StateCell {
    inner: Mutex<State>,
}

impl StateCell {
    /// Create a cell holding an empty state.
    #[must_use]
    pub fn new(pending_commit_limit: usize) -> Self {
        Self { inner: Mutex::new(State::new(pending_commit_limit)) }
    }

    /// Apply a pure transition returning an extra value.
    pub fn update<R>(&self, f: impl FnOnce(State) -> (State, R)) -> R {
        let mut guard = self.inner.lock();
        let (next, extra) = f(std::mem::take(&mut *guard));
        *guard = next;
        extra
    }

    /// Apply a pure transition with no extra value.
    pub fn apply(&self, f: impl FnOnce(State) -> State) {
        self.update(|state| (f(state), ()));
    }

    /// Capture a read-only snapshot.
    #[must_use]
    pub fn view(&self) -> StateView {
        self.inner.lock().view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OffsetMap;
    use crate::fetch::FetchDelivery;
    use skein_core::{PartitionId, Result, Topic};
    use tokio::sync::oneshot;

    fn tp(partition: u32) -> TopicPartition {
        TopicPartition::new(Topic::new("t").unwrap(), PartitionId::new(partition))
    }

    fn fetch(partition: u32, stream: u32) -> (FetchRequest, oneshot::Receiver<FetchDelivery>) {
        let (tx, rx) = oneshot::channel();
        (FetchRequest::new(tp(partition), StreamId::new(stream), tx), rx)
    }

    fn commit() -> (CommitRequest, oneshot::Receiver<Result<()>>) {
        let (tx, rx) = oneshot::channel();
        (CommitRequest::new(OffsetMap::new(), tx), rx)
    }

    #[test]
    fn test_flag_transitions_are_idempotent() {
        let state = State::default().with_rebalancing(true).with_rebalancing(true);
        assert!(state.is_rebalancing());

        let state = state.as_subscribed().as_subscribed().as_streaming().as_streaming();
        assert!(state.is_subscribed());
        assert!(state.is_streaming());

        let state = state.with_rebalancing(false).with_rebalancing(false);
        assert!(!state.is_rebalancing());
    }

    #[test]
    fn test_with_fetch_returns_prior_occupant() {
        let (first, _rx1) = fetch(0, 1);
        let (second, _rx2) = fetch(0, 1);

        let (state, prior) = State::default().with_fetch(first);
        assert!(prior.is_none());

        let (state, prior) = state.with_fetch(second);
        let prior = prior.expect("slot was occupied");
        assert_eq!(prior.partition(), &tp(0));
        assert_eq!(prior.stream(), StreamId::new(1));
        assert_eq!(state.requested_partitions().len(), 1);
    }

    #[test]
    fn test_fetch_slots_are_per_stream() {
        let (a, _rxa) = fetch(0, 1);
        let (b, _rxb) = fetch(0, 2);

        let (state, _) = State::default().with_fetch(a);
        let (state, prior) = state.with_fetch(b);
        assert!(prior.is_none());

        let (_, taken) = state.take_fetches(&[tp(0)].into_iter().collect());
        assert_eq!(taken.len(), 2);
    }

    #[test]
    fn test_install_then_remove_restores_domain() {
        let (f, _rx) = fetch(2, 0);
        let before = State::default();
        let empty_dom = before.requested_partitions();

        let (state, _) = before.with_fetch(f);
        let state = state.without_fetches(&[tp(2)].into_iter().collect());
        assert_eq!(state.requested_partitions(), empty_dom);
    }

    #[test]
    fn test_take_fetches_only_touches_named_partitions() {
        let (a, _rxa) = fetch(0, 0);
        let (b, _rxb) = fetch(1, 0);

        let (state, _) = State::default().with_fetch(a);
        let (state, _) = state.with_fetch(b);

        let (state, taken) = state.take_fetches(&[tp(0)].into_iter().collect());
        assert_eq!(taken.len(), 1);
        assert_eq!(state.requested_partitions(), [tp(1)].into_iter().collect());
    }

    #[test]
    fn test_pending_commit_cap_evicts_oldest() {
        let mut state = State::new(2);
        let (first, mut first_rx) = commit();
        let (second, _second_rx) = commit();
        let (third, _third_rx) = commit();

        let (next, evicted) = state.with_pending_commit(first);
        assert!(evicted.is_none());
        let (next, evicted) = next.with_pending_commit(second);
        assert!(evicted.is_none());
        let (next, evicted) = next.with_pending_commit(third);
        state = next;

        let evicted = evicted.expect("oldest entry evicted at the cap");
        evicted.complete(Err(skein_core::Error::CommitFailure {
            message: "parked commit limit exceeded".to_string(),
        }));
        assert!(first_rx.try_recv().unwrap().is_err());
        assert_eq!(state.pending_commit_count(), 2);
    }

    #[test]
    fn test_without_pending_commits_drains_in_order() {
        let (a, _rxa) = commit();
        let (b, _rxb) = commit();

        let (state, _) = State::default().with_pending_commit(a);
        let (state, _) = state.with_pending_commit(b);
        let (state, drained) = state.without_pending_commits();

        assert_eq!(drained.len(), 2);
        assert_eq!(state.pending_commit_count(), 0);
    }

    #[test]
    fn test_cell_update_swaps_state() {
        let cell = StateCell::new(DEFAULT_PENDING_COMMIT_LIMIT);
        cell.apply(State::as_subscribed);
        cell.apply(State::as_streaming);

        let view = cell.view();
        assert!(view.subscribed);
        assert!(view.streaming);
        assert!(!view.rebalancing);
        assert!(view.requested.is_empty());
    }
}

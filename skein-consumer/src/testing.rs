//! # Mock Broker Module
//!
//! Scripted [`BrokerClient`] implementation for exercising the consumer
//! actor without a real broker.
//!
//! ## Features
//!
//! - **Scripted assignment**: the partition set the coordinator would report
//! - **Queued poll batches**: each poll pops the next batch whose
//!   partitions are all resumed; paused data stays queued, like a real
//!   client. [`MockController::set_ignore_pause`] models a client that
//!   violates the pause protocol.
//! - **Scripted rebalances**: revoke/assign events delivered to the
//!   registered listener synchronously inside `poll`, like a real client
//! - **Commit modes**: succeed, fail synchronously, fail via callback, or
//!   defer the callback for manual release from another thread
//! - **Call log**: every handle operation is recorded for assertions
//!
//! ## Usage
//!
//! ```rust
//! use skein_consumer::testing::{MockBroker, RebalanceEvent};
//! use skein_core::RecordBatch;
//!
//! let (broker, controller) = MockBroker::new();
//! controller.set_assignment([]);
//! controller.push_batch(RecordBatch::new());
//! controller.push_rebalance(RebalanceEvent::Assign([].into_iter().collect()));
//! // hand `broker` to ConsumerActor::new / Consumer::spawn
//! ```

use crate::client::{BrokerClient, CommitCallback, OffsetMap, RebalanceListener};
use parking_lot::Mutex;
use regex::Regex;
use skein_core::{Error, RecordBatch, Result, Topic, TopicPartition};
use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

// ================================================================================================
// Scripting Types
// ================================================================================================

/// One recorded handle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerCall {
    /// `subscribe` with the given topics
    Subscribe(Vec<Topic>),
    /// `subscribe_pattern` with the pattern's source text
    SubscribePattern(String),
    /// `assignment`
    Assignment,
    /// `pause` with the given partitions
    Pause(BTreeSet<TopicPartition>),
    /// `resume` with the given partitions
    Resume(BTreeSet<TopicPartition>),
    /// `poll` with the given timeout
    Poll(Duration),
    /// `commit_async` covering the given partitions
    CommitAsync(Vec<TopicPartition>),
}

/// A group-protocol event delivered inside the next poll.
#[derive(Debug, Clone)]
pub enum RebalanceEvent {
    /// Partitions taken away from the consumer
    Revoke(BTreeSet<TopicPartition>),
    /// Partitions handed to the consumer
    Assign(BTreeSet<TopicPartition>),
}

/// How `commit_async` behaves.
#[derive(Debug, Clone, Default)]
pub enum CommitMode {
    /// Record the offsets and invoke the callback with `Ok` immediately
    #[default]
    Succeed,
    /// Fail the dispatch itself; the callback never runs
    FailSync(String),
    /// Dispatch, then invoke the callback with a commit failure
    FailAsync(String),
    /// Dispatch and hold the callback until
    /// [`MockController::release_deferred_commits`]
    Defer,
}

#[derive(Default)]
struct MockBrokerShared {
    assignment: Mutex<BTreeSet<TopicPartition>>,
    paused: Mutex<BTreeSet<TopicPartition>>,
    ignore_pause: Mutex<bool>,
    batches: Mutex<VecDeque<RecordBatch>>,
    rebalances: Mutex<VecDeque<RebalanceEvent>>,
    calls: Mutex<Vec<BrokerCall>>,
    subscribe_failures: Mutex<VecDeque<String>>,
    commit_mode: Mutex<CommitMode>,
    deferred_commits: Mutex<Vec<(OffsetMap, CommitCallback)>>,
    committed: Mutex<Vec<OffsetMap>>,
}

// ================================================================================================
// Mock Broker
// ================================================================================================

/// Scripted broker handle; the actor side of the pair.
pub struct MockBroker {
    shared: Arc<MockBrokerShared>,
    listener: Option<Arc<dyn RebalanceListener>>,
}

impl MockBroker {
    /// Create a broker and its scripting controller.
    #[must_use]
    pub fn new() -> (Self, MockController) {
        let shared = Arc::new(MockBrokerShared::default());
        (
            Self { shared: Arc::clone(&shared), listener: None },
            MockController { shared },
        )
    }

    fn record(&self, call: BrokerCall) {
        self.shared.calls.lock().push(call);
    }

    fn drain_rebalances(&mut self) {
        loop {
            let event = self.shared.rebalances.lock().pop_front();
            let Some(event) = event else { break };
            match event {
                RebalanceEvent::Revoke(partitions) => {
                    {
                        let mut assignment = self.shared.assignment.lock();
                        for partition in &partitions {
                            assignment.remove(partition);
                        }
                    }
                    if let Some(listener) = &self.listener {
                        listener.on_partitions_revoked(&partitions);
                    }
                }
                RebalanceEvent::Assign(partitions) => {
                    self.shared.assignment.lock().extend(partitions.iter().cloned());
                    if let Some(listener) = &self.listener {
                        listener.on_partitions_assigned(&partitions);
                    }
                }
            }
        }
    }
}

impl BrokerClient for MockBroker {
    fn subscribe(&mut self, topics: &[Topic], listener: Arc<dyn RebalanceListener>) -> Result<()> {
        self.record(BrokerCall::Subscribe(topics.to_vec()));
        if let Some(message) = self.shared.subscribe_failures.lock().pop_front() {
            return Err(Error::SubscribeFailure { message });
        }
        self.listener = Some(listener);
        Ok(())
    }

    fn subscribe_pattern(
        &mut self,
        pattern: &Regex,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<()> {
        self.record(BrokerCall::SubscribePattern(pattern.as_str().to_string()));
        if let Some(message) = self.shared.subscribe_failures.lock().pop_front() {
            return Err(Error::SubscribeFailure { message });
        }
        self.listener = Some(listener);
        Ok(())
    }

    fn assignment(&mut self) -> Result<BTreeSet<TopicPartition>> {
        self.record(BrokerCall::Assignment);
        Ok(self.shared.assignment.lock().clone())
    }

    fn pause(&mut self, partitions: &BTreeSet<TopicPartition>) -> Result<()> {
        self.record(BrokerCall::Pause(partitions.clone()));
        self.shared.paused.lock().extend(partitions.iter().cloned());
        Ok(())
    }

    fn resume(&mut self, partitions: &BTreeSet<TopicPartition>) -> Result<()> {
        self.record(BrokerCall::Resume(partitions.clone()));
        let mut paused = self.shared.paused.lock();
        for partition in partitions {
            paused.remove(partition);
        }
        Ok(())
    }

    fn poll(&mut self, timeout: Duration) -> Result<RecordBatch> {
        self.record(BrokerCall::Poll(timeout));
        // Group-protocol callbacks fire on the polling thread, before any
        // records come back, exactly like a real client.
        self.drain_rebalances();

        let mut batches = self.shared.batches.lock();
        let deliverable = batches.front().is_some_and(|batch| {
            *self.shared.ignore_pause.lock() || {
                let paused = self.shared.paused.lock();
                batch.partitions().iter().all(|partition| !paused.contains(partition))
            }
        });
        let batch = if deliverable {
            batches.pop_front().unwrap_or_default()
        } else {
            RecordBatch::new()
        };
        Ok(batch)
    }

    fn commit_async(&mut self, offsets: OffsetMap, callback: CommitCallback) -> Result<()> {
        self.record(BrokerCall::CommitAsync(offsets.keys().cloned().collect()));
        let mode = self.shared.commit_mode.lock().clone();
        match mode {
            CommitMode::Succeed => {
                self.shared.committed.lock().push(offsets);
                callback(Ok(()));
                Ok(())
            }
            CommitMode::FailSync(message) => Err(Error::CommitFailure { message }),
            CommitMode::FailAsync(message) => {
                callback(Err(Error::CommitFailure { message }));
                Ok(())
            }
            CommitMode::Defer => {
                self.shared.deferred_commits.lock().push((offsets, callback));
                Ok(())
            }
        }
    }
}

// ================================================================================================
// Controller
// ================================================================================================

/// Test-side scripting surface for a [`MockBroker`].
#[derive(Clone)]
pub struct MockController {
    shared: Arc<MockBrokerShared>,
}

impl MockController {
    /// Replace the assignment the coordinator reports.
    pub fn set_assignment(&self, partitions: impl IntoIterator<Item = TopicPartition>) {
        *self.shared.assignment.lock() = partitions.into_iter().collect();
    }

    /// Queue a batch for the next data-taking poll.
    pub fn push_batch(&self, batch: RecordBatch) {
        self.shared.batches.lock().push_back(batch);
    }

    /// Queue a rebalance event for delivery inside the next poll.
    pub fn push_rebalance(&self, event: RebalanceEvent) {
        self.shared.rebalances.lock().push_back(event);
    }

    /// Make the next subscribe call fail with `message`.
    pub fn fail_next_subscribe(&self, message: impl Into<String>) {
        self.shared.subscribe_failures.lock().push_back(message.into());
    }

    /// Return queued batches even for paused partitions, modelling a
    /// client that violates the pause protocol.
    pub fn set_ignore_pause(&self, ignore: bool) {
        *self.shared.ignore_pause.lock() = ignore;
    }

    /// Select how subsequent `commit_async` calls behave.
    pub fn set_commit_mode(&self, mode: CommitMode) {
        *self.shared.commit_mode.lock() = mode;
    }

    /// Invoke every deferred commit callback with `result`.
    ///
    /// Call from a separate thread to model the broker-internal callback
    /// thread.
    pub fn release_deferred_commits(&self, result: Result<()>) {
        let deferred: Vec<_> = self.shared.deferred_commits.lock().drain(..).collect();
        for (offsets, callback) in deferred {
            if result.is_ok() {
                self.shared.committed.lock().push(offsets);
            }
            callback(result.clone());
        }
    }

    /// Every handle operation recorded so far.
    #[must_use]
    pub fn calls(&self) -> Vec<BrokerCall> {
        self.shared.calls.lock().clone()
    }

    /// Offsets the broker accepted, in commit order.
    #[must_use]
    pub fn committed(&self) -> Vec<OffsetMap> {
        self.shared.committed.lock().clone()
    }

    /// Number of deferred commit callbacks currently held.
    #[must_use]
    pub fn deferred_commit_count(&self) -> usize {
        self.shared.deferred_commits.lock().len()
    }
}

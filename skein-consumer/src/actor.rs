//! The serialized request-dispatch actor.
//!
//! One request is fully handled, including its broker interactions and
//! completions, before the next is dequeued. Dispatch never rejects: every
//! request variant is total. The only way out of the loop is the queue
//! closing or an invariant violation
//! ([`skein_core::Error::UnexpectedRecords`]), which is fatal.

use crate::client::{BrokerClient, RebalanceListener};
use crate::config::ConsumerConfig;
use crate::fetch::{CompletionReason, FetchDelivery, FetchRequest};
use crate::handle::HandleGuard;
use crate::rebalance::RebalanceHandler;
use crate::requests::{CommitRequest, ConsumerRequest, OnRebalance};
use crate::state::{State, StateCell};
use parking_lot::Mutex;
use regex::Regex;
use skein_core::{Error, Record, RecordBatch, Result, StreamId, Topic, TopicPartition};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Serialized owner of the broker handle.
///
/// Consumes [`ConsumerRequest`]s from a FIFO queue; see the crate docs for
/// the surrounding architecture. Constructed by [`crate::Consumer::spawn`],
/// or directly in tests that want to drive the queue by hand.
pub struct ConsumerActor<C: BrokerClient> {
    requests: mpsc::Receiver<ConsumerRequest>,
    handle: HandleGuard<C>,
    state: Arc<StateCell>,
    listener: Arc<RebalanceHandler>,
    poll_timeout: Duration,
    group_id: Option<String>,
}

impl<C: BrokerClient> ConsumerActor<C> {
    /// Create an actor reading from `requests` and owning `client`.
    #[must_use]
    pub fn new(requests: mpsc::Receiver<ConsumerRequest>, client: C, config: &ConsumerConfig) -> Self {
        let state = Arc::new(StateCell::new(config.max_pending_commits));
        let listener = Arc::new(RebalanceHandler::new(Arc::clone(&state)));
        Self {
            requests,
            handle: HandleGuard::new(client),
            state,
            listener,
            poll_timeout: config.poll_timeout,
            group_id: config.group_id.clone(),
        }
    }

    /// The shared state cell, for introspection in tests and diagnostics.
    #[must_use]
    pub fn state(&self) -> Arc<StateCell> {
        Arc::clone(&self.state)
    }

    /// Run the dispatch loop until the queue closes or a fatal error.
    ///
    /// On the way out, every live fetch is completed without records as
    /// revoked and parked commits are failed, so no waiter is stranded.
    ///
    /// # Errors
    /// Returns [`Error::UnexpectedRecords`] (or another broker error from
    /// inside a poll, which has no per-request completion to land on) when
    /// the actor aborts.
    pub async fn run(mut self) -> Result<()> {
        debug!("Consumer actor started (group: {:?})", self.group_id);

        let mut outcome = Ok(());
        while let Some(request) = self.requests.recv().await {
            if let Err(fatal) = self.dispatch(request) {
                error!("Consumer actor aborting: {fatal}");
                outcome = Err(fatal);
                break;
            }
        }

        self.teardown();
        debug!("Consumer actor stopped");
        outcome
    }

    fn dispatch(&mut self, request: ConsumerRequest) -> Result<()> {
        match request {
            ConsumerRequest::Poll => self.handle_poll(),
            ConsumerRequest::Assignment { on_rebalance, reply } => {
                self.handle_assignment(on_rebalance, reply);
                Ok(())
            }
            ConsumerRequest::SubscribeTopics { topics, reply } => {
                self.handle_subscribe_topics(&topics, reply);
                Ok(())
            }
            ConsumerRequest::SubscribePattern { pattern, reply } => {
                self.handle_subscribe_pattern(&pattern, reply);
                Ok(())
            }
            ConsumerRequest::Fetch { partition, stream, reply } => {
                self.handle_fetch(partition, stream, reply);
                Ok(())
            }
            ConsumerRequest::Commit(commit) => {
                self.handle_commit(commit);
                Ok(())
            }
        }
    }

    fn listener(&self) -> Arc<dyn RebalanceListener> {
        Arc::clone(&self.listener) as Arc<dyn RebalanceListener>
    }

    fn handle_subscribe_topics(&mut self, topics: &[Topic], reply: oneshot::Sender<Result<()>>) {
        let listener = self.listener();
        let result = self.handle.with(|client| client.subscribe(topics, listener));
        match &result {
            Ok(()) => {
                self.state.apply(State::as_subscribed);
                info!("Subscribed to topics: {topics:?}");
            }
            Err(reason) => warn!("Topic subscription failed: {reason}"),
        }
        if reply.send(result).is_err() {
            debug!("Subscribe waiter went away before completion");
        }
    }

    fn handle_subscribe_pattern(&mut self, pattern: &Regex, reply: oneshot::Sender<Result<()>>) {
        let listener = self.listener();
        let result = self.handle.with(|client| client.subscribe_pattern(pattern, listener));
        match &result {
            Ok(()) => {
                self.state.apply(State::as_subscribed);
                info!("Subscribed to topic pattern: {pattern}");
            }
            Err(reason) => warn!("Pattern subscription failed: {reason}"),
        }
        if reply.send(result).is_err() {
            debug!("Subscribe waiter went away before completion");
        }
    }

    fn handle_assignment(
        &mut self,
        on_rebalance: Option<OnRebalance>,
        reply: oneshot::Sender<Result<BTreeSet<TopicPartition>>>,
    ) {
        if let Some(hook) = on_rebalance {
            self.state.apply(|state| state.with_on_rebalance(hook));
            debug!("Stored rebalance hooks");
        }

        // The first assignment request marks the consumer as streaming,
        // which arms the poll handler.
        self.state.apply(State::as_streaming);

        let result = if self.state.view().subscribed {
            self.handle.with(|client| client.assignment())
        } else {
            Err(Error::NotSubscribed)
        };
        if reply.send(result).is_err() {
            debug!("Assignment waiter went away before completion");
        }
    }

    fn handle_fetch(
        &mut self,
        partition: TopicPartition,
        stream: StreamId,
        reply: oneshot::Sender<FetchDelivery>,
    ) {
        let fetch = FetchRequest::new(partition.clone(), stream, reply);

        let assigned = match self.handle.with(|client| client.assignment()) {
            Ok(assigned) => assigned,
            Err(reason) => {
                warn!("Assignment lookup failed, completing fetch for {partition} as revoked: {reason}");
                fetch.complete_revoked();
                return;
            }
        };

        // A fetch for a partition this consumer does not own can never be
        // satisfied; completing it straight away prevents orphaned waiters.
        if !assigned.contains(&partition) {
            debug!("Fetch for unassigned partition {partition} (stream {stream}) completed as revoked");
            fetch.complete_revoked();
            return;
        }

        let prior = self.state.update(|state| state.with_fetch(fetch));
        debug!("Stored fetch for {partition} (stream {stream})");

        if let Some(prior) = prior {
            info!("Revoked previous fetch for {partition} (stream {stream})");
            prior.complete_revoked();
        }
    }

    fn handle_commit(&mut self, commit: CommitRequest) {
        if self.state.view().rebalancing {
            let evicted = self.state.update(|state| state.with_pending_commit(commit));
            debug!("Stored pending commit while rebalancing");
            if let Some(evicted) = evicted {
                warn!("Pending commit limit reached, failing oldest parked commit");
                evicted.complete(Err(Error::CommitFailure {
                    message: "parked commit limit exceeded during rebalance".to_string(),
                }));
            }
        } else {
            self.commit_async(commit);
        }
    }

    /// Dispatch an asynchronous commit while holding the handle.
    ///
    /// The broker may run the callback on an internal thread; the reply is
    /// a one-shot slot shared between the callback and the synchronous
    /// failure path, whichever fires first.
    fn commit_async(&mut self, commit: CommitRequest) {
        let (offsets, reply) = commit.into_parts();
        let partition_count = offsets.len();

        let slot = Arc::new(Mutex::new(Some(reply)));
        let callback_slot = Arc::clone(&slot);
        let dispatched = self.handle.with(|client| {
            client.commit_async(
                offsets,
                Box::new(move |outcome| {
                    if let Some(reply) = callback_slot.lock().take() {
                        let _ = reply.send(outcome);
                    }
                }),
            )
        });

        match dispatched {
            Ok(()) => debug!("Dispatched async commit covering {partition_count} partitions"),
            Err(reason) => {
                warn!("Commit dispatch failed: {reason}");
                if let Some(reply) = slot.lock().take() {
                    let _ = reply.send(Err(reason));
                }
            }
        }
    }

    fn handle_poll(&mut self) -> Result<()> {
        let view = self.state.view();
        if !(view.subscribed && view.streaming) {
            return Ok(());
        }

        // Captured before polling: the rebalance listener may close the
        // window while the poll is in flight.
        let initial_rebalancing = view.rebalancing;

        let batch = self.poll_broker(&view.requested)?;
        if !batch.is_empty() {
            self.distribute_records(batch)?;
        }

        let after = self.state.view();
        if initial_rebalancing && !after.rebalancing && after.pending_commits > 0 {
            let parked = self.state.update(State::without_pending_commits);
            info!("Committing {} commits parked during rebalance", parked.len());
            for commit in parked {
                self.commit_async(commit);
            }
        }

        Ok(())
    }

    /// Pause/resume from current demand, then poll.
    ///
    /// With no demand the poll still runs at zero timeout: the broker
    /// requires periodic polls to maintain group membership and heartbeats
    /// even when the application is not consuming.
    fn poll_broker(&mut self, requested: &BTreeSet<TopicPartition>) -> Result<RecordBatch> {
        let poll_timeout = self.poll_timeout;
        self.handle.with(|client| {
            let assigned = client.assignment()?;

            if requested.is_empty() {
                if !assigned.is_empty() {
                    client.pause(&assigned)?;
                }
                let batch = client.poll(Duration::ZERO)?;
                if batch.is_empty() {
                    Ok(RecordBatch::new())
                } else {
                    // Everything was paused; records mean the client is not
                    // honoring pause state.
                    Err(Error::UnexpectedRecords {
                        partitions: batch.partitions().into_iter().collect(),
                    })
                }
            } else {
                let resume: BTreeSet<TopicPartition> =
                    requested.intersection(&assigned).cloned().collect();
                let pause: BTreeSet<TopicPartition> =
                    assigned.difference(&resume).cloned().collect();

                if !pause.is_empty() {
                    client.pause(&pause)?;
                }
                if !resume.is_empty() {
                    client.resume(&resume)?;
                }
                client.poll(poll_timeout)
            }
        })
    }

    fn distribute_records(&mut self, batch: RecordBatch) -> Result<()> {
        let returned = batch.partitions();

        // Fetches may have shrunk while the poll ran (rebalance listener);
        // records for any partition without demand violate the pause
        // protocol and are fatal.
        let requested = self.state.view().requested;
        let unexpected: Vec<TopicPartition> = returned.difference(&requested).cloned().collect();
        if !unexpected.is_empty() {
            return Err(Error::UnexpectedRecords { partitions: unexpected });
        }

        let fetches = self.state.update(|state| state.take_fetches(&returned));
        let mut waiters: BTreeMap<TopicPartition, Vec<FetchRequest>> = BTreeMap::new();
        for fetch in fetches {
            waiters.entry(fetch.partition().clone()).or_default().push(fetch);
        }

        for (partition, records) in batch.into_parts() {
            let streams = waiters.remove(&partition).unwrap_or_default();
            // One shared chunk per partition; every stream sees the same
            // records without a copy.
            let chunk: Arc<[Record]> = records.into();
            info!(
                "Completed {} fetches for {partition} with {} records",
                streams.len(),
                chunk.len()
            );
            for fetch in streams {
                fetch.complete(Arc::clone(&chunk), CompletionReason::FetchedRecords);
            }
        }

        Ok(())
    }

    fn teardown(&mut self) {
        let fetches = self.state.update(State::take_all_fetches);
        if !fetches.is_empty() {
            info!("Completing {} outstanding fetches as revoked at shutdown", fetches.len());
            for fetch in fetches {
                fetch.complete_revoked();
            }
        }

        let parked = self.state.update(State::without_pending_commits);
        if !parked.is_empty() {
            warn!("Failing {} parked commits at shutdown", parked.len());
            for commit in parked {
                commit.complete(Err(Error::ActorTerminated));
            }
        }
    }
}

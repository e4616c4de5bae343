//! The request vocabulary accepted by the consumer actor.

use crate::client::OffsetMap;
use crate::fetch::FetchDelivery;
use regex::Regex;
use skein_core::{Result, StreamId, Topic, TopicPartition};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Callback invoked with a set of partitions during a rebalance.
pub type RebalanceCallback = Arc<dyn Fn(&BTreeSet<TopicPartition>) + Send + Sync>;

/// A pair of user callbacks fired around rebalances.
///
/// Hooks are appended to the actor state on registration and invoked in
/// registration order, after the actor's own rebalance bookkeeping.
#[derive(Clone)]
pub struct OnRebalance {
    on_assigned: RebalanceCallback,
    on_revoked: RebalanceCallback,
}

impl OnRebalance {
    /// Create a hook pair from two callbacks.
    pub fn new(
        on_assigned: impl Fn(&BTreeSet<TopicPartition>) + Send + Sync + 'static,
        on_revoked: impl Fn(&BTreeSet<TopicPartition>) + Send + Sync + 'static,
    ) -> Self {
        Self { on_assigned: Arc::new(on_assigned), on_revoked: Arc::new(on_revoked) }
    }

    /// A hook that only observes assignments.
    pub fn on_assigned(
        on_assigned: impl Fn(&BTreeSet<TopicPartition>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(on_assigned, |_| {})
    }

    /// A hook that only observes revocations.
    pub fn on_revoked(
        on_revoked: impl Fn(&BTreeSet<TopicPartition>) + Send + Sync + 'static,
    ) -> Self {
        Self::new(|_| {}, on_revoked)
    }

    /// Invoke the assigned callback.
    pub fn assigned(&self, partitions: &BTreeSet<TopicPartition>) {
        (self.on_assigned)(partitions);
    }

    /// Invoke the revoked callback.
    pub fn revoked(&self, partitions: &BTreeSet<TopicPartition>) {
        (self.on_revoked)(partitions);
    }
}

impl fmt::Debug for OnRebalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnRebalance").finish_non_exhaustive()
    }
}

/// An offset commit with its one-shot completion.
#[derive(Debug)]
pub struct CommitRequest {
    offsets: OffsetMap,
    reply: oneshot::Sender<Result<()>>,
}

impl CommitRequest {
    /// Create a commit request delivering its outcome into `reply`.
    #[must_use]
    pub fn new(offsets: OffsetMap, reply: oneshot::Sender<Result<()>>) -> Self {
        Self { offsets, reply }
    }

    /// The offsets to commit.
    #[must_use]
    pub fn offsets(&self) -> &OffsetMap {
        &self.offsets
    }

    /// Split into offsets and the completion slot.
    #[must_use]
    pub fn into_parts(self) -> (OffsetMap, oneshot::Sender<Result<()>>) {
        (self.offsets, self.reply)
    }

    /// Complete the request with `result`, consuming it.
    pub fn complete(self, result: Result<()>) {
        if self.reply.send(result).is_err() {
            debug!("Commit waiter went away before completion");
        }
    }
}

/// The operations the consumer actor accepts, dispatched strictly in FIFO
/// order.
#[derive(Debug)]
pub enum ConsumerRequest {
    /// Report the current assignment, optionally registering rebalance
    /// hooks first; marks the consumer as streaming.
    Assignment {
        /// Hooks to append before reporting, if any
        on_rebalance: Option<OnRebalance>,
        /// Receives the assignment or [`skein_core::Error::NotSubscribed`]
        reply: oneshot::Sender<Result<BTreeSet<TopicPartition>>>,
    },

    /// Drive the broker: pause/resume from demand, poll, distribute
    /// records, flush parked commits. Enqueued by the poll ticker.
    Poll,

    /// Subscribe to an explicit topic list.
    SubscribeTopics {
        /// Topics to subscribe to (non-empty)
        topics: Vec<Topic>,
        /// Receives the broker outcome
        reply: oneshot::Sender<Result<()>>,
    },

    /// Subscribe to all topics matching a pattern.
    SubscribePattern {
        /// Topic name pattern
        pattern: Regex,
        /// Receives the broker outcome
        reply: oneshot::Sender<Result<()>>,
    },

    /// Register demand for the next record chunk of a partition.
    Fetch {
        /// Partition to fetch from
        partition: TopicPartition,
        /// Downstream stream registering the demand
        stream: StreamId,
        /// Receives the records or a revocation signal
        reply: oneshot::Sender<FetchDelivery>,
    },

    /// Commit offsets, parking while a rebalance is in progress.
    Commit(CommitRequest),
}

//! The broker client interface consumed by the actor core.
//!
//! The underlying client library is treated as a stateful opaque handle:
//! every operation takes `&mut self` because the handle is not thread
//! safe. The actor serializes all access through
//! [`crate::handle::HandleGuard`].

use regex::Regex;
use skein_core::{Offset, RecordBatch, Result, Topic, TopicPartition};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// Offsets to commit for a set of partitions, in deterministic order.
pub type OffsetMap = BTreeMap<TopicPartition, OffsetCommit>;

/// One committed position: the offset to resume from plus opaque metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetCommit {
    /// Offset the group should resume from after a restart
    pub offset: Offset,

    /// Opaque metadata stored alongside the offset
    pub metadata: Option<String>,
}

impl OffsetCommit {
    /// Create a commit position without metadata.
    #[must_use]
    pub const fn new(offset: Offset) -> Self {
        Self { offset, metadata: None }
    }

    /// Attach metadata to the commit position.
    #[must_use]
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }
}

/// Completion callback for an asynchronous offset commit.
///
/// The broker client may invoke this on one of its internal threads, so it
/// must only touch thread-safe one-shot signals.
pub type CommitCallback = Box<dyn FnOnce(Result<()>) + Send>;

/// Rebalance callbacks invoked by the broker client.
///
/// Both callbacks run synchronously inside a `poll` call, on the polling
/// thread. Implementations must not block on the actor queue and must
/// never fail: an error here would break the broker's group protocol.
pub trait RebalanceListener: Send + Sync {
    /// Partitions are being taken away from this consumer.
    fn on_partitions_revoked(&self, revoked: &BTreeSet<TopicPartition>);

    /// Partitions have been (re)assigned to this consumer.
    fn on_partitions_assigned(&self, assigned: &BTreeSet<TopicPartition>);
}

/// Operations the consumer core needs from the broker client handle.
///
/// None of these are safe to call concurrently; the actor core guarantees
/// exclusive access. Implementations wrap the real client library; the
/// [`crate::testing`] module provides a scripted mock.
pub trait BrokerClient: Send + 'static {
    /// Subscribe to an explicit topic list, registering `listener` for
    /// rebalance callbacks.
    ///
    /// # Errors
    /// Returns an error when the broker rejects the subscription.
    fn subscribe(
        &mut self,
        topics: &[Topic],
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<()>;

    /// Subscribe to every topic matching `pattern`, registering `listener`
    /// for rebalance callbacks.
    ///
    /// # Errors
    /// Returns an error when the broker rejects the subscription.
    fn subscribe_pattern(
        &mut self,
        pattern: &Regex,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<()>;

    /// The set of partitions the group coordinator currently assigns to
    /// this consumer.
    ///
    /// # Errors
    /// Returns an error when the client cannot report its assignment.
    fn assignment(&mut self) -> Result<BTreeSet<TopicPartition>>;

    /// Stop returning records for `partitions` from subsequent polls.
    ///
    /// # Errors
    /// Returns an error when the client rejects the pause request.
    fn pause(&mut self, partitions: &BTreeSet<TopicPartition>) -> Result<()>;

    /// Resume returning records for `partitions`.
    ///
    /// # Errors
    /// Returns an error when the client rejects the resume request.
    fn resume(&mut self, partitions: &BTreeSet<TopicPartition>) -> Result<()>;

    /// Advance group state (heartbeats, rebalances) and return any records
    /// fetched for resumed partitions, blocking at most `timeout`.
    ///
    /// Rebalance listeners registered through subscribe calls fire inside
    /// this call, on the calling thread.
    ///
    /// # Errors
    /// Returns an error when the poll itself fails.
    fn poll(&mut self, timeout: Duration) -> Result<RecordBatch>;

    /// Commit `offsets` asynchronously; `callback` fires exactly once with
    /// the outcome, possibly on a broker-internal thread.
    ///
    /// # Errors
    /// Returns an error when the commit cannot even be dispatched; in that
    /// case `callback` is never invoked.
    fn commit_async(&mut self, offsets: OffsetMap, callback: CommitCallback) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::PartitionId;

    #[test]
    fn test_offset_commit_metadata() {
        let plain = OffsetCommit::new(Offset::new(5));
        assert_eq!(plain.metadata, None);

        let tagged = OffsetCommit::new(Offset::new(5)).with_metadata("source=backfill");
        assert_eq!(tagged.metadata.as_deref(), Some("source=backfill"));
    }

    #[test]
    fn test_offset_map_iterates_in_partition_order() {
        let t = Topic::new("t").unwrap();
        let mut offsets = OffsetMap::new();
        offsets.insert(
            TopicPartition::new(t.clone(), PartitionId::new(2)),
            OffsetCommit::new(Offset::new(1)),
        );
        offsets.insert(
            TopicPartition::new(t, PartitionId::new(0)),
            OffsetCommit::new(Offset::new(9)),
        );

        let partitions: Vec<u32> =
            offsets.keys().map(|tp| tp.partition.value()).collect();
        assert_eq!(partitions, vec![0, 2]);
    }
}

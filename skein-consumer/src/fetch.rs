//! One-shot completion tokens for per-partition fetches.

use skein_core::{Record, StreamId, TopicPartition};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::debug;

/// Why a fetch completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// The broker returned records for the partition
    FetchedRecords,

    /// The partition was revoked (rebalance, replaced fetch, or shutdown)
    /// before any records arrived
    TopicPartitionRevoked,
}

/// What a fetch waiter receives: a shared record chunk plus the reason.
///
/// The chunk is reference-counted so that every stream interested in the
/// same partition receives the same records without copying.
#[derive(Debug, Clone)]
pub struct FetchDelivery {
    /// Records for the partition, in poll order; empty on revocation
    pub records: Arc<[Record]>,

    /// Why the fetch completed
    pub reason: CompletionReason,
}

impl FetchDelivery {
    /// Whether this delivery signals revocation rather than data.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.reason == CompletionReason::TopicPartitionRevoked
    }

    /// Whether the delivery carries no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A single-use completion token for a `(partition, stream)` fetch.
///
/// While registered in the actor state the token is uncompleted; completing
/// it consumes the token, so a double completion is unrepresentable.
#[derive(Debug)]
pub struct FetchRequest {
    partition: TopicPartition,
    stream: StreamId,
    slot: oneshot::Sender<FetchDelivery>,
}

impl FetchRequest {
    /// Create a fetch token delivering into `slot`.
    #[must_use]
    pub fn new(
        partition: TopicPartition,
        stream: StreamId,
        slot: oneshot::Sender<FetchDelivery>,
    ) -> Self {
        Self { partition, stream, slot }
    }

    /// The partition this fetch is waiting on.
    #[must_use]
    pub fn partition(&self) -> &TopicPartition {
        &self.partition
    }

    /// The downstream stream this fetch belongs to.
    #[must_use]
    pub fn stream(&self) -> StreamId {
        self.stream
    }

    /// Deliver `records` with `reason`, consuming the token.
    ///
    /// A waiter that has gone away is logged and otherwise ignored; the
    /// actor does not care whether anyone is still listening.
    pub fn complete(self, records: Arc<[Record]>, reason: CompletionReason) {
        let partition = self.partition;
        let stream = self.stream;
        if self.slot.send(FetchDelivery { records, reason }).is_err() {
            debug!(
                "Fetch waiter for {partition} stream {stream} went away before completion"
            );
        }
    }

    /// Complete with no records and [`CompletionReason::TopicPartitionRevoked`].
    pub fn complete_revoked(self) {
        self.complete(Arc::from(Vec::new()), CompletionReason::TopicPartitionRevoked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{PartitionId, Topic};

    fn tp(partition: u32) -> TopicPartition {
        TopicPartition::new(Topic::new("t").unwrap(), PartitionId::new(partition))
    }

    #[tokio::test]
    async fn test_complete_delivers_once() {
        let (tx, rx) = oneshot::channel();
        let fetch = FetchRequest::new(tp(0), StreamId::new(1), tx);
        fetch.complete(Arc::from(Vec::new()), CompletionReason::FetchedRecords);

        let delivery = rx.await.unwrap();
        assert_eq!(delivery.reason, CompletionReason::FetchedRecords);
        assert!(delivery.is_empty());
    }

    #[tokio::test]
    async fn test_complete_revoked_is_empty() {
        let (tx, rx) = oneshot::channel();
        FetchRequest::new(tp(3), StreamId::new(0), tx).complete_revoked();

        let delivery = rx.await.unwrap();
        assert!(delivery.is_revoked());
        assert!(delivery.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_tolerated() {
        let (tx, rx) = oneshot::channel();
        drop(rx);
        // Must not panic.
        FetchRequest::new(tp(0), StreamId::new(0), tx).complete_revoked();
    }
}

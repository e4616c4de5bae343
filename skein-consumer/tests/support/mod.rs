//! Shared helpers for the consumer integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use skein_consumer::actor::ConsumerActor;
use skein_consumer::config::ConsumerConfig;
use skein_consumer::requests::ConsumerRequest;
use skein_consumer::state::StateCell;
use skein_consumer::testing::{MockBroker, MockController};
use skein_core::{Offset, PartitionId, Record, RecordBatch, Result, Topic, TopicPartition};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub fn topic(name: &str) -> Topic {
    Topic::new(name).expect("valid test topic")
}

pub fn tp(topic_name: &str, partition: u32) -> TopicPartition {
    TopicPartition::new(topic(topic_name), PartitionId::new(partition))
}

pub fn partitions(pairs: &[(&str, u32)]) -> BTreeSet<TopicPartition> {
    pairs.iter().map(|(name, partition)| tp(name, *partition)).collect()
}

pub fn record(topic_name: &str, partition: u32, offset: u64) -> Record {
    Record::builder()
        .topic(topic(topic_name))
        .partition(PartitionId::new(partition))
        .offset(Offset::new(offset))
        .value(Bytes::from_static(b"payload"))
        .build()
        .expect("valid test record")
}

pub fn batch(records: Vec<Record>) -> RecordBatch {
    RecordBatch::from_records(records)
}

/// A consumer actor wired to a mock broker, driven by hand through its
/// request queue. No poll ticker: every poll is sent explicitly, so tests
/// are deterministic.
pub struct Harness {
    pub requests: mpsc::Sender<ConsumerRequest>,
    pub state: Arc<StateCell>,
    pub controller: MockController,
    pub actor: JoinHandle<Result<()>>,
}

/// Install a test subscriber once so failures come with actor logs.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

impl Harness {
    pub fn start(config: ConsumerConfig) -> Self {
        init_tracing();
        let (broker, controller) = MockBroker::new();
        let (requests, queue) = mpsc::channel(64);
        let actor = ConsumerActor::new(queue, broker, &config);
        let state = actor.state();
        let actor = tokio::spawn(actor.run());
        Self { requests, state, controller, actor }
    }

    pub async fn subscribe(&self, topic_name: &str) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(ConsumerRequest::SubscribeTopics { topics: vec![topic(topic_name)], reply })
            .await
            .expect("actor alive");
        response.await.expect("subscribe completed")
    }

    /// Issue an assignment request and wait for it, which both marks the
    /// consumer as streaming and acts as a barrier: every previously
    /// enqueued request has been fully handled once this returns.
    pub async fn assignment_barrier(&self) -> Result<BTreeSet<TopicPartition>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(ConsumerRequest::Assignment { on_rebalance: None, reply })
            .await
            .expect("actor alive");
        response.await.expect("assignment completed")
    }

    pub async fn poll(&self) {
        self.requests.send(ConsumerRequest::Poll).await.expect("actor alive");
    }

    pub async fn fetch(
        &self,
        partition: TopicPartition,
        stream: u32,
    ) -> oneshot::Receiver<skein_consumer::fetch::FetchDelivery> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(ConsumerRequest::Fetch {
                partition,
                stream: skein_core::StreamId::new(stream),
                reply,
            })
            .await
            .expect("actor alive");
        response
    }

    pub async fn commit(
        &self,
        offsets: skein_consumer::client::OffsetMap,
    ) -> oneshot::Receiver<Result<()>> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(ConsumerRequest::Commit(skein_consumer::requests::CommitRequest::new(
                offsets, reply,
            )))
            .await
            .expect("actor alive");
        response
    }

    /// Drop the queue and wait for the actor to finish.
    pub async fn shutdown(self) -> Result<()> {
        drop(self.requests);
        self.actor.await.expect("actor task not cancelled")
    }
}

pub fn offsets_of(pairs: &[(&str, u32, u64)]) -> skein_consumer::client::OffsetMap {
    pairs
        .iter()
        .map(|(name, partition, offset)| {
            (tp(name, *partition), skein_consumer::client::OffsetCommit::new(Offset::new(*offset)))
        })
        .collect()
}

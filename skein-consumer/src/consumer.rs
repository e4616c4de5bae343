//! Public consumer surface: spawn the actor and drive it through a handle.

use crate::actor::ConsumerActor;
use crate::client::{BrokerClient, OffsetCommit, OffsetMap};
use crate::config::{ConsumerConfig, ConsumerHooks, RecoveryDirective};
use crate::fetch::FetchDelivery;
use crate::requests::{CommitRequest, ConsumerRequest, OnRebalance};
use regex::Regex;
use skein_core::{Error, Record, Result, StreamId, Topic, TopicPartition};
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::debug;

/// Entry point for running a consumer actor.
#[derive(Debug, Clone, Copy)]
pub struct Consumer;

impl Consumer {
    /// Spawn the actor task plus the poll ticker, returning a cloneable
    /// request handle and the actor's join handle.
    ///
    /// The ticker enqueues one [`ConsumerRequest::Poll`] per
    /// `poll_interval` and holds the queue only weakly: once every
    /// [`ConsumerHandle`] is dropped, the queue closes, the ticker stops,
    /// and the actor tears down.
    ///
    /// # Errors
    /// Returns a configuration error when `config` fails validation.
    pub fn spawn<C: BrokerClient>(
        client: C,
        config: ConsumerConfig,
        hooks: ConsumerHooks,
    ) -> Result<(ConsumerHandle, JoinHandle<Result<()>>)> {
        config.validate()?;

        let (requests, queue) = mpsc::channel(config.queue_depth);
        let actor = ConsumerActor::new(queue, client, &config);
        let actor_task = tokio::spawn(actor.run());

        let ticker = requests.downgrade();
        let poll_interval = config.poll_interval;
        tokio::spawn(async move {
            let mut interval = time::interval(poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(requests) = ticker.upgrade() else { break };
                if requests.send(ConsumerRequest::Poll).await.is_err() {
                    break;
                }
            }
            debug!("Poll ticker stopped");
        });

        let handle =
            ConsumerHandle { requests, commit_timeout: config.commit_timeout, hooks };
        Ok((handle, actor_task))
    }
}

/// Cloneable handle enqueueing requests onto the consumer actor.
///
/// All methods suspend until the actor completes the request; the actor
/// handles requests strictly in enqueue order.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    requests: mpsc::Sender<ConsumerRequest>,
    commit_timeout: Duration,
    hooks: ConsumerHooks,
}

impl ConsumerHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ConsumerRequest,
    ) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.requests.send(build(reply)).await.map_err(|_| Error::ActorTerminated)?;
        response.await.map_err(|_| Error::ActorTerminated)
    }

    /// Subscribe to an explicit, non-empty topic list.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTopic`] for an empty list,
    /// [`Error::SubscribeFailure`] when the broker rejects the call, or
    /// [`Error::ActorTerminated`] when the actor is gone.
    pub async fn subscribe(&self, topics: Vec<Topic>) -> Result<()> {
        if topics.is_empty() {
            return Err(Error::InvalidTopic {
                message: "Topic list cannot be empty".to_string(),
            });
        }
        self.request(|reply| ConsumerRequest::SubscribeTopics { topics, reply }).await?
    }

    /// Subscribe to every topic matching `pattern`.
    ///
    /// # Errors
    /// Returns [`Error::SubscribeFailure`] when the broker rejects the
    /// call, or [`Error::ActorTerminated`] when the actor is gone.
    pub async fn subscribe_pattern(&self, pattern: Regex) -> Result<()> {
        self.request(|reply| ConsumerRequest::SubscribePattern { pattern, reply }).await?
    }

    /// Report the current assignment, optionally registering rebalance
    /// hooks first. The first call marks the consumer as streaming.
    ///
    /// # Errors
    /// Returns [`Error::NotSubscribed`] before any successful subscribe,
    /// or [`Error::ActorTerminated`] when the actor is gone.
    pub async fn assignment(
        &self,
        on_rebalance: Option<OnRebalance>,
    ) -> Result<BTreeSet<TopicPartition>> {
        self.request(|reply| ConsumerRequest::Assignment { on_rebalance, reply }).await?
    }

    /// Register demand for the next chunk of `partition` on behalf of
    /// `stream`, suspending until records arrive or the partition is
    /// revoked.
    ///
    /// Fetches carry no timeout: revocation is guaranteed by the group
    /// protocol whenever the consumer leaves or rebalances.
    ///
    /// # Errors
    /// Returns [`Error::ActorTerminated`] when the actor is gone.
    pub async fn fetch(
        &self,
        partition: TopicPartition,
        stream: StreamId,
    ) -> Result<FetchDelivery> {
        self.request(|reply| ConsumerRequest::Fetch { partition, stream, reply }).await
    }

    /// Commit `offsets`, suspending until the broker acknowledges.
    ///
    /// During a rebalance window the commit is parked and dispatched by
    /// the first poll after the window closes.
    ///
    /// # Errors
    /// Returns [`Error::CommitFailure`] when the broker reports one, or
    /// [`Error::ActorTerminated`] when the actor is gone.
    pub async fn commit(&self, offsets: OffsetMap) -> Result<()> {
        self.request(|reply| ConsumerRequest::Commit(CommitRequest::new(offsets, reply)))
            .await?
    }

    /// Commit with the external timeout race and recovery policy applied.
    ///
    /// The commit is raced against `commit_timeout`; expiry surfaces
    /// [`Error::CommitTimeout`] while the underlying broker commit may
    /// still complete. Any other failure is routed through the configured
    /// [`crate::config::CommitRecovery`] hook, which decides between
    /// retrying and surfacing.
    ///
    /// # Errors
    /// Returns [`Error::CommitTimeout`] on expiry or whatever failure the
    /// recovery hook chose to surface.
    pub async fn commit_with_recovery(&self, offsets: OffsetMap) -> Result<()> {
        loop {
            match time::timeout(self.commit_timeout, self.commit(offsets.clone())).await {
                Err(_elapsed) => {
                    return Err(Error::CommitTimeout { timeout: self.commit_timeout })
                }
                Ok(Ok(())) => return Ok(()),
                Ok(Err(failure)) => {
                    match self.hooks.commit_recovery.on_failure(&offsets, &failure) {
                        RecoveryDirective::Retry => {
                            debug!("Retrying commit after failure: {failure}");
                        }
                        RecoveryDirective::Surface => return Err(failure),
                    }
                }
            }
        }
    }

    /// Commit the position after `record`, deriving metadata through the
    /// configured record-metadata hook.
    ///
    /// # Errors
    /// Propagates [`ConsumerHandle::commit_with_recovery`] failures.
    pub async fn commit_record(&self, record: &Record) -> Result<()> {
        let mut position = OffsetCommit::new(record.offset.next());
        if let Some(derive) = self.hooks.record_metadata.as_ref() {
            position = position.with_metadata(derive(record));
        }

        let mut offsets = OffsetMap::new();
        offsets.insert(record.topic_partition(), position);
        self.commit_with_recovery(offsets).await
    }
}

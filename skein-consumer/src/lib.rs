//! # Skein Consumer
//!
//! Consumer actor core for the Skein streaming client.
//!
//! The broker exposes a poll-driven consumer handle that is not thread
//! safe: one thread at a time may touch subscription, assignment,
//! pause/resume, and offset state. This crate mediates all access to that
//! handle through a single serialized actor so that many independent
//! downstream consumers can:
//!
//! - subscribe to topics by name or pattern,
//! - pull records per partition with demand-driven backpressure,
//! - commit offsets,
//!
//! without ever racing each other on the handle.
//!
//! ## Architecture
//!
//! Requests flow through a FIFO queue into [`actor::ConsumerActor`], which
//! handles one request at a time. A timer task enqueues a poll request at a
//! fixed interval; polls pause partitions nobody is fetching from, resume
//! the ones with demand, and fan polled records out to every waiting
//! stream. Rebalance callbacks run synchronously inside the broker poll and
//! are therefore serialized with every other handler.
//!
//! ## Examples
//!
//! ```rust,ignore
//! use skein_consumer::{Consumer, ConsumerConfig, ConsumerHooks};
//! use skein_core::{StreamId, Topic};
//!
//! # async fn example(client: impl skein_consumer::BrokerClient) -> skein_core::Result<()> {
//! let (handle, _actor) = Consumer::spawn(client, ConsumerConfig::default(), ConsumerHooks::default())?;
//!
//! handle.subscribe(vec![Topic::new("orders")?]).await?;
//! let assignment = handle.assignment(None).await?;
//!
//! for partition in assignment {
//!     let delivery = handle.fetch(partition, StreamId::new(0)).await?;
//!     for record in delivery.records.iter() {
//!         handle.commit_record(record).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod actor;
pub mod client;
pub mod config;
pub mod consumer;
pub mod fetch;
pub mod handle;
pub mod rebalance;
pub mod requests;
pub mod state;
pub mod testing;

pub use actor::ConsumerActor;
pub use client::{BrokerClient, CommitCallback, OffsetCommit, OffsetMap, RebalanceListener};
pub use config::{CommitRecovery, ConsumerConfig, ConsumerHooks, NoRecovery, RecoveryDirective};
pub use consumer::{Consumer, ConsumerHandle};
pub use fetch::{CompletionReason, FetchDelivery, FetchRequest};
pub use requests::{CommitRequest, ConsumerRequest, OnRebalance};
pub use skein_core::{Error, Result};

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::client::{BrokerClient, OffsetCommit, OffsetMap, RebalanceListener};
    pub use crate::config::{ConsumerConfig, ConsumerHooks};
    pub use crate::consumer::{Consumer, ConsumerHandle};
    pub use crate::fetch::{CompletionReason, FetchDelivery};
    pub use crate::requests::OnRebalance;
    pub use skein_core::prelude::*;
}

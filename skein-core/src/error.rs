//! Error types for the Skein client libraries.

use crate::types::TopicPartition;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Skein client operations.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Invalid topic name or topic list
    #[error("Invalid topic: {message}")]
    InvalidTopic { message: String },

    /// Invalid record construction
    #[error("Invalid record: {message}")]
    InvalidRecord { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Assignment was requested before any successful subscribe
    #[error("Consumer is not subscribed to any topics")]
    NotSubscribed,

    /// The broker rejected a subscribe call
    #[error("Subscribe failed: {message}")]
    SubscribeFailure { message: String },

    /// The broker reported an error while committing offsets
    #[error("Offset commit failed: {message}")]
    CommitFailure { message: String },

    /// An offset commit did not complete within the configured bound
    #[error("Offset commit timed out after {timeout:?}")]
    CommitTimeout { timeout: Duration },

    /// The broker returned records for partitions that were not requested
    ///
    /// This is an invariant violation and is fatal to the consumer actor.
    #[error("Broker returned records for unrequested partitions: {partitions:?}")]
    UnexpectedRecords { partitions: Vec<TopicPartition> },

    /// A record key or value could not be deserialized
    #[error("Deserialization failed for topic {topic}: {message}")]
    Deserialization { topic: String, message: String },

    /// A request was issued to a consumer actor that has already stopped
    #[error("Consumer actor has terminated")]
    ActorTerminated,
}

/// Result type alias for Skein operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Common types used throughout the Skein client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp type for record ordering and expiration.
pub type Timestamp = DateTime<Utc>;

/// Partition identifier within a topic.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct PartitionId(pub u32);

impl PartitionId {
    /// Create a new partition identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw partition index.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PartitionId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Identifier for one downstream consumer of a partition.
///
/// Multiple streams may consume the same partition concurrently; the id is
/// unique per partition, not globally.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct StreamId(pub u32);

impl StreamId {
    /// Create a new stream identifier.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw stream id.
    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

/// Record offset within a partition.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Offset(pub u64);

impl Offset {
    /// Create a new offset.
    #[must_use]
    pub const fn new(offset: u64) -> Self {
        Self(offset)
    }

    /// Get the next offset.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Get the raw offset value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Offset {
    fn from(offset: u64) -> Self {
        Self(offset)
    }
}

/// Topic name for record routing.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Create a new topic.
    ///
    /// # Errors
    /// Returns an error if the topic name is empty, longer than 255
    /// characters, or contains characters outside `[A-Za-z0-9._-]`.
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("Topic name cannot be empty")
        } else if name.len() > 255 {
            Some("Topic name cannot exceed 255 characters")
        } else if !name.bytes().all(Self::is_allowed_byte) {
            Some("Topic name contains characters outside [A-Za-z0-9._-]")
        } else {
            None
        };

        match reason {
            Some(message) => {
                Err(crate::Error::InvalidTopic { message: message.to_string() })
            }
            None => Ok(Self(name)),
        }
    }

    // ASCII only; Unicode alphanumerics are not valid broker topic names.
    fn is_allowed_byte(byte: u8) -> bool {
        byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.')
    }

    /// Get the topic name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An addressable append-only log: a (topic, partition) pair.
///
/// Ordered by topic name first, then partition index, so sets of partitions
/// iterate deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TopicPartition {
    /// Topic the partition belongs to
    pub topic: Topic,
    /// Partition index within the topic
    pub partition: PartitionId,
}

impl TopicPartition {
    /// Create a new topic-partition pair.
    #[must_use]
    pub const fn new(topic: Topic, partition: PartitionId) -> Self {
        Self { topic, partition }
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tp(topic: &str, partition: u32) -> TopicPartition {
        TopicPartition::new(Topic::new(topic).unwrap(), PartitionId::new(partition))
    }

    #[test]
    fn test_topic_validation() {
        assert!(Topic::new("orders.v2").is_ok());
        assert!(Topic::new("a-b_c").is_ok());
        assert!(Topic::new("").is_err());
        assert!(Topic::new("no spaces").is_err());
        assert!(Topic::new("x".repeat(256)).is_err());
    }

    #[test]
    fn test_topic_rejects_non_ascii_alphanumerics() {
        // Unicode letters count as alphanumeric but are not valid topic
        // name characters.
        assert!(Topic::new("café").is_err());
        assert!(Topic::new("日本").is_err());
        assert!(Topic::new("naïve-topic").is_err());
    }

    #[test]
    fn test_topic_partition_ordering() {
        assert!(tp("a", 9) < tp("b", 0));
        assert!(tp("a", 0) < tp("a", 1));
        assert_eq!(tp("a", 3), tp("a", 3));
    }

    #[test]
    fn test_topic_partition_display() {
        assert_eq!(tp("orders", 2).to_string(), "orders-2");
    }

    #[test]
    fn test_offset_next() {
        assert_eq!(Offset::new(41).next(), Offset::new(42));
        assert_eq!(Offset::default().value(), 0);
    }
}

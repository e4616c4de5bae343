//! Consumed records and poll batches.

use crate::types::{Offset, PartitionId, Timestamp, Topic, TopicPartition};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// A single record consumed from a partition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Topic the record was read from
    pub topic: Topic,

    /// Partition the record was read from
    pub partition: PartitionId,

    /// Offset of the record within its partition
    pub offset: Offset,

    /// Optional record key (zero-copy)
    pub key: Option<Bytes>,

    /// Record payload (zero-copy)
    pub value: Bytes,

    /// Broker-assigned timestamp
    pub timestamp: Timestamp,

    /// Optional record headers
    pub headers: Option<HashMap<String, String>>,
}

impl Record {
    /// Create a record builder.
    #[must_use]
    pub fn builder() -> RecordBuilder {
        RecordBuilder::default()
    }

    /// The partition this record belongs to, as a [`TopicPartition`].
    #[must_use]
    pub fn topic_partition(&self) -> TopicPartition {
        TopicPartition::new(self.topic.clone(), self.partition)
    }

    /// Get the payload size in bytes.
    #[must_use]
    pub fn payload_size(&self) -> usize {
        self.value.len()
    }

    /// Get a header value by key.
    #[must_use]
    pub fn get_header(&self, key: &str) -> Option<&str> {
        self.headers.as_ref()?.get(key).map(String::as_str)
    }
}

/// Builder pattern for constructing records.
#[derive(Debug, Default)]
pub struct RecordBuilder {
    topic: Option<Topic>,
    partition: Option<PartitionId>,
    offset: Option<Offset>,
    key: Option<Bytes>,
    value: Option<Bytes>,
    timestamp: Option<Timestamp>,
    headers: Option<HashMap<String, String>>,
}

impl RecordBuilder {
    /// Set the topic.
    #[must_use]
    pub fn topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    /// Set the partition.
    #[must_use]
    pub fn partition(mut self, partition: PartitionId) -> Self {
        self.partition = Some(partition);
        self
    }

    /// Set the offset.
    #[must_use]
    pub fn offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Set the record key.
    #[must_use]
    pub fn key(mut self, key: Bytes) -> Self {
        self.key = Some(key);
        self
    }

    /// Set the payload.
    #[must_use]
    pub fn value(mut self, value: Bytes) -> Self {
        self.value = Some(value);
        self
    }

    /// Set the timestamp.
    #[must_use]
    pub fn timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn header(mut self, key: String, value: String) -> Self {
        self.headers.get_or_insert_with(Default::default).insert(key, value);
        self
    }

    /// Build the record.
    ///
    /// # Errors
    /// Returns an error if topic, partition, offset, or value are missing.
    pub fn build(self) -> crate::Result<Record> {
        let topic = self.topic.ok_or_else(|| crate::Error::InvalidRecord {
            message: "Topic is required".to_string(),
        })?;
        let partition = self.partition.ok_or_else(|| crate::Error::InvalidRecord {
            message: "Partition is required".to_string(),
        })?;
        let offset = self.offset.ok_or_else(|| crate::Error::InvalidRecord {
            message: "Offset is required".to_string(),
        })?;
        let value = self.value.ok_or_else(|| crate::Error::InvalidRecord {
            message: "Value is required".to_string(),
        })?;

        Ok(Record {
            topic,
            partition,
            offset,
            key: self.key,
            value,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            headers: self.headers,
        })
    }
}

/// Records returned by a single broker poll, grouped by partition.
#[derive(Debug, Clone, Default)]
pub struct RecordBatch {
    records: BTreeMap<TopicPartition, Vec<Record>>,
}

impl RecordBatch {
    /// Create an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a batch from an iterator of records, grouping by partition.
    ///
    /// Records keep their relative order within each partition.
    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        let mut batch = Self::new();
        for record in records {
            batch.push(record);
        }
        batch
    }

    /// Append one record to its partition group.
    pub fn push(&mut self, record: Record) {
        self.records.entry(record.topic_partition()).or_default().push(record);
    }

    /// The set of partitions that have records in this batch.
    #[must_use]
    pub fn partitions(&self) -> BTreeSet<TopicPartition> {
        self.records.keys().cloned().collect()
    }

    /// The records for one partition, in poll order.
    #[must_use]
    pub fn records(&self, partition: &TopicPartition) -> &[Record] {
        self.records.get(partition).map_or(&[], Vec::as_slice)
    }

    /// Whether the batch holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total number of records across all partitions.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    /// Consume the batch into its per-partition groups.
    #[must_use]
    pub fn into_parts(self) -> BTreeMap<TopicPartition, Vec<Record>> {
        self.records
    }
}

/// Deserialization surface for record keys and values.
///
/// The consumer core hands out raw [`Bytes`]; downstream record streams
/// apply a deserializer once per chunk before fan-out.
pub trait Deserializer<T>: Send + Sync {
    /// Deserialize `data` read from `topic`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Deserialization`] when the payload cannot be
    /// decoded.
    fn deserialize(&self, topic: &Topic, data: &[u8]) -> crate::Result<T>;
}

/// Identity deserializer: hands back the raw bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDeserializer;

impl Deserializer<Bytes> for BytesDeserializer {
    fn deserialize(&self, _topic: &Topic, data: &[u8]) -> crate::Result<Bytes> {
        Ok(Bytes::copy_from_slice(data))
    }
}

/// UTF-8 string deserializer.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringDeserializer;

impl Deserializer<String> for StringDeserializer {
    fn deserialize(&self, topic: &Topic, data: &[u8]) -> crate::Result<String> {
        String::from_utf8(data.to_vec()).map_err(|e| crate::Error::Deserialization {
            topic: topic.to_string(),
            message: e.to_string(),
        })
    }
}

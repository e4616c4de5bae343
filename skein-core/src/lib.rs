//! # Skein Core
//!
//! Core vocabulary for the Skein streaming client: typed identifiers for
//! partitioned commit logs, consumed records, poll batches, and the shared
//! error type.
//!
//! This crate carries no broker connectivity of its own; it defines the
//! data that flows between the consumer actor core and its collaborators.
//!
//! ## Examples
//!
//! ```rust
//! use skein_core::{Record, Topic, TopicPartition, PartitionId, Offset};
//! use bytes::Bytes;
//!
//! # fn example() -> skein_core::Result<()> {
//! let topic = Topic::new("orders")?;
//! let partition = TopicPartition::new(topic.clone(), PartitionId::new(0));
//! let record = Record::builder()
//!     .topic(topic)
//!     .partition(PartitionId::new(0))
//!     .offset(Offset::new(42))
//!     .value(Bytes::from_static(b"payload"))
//!     .build()?;
//! assert_eq!(record.topic_partition(), partition);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod error;
pub mod record;
pub mod types;

pub use error::{Error, Result};
pub use record::{BytesDeserializer, Deserializer, Record, RecordBatch, StringDeserializer};
pub use types::{Offset, PartitionId, StreamId, Timestamp, Topic, TopicPartition};

/// Re-export commonly used types for convenience.
pub mod prelude {
    pub use crate::record::{Deserializer, Record, RecordBatch};
    pub use crate::types::{Offset, PartitionId, StreamId, Topic, TopicPartition};
    pub use crate::{Error, Result};
    pub use bytes::Bytes;
    pub use chrono::{DateTime, Utc};
}

//! Consumer configuration and pluggable hooks.

use crate::client::OffsetMap;
use crate::state::DEFAULT_PENDING_COMMIT_LIMIT;
use serde::{Deserialize, Serialize};
use skein_core::{Error, Record, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for the consumer actor core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Consumer group ID; `None` opts out of group semantics
    pub group_id: Option<String>,

    /// Interval at which the ticker enqueues poll requests
    pub poll_interval: Duration,

    /// Broker poll blocking cap when at least one fetch is waiting
    pub poll_timeout: Duration,

    /// External bound on the commit race in
    /// [`crate::ConsumerHandle::commit_with_recovery`]
    pub commit_timeout: Duration,

    /// Capacity of the actor's request queue
    pub queue_depth: usize,

    /// Bound on commits parked during a rebalance window
    pub max_pending_commits: usize,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            group_id: None,
            poll_interval: Duration::from_millis(50),
            poll_timeout: Duration::from_millis(50),
            commit_timeout: Duration::from_secs(5),
            queue_depth: 256,
            max_pending_commits: DEFAULT_PENDING_COMMIT_LIMIT,
        }
    }
}

impl ConsumerConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error for zero durations or zero queue bounds, which
    /// would stall the actor.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(configuration_error("poll_interval must be non-zero"));
        }
        if self.poll_timeout.is_zero() {
            return Err(configuration_error("poll_timeout must be non-zero"));
        }
        if self.commit_timeout.is_zero() {
            return Err(configuration_error("commit_timeout must be non-zero"));
        }
        if self.queue_depth == 0 {
            return Err(configuration_error("queue_depth must be non-zero"));
        }
        if self.max_pending_commits == 0 {
            return Err(configuration_error("max_pending_commits must be non-zero"));
        }
        Ok(())
    }
}

fn configuration_error(message: &str) -> Error {
    Error::Configuration { message: message.to_string() }
}

/// What to do after a failed commit in
/// [`crate::ConsumerHandle::commit_with_recovery`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryDirective {
    /// Enqueue the commit again
    Retry,

    /// Surface the failure to the caller
    Surface,
}

/// Pluggable recovery policy consulted when a commit fails with anything
/// other than a timeout.
pub trait CommitRecovery: Send + Sync {
    /// Decide whether `offsets` should be committed again after `error`.
    fn on_failure(&self, offsets: &OffsetMap, error: &Error) -> RecoveryDirective;
}

/// Default recovery policy: never retry, always surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRecovery;

impl CommitRecovery for NoRecovery {
    fn on_failure(&self, _offsets: &OffsetMap, _error: &Error) -> RecoveryDirective {
        RecoveryDirective::Surface
    }
}

/// Function deriving the commit metadata string from a record.
pub type RecordMetadataFn = Arc<dyn Fn(&Record) -> String + Send + Sync>;

/// Non-serializable collaborators passed at spawn time.
#[derive(Clone)]
pub struct ConsumerHooks {
    /// Commit recovery policy for `commit_with_recovery`
    pub commit_recovery: Arc<dyn CommitRecovery>,

    /// Optional metadata derivation for `commit_record`
    pub record_metadata: Option<RecordMetadataFn>,
}

impl Default for ConsumerHooks {
    fn default() -> Self {
        Self { commit_recovery: Arc::new(NoRecovery), record_metadata: None }
    }
}

impl fmt::Debug for ConsumerHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHooks")
            .field("record_metadata", &self.record_metadata.is_some())
            .finish_non_exhaustive()
    }
}

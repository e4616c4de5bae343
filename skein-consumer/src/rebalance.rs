//! Rebalance callbacks, serialized with the actor.
//!
//! The broker client invokes these synchronously on the polling thread,
//! inside `poll`. Polls themselves run as actor handlers, so everything
//! here reads and writes the shared state cell without further
//! coordination. The handling must finish before `poll` returns; nothing
//! is queued back onto the actor.

use crate::client::RebalanceListener;
use crate::state::StateCell;
use skein_core::TopicPartition;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

/// The listener the actor registers with every subscribe call.
///
/// Never raises: an error escaping a rebalance callback would break the
/// broker's group protocol.
#[derive(Debug)]
pub struct RebalanceHandler {
    state: Arc<StateCell>,
}

impl RebalanceHandler {
    /// Create a handler over the actor's state cell.
    #[must_use]
    pub fn new(state: Arc<StateCell>) -> Self {
        Self { state }
    }
}

impl RebalanceListener for RebalanceHandler {
    fn on_partitions_revoked(&self, revoked: &BTreeSet<TopicPartition>) {
        // Open the rebalance window and drain fetches for the revoked
        // partitions in one swap, so no handler can observe a token for a
        // partition the group no longer owns.
        let (drained, hooks) = self.state.update(|state| {
            let state = state.with_rebalancing(true);
            let (state, drained) = state.take_fetches(revoked);
            let hooks = state.on_rebalances().to_vec();
            (state, (drained, hooks))
        });

        info!("Partitions revoked: {revoked:?}");

        if !drained.is_empty() {
            info!(
                "Completing {} fetches without records for revoked partitions",
                drained.len()
            );
            for fetch in drained {
                fetch.complete_revoked();
            }
        }

        // Outstanding fetches are completed before any user hook runs.
        for hook in &hooks {
            hook.revoked(revoked);
        }
    }

    fn on_partitions_assigned(&self, assigned: &BTreeSet<TopicPartition>) {
        let hooks = self.state.update(|state| {
            let state = state.with_rebalancing(false);
            let hooks = state.on_rebalances().to_vec();
            (state, hooks)
        });

        info!("Partitions assigned: {assigned:?}");

        for hook in &hooks {
            hook.assigned(assigned);
        }
    }
}

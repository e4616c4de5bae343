//! Scoped exclusive access to the broker client handle.

use parking_lot::Mutex;

/// Guards the non-thread-safe broker handle.
///
/// The actor is single-threaded with respect to this guard; it exists to
/// reject accidental concurrent use from a stray caller and to serialize
/// with any background close path. Every broker call in the crate runs
/// inside [`HandleGuard::with`].
#[derive(Debug)]
pub struct HandleGuard<C> {
    client: Mutex<C>,
}

impl<C> HandleGuard<C> {
    /// Wrap a broker client handle.
    pub fn new(client: C) -> Self {
        Self { client: Mutex::new(client) }
    }

    /// Run `f` with exclusive access to the handle.
    ///
    /// The critical section is released on all exit paths, including
    /// panics inside `f`.
    ///
    /// # Panics
    /// Panics if the handle is already held. The actor never re-enters the
    /// guard, so contention here means a caller outside the actor touched
    /// the handle; that is a bug, not a runtime condition.
    pub fn with<R>(&self, f: impl FnOnce(&mut C) -> R) -> R {
        let Some(mut client) = self.client.try_lock() else {
            panic!("broker handle is already in use: concurrent access to the consumer handle");
        };
        f(&mut client)
    }

    /// Recover the wrapped client, consuming the guard.
    pub fn into_inner(self) -> C {
        self.client.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_gives_exclusive_mutable_access() {
        let guard = HandleGuard::new(0u32);
        guard.with(|n| *n += 1);
        guard.with(|n| *n += 2);
        assert_eq!(guard.into_inner(), 3);
    }

    #[test]
    #[should_panic(expected = "already in use")]
    fn test_reentry_panics() {
        let guard = HandleGuard::new(());
        guard.with(|_| {
            guard.with(|_| {});
        });
    }
}

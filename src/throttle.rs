//! Per-identity concurrency limiter for status requests.
//!
//! Wraps the aggregation entry point at the caller: at most `limit` status
//! requests may be in flight per caller identity; requests beyond the cap
//! are rejected with [`StatusError::Throttled`]. The core itself never
//! blocks on this.
//!
//! An identity's slot entry is evicted once its last permit drops, so the
//! map tracks only identities with requests in flight.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::StatusError;

#[derive(Debug)]
pub struct UserThrottle {
    limit: usize,
    slots: Arc<DashMap<String, Arc<Semaphore>>>,
}

/// Holds one concurrency slot; the slot frees when the permit drops.
#[derive(Debug)]
pub struct ThrottlePermit {
    permit: Option<OwnedSemaphorePermit>,
    identity: String,
    limit: usize,
    slots: Arc<DashMap<String, Arc<Semaphore>>>,
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        // Return the permit before the idleness check below.
        drop(self.permit.take());
        // Evict the identity's entry once it is idle. A strong count of 1
        // means the map holds the only reference: no permit is outstanding
        // (permits each hold an Arc) and no acquire is mid-flight.
        self.slots.remove_if(&self.identity, |_, semaphore| {
            Arc::strong_count(semaphore) == 1 && semaphore.available_permits() == self.limit
        });
    }
}

impl UserThrottle {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            slots: Arc::new(DashMap::new()),
        }
    }

    /// Acquire a slot for the given identity, rejecting on overflow.
    pub fn try_acquire(&self, identity: &str) -> Result<ThrottlePermit, StatusError> {
        let semaphore = self
            .slots
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.limit)))
            .clone();

        let permit = semaphore
            .try_acquire_owned()
            .map_err(|_| StatusError::Throttled {
                identity: identity.to_string(),
                limit: self.limit,
            })?;
        Ok(ThrottlePermit {
            permit: Some(permit),
            identity: identity.to_string(),
            limit: self.limit,
            slots: Arc::clone(&self.slots),
        })
    }

    /// Number of identities currently holding at least one slot.
    pub fn active_identities(&self) -> usize {
        self.slots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_beyond_the_per_identity_cap() {
        let throttle = UserThrottle::new(3);
        let _a = throttle.try_acquire("alice").unwrap();
        let _b = throttle.try_acquire("alice").unwrap();
        let _c = throttle.try_acquire("alice").unwrap();

        let err = throttle.try_acquire("alice").unwrap_err();
        assert!(matches!(err, StatusError::Throttled { limit: 3, .. }));

        // A different identity has its own budget.
        assert!(throttle.try_acquire("bob").is_ok());
    }

    #[tokio::test]
    async fn released_permits_free_the_slot() {
        let throttle = UserThrottle::new(1);
        let permit = throttle.try_acquire("alice").unwrap();
        assert!(throttle.try_acquire("alice").is_err());
        drop(permit);
        assert!(throttle.try_acquire("alice").is_ok());
    }

    #[tokio::test]
    async fn idle_identities_are_evicted() {
        let throttle = UserThrottle::new(2);
        let a1 = throttle.try_acquire("alice").unwrap();
        let a2 = throttle.try_acquire("alice").unwrap();
        let b = throttle.try_acquire("bob").unwrap();
        assert_eq!(throttle.active_identities(), 2);

        // Alice stays tracked while she still holds a permit.
        drop(a1);
        assert_eq!(throttle.active_identities(), 2);

        drop(a2);
        assert_eq!(throttle.active_identities(), 1);

        drop(b);
        assert_eq!(throttle.active_identities(), 0);
    }
}

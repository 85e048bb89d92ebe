//! Exclusive connection lease.
//!
//! The lease guards *opening* and *closing* a connection: a poll attempt or
//! a live attempt holds it while connecting and reading, and live teardown
//! holds it while unsubscribing and disconnecting. An established live
//! session does not hold it. The guard releases on drop, so every exit path
//! gives it back.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Proof of holding the lease. Dropping it releases the lease.
#[derive(Debug)]
pub struct LeaseGuard {
    _guard: OwnedMutexGuard<()>,
}

/// One lease per device.
#[derive(Debug, Clone, Default)]
pub struct ConnectionLease {
    lock: Arc<Mutex<()>>,
}

impl ConnectionLease {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease if it is free. Never waits.
    #[must_use]
    pub fn try_acquire(&self) -> Option<LeaseGuard> {
        self.lock
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| LeaseGuard { _guard: guard })
    }

    /// Wait for the lease.
    pub async fn acquire(&self) -> LeaseGuard {
        LeaseGuard {
            _guard: self.lock.clone().lock_owned().await,
        }
    }

    /// Whether someone currently holds the lease.
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let lease = ConnectionLease::new();
        let guard = lease.try_acquire().expect("free lease");
        assert!(lease.is_held());
        assert!(lease.try_acquire().is_none());
        drop(guard);
        assert!(!lease.is_held());
        assert!(lease.try_acquire().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_release() {
        let lease = ConnectionLease::new();
        let guard = lease.acquire().await;

        let waiter = {
            let lease = lease.clone();
            tokio::spawn(async move {
                let _g = lease.acquire().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(!lease.is_held());
    }

    #[tokio::test]
    async fn test_clones_share_the_lease() {
        let lease = ConnectionLease::new();
        let other = lease.clone();
        let _guard = lease.acquire().await;
        assert!(other.try_acquire().is_none());
    }
}

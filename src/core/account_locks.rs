//! Per-address serialization of chain writes
//!
//! Every block an account publishes is built on the account's current
//! frontier. A send and a receive on one address must therefore never run at
//! the same time, or both would be built on the same frontier and fork the
//! chain. The orchestrator and the crediting pipeline share one
//! [`AccountLocks`] and hold an address's lock for the whole of any operation
//! that writes to its chain.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Lazily created async mutex per ledger address
///
/// Locks are never removed; there is one entry per address that ever wrote
/// to its chain through this process.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `address` is free and hold it until the guard is dropped
    pub async fn lock(&self, address: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(
            &self
                .locks
                .entry(address.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        );
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_address_waits_for_release() {
        let locks = Arc::new(AccountLocks::new());
        let held = locks.lock("nano_a").await;

        let waiter = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock("nano_a").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("lock was never released")
            .unwrap();
    }

    #[tokio::test]
    async fn test_different_addresses_do_not_wait() {
        let locks = AccountLocks::new();
        let _a = locks.lock("nano_a").await;

        tokio::time::timeout(Duration::from_secs(1), locks.lock("nano_b"))
            .await
            .expect("nano_b must not wait on nano_a");
    }
}

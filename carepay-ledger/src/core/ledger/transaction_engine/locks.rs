use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-account async locks.
///
/// Operations on one account queue in FIFO order (tokio mutexes are fair);
/// operations on different accounts never share a lock. An entry lives only
/// while a guard or a waiter holds it.
#[derive(Debug, Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Holds one account lock. Dropping it releases the lock and forgets the
/// account when nobody else is queued on it.
#[derive(Debug)]
pub struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    account_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.account_id);
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, account_id: &str) -> Arc<AsyncMutex<()>> {
        self.registry().entry(account_id.to_string()).or_default().clone()
    }

    fn release(&self, account_id: &str) {
        let mut locks = self.registry();
        // Only the registry's own reference left: no holder, no waiter.
        if locks.get(account_id).is_some_and(|handle| Arc::strong_count(handle) == 1) {
            locks.remove(account_id);
        }
    }

    /// Number of accounts currently locked or waited on.
    pub(crate) fn tracked(&self) -> usize {
        self.registry().len()
    }

    pub async fn lock(&self, account_id: &str) -> AccountGuard<'_> {
        let handle = self.handle(account_id);
        let mut guard = AccountGuard { locks: self, account_id: account_id.to_string(), guard: None };
        guard.guard = Some(handle.lock_owned().await);
        guard
    }

    /// Locks two distinct accounts in lexical order so opposite transfers
    /// cannot deadlock. Guards are returned as `(a, b)` in argument order.
    pub async fn lock_pair(&self, a: &str, b: &str) -> (AccountGuard<'_>, AccountGuard<'_>) {
        if a <= b {
            let first = self.lock(a).await;
            let second = self.lock(b).await;
            (first, second)
        } else {
            let first = self.lock(b).await;
            let second = self.lock(a).await;
            (second, first)
        }
    }
}

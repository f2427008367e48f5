//! Per-user serialization of decisions within one process.
//!
//! Events for the same user queue behind one async mutex; events for different
//! users never wait on each other. Cross-process safety comes from the
//! repository's versioned writes, not from these locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Entries are swept once the table grows past this many users.
const PRUNE_THRESHOLD: usize = 4096;

/// Holds the per-user lock until dropped.
pub type UserGuard = OwnedMutexGuard<()>;

/// Table of per-user async locks.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `user_id`.
    pub async fn acquire(&self, user_id: &str) -> UserGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() > PRUNE_THRESHOLD {
                prune_idle(&mut locks);
            }
            Arc::clone(locks.entry(user_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drop locks nobody holds or waits on. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        prune_idle(&mut locks)
    }

    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn prune_idle(locks: &mut HashMap<String, Arc<AsyncMutex<()>>>) -> usize {
    let before = locks.len();
    // Only the table's own reference left: no guard and no waiter.
    locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    before - locks.len()
}

//! Per-key async locks
//!
//! Serializes read-validate-post cycles on the same account inside one
//! process. Keys are always locked in ascending order, so two operations
//! locking overlapping sets cannot deadlock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Table size above which idle entries are pruned
const PRUNE_THRESHOLD: usize = 1024;

/// Table of async mutexes keyed by account id (or client id)
#[derive(Debug, Default)]
pub struct AccountLocks {
    table: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Held locks; released on drop
#[derive(Debug)]
pub struct LockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: i64) -> Arc<AsyncMutex<()>> {
        let mut table = self
            .table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if table.len() > PRUNE_THRESHOLD {
            table.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        table.entry(key).or_default().clone()
    }

    /// Lock every key in `keys`, in ascending order, ignoring duplicates
    pub async fn lock(&self, keys: &[i64]) -> LockGuard {
        let mut ordered = keys.to_vec();
        ordered.sort_unstable();
        ordered.dedup();

        let mut guards = Vec::with_capacity(ordered.len());
        for key in ordered {
            guards.push(self.entry(key).lock_owned().await);
        }

        LockGuard { _guards: guards }
    }

    /// Number of keys currently tracked
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

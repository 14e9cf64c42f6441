//! Nullifier Lock Table
//!
//! In-process keyed lock serializing proof requests on the nullifiers they
//! claim. Validation of `is_nullifier_spent` and the subsequent insert are
//! racy without this: two requests claiming the same nullifier must not both
//! pass the not-spent check.
//!
//! Keys are sorted and deduplicated before locking, so concurrent callers
//! with overlapping sets cannot deadlock. A table entry is reclaimed when its
//! last holder releases.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::types::Field;

type LockMap = Arc<StdMutex<HashMap<Field, Arc<AsyncMutex<()>>>>>;

/// Keyed async lock over nullifier values.
#[derive(Clone, Default)]
pub struct NullifierLocks {
    entries: LockMap,
}

impl NullifierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire all keys, waiting for any current holders. The returned guard
    /// releases on drop, covering every exit path of the critical section.
    pub async fn acquire(&self, keys: &[Field]) -> NullifierLockGuard {
        let mut sorted: Vec<Field> = keys.to_vec();
        sorted.sort();
        sorted.dedup();

        // Snapshot the per-key mutexes under the table lock, then lock them
        // in sorted order without holding the table lock across awaits.
        let slots: Vec<(Field, Arc<AsyncMutex<()>>)> = {
            let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            sorted
                .iter()
                .map(|key| (*key, map.entry(*key).or_default().clone()))
                .collect()
        };

        let mut held = Vec::with_capacity(slots.len());
        for (key, slot) in slots {
            let guard = slot.lock_owned().await;
            held.push((key, guard));
        }

        NullifierLockGuard {
            entries: self.entries.clone(),
            held,
        }
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

/// Holds a set of nullifier locks; dropping releases them and reclaims
/// entries with no remaining holders or waiters.
pub struct NullifierLockGuard {
    entries: LockMap,
    held: Vec<(Field, OwnedMutexGuard<()>)>,
}

impl Drop for NullifierLockGuard {
    fn drop(&mut self) {
        let keys: Vec<Field> = self.held.iter().map(|(key, _)| *key).collect();
        // Release the per-key locks before inspecting reference counts.
        self.held.clear();

        let mut map = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            // strong_count == 1 means the map holds the only reference:
            // no holder, no waiter.
            let idle = map
                .get(&key)
                .map(|slot| Arc::strong_count(slot) == 1)
                .unwrap_or(false);
            if idle {
                map.remove(&key);
            }
        }
    }
}

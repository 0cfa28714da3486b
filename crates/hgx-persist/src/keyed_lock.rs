//! Per-key async mutual exclusion.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A family of async locks, one per key, created on demand.
///
/// Tasks locking different keys never contend. Entries are dropped from the
/// table once the last holder or waiter releases them.
pub struct KeyedLock<K: Eq + Hash + Clone> {
    locks: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Guard returned by [`KeyedLock::lock`]. The key is released on drop.
pub struct KeyedGuard<'a, K: Eq + Hash + Clone> {
    owner: &'a KeyedLock<K>,
    key: K,
    _guard: OwnedMutexGuard<()>,
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: K) -> KeyedGuard<'_, K> {
        let entry = {
            let mut locks = self.locks.lock().expect("lock poisoned");
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let guard = entry.lock_owned().await;
        KeyedGuard {
            owner: self,
            key,
            _guard: guard,
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        self.locks.lock().expect("lock poisoned").len()
    }
}

impl<K: Eq + Hash + Clone> Default for KeyedLock<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> Drop for KeyedGuard<'_, K> {
    fn drop(&mut self) {
        let mut locks = self.owner.locks.lock().expect("lock poisoned");
        // One reference in the table, one inside our own guard.
        if let Some(entry) = locks.get(&self.key) {
            if Arc::strong_count(entry) == 2 {
                locks.remove(&self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_exclusive() {
        let locks = Arc::new(KeyedLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            handles.push(tokio::spawn(async move {
                let _g = locks.lock("k").await;
                assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(locks.active(), 0);
    }

    #[tokio::test]
    async fn different_keys_do_not_contend() {
        let locks = KeyedLock::new();
        let _a = locks.lock(1u8).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.lock(2u8)).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn table_entry_released_after_use() {
        let locks = KeyedLock::new();
        {
            let _g = locks.lock(7u32).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}

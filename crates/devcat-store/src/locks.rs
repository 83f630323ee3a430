//! Per-key serialization of re-derivations

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A set of async mutexes addressed by string key
///
/// Holding the guard for a key blocks other holders of the same key only.
/// Entries nobody holds are pruned on the next acquisition.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            locks.entry(key.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Take several keys at once, always in sorted order so that two callers
    /// with overlapping key sets cannot deadlock
    pub async fn lock_all<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a str>,
    ) -> Vec<OwnedMutexGuard<()>> {
        let keys: BTreeSet<&str> = keys.into_iter().collect();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            guards.push(self.lock(key).await);
        }
        guards
    }

    /// Number of keys currently tracked
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks = Arc::new(KeyedLocks::new());
        let guard = locks.lock("dt1").await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock("dt1").await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        // Other keys are not blocked
        let other = tokio::time::timeout(Duration::from_millis(100), locks.lock("dt2")).await;
        assert!(other.is_ok());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_lock_all_in_any_order() {
        let locks = Arc::new(KeyedLocks::new());

        let mut handles = Vec::new();
        for i in 0..8 {
            let locks = locks.clone();
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 { ["a", "b", "a"] } else { ["b", "a", "b"] };
                let guards = locks.lock_all(keys).await;
                assert_eq!(guards.len(), 2);
                tokio::time::sleep(Duration::from_millis(2)).await;
            }));
        }
        for handle in handles {
            tokio::time::timeout(Duration::from_secs(2), handle)
                .await
                .unwrap()
                .unwrap();
        }

        let held = locks.lock_all(["b", "a"]).await;
        let blocked = tokio::time::timeout(Duration::from_millis(20), locks.lock("a")).await;
        assert!(blocked.is_err());
        drop(held);
        assert!(tokio::time::timeout(Duration::from_secs(1), locks.lock("a")).await.is_ok());
    }

    #[tokio::test]
    async fn test_unused_keys_are_pruned() {
        let locks = KeyedLocks::new();
        drop(locks.lock("a").await);
        drop(locks.lock("b").await);
        drop(locks.lock("c").await);
        assert_eq!(locks.len().await, 1);
    }
}

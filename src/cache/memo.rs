//! Keyed get-or-compute memo table.
//!
//! Every cache layer of the crate (request slots, render-context partitions,
//! per-instance page URLs) is one [`MemoMap`] parameterised by its key type
//! and the fetch function passed at lookup time.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use metrics::counter;
use tokio::sync::OnceCell;

use super::lock::mutex_lock;
use super::metrics::{METRIC_CACHE_HIT, METRIC_CACHE_MISS};

const SOURCE: &str = "cache::memo";

/// Memo table with at-most-once initialisation per key.
///
/// Callers racing on the same key await a single initialiser and all observe
/// the value it produced. A failed initialiser leaves the slot empty, so no
/// partial entry is ever committed and the next lookup retries.
pub struct MemoMap<K, V> {
    layer: &'static str,
    slots: Mutex<HashMap<K, Arc<OnceCell<V>>>>,
}

impl<K, V> MemoMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// `layer` labels the hit/miss metrics emitted by this table.
    pub fn new(layer: &'static str) -> Self {
        Self {
            layer,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Return the memoised value for `key`, running `init` if the slot is empty.
    pub async fn get_or_try_init<F, Fut, E>(&self, key: K, init: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        // The map lock is released before awaiting; only the slot is shared.
        let slot = {
            let mut slots = mutex_lock(&self.slots, SOURCE, "get_or_try_init");
            Arc::clone(slots.entry(key).or_default())
        };

        if let Some(value) = slot.get() {
            counter!(METRIC_CACHE_HIT, "layer" => self.layer).increment(1);
            return Ok(value.clone());
        }

        let layer = self.layer;
        let value = slot
            .get_or_try_init(|| async move {
                counter!(METRIC_CACHE_MISS, "layer" => layer).increment(1);
                init().await
            })
            .await?;
        Ok(value.clone())
    }

    /// Peek at a memoised value without initialising it.
    pub fn get(&self, key: &K) -> Option<V> {
        mutex_lock(&self.slots, SOURCE, "get")
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of initialised slots.
    pub fn len(&self) -> usize {
        mutex_lock(&self.slots, SOURCE, "len")
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn initialiser_runs_once_per_key() {
        let memo: MemoMap<&str, Arc<String>> = MemoMap::new("test");
        let calls = AtomicUsize::new(0);

        let mut values = Vec::new();
        for _ in 0..3 {
            let value = memo
                .get_or_try_init("a", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(Arc::new("value".to_string()))
                })
                .await
                .expect("init succeeds");
            values.push(value);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&values[0], &values[1]));
        assert!(Arc::ptr_eq(&values[1], &values[2]));
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn failed_initialiser_commits_nothing() {
        let memo: MemoMap<u32, u32> = MemoMap::new("test");

        let err = memo
            .get_or_try_init(7, || async { Err::<u32, _>("store down") })
            .await
            .expect_err("init fails");
        assert_eq!(err, "store down");
        assert!(memo.get(&7).is_none());
        assert!(memo.is_empty());

        let value = memo
            .get_or_try_init(7, || async { Ok::<_, &str>(42) })
            .await
            .expect("retry succeeds");
        assert_eq!(value, 42);
        assert_eq!(memo.get(&7), Some(42));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_initialiser() {
        let memo: MemoMap<&str, Arc<u32>> = MemoMap::new("test");
        let calls = AtomicUsize::new(0);

        let lookup = || async {
            memo.get_or_try_init("shared", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, ()>(Arc::new(1))
            })
            .await
            .expect("init succeeds")
        };

        let (first, second) = tokio::join!(lookup(), lookup());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let memo: MemoMap<&str, u32> = MemoMap::new("test");
        memo.get_or_try_init("a", || async { Ok::<_, ()>(1) })
            .await
            .expect("a");
        memo.get_or_try_init("b", || async { Ok::<_, ()>(2) })
            .await
            .expect("b");
        assert_eq!(memo.get(&"a"), Some(1));
        assert_eq!(memo.get(&"b"), Some(2));
        assert_eq!(memo.len(), 2);
    }
}

//! Coalescing in-process cache for per-file metric computations.
//!
//! Keyed by `(file_path, head_commit, algo_version)` so a HEAD advance or
//! an algorithm change naturally misses. Single-writer per key: when two
//! assessments miss the same key concurrently, one computes and stores,
//! the other awaits the same cell. Failed computations are not cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

/// Cache key. The algo version guards against serving values computed by
/// an older scoring formula.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetricKey {
    pub path: String,
    pub head_commit: String,
    pub algo_version: u32,
}

/// Coalescing cache for clonable metric values.
#[derive(Debug)]
pub struct MetricCache<V> {
    inner: RwLock<HashMap<MetricKey, Arc<OnceCell<V>>>>,
}

impl<V: Clone> MetricCache<V> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Get the cached value or run `compute` exactly once per key.
    ///
    /// An `Err` from `compute` propagates to every waiter of this round
    /// and leaves the key empty, so a later call retries.
    pub async fn get_or_try_compute<F, Fut, E>(&self, key: MetricKey, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        let cell = {
            if let Some(cell) = self.inner.read().await.get(&key).cloned() {
                cell
            } else {
                let mut w = self.inner.write().await;
                w.entry(key).or_insert_with(|| Arc::new(OnceCell::new())).clone()
            }
        };
        cell.get_or_try_init(compute).await.map(|v| v.clone())
    }

    /// Number of populated or in-flight keys.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl<V: Clone> Default for MetricCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(path: &str) -> MetricKey {
        MetricKey {
            path: path.into(),
            head_commit: "head1".into(),
            algo_version: 1,
        }
    }

    #[tokio::test]
    async fn concurrent_misses_coalesce_to_one_computation() {
        let cache = Arc::new(MetricCache::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_try_compute(key("a.rs"), || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                        Ok::<_, ()>(42)
                    })
                    .await
                    .unwrap()
            }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_computation_is_not_cached() {
        let cache = MetricCache::<u32>::new();
        let first: Result<u32, &str> = cache
            .get_or_try_compute(key("b.rs"), || async { Err("down") })
            .await;
        assert!(first.is_err());

        let second = cache
            .get_or_try_compute(key("b.rs"), || async { Ok::<_, &str>(7) })
            .await;
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_collide() {
        let cache = MetricCache::<u32>::new();
        let a = cache
            .get_or_try_compute(key("a.rs"), || async { Ok::<_, ()>(1) })
            .await
            .unwrap();
        let mut k2 = key("a.rs");
        k2.algo_version = 2;
        let b = cache
            .get_or_try_compute(k2, || async { Ok::<_, ()>(2) })
            .await
            .unwrap();
        assert_eq!((a, b), (1, 2));
        assert_eq!(cache.len().await, 2);
    }
}

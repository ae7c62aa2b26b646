// Time-boxed memoization cell
// Expiry is evaluated lazily on read; the cell never proactively expires

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

struct Entry<T> {
    value: T,
    last_updated: Instant,
}

/// One cached value with a fixed TTL. Each cell is independent; the
/// check-then-fill of a single cell is atomic with respect to concurrent
/// callers, so a caller never observes a half-written value.
#[derive(Clone)]
pub struct TtlCache<T> {
    inner: Arc<Mutex<Option<Entry<T>>>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
            ttl,
        }
    }

    /// Returns the stored value iff it is still fresh, otherwise None.
    /// The caller is expected to recompute and `set`.
    pub async fn get(&self) -> Option<T> {
        let guard = self.inner.lock().await;
        match guard.as_ref() {
            Some(entry) if entry.last_updated.elapsed() < self.ttl => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn set(&self, value: T) {
        let mut guard = self.inner.lock().await;
        *guard = Some(Entry {
            value,
            last_updated: Instant::now(),
        });
    }

    /// Fresh value or a live fetch. The cell's lock is held across the fetch,
    /// so concurrent callers coalesce onto one refresh instead of racing; a
    /// fetch error propagates to this caller only and leaves the cell empty.
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        let mut guard = self.inner.lock().await;
        if let Some(entry) = guard.as_ref() {
            if entry.last_updated.elapsed() < self.ttl {
                return Ok(entry.value.clone());
            }
        }
        let value = fetch().await?;
        *guard = Some(Entry {
            value: value.clone(),
            last_updated: Instant::now(),
        });
        Ok(value)
    }
}

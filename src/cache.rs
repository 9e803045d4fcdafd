//! Query cache with explicit invalidation

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::debug;

use crate::errors::TrackerError;

/// A single cached query result
///
/// Reads are served from the cache until it is invalidated or older than the
/// TTL. The lock is not held while fetching, so concurrent misses may fetch
/// twice. A fetch that was started before an invalidation is returned to its
/// caller but never stored.
pub struct QueryCache<T> {
    key: &'static str,
    ttl: Duration,
    slot: RwLock<Slot<T>>,
}

struct Slot<T> {
    /// Bumped by every invalidation
    generation: u64,
    entry: Option<(Instant, Arc<T>)>,
}

impl<T> QueryCache<T> {
    pub fn new(key: &'static str, ttl: Duration) -> Self {
        Self {
            key,
            ttl,
            slot: RwLock::new(Slot {
                generation: 0,
                entry: None,
            }),
        }
    }

    /// Return the cached value, or run `fetch` and cache its result
    pub async fn get_or_fetch<F, Fut>(&self, fetch: F) -> Result<Arc<T>, TrackerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, TrackerError>>,
    {
        let generation = {
            let slot = self.slot.read().await;
            if let Some((fetched_at, value)) = slot.entry.as_ref() {
                if fetched_at.elapsed() < self.ttl {
                    debug!("Cache hit for {}", self.key);
                    return Ok(Arc::clone(value));
                }
            }
            slot.generation
        };

        let value = Arc::new(fetch().await?);

        let mut slot = self.slot.write().await;
        if slot.generation == generation {
            slot.entry = Some((Instant::now(), Arc::clone(&value)));
        } else {
            debug!("Discarding stale fetch for {}", self.key);
        }
        Ok(value)
    }

    /// Drop the cached value so the next read refetches
    pub async fn invalidate(&self) {
        debug!("Invalidating cache for {}", self.key);
        let mut slot = self.slot.write().await;
        slot.generation = slot.generation.wrapping_add(1);
        slot.entry = None;
    }

    pub async fn is_cached(&self) -> bool {
        self.slot.read().await.entry.is_some()
    }
}

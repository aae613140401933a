use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// A cached GET response: status, the content type, and the buffered body.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

struct Entry {
    value: CachedResponse,
    stored_at: Instant,
}

struct CacheInner {
    entries: HashMap<String, Entry>,
    /// Keys in insertion order; front is the oldest-inserted entry.
    order: VecDeque<String>,
}

/// Bounded, TTL-based in-memory response cache keyed by request signature
/// (`METHOD url`).
///
/// Entries expire after the TTL and are evicted on read. When the capacity is
/// exceeded, the oldest-inserted entry is evicted (insertion order, not LRU).
/// Invalidation is coarse: any successful mutation clears the whole cache.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    capacity: usize,
}

impl ResponseCache {
    /// Create a cache with the given entry lifetime and capacity
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            }),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Look up a fresh entry. Expired entries are evicted and reported as
    /// absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            Some(entry) => entry.stored_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            tracing::trace!(key, "cache entry expired");
            return None;
        }

        tracing::trace!(key, "cache hit");
        inner.entries.get(key).map(|e| e.value.clone())
    }

    /// Insert or overwrite an entry. Overwriting refreshes the entry's
    /// insertion position. Evicts the oldest-inserted entry when the bound
    /// is exceeded.
    pub fn set(&self, key: &str, value: CachedResponse) {
        let mut inner = self.inner.lock();

        if inner.entries.contains_key(key) {
            inner.order.retain(|k| k != key);
        }
        inner.order.push_back(key.to_owned());
        inner.entries.insert(
            key.to_owned(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );

        while inner.entries.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
                tracing::trace!(key = %oldest, "cache entry evicted at capacity");
            } else {
                break;
            }
        }
    }

    /// Drop every entry. Called after any successful mutation.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        if dropped > 0 {
            tracing::trace!(dropped, "cache cleared");
        }
    }

    /// Current entry count
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

/// Build the cache key for a request: method plus the final URL
/// (path and serialized query parameters).
#[must_use]
pub fn cache_key(method: &http::Method, url: &url::Url) -> String {
    format!("{method} {url}")
}

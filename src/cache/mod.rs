//! Response caching — process-wide TTL cache and read-through middleware.
//!
//! [`ResponseCache`] is an explicitly owned key/value store (constructed once at
//! process start and shared by `Arc`, never an ambient singleton) mapping cache
//! keys to captured responses with a per-entry time-to-live. Expired entries are
//! purged lazily on access and proactively by a periodic background sweep, which
//! bounds worst-case staleness to one sweep interval beyond the TTL.
//!
//! [`CacheMiddleware`] mounts the store on the middleware pipeline as a
//! read-through cache:
//!
//! - only `GET` requests participate; every other method bypasses the cache
//!   entirely (no write-invalidation),
//! - the key is the method tag plus the full path-with-query,
//! - only `200 OK` responses are stored; errors and redirects pass through
//!   uncached,
//! - a replayed response is byte-identical to what was stored — the middleware
//!   adds no headers and never alters status or body.
//!
//! Cache-internal failures (a poisoned lock) are swallowed: the operation
//! degrades to a miss or a no-op and the request proceeds uncached.
//!
//! Two concurrent misses for the same key may both run the downstream handler
//! and both write the result; last writer wins. There is no request coalescing.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{
    Arc, RwLock, RwLockReadGuard, RwLockWriteGuard,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::context::Context;
use crate::http::{Headers, StatusCode};
use crate::middleware::{Middleware, Next};
use crate::{Method, Response};

/// Default time-to-live for cached responses: 300 seconds.
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Default interval between background sweep passes: 60 seconds.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Derives the cache key for a request: the method tag plus the full
/// path-with-query, e.g. `GET /leads?status=open`.
pub fn cache_key(method: &Method, target: &str) -> String {
    format!("{method} {target}")
}

/// A captured HTTP response, ready to be replayed on a later cache hit.
///
/// Holds the status, headers, and body of a response at the moment it was
/// stored. The connection-scoped keep-alive flag is deliberately not captured;
/// it belongs to the connection serving the replay, not to the cached value.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl CachedResponse {
    /// Captures the cacheable parts of a response.
    pub fn capture(response: &Response) -> Self {
        Self {
            status: response.status(),
            headers: response.headers().clone(),
            body: Bytes::copy_from_slice(response.body_ref()),
        }
    }

    /// Rebuilds a [`Response`] identical in status, headers, and body bytes to
    /// the one that was stored.
    pub fn to_response(&self) -> Response {
        Response::from_parts(self.status, self.headers.clone(), self.body.to_vec())
    }

    /// Returns the status the response was stored with.
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

// One cache slot: the captured value and its absolute expiry instant.
struct CacheEntry {
    value: CachedResponse,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at <= now
    }
}

/// Process-wide response cache with per-entry TTL.
///
/// Capacity is unbounded and memory-backed; contents are lost on process
/// restart by design. All operations are best-effort: a poisoned lock turns
/// reads into misses and writes into no-ops rather than propagating a panic
/// into request handling.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use leadify::cache::{CachedResponse, ResponseCache};
/// use leadify::{Response, StatusCode};
///
/// let cache = ResponseCache::new();
/// let value = CachedResponse::capture(&Response::new(StatusCode::Ok).body("[]"));
///
/// cache.set("GET /leads", value, Duration::from_secs(30));
/// assert!(cache.get("GET /leads").is_some());
///
/// assert_eq!(cache.invalidate("GET /leads"), 1);
/// assert!(cache.get("GET /leads").is_none());
/// ```
pub struct ResponseCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseCache {
    /// Creates an empty cache with the stock 300-second default TTL.
    pub fn new() -> Self {
        Self::with_default_ttl(DEFAULT_TTL)
    }

    /// Creates an empty cache with a custom default TTL, used by
    /// [`set_default`](Self::set_default).
    pub fn with_default_ttl(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // Poisoning means a writer panicked mid-operation. The map itself is still
    // structurally sound, but per the failure contract we degrade instead of
    // propagating: readers see a miss, writers become no-ops.
    fn read_entries(&self) -> Option<RwLockReadGuard<'_, HashMap<String, CacheEntry>>> {
        match self.entries.read() {
            Ok(guard) => Some(guard),
            Err(_) => {
                debug!("response cache lock poisoned — treating as miss");
                None
            }
        }
    }

    fn write_entries(&self) -> Option<RwLockWriteGuard<'_, HashMap<String, CacheEntry>>> {
        match self.entries.write() {
            Ok(guard) => Some(guard),
            Err(_) => {
                debug!("response cache lock poisoned — skipping write");
                None
            }
        }
    }

    /// Returns the cached value for `key` if present and unexpired.
    ///
    /// An expired entry found under `key` is purged on the spot (lazy
    /// eviction) and reported as a miss.
    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let now = Instant::now();

        let expired = {
            let entries = self.read_entries()?;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.value.clone());
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            if let Some(mut entries) = self.write_entries() {
                // Re-check under the write lock; a concurrent set may have
                // refreshed the entry since the read.
                if entries.get(key).is_some_and(|e| e.is_expired(now)) {
                    entries.remove(key);
                    trace!(key, "lazily purged expired cache entry");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Stores `value` under `key` with the given TTL, overwriting any previous
    /// entry. Always succeeds (best-effort on a poisoned lock).
    pub fn set(&self, key: impl Into<String>, value: CachedResponse, ttl: Duration) {
        if let Some(mut entries) = self.write_entries() {
            entries.insert(
                key.into(),
                CacheEntry {
                    value,
                    expires_at: Instant::now() + ttl,
                },
            );
        }
    }

    /// Stores `value` under `key` with this cache's default TTL.
    pub fn set_default(&self, key: impl Into<String>, value: CachedResponse) {
        self.set(key, value, self.default_ttl);
    }

    /// Removes the entry for `key` if present, returning the number of entries
    /// removed (0 or 1).
    pub fn invalidate(&self, key: &str) -> usize {
        match self.write_entries() {
            Some(mut entries) => usize::from(entries.remove(key).is_some()),
            None => 0,
        }
    }

    /// Removes all entries.
    pub fn flush(&self) {
        if let Some(mut entries) = self.write_entries() {
            entries.clear();
        }
    }

    /// Evicts every expired entry now, returning the number evicted.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        match self.write_entries() {
            Some(mut entries) => {
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired(now));
                before - entries.len()
            }
            None => 0,
        }
    }

    /// Returns the number of entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.read_entries().map_or(0, |entries| entries.len())
    }

    /// Returns `true` when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the `(hits, misses)` counters accumulated since construction.
    pub fn stats(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }

    /// Spawns the periodic background sweep with the stock
    /// [`DEFAULT_SWEEP_INTERVAL`] of 60 seconds.
    pub fn start_sweep_default(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.start_sweep(DEFAULT_SWEEP_INTERVAL)
    }

    /// Spawns the periodic background sweep on the current Tokio runtime with
    /// a custom interval.
    ///
    /// The task holds only a [`Weak`](std::sync::Weak) reference and exits on
    /// its own once the cache is dropped; the returned handle can also be
    /// aborted explicitly on shutdown. Sweeping happens off the request path
    /// and never blocks in-flight request processing.
    pub fn start_sweep(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let cache = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so the first real
            // sweep happens one full interval after startup.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else { break };
                let evicted = cache.sweep();
                if evicted > 0 {
                    debug!(evicted, "swept expired response cache entries");
                }
            }
        })
    }
}

/// Read-through caching middleware for `GET` requests.
///
/// On a hit, replays the stored response without invoking the rest of the
/// chain. On a miss, runs the downstream handler and stores the result when —
/// and only when — it completed with `200 OK`.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use leadify::cache::{CacheMiddleware, ResponseCache};
/// use leadify::middleware::Pipeline;
///
/// let cache = Arc::new(ResponseCache::new());
/// let pipeline = Pipeline::new()
///     .with(Arc::new(CacheMiddleware::with_ttl(Arc::clone(&cache), Duration::from_secs(30))));
/// ```
pub struct CacheMiddleware {
    cache: Arc<ResponseCache>,
    ttl: Option<Duration>,
}

impl CacheMiddleware {
    /// Creates a caching middleware that stores entries with the cache's
    /// default TTL.
    pub fn new(cache: Arc<ResponseCache>) -> Self {
        Self { cache, ttl: None }
    }

    /// Creates a caching middleware with an explicit per-entry TTL.
    pub fn with_ttl(cache: Arc<ResponseCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl: Some(ttl),
        }
    }
}

impl Middleware for CacheMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let cache = Arc::clone(&self.cache);
        let ttl = self.ttl;

        Box::pin(async move {
            if !ctx.request().method().is_cacheable() {
                return next.run(ctx).await;
            }

            let key = cache_key(ctx.request().method(), &ctx.request().target());

            if let Some(hit) = cache.get(&key) {
                debug!(key = %key, "response cache hit");
                return hit.to_response();
            }
            trace!(key = %key, "response cache miss");

            let response = next.run(ctx).await;

            if response.status() == StatusCode::Ok {
                let value = CachedResponse::capture(&response);
                match ttl {
                    Some(ttl) => cache.set(key, value, ttl),
                    None => cache.set_default(key, value),
                }
            }

            response
        })
    }
}

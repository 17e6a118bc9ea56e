//! Response cache: memoizes responses to idempotent requests, coalesces
//! concurrent misses onto a single builder per fingerprint, and evicts by
//! the configured policy once `max_entries` is reached.
//!
//! Favors fixed-capacity, pre-sized collections where the entry count is
//! known; the backing map is a [`parking_lot::Mutex`] rather than a lock-free
//! structure because eviction bookkeeping (LRU timestamps, LFU counters,
//! FIFO sequence numbers) all mutate together on every insert, so a short
//! critical section beats a lock-free structure that would need its own
//! coordination for that bookkeeping anyway.

pub mod etag;

use crate::{
    config::{CacheConfig, EvictionPolicy},
    errors::{ClientProtocolError, ErrorKind},
    http::types::StatusCode,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::Notify;

/// A cached response snapshot, deep-copied out of the originating request's
/// arena so it outlives that arena's reset.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

struct Entry {
    artifact: CachedResponse,
    expires_at: Instant,
    inserted_seq: u64,
    last_access: Instant,
    access_count: u64,
}

/// How many times a waiter may be promoted to builder after a build
/// failure before giving up and reporting a miss.
const MAX_BUILD_RETRIES: u32 = 3;

struct InFlight {
    notify: Arc<Notify>,
    failed: bool,
}

pub struct ResponseCache {
    config: CacheConfig,
    entries: Mutex<HashMap<String, Entry>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
    next_seq: AtomicU64,
    stats: CacheStats,
}

impl ResponseCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            stats: CacheStats::default(),
        }
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Fingerprint a request per spec: method, path, and the canonicalized
    /// value of every header named in the response's `Vary` list. Callers
    /// that don't yet know `Vary` (the common case, before any response
    /// exists) should fingerprint with an empty `vary_values` and re-key
    /// once a `Vary` header is observed.
    pub fn fingerprint(method: &str, path: &[u8], vary_values: &[(&str, &str)]) -> String {
        let mut vary: Vec<&(&str, &str)> = vary_values.iter().collect();
        vary.sort_by_key(|(name, _)| name.to_ascii_lowercase());
        let mut key = format!("{method}:{}", String::from_utf8_lossy(path));
        for (name, value) in vary {
            key.push('|');
            key.push_str(&name.to_ascii_lowercase());
            key.push('=');
            key.push_str(value);
        }
        key
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        let hit = match entries.get_mut(key) {
            Some(entry) if entry.expires_at > now => {
                entry.last_access = now;
                entry.access_count += 1;
                Some(entry.artifact.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        };
        drop(entries);
        if hit.is_some() {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
        }
        hit
    }

    pub fn set(&self, key: String, artifact: CachedResponse, ttl: Duration) -> Result<(), ErrorKind> {
        if artifact.body.len() > self.config.max_body_size {
            return Err(ClientProtocolError::BodyTooLarge.into());
        }
        let mut entries = self.entries.lock();
        if entries.len() >= self.config.max_entries && !entries.contains_key(&key) {
            if let Some(victim) = self.select_victim(&entries) {
                entries.remove(&victim);
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        entries.insert(
            key,
            Entry {
                artifact,
                expires_at: now + ttl,
                inserted_seq: seq,
                last_access: now,
                access_count: 0,
            },
        );
        Ok(())
    }

    fn select_victim(&self, entries: &HashMap<String, Entry>) -> Option<String> {
        match self.config.eviction_policy {
            EvictionPolicy::Lru => entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Lfu => entries
                .iter()
                .min_by_key(|(_, e)| (e.access_count, e.last_access))
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Fifo => entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_seq)
                .map(|(k, _)| k.clone()),
            EvictionPolicy::Random => {
                let idx = (self.next_seq.load(Ordering::Relaxed) as usize) % entries.len().max(1);
                entries.keys().nth(idx).cloned()
            }
        }
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock();
        matches!(entries.get(key), Some(e) if e.expires_at > Instant::now())
    }

    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Snapshot of every live key, for prefix-based bulk invalidation.
    pub fn iterate(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    /// Joins the single-flight rendezvous for `key`. The first caller for a
    /// given key becomes the builder and must call [`BuildGuard::publish`]
    /// or [`BuildGuard::fail`]; later callers block on `wait` until the
    /// builder finishes, then re-check the cache.
    pub async fn acquire_or_wait(self: &Arc<Self>, key: &str) -> SingleFlight {
        if let Some(hit) = self.get(key) {
            return SingleFlight::Hit(hit);
        }

        for _ in 0..=MAX_BUILD_RETRIES {
            let notify = {
                let mut in_flight = self.in_flight.lock();
                if let Some(existing) = in_flight.get(key) {
                    Some(existing.notify.clone())
                } else {
                    in_flight.insert(
                        key.to_string(),
                        InFlight {
                            notify: Arc::new(Notify::new()),
                            failed: false,
                        },
                    );
                    None
                }
            };

            match notify {
                None => {
                    return SingleFlight::Builder(BuildGuard {
                        cache: self.clone(),
                        key: key.to_string(),
                    });
                }
                Some(notify) => {
                    notify.notified().await;
                    if let Some(hit) = self.get(key) {
                        return SingleFlight::Hit(hit);
                    }
                    // builder failed; loop around to retry as a new builder
                    // candidate, bounded by MAX_BUILD_RETRIES.
                }
            }
        }
        SingleFlight::Miss
    }
}

/// Outcome of joining the single-flight rendezvous.
pub enum SingleFlight {
    Hit(CachedResponse),
    Builder(BuildGuard),
    Miss,
}

/// Held by whichever caller is responsible for building the artifact for a
/// fingerprint. Dropping without calling `publish`/`fail` is treated as a
/// failure so panicking builders don't wedge waiters forever.
pub struct BuildGuard {
    cache: Arc<ResponseCache>,
    key: String,
}

impl BuildGuard {
    pub fn publish(self, artifact: CachedResponse, ttl: Duration) {
        let _ = self.cache.set(self.key.clone(), artifact, ttl);
        self.finish();
    }

    pub fn fail(self) {
        self.finish();
    }

    fn finish(&self) {
        if let Some(in_flight) = self.cache.in_flight.lock().remove(&self.key) {
            in_flight.notify.notify_waiters();
        }
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        self.finish();
    }
}

#[derive(Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed) as f64;
        let misses = self.misses.load(Ordering::Relaxed) as f64;
        if hits + misses == 0.0 {
            0.0
        } else {
            hits / (hits + misses)
        }
    }
}

/// Cache-Control directive builder, emitting directives in the canonical
/// order spec'd: visibility, then cacheability, then freshness.
#[derive(Default, Clone)]
pub struct CacheControlBuilder {
    public: bool,
    private: bool,
    no_cache: bool,
    no_store: bool,
    no_transform: bool,
    must_revalidate: bool,
    proxy_revalidate: bool,
    immutable: bool,
    max_age: Option<u64>,
    s_maxage: Option<u64>,
    stale_while_revalidate: Option<u64>,
    stale_if_error: Option<u64>,
}

macro_rules! flag_setter {
    ($($name:ident),+ $(,)?) => {
        $(pub fn $name(mut self) -> Self { self.$name = true; self })+
    };
}

impl CacheControlBuilder {
    flag_setter!(public, private, no_cache, no_store, no_transform, must_revalidate, proxy_revalidate, immutable);

    pub fn max_age(mut self, seconds: u64) -> Self {
        self.max_age = Some(seconds);
        self
    }

    pub fn s_maxage(mut self, seconds: u64) -> Self {
        self.s_maxage = Some(seconds);
        self
    }

    pub fn stale_while_revalidate(mut self, seconds: u64) -> Self {
        self.stale_while_revalidate = Some(seconds);
        self
    }

    pub fn stale_if_error(mut self, seconds: u64) -> Self {
        self.stale_if_error = Some(seconds);
        self
    }

    pub fn build(&self) -> String {
        let mut parts = Vec::new();
        if self.public {
            parts.push("public".to_string());
        }
        if self.private {
            parts.push("private".to_string());
        }
        if self.no_cache {
            parts.push("no-cache".to_string());
        }
        if self.no_store {
            parts.push("no-store".to_string());
        }
        if self.no_transform {
            parts.push("no-transform".to_string());
        }
        if self.must_revalidate {
            parts.push("must-revalidate".to_string());
        }
        if self.proxy_revalidate {
            parts.push("proxy-revalidate".to_string());
        }
        if self.immutable {
            parts.push("immutable".to_string());
        }
        if let Some(v) = self.max_age {
            parts.push(format!("max-age={v}"));
        }
        if let Some(v) = self.s_maxage {
            parts.push(format!("s-maxage={v}"));
        }
        if let Some(v) = self.stale_while_revalidate {
            parts.push(format!("stale-while-revalidate={v}"));
        }
        if let Some(v) = self.stale_if_error {
            parts.push(format!("stale-if-error={v}"));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artifact(body: &[u8]) -> CachedResponse {
        CachedResponse {
            status: StatusCode::Ok,
            headers: Vec::new(),
            body: body.to_vec(),
        }
    }

    #[test]
    fn miss_then_hit_after_set() {
        let cache = ResponseCache::new(CacheConfig::default());
        assert!(cache.get("k").is_none());
        cache.set("k".to_string(), artifact(b"body"), Duration::from_secs(60)).unwrap();
        assert_eq!(cache.get("k").unwrap().body, b"body");
        assert_eq!(cache.stats().hits.load(Ordering::Relaxed), 1);
        assert_eq!(cache.stats().misses.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = ResponseCache::new(CacheConfig::default());
        cache.set("k".to_string(), artifact(b"x"), Duration::from_millis(0)).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert!(!cache.contains("k"));
    }

    #[test]
    fn oversized_body_is_rejected() {
        let config = CacheConfig {
            max_body_size: 4,
            ..CacheConfig::default()
        };
        let cache = ResponseCache::new(config);
        let err = cache.set("k".to_string(), artifact(b"too big"), Duration::from_secs(1)).unwrap_err();
        assert_eq!(err.code(), "BODY_TOO_LARGE");
    }

    #[test]
    fn lru_eviction_picks_the_least_recently_accessed() {
        let config = CacheConfig {
            max_entries: 2,
            eviction_policy: EvictionPolicy::Lru,
            ..CacheConfig::default()
        };
        let cache = ResponseCache::new(config);
        cache.set("a".to_string(), artifact(b"a"), Duration::from_secs(60)).unwrap();
        std::thread::sleep(Duration::from_millis(2));
        cache.set("b".to_string(), artifact(b"b"), Duration::from_secs(60)).unwrap();
        // touch "a" so "b" becomes the least recently accessed
        std::thread::sleep(Duration::from_millis(2));
        cache.get("a");
        cache.set("c".to_string(), artifact(b"c"), Duration::from_secs(60)).unwrap();
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert!(cache.contains("c"));
    }

    #[test]
    fn hit_rate_convention_zero_over_zero_is_zero() {
        let stats = CacheStats::default();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn cache_control_emits_canonical_order() {
        let header = CacheControlBuilder::default()
            .public()
            .must_revalidate()
            .max_age(60)
            .stale_while_revalidate(30)
            .build();
        assert_eq!(header, "public, must-revalidate, max-age=60, stale-while-revalidate=30");
    }

    #[tokio::test]
    async fn single_flight_builder_publishes_to_waiters() {
        let cache = Arc::new(ResponseCache::new(CacheConfig::default()));

        let builder = match cache.acquire_or_wait("k").await {
            SingleFlight::Builder(g) => g,
            _ => panic!("expected builder"),
        };

        let waiter_cache = cache.clone();
        let waiter = tokio::spawn(async move { waiter_cache.acquire_or_wait("k").await });

        // give the waiter a moment to register before the builder publishes
        tokio::task::yield_now().await;
        builder.publish(artifact(b"built"), Duration::from_secs(60));

        match waiter.await.unwrap() {
            SingleFlight::Hit(resp) => assert_eq!(resp.body, b"built"),
            _ => panic!("expected the waiter to observe the published artifact"),
        }
    }
}

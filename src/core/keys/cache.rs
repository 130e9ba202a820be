//! Two-tier cache for derived sector keys
//!
//! Lookups go memory tier -> persistent tier -> key derivation engine.
//!
//! - **Memory tier**: fixed-capacity [`LruCache`]. An entry pushed out on
//!   overflow is written back to the persistent tier, not dropped.
//! - **Persistent tier**: entries serialized as JSON into a
//!   [`KeyValueStore`] namespace, bounded by an LRU index that is itself
//!   persisted (in `<namespace>.index`) so the bound holds across restarts.
//!   The namespace is the configured one suffixed with the engine's
//!   [`KeyDerivation::id`], e.g. `derived_keys.bambu-a`.
//! - **TTL**: both tiers treat entries older than the TTL as absent and
//!   remove them on sight.
//! - **Corruption**: unparseable persisted data is deleted and the lookup
//!   proceeds as a miss. Store failures are counted and logged; callers
//!   always get keys back.
//! - **Bound**: a key leaves the index only once its store delete succeeds.
//!   When no slot can be freed, a new entry stays in memory only, so the
//!   index never grows past `persistent_capacity`.
//! - **Recency**: a persistent hit only reorders the in-memory index. The
//!   reordered index is written with the next insert, removal or purge, or
//!   when the cache is dropped. `access_count` and `last_accessed` reach
//!   the store when the entry is written back from the memory tier; a hit
//!   does not rewrite the persisted entry.
//!
//! Each tier sits behind its own mutex and counters are atomics, so the
//! cache can be shared across threads. Derivation runs outside the locks;
//! two threads missing on the same UID may both derive, which is harmless
//! because derivation is pure.

use super::{uid_key, KeyDerivation, SectorKey};
use crate::config::CacheConfig;
use crate::store::KeyValueStore;
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Key under which the persistent LRU index is stored
const INDEX_KEY: &str = "lru";

type Keys = Vec<SectorKey>;

/// Source of wall-clock time in milliseconds
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// Manually advanced clock
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        ManualClock {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// A cached value with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Creation time (ms since epoch); TTL is measured from here
    pub timestamp: u64,
    pub access_count: u64,
    pub last_accessed: u64,
}

impl<T> CacheEntry<T> {
    pub fn new(data: T, now_ms: u64) -> Self {
        CacheEntry {
            data,
            timestamp: now_ms,
            access_count: 0,
            last_accessed: now_ms,
        }
    }

    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > ttl_ms
    }

    fn touch(&mut self, now_ms: u64) {
        self.access_count += 1;
        self.last_accessed = now_ms;
    }
}

/// Snapshot of cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStatistics {
    pub memory_hits: u64,
    pub persistent_hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub errors: u64,
    pub memory_evictions: u64,
    pub persistent_evictions: u64,
    pub expirations: u64,
}

impl CacheStatistics {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.persistent_hits
    }

    pub fn requests(&self) -> u64 {
        self.hits() + self.misses
    }

    /// Calculate hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.requests();
        if total == 0 {
            0.0
        } else {
            (self.hits() as f64 / total as f64) * 100.0
        }
    }
}

/// Current tier occupancy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheSizes {
    pub memory: usize,
    pub memory_capacity: usize,
    pub persistent: usize,
    pub persistent_capacity: usize,
}

#[derive(Debug, Default)]
struct Counters {
    memory_hits: AtomicU64,
    persistent_hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
    memory_evictions: AtomicU64,
    persistent_evictions: AtomicU64,
    expirations: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStatistics {
        CacheStatistics {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            persistent_hits: self.persistent_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            memory_evictions: self.memory_evictions.load(Ordering::Relaxed),
            persistent_evictions: self.persistent_evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }

    fn reset(&self) {
        for counter in [
            &self.memory_hits,
            &self.persistent_hits,
            &self.misses,
            &self.invalidations,
            &self.errors,
            &self.memory_evictions,
            &self.persistent_evictions,
            &self.expirations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Memory + persistent cache in front of a [`KeyDerivation`] engine
pub struct DerivedKeyCache {
    engine: Arc<dyn KeyDerivation>,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    namespace: String,
    index_namespace: String,
    ttl_ms: u64,
    persistent_capacity: usize,
    memory: Mutex<LruCache<String, CacheEntry<Keys>>>,
    /// Recency order of persisted keys; also serializes persistent-tier writes
    persistent: Mutex<LruCache<String, ()>>,
    /// Index reordered since it was last written
    index_dirty: AtomicBool,
    counters: Counters,
}

impl DerivedKeyCache {
    pub fn new(
        engine: Arc<dyn KeyDerivation>,
        store: Arc<dyn KeyValueStore>,
        config: &CacheConfig,
    ) -> Self {
        Self::with_clock(engine, store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        engine: Arc<dyn KeyDerivation>,
        store: Arc<dyn KeyValueStore>,
        config: &CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let memory_capacity = NonZeroUsize::new(config.memory_capacity).unwrap_or(NonZeroUsize::MIN);

        // entries from different key sets never share a namespace
        let namespace = format!("{}.{}", config.namespace, engine.id());
        let cache = DerivedKeyCache {
            engine,
            store,
            clock,
            index_namespace: format!("{}.index", namespace),
            namespace,
            ttl_ms: config.ttl().as_millis() as u64,
            persistent_capacity: config.persistent_capacity.max(1),
            memory: Mutex::new(LruCache::new(memory_capacity)),
            persistent: Mutex::new(LruCache::unbounded()),
            index_dirty: AtomicBool::new(false),
            counters: Counters::default(),
        };
        cache.load_index();

        info!(
            "Derived key cache ready: namespace '{}', memory capacity {}, persistent capacity {}, {} persisted entries",
            cache.namespace,
            memory_capacity,
            cache.persistent_capacity,
            cache.persistent.lock().len()
        );
        cache
    }

    /// Keys for `uid`, from cache when possible
    ///
    /// Counts exactly one of memory hit, persistent hit or miss.
    pub fn get_derived_keys(&self, uid: &[u8]) -> Vec<SectorKey> {
        let key = uid_key(uid);
        let now = self.clock.now_ms();

        if let Some(keys) = self.memory_lookup(&key, now) {
            Counters::bump(&self.counters.memory_hits);
            debug!("Memory hit for {}", key);
            return keys;
        }

        if let Some(entry) = self.persistent_lookup(&key, now) {
            Counters::bump(&self.counters.persistent_hits);
            debug!("Persistent hit for {}", key);
            let keys = entry.data.clone();
            self.insert_memory(key, entry, now);
            return keys;
        }

        Counters::bump(&self.counters.misses);
        debug!("Miss for {}, deriving", key);
        let keys = self.engine.derive_keys(uid);
        let entry = CacheEntry::new(keys.clone(), now);
        self.write_persistent(&key, &entry);
        self.insert_memory(key, entry, now);
        keys
    }

    /// Warm the cache for `uid` on a background thread
    ///
    /// Returns immediately. Failures are logged and counted, never raised.
    pub fn preload_keys(self: &Arc<Self>, uid: &[u8]) {
        let cache = Arc::clone(self);
        let uid = uid.to_vec();
        let spawned = std::thread::Builder::new()
            .name("spooltag-preload".to_string())
            .spawn(move || {
                cache.get_derived_keys(&uid);
            });

        if let Err(e) = spawned {
            Counters::bump(&self.counters.errors);
            warn!("Failed to spawn key preload thread: {}", e);
        }
    }

    /// Drop `uid` from both tiers
    pub fn invalidate_uid(&self, uid: &[u8]) {
        let key = uid_key(uid);
        self.memory.lock().pop(&key);
        {
            let mut index = self.persistent.lock();
            self.remove_persistent_locked(&mut index, &key);
            self.save_index_locked(&index);
        }
        Counters::bump(&self.counters.invalidations);
        debug!("Invalidated cached keys for {}", key);
    }

    /// Empty both tiers and reset all counters
    pub fn clear_all(&self) {
        self.memory.lock().clear();
        {
            let mut index = self.persistent.lock();
            if let Err(e) = self.store.clear(&self.namespace) {
                Counters::bump(&self.counters.errors);
                warn!("Failed to clear namespace '{}': {}", self.namespace, e);
            }
            if let Err(e) = self.store.clear(&self.index_namespace) {
                warn!("Failed to clear namespace '{}': {}", self.index_namespace, e);
            }
            index.clear();
        }
        self.counters.reset();
        info!("Cleared derived key cache '{}'", self.namespace);
    }

    /// Remove expired entries from both tiers, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut purged = 0;

        {
            let mut memory = self.memory.lock();
            let stale: Vec<String> = memory
                .iter()
                .filter(|(_, entry)| entry.is_expired(now, self.ttl_ms))
                .map(|(key, _)| key.clone())
                .collect();
            for key in stale {
                memory.pop(&key);
                purged += 1;
            }
        }

        let mut index = self.persistent.lock();
        let keys: Vec<String> = index.iter().map(|(key, _)| key.clone()).collect();
        for key in keys {
            let expired = match self.store.get(&self.namespace, &key) {
                Ok(Some(raw)) => match serde_json::from_str::<CacheEntry<Keys>>(&raw) {
                    Ok(entry) => entry.is_expired(now, self.ttl_ms),
                    Err(_) => true,
                },
                Ok(None) => true,
                Err(_) => false,
            };
            if expired && self.remove_persistent_locked(&mut index, &key) {
                purged += 1;
            }
        }
        self.save_index_locked(&index);

        if purged > 0 {
            self.counters
                .expirations
                .fetch_add(purged as u64, Ordering::Relaxed);
            debug!("Purged {} expired entries", purged);
        }
        purged
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.counters.snapshot()
    }

    pub fn cache_sizes(&self) -> CacheSizes {
        let memory = self.memory.lock();
        CacheSizes {
            memory: memory.len(),
            memory_capacity: memory.cap().get(),
            persistent: self.persistent.lock().len(),
            persistent_capacity: self.persistent_capacity,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn memory_lookup(&self, key: &str, now: u64) -> Option<Keys> {
        let mut memory = self.memory.lock();
        match memory.get_mut(key) {
            None => return None,
            Some(entry) if !entry.is_expired(now, self.ttl_ms) => {
                entry.touch(now);
                return Some(entry.data.clone());
            }
            Some(_) => {}
        }

        memory.pop(key);
        drop(memory);
        Counters::bump(&self.counters.expirations);
        debug!("Expired memory entry for {}", key);
        None
    }

    fn persistent_lookup(&self, key: &str, now: u64) -> Option<CacheEntry<Keys>> {
        let mut index = self.persistent.lock();

        let raw = match self.store.get(&self.namespace, key) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                if index.pop(key).is_some() {
                    self.save_index_locked(&index);
                }
                return None;
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Persistent read failed for {}: {}", key, e);
                return None;
            }
        };

        let mut entry = match serde_json::from_str::<CacheEntry<Keys>>(&raw) {
            Ok(entry) if !entry.data.is_empty() => entry,
            Ok(_) => {
                warn!("Discarding empty persisted key list for {}", key);
                self.remove_persistent_locked(&mut index, key);
                self.save_index_locked(&index);
                return None;
            }
            Err(e) => {
                warn!("Discarding corrupted cache entry for {}: {}", key, e);
                self.remove_persistent_locked(&mut index, key);
                self.save_index_locked(&index);
                return None;
            }
        };

        if entry.is_expired(now, self.ttl_ms) {
            Counters::bump(&self.counters.expirations);
            debug!("Expired persistent entry for {}", key);
            self.remove_persistent_locked(&mut index, key);
            self.save_index_locked(&index);
            return None;
        }

        entry.touch(now);
        if index.get(key).is_some() {
            self.index_dirty.store(true, Ordering::Relaxed);
        } else if self.make_room_locked(&mut index) {
            // present in the store but untracked, e.g. left behind by a failed trim
            index.put(key.to_string(), ());
            self.save_index_locked(&index);
        } else {
            debug!("Persistent tier full, serving untracked entry {}", key);
        }
        Some(entry)
    }

    /// Insert into the memory tier, writing any displaced entry back
    fn insert_memory(&self, key: String, entry: CacheEntry<Keys>, now: u64) {
        let displaced = self.memory.lock().push(key.clone(), entry);

        if let Some((evicted_key, evicted)) = displaced {
            if evicted_key != key {
                Counters::bump(&self.counters.memory_evictions);
                if !evicted.is_expired(now, self.ttl_ms) {
                    debug!("Writing back memory-evicted entry {}", evicted_key);
                    self.write_persistent(&evicted_key, &evicted);
                }
            }
        }
    }

    fn write_persistent(&self, key: &str, entry: &CacheEntry<Keys>) {
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Failed to serialize cache entry for {}: {}", key, e);
                return;
            }
        };

        let mut index = self.persistent.lock();

        if !index.contains(key) && !self.make_room_locked(&mut index) {
            warn!("Persistent tier full, keeping {} in memory only", key);
            self.save_index_locked(&index);
            return;
        }

        match self.store.put(&self.namespace, key, &raw) {
            Ok(()) => {
                index.put(key.to_string(), ());
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Failed to persist keys for {}: {}", key, e);
            }
        }
        self.save_index_locked(&index);
    }

    /// Evict least recently used entries until one more fits
    ///
    /// Stops at the first failed delete, leaving that key indexed. Returns
    /// whether a slot is free.
    fn make_room_locked(&self, index: &mut LruCache<String, ()>) -> bool {
        while index.len() >= self.persistent_capacity {
            let Some(oldest) = index.peek_lru().map(|(key, _)| key.clone()) else {
                break;
            };
            if let Err(e) = self.store.delete(&self.namespace, &oldest) {
                Counters::bump(&self.counters.errors);
                warn!("Failed to evict persisted entry {}: {}", oldest, e);
                return false;
            }
            index.pop(&oldest);
            Counters::bump(&self.counters.persistent_evictions);
            debug!("Evicted persisted entry {}", oldest);
        }
        true
    }

    /// Delete `key` from the store, dropping it from the index on success
    fn remove_persistent_locked(&self, index: &mut LruCache<String, ()>, key: &str) -> bool {
        match self.store.delete(&self.namespace, key) {
            Ok(()) => {
                index.pop(key);
                true
            }
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Failed to delete persisted entry {}: {}", key, e);
                false
            }
        }
    }

    /// Persist the index, least recently used first
    fn save_index_locked(&self, index: &LruCache<String, ()>) {
        let mut order: Vec<&String> = index.iter().map(|(key, _)| key).collect();
        order.reverse();

        let result = serde_json::to_string(&order)
            .map_err(crate::error::SpoolTagError::from)
            .and_then(|raw| self.store.put(&self.index_namespace, INDEX_KEY, &raw));

        match result {
            Ok(()) => self.index_dirty.store(false, Ordering::Relaxed),
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Failed to persist cache index: {}", e);
            }
        }
    }

    /// Restore the persistent index, rebuilding it from the store if needed
    fn load_index(&self) {
        let mut index = self.persistent.lock();

        let saved = match self.store.get(&self.index_namespace, INDEX_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<Vec<String>>(&raw) {
                Ok(order) => Some(order),
                Err(e) => {
                    warn!("Cache index corrupted, rebuilding: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Failed to read cache index, rebuilding: {}", e);
                None
            }
        };

        let stored: Vec<String> = match self.store.keys(&self.namespace) {
            Ok(keys) => keys,
            Err(e) => {
                Counters::bump(&self.counters.errors);
                warn!("Failed to list persisted entries: {}", e);
                Vec::new()
            }
        };

        // Saved order first, then any stored keys the index did not know about
        let mut order = saved.unwrap_or_default();
        order.retain(|key| stored.contains(key));
        for key in &stored {
            if !order.contains(key) {
                order.insert(0, key.clone());
            }
        }

        for key in order {
            index.put(key, ());
        }

        // a failed delete leaves an untracked entry behind; a later hit on it
        // only re-enters the index through make_room_locked
        while index.len() > self.persistent_capacity {
            if let Some((oldest, _)) = index.pop_lru() {
                if let Err(e) = self.store.delete(&self.namespace, &oldest) {
                    Counters::bump(&self.counters.errors);
                    warn!("Failed to trim persisted entry {}: {}", oldest, e);
                }
            }
        }

        self.save_index_locked(&index);
    }
}

impl Drop for DerivedKeyCache {
    fn drop(&mut self) {
        if self.index_dirty.load(Ordering::Relaxed) {
            let index = self.persistent.lock();
            self.save_index_locked(&index);
        }
    }
}

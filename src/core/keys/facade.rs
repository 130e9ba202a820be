//! Lifecycle-managed access point for key derivation
//!
//! Other subsystems hold an `Arc<CachedKeyDerivation>` rather than the cache
//! itself. Until [`CachedKeyDerivation::initialize`] is called (and after
//! [`CachedKeyDerivation::shutdown`]) every request goes straight to the
//! engine, so callers never need to care whether caching is available.

use super::cache::{CacheSizes, CacheStatistics, Clock, DerivedKeyCache, SystemClock};
use super::{KeyDerivation, SectorKey};
use crate::config::CacheConfig;
use crate::store::KeyValueStore;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

pub struct CachedKeyDerivation {
    engine: Arc<dyn KeyDerivation>,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
    cache: RwLock<Option<Arc<DerivedKeyCache>>>,
}

impl CachedKeyDerivation {
    pub fn new(engine: Arc<dyn KeyDerivation>, config: CacheConfig) -> Self {
        Self::with_clock(engine, config, Arc::new(SystemClock))
    }

    pub fn with_clock(
        engine: Arc<dyn KeyDerivation>,
        config: CacheConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        CachedKeyDerivation {
            engine,
            config,
            clock,
            cache: RwLock::new(None),
        }
    }

    /// Attach the persistent store and enable caching
    ///
    /// Idempotent: returns `true` if this call initialized the cache and
    /// `false` if it was already initialized (the new store is ignored).
    pub fn initialize(&self, store: Arc<dyn KeyValueStore>) -> bool {
        let mut slot = self.cache.write();
        if slot.is_some() {
            debug!("Key cache already initialized");
            return false;
        }

        let cache = DerivedKeyCache::with_clock(
            Arc::clone(&self.engine),
            store,
            &self.config,
            Arc::clone(&self.clock),
        );
        *slot = Some(Arc::new(cache));
        info!("Key derivation cache initialized");
        true
    }

    pub fn is_cache_initialized(&self) -> bool {
        self.cache.read().is_some()
    }

    /// Detach the cache and fall back to direct derivation
    ///
    /// Persisted entries are left in the store.
    pub fn shutdown(&self) {
        if self.cache.write().take().is_some() {
            info!("Key derivation cache shut down");
        }
    }

    /// Sector keys for `uid`
    ///
    /// Identical output whether served by the cache or the raw engine.
    pub fn derive_keys(&self, uid: &[u8]) -> Vec<SectorKey> {
        match self.cache_handle() {
            Some(cache) => cache.get_derived_keys(uid),
            None => {
                debug!("Key cache not initialized, deriving directly");
                self.engine.derive_keys(uid)
            }
        }
    }

    /// Background warm-up; no-op before initialization
    pub fn preload_keys(&self, uid: &[u8]) {
        if let Some(cache) = self.cache_handle() {
            cache.preload_keys(uid);
        }
    }

    pub fn invalidate_uid(&self, uid: &[u8]) {
        if let Some(cache) = self.cache_handle() {
            cache.invalidate_uid(uid);
        }
    }

    pub fn clear_all(&self) {
        if let Some(cache) = self.cache_handle() {
            cache.clear_all();
        }
    }

    pub fn statistics(&self) -> Option<CacheStatistics> {
        self.cache_handle().map(|cache| cache.statistics())
    }

    pub fn cache_sizes(&self) -> Option<CacheSizes> {
        self.cache_handle().map(|cache| cache.cache_sizes())
    }

    fn cache_handle(&self) -> Option<Arc<DerivedKeyCache>> {
        self.cache.read().clone()
    }
}

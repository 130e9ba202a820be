#![no_main]
use libfuzzer_sys::fuzz_target;
use spooltag_rs::{BambuKeyDerivation, CacheConfig, DerivedKeyCache, KeyValueStore, MemoryStore};
use std::sync::Arc;

// Arbitrary persisted entries and index text must read as misses, never panic
fuzz_target!(|data: (String, String)| {
    let (entry, index) = data;
    let store = Arc::new(MemoryStore::new());
    let uid = [0x04, 0xF0, 0x22, 0x11];

    let _ = store.put("derived_keys.bambu-a", "04F02211", &entry);
    let _ = store.put("derived_keys.bambu-a.index", "lru", &index);

    let cache = DerivedKeyCache::new(
        Arc::new(BambuKeyDerivation::new()),
        store,
        &CacheConfig::default(),
    );
    assert_eq!(cache.get_derived_keys(&uid).len(), 16);
});

//! Property-based tests for the derived key cache
//!
//! Uses proptest to check tier bounds and determinism across random operation
//! sequences

use proptest::prelude::*;
use spooltag_rs::{
    BambuKeyDerivation, CacheConfig, DerivedKeyCache, KeyDerivation, ManualClock, MemoryStore,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Get(u8),
    Invalidate(u8),
    Advance(u16),
    Purge,
    Clear,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => any::<u8>().prop_map(Op::Get),
        1 => any::<u8>().prop_map(Op::Invalidate),
        1 => (0u16..120).prop_map(Op::Advance),
        1 => Just(Op::Purge),
        1 => Just(Op::Clear),
    ]
}

proptest! {
    #[test]
    fn prop_tiers_stay_bounded(
        memory_capacity in 1usize..6,
        persistent_capacity in 1usize..10,
        ops in prop::collection::vec(op(), 1..120)
    ) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(1_000_000));
        let config = CacheConfig {
            memory_capacity,
            persistent_capacity,
            ttl_secs: 60,
            namespace: "derived_keys".to_string(),
        };
        let cache = DerivedKeyCache::with_clock(
            Arc::new(BambuKeyDerivation::new()),
            store.clone(),
            &config,
            clock.clone(),
        );
        let reference = BambuKeyDerivation::new();

        for op in ops {
            match op {
                Op::Get(n) => {
                    let uid = [0x04, n % 16, 0x00, 0x01];
                    prop_assert_eq!(cache.get_derived_keys(&uid), reference.derive_keys(&uid));
                }
                Op::Invalidate(n) => cache.invalidate_uid(&[0x04, n % 16, 0x00, 0x01]),
                Op::Advance(secs) => clock.advance(Duration::from_secs(secs as u64)),
                Op::Purge => {
                    cache.purge_expired();
                }
                Op::Clear => cache.clear_all(),
            }

            let sizes = cache.cache_sizes();
            prop_assert!(sizes.memory <= memory_capacity);
            prop_assert!(sizes.persistent <= persistent_capacity);
            prop_assert!(store.len("derived_keys.bambu-a") <= persistent_capacity);
        }
    }

    #[test]
    fn prop_each_get_counts_once(
        uids in prop::collection::vec(0u8..8, 1..60)
    ) {
        let config = CacheConfig {
            memory_capacity: 3,
            persistent_capacity: 5,
            ..CacheConfig::default()
        };
        let cache = DerivedKeyCache::new(
            Arc::new(BambuKeyDerivation::new()),
            Arc::new(MemoryStore::new()),
            &config,
        );

        for n in &uids {
            cache.get_derived_keys(&[*n, 0xAA, 0xBB, 0xCC]);
        }

        let stats = cache.statistics();
        prop_assert_eq!(stats.requests(), uids.len() as u64);
        prop_assert_eq!(stats.errors, 0);
    }

    #[test]
    fn prop_derivation_is_deterministic(uid in prop::collection::vec(any::<u8>(), 4..11)) {
        let engine = BambuKeyDerivation::new();
        let first = engine.derive_keys(&uid);
        prop_assert_eq!(first.len(), 16);
        prop_assert_eq!(&first, &engine.derive_keys(&uid));
        prop_assert_ne!(&first, &BambuKeyDerivation::key_b().derive_keys(&uid));
    }
}

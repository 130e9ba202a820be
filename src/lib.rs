//! # spooltag - Filament Spool RFID Decoding
//!
//! `spooltag-rs` turns the encrypted memory of a filament spool's RFID tag
//! into structured product metadata (material, color, temperatures,
//! dimensions).
//!
//! - **Key derivation** per tag UID, behind a two-tier (memory + persistent)
//!   cache with TTL, bounded LRU tiers and statistics
//! - **Interpreters** for Bambu Lab, Creality and OpenTag layouts
//! - **Catalog enrichment**: exact material codes and nearest-color matching
//!
//! Reading the tag and decrypting its blocks is left to a [`Decryptor`]
//! supplied by the caller.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spooltag_rs::{DecryptedScanData, InterpreterFactory, TagFormat};
//!
//! let data: DecryptedScanData = serde_json::from_str(
//!     &std::fs::read_to_string("dump.json").unwrap(),
//! )
//! .unwrap();
//!
//! let factory = InterpreterFactory::with_defaults();
//! match factory.interpret(&data) {
//!     Some(info) => println!("{} {} {}", info.manufacturer, info.filament_type, info.color_name),
//!     None => println!("unrecognized tag"),
//! }
//! ```
//!
//! ## Full Pipeline
//!
//! ```rust,no_run
//! use spooltag_rs::{Decryptor, DecryptedScanData, FileStore, SectorKey, SpoolScanner, Result};
//! use std::sync::Arc;
//!
//! struct Reader;
//!
//! impl Decryptor for Reader {
//!     fn decrypt(&self, uid: &[u8], _keys: &[SectorKey]) -> DecryptedScanData {
//!         // authenticate sectors and read blocks here
//!         DecryptedScanData::builder(hex::encode(uid)).build()
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let scanner = SpoolScanner::builder()
//!     .decryptor(Arc::new(Reader))
//!     .store(Arc::new(FileStore::open("/var/lib/spooltag")?))
//!     .build()?;
//!
//! let outcome = scanner.scan(&[0x04, 0xA1, 0xB2, 0xC3]);
//! println!("{:?}", outcome.filament);
//! # Ok(())
//! # }
//! ```

pub mod core;

// Re-export core modules internally so crate:: paths in core still work
#[allow(unused_imports)]
pub(crate) use core::{
    block, catalog, color, config, error, filament, interpreter, keys, scan, store,
};

pub use crate::core::{
    catalog::{
        CatalogSource, EmptyCatalog, MappingCatalog, MaterialMapping, ProductEntry,
        SharedCatalog, StaticCatalog,
    },
    config::{CacheConfig, Config, InterpreterConfig},
    error::{Result, SpoolTagError},
    filament::{FilamentInfo, TemperatureProfile},
    interpreter::{Interpreter, InterpreterFactory},
    keys::{
        BambuKeyDerivation, CacheSizes, CacheStatistics, CachedKeyDerivation, Clock,
        DerivedKeyCache, KeyDerivation, ManualClock, SectorKey, SystemClock,
    },
    scan::{DecryptedScanData, ScanResult, TagFormat},
    store::{FileStore, KeyValueStore, MemoryStore},
};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use validator::Validate;

/// Authenticates a tag with derived keys and reads its blocks
///
/// Implemented outside this crate by whatever talks to the NFC hardware.
pub trait Decryptor: Send + Sync {
    fn decrypt(&self, uid: &[u8], keys: &[SectorKey]) -> DecryptedScanData;
}

/// Result of one pass through [`SpoolScanner::scan`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    pub data: DecryptedScanData,
    /// `None` when no interpreter recognized the tag
    pub filament: Option<FilamentInfo>,
}

/// UID -> keys -> decryption -> interpretation
///
/// Owns handles to the key facade and the interpreter registry so both can
/// also be shared with other subsystems.
pub struct SpoolScanner {
    keys: Arc<CachedKeyDerivation>,
    decryptor: Arc<dyn Decryptor>,
    interpreters: Arc<InterpreterFactory>,
}

impl SpoolScanner {
    pub fn builder() -> SpoolScannerBuilder {
        SpoolScannerBuilder::new()
    }

    /// Derive keys, decrypt and decode one tag
    pub fn scan(&self, uid: &[u8]) -> ScanOutcome {
        let started = Instant::now();
        let keys = self.keys.derive_keys(uid);
        let derivation_ms = started.elapsed().as_millis() as u64;

        let mut data = self.decryptor.decrypt(uid, &keys);
        if data.key_derivation_time_ms == 0 {
            data.key_derivation_time_ms = derivation_ms;
        }
        debug!(
            "Tag {} read: {:?}, {} blocks",
            data.tag_uid,
            data.scan_result,
            data.decrypted_blocks.len()
        );

        let filament = self.interpreters.interpret(&data);
        ScanOutcome { data, filament }
    }

    /// Decode an existing dump without touching the tag
    pub fn decode(&self, data: &DecryptedScanData) -> Option<FilamentInfo> {
        self.interpreters.interpret(data)
    }

    /// Warm the key cache for a tag expected to be scanned soon
    pub fn preload(&self, uid: &[u8]) {
        self.keys.preload_keys(uid);
    }

    pub fn keys(&self) -> &Arc<CachedKeyDerivation> {
        &self.keys
    }

    pub fn interpreters(&self) -> &Arc<InterpreterFactory> {
        &self.interpreters
    }

    /// Detach the key cache; later scans derive keys directly
    pub fn shutdown(&self) {
        self.keys.shutdown();
    }
}

/// Builder for [`SpoolScanner`]
///
/// Only the decryptor is required. Without a store, keys are derived on
/// every scan; without a catalog, decoded spools are not enriched.
pub struct SpoolScannerBuilder {
    config: Config,
    engine: Option<Arc<dyn KeyDerivation>>,
    store: Option<Arc<dyn KeyValueStore>>,
    catalog: Option<Arc<dyn CatalogSource>>,
    decryptor: Option<Arc<dyn Decryptor>>,
}

impl SpoolScannerBuilder {
    pub fn new() -> Self {
        SpoolScannerBuilder {
            config: Config::default(),
            engine: None,
            store: None,
            catalog: None,
            decryptor: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Key derivation engine (defaults to [`BambuKeyDerivation`])
    pub fn engine(mut self, engine: Arc<dyn KeyDerivation>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Persistent store for the key cache
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn CatalogSource>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn decryptor(mut self, decryptor: Arc<dyn Decryptor>) -> Self {
        self.decryptor = Some(decryptor);
        self
    }

    pub fn build(self) -> Result<SpoolScanner> {
        self.config.validate()?;

        let decryptor = self.decryptor.ok_or_else(|| {
            SpoolTagError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "decryptor must be set",
            ))
        })?;

        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(BambuKeyDerivation::new()));
        let keys = Arc::new(CachedKeyDerivation::new(engine, self.config.cache.clone()));
        if let Some(store) = self.store {
            keys.initialize(store);
        }

        let catalog = self.catalog.unwrap_or_else(|| Arc::new(EmptyCatalog));
        let interpreters = Arc::new(InterpreterFactory::new(
            catalog,
            self.config.interpreter.clone(),
        ));

        info!(
            "Spool scanner ready (key cache {})",
            if keys.is_cache_initialized() { "enabled" } else { "disabled" }
        );

        Ok(SpoolScanner {
            keys,
            decryptor,
            interpreters,
        })
    }
}

impl Default for SpoolScannerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a Bambu-shaped dump for any UID
    struct FixtureDecryptor;

    impl Decryptor for FixtureDecryptor {
        fn decrypt(&self, uid: &[u8], keys: &[SectorKey]) -> DecryptedScanData {
            let mut ids = [0u8; 16];
            ids[..8].copy_from_slice(b"A00-K000");
            ids[8..].copy_from_slice(b"GFA00000");
            let mut kind = [0u8; 16];
            kind[..4].copy_from_slice(b"PETG");

            DecryptedScanData::builder(hex::encode(uid))
                .mifare_classic_1k()
                .block(1, &ids)
                .block(2, &kind)
                .derived_keys(keys.iter().map(SectorKey::to_hex).collect())
                .build()
        }
    }

    #[test]
    fn test_scan_pipeline() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let scanner = SpoolScanner::builder()
            .decryptor(Arc::new(FixtureDecryptor))
            .store(store.clone())
            .build()?;

        let outcome = scanner.scan(&[0x04, 0xA1, 0xB2, 0xC3]);
        assert_eq!(outcome.data.derived_keys.len(), 16);

        let info = outcome.filament.unwrap();
        assert_eq!(info.tag_uid, "04A1B2C3");
        assert_eq!(info.filament_type, "PETG");
        assert_eq!(info.rfid_code, "GFA00000:A00-K000");

        scanner.scan(&[0x04, 0xA1, 0xB2, 0xC3]);
        let stats = scanner.keys().statistics().unwrap();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(store.len("derived_keys.bambu-a"), 1);

        Ok(())
    }

    #[test]
    fn test_builder_requires_decryptor() {
        assert!(SpoolScanner::builder().build().is_err());
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let mut config = Config::default();
        config.cache.memory_capacity = 0;

        let result = SpoolScanner::builder()
            .config(config)
            .decryptor(Arc::new(FixtureDecryptor))
            .build();
        assert!(matches!(result, Err(SpoolTagError::ConfigValidation(_))));
    }

    #[test]
    fn test_without_store_derives_directly() -> Result<()> {
        let scanner = SpoolScanner::builder()
            .decryptor(Arc::new(FixtureDecryptor))
            .build()?;

        assert!(!scanner.keys().is_cache_initialized());
        assert!(scanner.scan(&[1, 2, 3, 4]).filament.is_some());
        Ok(())
    }
}

//! Spool tag core
//!
//! Key derivation with caching, plus decoders for the tag formats found on
//! filament spools.
//!
//! ## Modules
//!
//! - [`error`] - Error type shared by the whole crate
//! - [`config`] - TOML configuration with validation
//! - [`scan`] - Decrypted block maps handed over by the decryption layer
//! - [`filament`] - Decoded spool metadata
//! - [`keys`] - Sector key derivation:
//!   - [`keys::cache`] - Two-tier (memory + persistent) derived key cache
//!   - [`keys::facade`] - Lifecycle-managed entry point with direct fallback
//! - [`store`] - Namespaced key-value storage behind the persistent tier
//! - [`catalog`] - Material mappings and product lookups
//! - [`interpreter`] - Bambu Lab, Creality and OpenTag decoders and their
//!   registry
//! - [`block`], [`color`] - Field readers and color helpers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use spooltag_rs::core::interpreter::InterpreterFactory;
//! use spooltag_rs::core::scan::{DecryptedScanData, TagFormat};
//!
//! let data = DecryptedScanData::builder("04A1B2C3")
//!     .mifare_classic_1k()
//!     .tag_format(TagFormat::BambuLab)
//!     .block_hex(1, "4130302D4B3030304746413030303030")
//!     .build();
//!
//! let factory = InterpreterFactory::with_defaults();
//! if let Some(info) = factory.interpret(&data) {
//!     println!("{} {}", info.filament_type, info.color_hex);
//! }
//! ```

pub mod block;
pub mod catalog;
pub mod color;
pub mod config;
pub mod error;
pub mod filament;
pub mod interpreter;
pub mod keys;
pub mod scan;
pub mod store;

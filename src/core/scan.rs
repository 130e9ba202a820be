//! Decrypted scan data handed over by the decryption layer
//!
//! A `DecryptedScanData` is built once per scan, read by the interpreters,
//! and then dropped. Construction goes through [`DecryptedScanDataBuilder`],
//! which refuses to carry blocks from sectors that failed authentication.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Bytes per tag block
pub const BLOCK_SIZE: usize = 16;

/// Blocks per sector on MIFARE Classic 1K (the last one is the trailer)
pub const BLOCKS_PER_SECTOR: u8 = 4;

/// Tag format as reported by the reader, or `Unknown` for legacy dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagFormat {
    BambuLab,
    Creality,
    OpenTag,
    Unknown,
}

impl TagFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagFormat::BambuLab => "BambuLab",
            TagFormat::Creality => "Creality",
            TagFormat::OpenTag => "OpenTag",
            TagFormat::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for TagFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the authentication/read pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanResult {
    Success,
    AuthFailure,
    Corrupted,
    PartialRead,
    ReadError,
}

/// Output of the decryption layer for a single tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecryptedScanData {
    pub tag_uid: String,
    pub technology: String,
    pub tag_format: TagFormat,
    pub scan_result: ScanResult,
    pub sector_count: u16,
    pub tag_size_bytes: u32,
    /// Block index -> 32 hex characters (16 bytes)
    pub decrypted_blocks: BTreeMap<u8, String>,
    pub authenticated_sectors: BTreeSet<u8>,
    pub failed_sectors: BTreeSet<u8>,
    /// Hex keys, for diagnostics only
    pub derived_keys: Vec<String>,
    pub errors: Vec<String>,
    pub key_derivation_time_ms: u64,
    pub authentication_time_ms: u64,
}

impl DecryptedScanData {
    pub fn builder(tag_uid: impl Into<String>) -> DecryptedScanDataBuilder {
        DecryptedScanDataBuilder::new(tag_uid)
    }

    /// True when the scan succeeded and produced at least one block
    pub fn has_data(&self) -> bool {
        self.scan_result == ScanResult::Success && !self.decrypted_blocks.is_empty()
    }

    /// Raw hex text of a block, if it was read
    pub fn block_hex(&self, index: u8) -> Option<&str> {
        self.decrypted_blocks.get(&index).map(String::as_str)
    }

    /// Decoded bytes of a block
    ///
    /// Returns `None` when the block is absent or its hex text is not
    /// exactly 16 bytes.
    pub fn block(&self, index: u8) -> Option<[u8; BLOCK_SIZE]> {
        let hex_text = self.block_hex(index)?;
        let bytes = hex::decode(hex_text.trim()).ok()?;
        bytes.try_into().ok()
    }
}

/// Builder for [`DecryptedScanData`]
#[derive(Debug, Clone)]
pub struct DecryptedScanDataBuilder {
    data: DecryptedScanData,
}

impl DecryptedScanDataBuilder {
    pub fn new(tag_uid: impl Into<String>) -> Self {
        DecryptedScanDataBuilder {
            data: DecryptedScanData {
                tag_uid: tag_uid.into().to_uppercase(),
                technology: String::new(),
                tag_format: TagFormat::Unknown,
                scan_result: ScanResult::Success,
                sector_count: 0,
                tag_size_bytes: 0,
                decrypted_blocks: BTreeMap::new(),
                authenticated_sectors: BTreeSet::new(),
                failed_sectors: BTreeSet::new(),
                derived_keys: Vec::new(),
                errors: Vec::new(),
                key_derivation_time_ms: 0,
                authentication_time_ms: 0,
            },
        }
    }

    pub fn technology(mut self, technology: impl Into<String>) -> Self {
        self.data.technology = technology.into();
        self
    }

    pub fn tag_format(mut self, format: TagFormat) -> Self {
        self.data.tag_format = format;
        self
    }

    pub fn scan_result(mut self, result: ScanResult) -> Self {
        self.data.scan_result = result;
        self
    }

    /// Declare a MIFARE Classic 1K geometry (16 sectors, 1024 bytes)
    pub fn mifare_classic_1k(mut self) -> Self {
        self.data.technology = "MifareClassic".to_string();
        self.data.sector_count = 16;
        self.data.tag_size_bytes = 1024;
        self
    }

    pub fn geometry(mut self, sector_count: u16, tag_size_bytes: u32) -> Self {
        self.data.sector_count = sector_count;
        self.data.tag_size_bytes = tag_size_bytes;
        self
    }

    pub fn block_hex(mut self, index: u8, hex_text: impl Into<String>) -> Self {
        self.data
            .decrypted_blocks
            .insert(index, hex_text.into().to_uppercase());
        self
    }

    pub fn block(self, index: u8, bytes: &[u8; BLOCK_SIZE]) -> Self {
        self.block_hex(index, hex::encode_upper(bytes))
    }

    pub fn authenticated_sector(mut self, sector: u8) -> Self {
        self.data.authenticated_sectors.insert(sector);
        self
    }

    pub fn failed_sector(mut self, sector: u8) -> Self {
        self.data.failed_sectors.insert(sector);
        self
    }

    pub fn derived_keys(mut self, keys: Vec<String>) -> Self {
        self.data.derived_keys = keys;
        self
    }

    pub fn error(mut self, message: impl Into<String>) -> Self {
        self.data.errors.push(message.into());
        self
    }

    pub fn timings(mut self, key_derivation_ms: u64, authentication_ms: u64) -> Self {
        self.data.key_derivation_time_ms = key_derivation_ms;
        self.data.authentication_time_ms = authentication_ms;
        self
    }

    /// Finish the scan record
    ///
    /// Blocks belonging to a failed sector are dropped.
    pub fn build(mut self) -> DecryptedScanData {
        let failed = &self.data.failed_sectors;
        if !failed.is_empty() {
            let before = self.data.decrypted_blocks.len();
            self.data
                .decrypted_blocks
                .retain(|index, _| !failed.contains(&(index / BLOCKS_PER_SECTOR)));
            let dropped = before - self.data.decrypted_blocks.len();
            if dropped > 0 {
                debug!(
                    "Dropped {} blocks from failed sectors on tag {}",
                    dropped, self.data.tag_uid
                );
            }
        }
        self.data
    }
}

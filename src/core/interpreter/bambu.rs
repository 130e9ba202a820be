//! Bambu Lab proprietary tag layout
//!
//! Fixed 16-byte blocks, little-endian integers:
//!
//! | Block | Bytes  | Field                                          |
//! |-------|--------|------------------------------------------------|
//! | 1     | 0-7    | variant id                                     |
//! | 1     | 8-15   | material id                                    |
//! | 2     | 0-15   | base material type                             |
//! | 4     | 0-15   | detailed material type                         |
//! | 5     | 0-3    | RGBA color                                     |
//! | 5     | 4-5    | spool weight (g)                               |
//! | 5     | 8-15   | filament diameter (mm, f64)                    |
//! | 6     | 0-11   | drying temp/hours, bed type/temp, hotend max/min |
//! | 8     | 12-15  | nozzle diameter (mm, f32)                      |
//! | 9     | 0-15   | tray UID                                       |
//! | 10    | 4-5    | spool width (1/100 mm)                         |
//! | 12    | 0-15   | production date                                |
//! | 14    | 4-5    | filament length (m)                            |
//! | 16    | 0-7    | color format, color count, second color (ABGR) |
//!
//! Only a missing variant or material id aborts decoding; every other field
//! falls back to its own default.

use crate::block::{self, text};
use crate::catalog::{MappingCatalog, MaterialMapping, ProductEntry};
use crate::color;
use crate::config::InterpreterConfig;
use crate::error::{Result, SpoolTagError};
use crate::filament::{FilamentInfo, TemperatureProfile};
use crate::scan::{DecryptedScanData, TagFormat, BLOCK_SIZE};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Manufacturer name written to every decoded record
pub const MANUFACTURER: &str = "Bambu Lab";

const DEFAULT_DIAMETER_MM: f64 = 1.75;

const MAX_HOTEND_C: u16 = 500;
const MAX_BED_C: u16 = 200;
const MAX_DRYING_C: u16 = 200;
const MAX_DRYING_HOURS: u16 = 72;
const MAX_BED_TYPE: u16 = 16;

fn tray_uid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_:-]{3,}$").expect("static pattern"))
}

pub struct BambuFormatInterpreter {
    catalog: Arc<dyn MappingCatalog>,
    color_match_threshold: f64,
}

impl BambuFormatInterpreter {
    pub const NAME: &'static str = "BambuFormatInterpreter";

    pub fn new(catalog: Arc<dyn MappingCatalog>, config: &InterpreterConfig) -> Self {
        BambuFormatInterpreter {
            catalog,
            color_match_threshold: config.color_match_threshold,
        }
    }

    pub fn can_interpret(&self, data: &DecryptedScanData) -> bool {
        match data.tag_format {
            TagFormat::BambuLab => true,
            // 1K geometry alone also matches Creality tags; require the id block
            TagFormat::Unknown => {
                data.technology.contains("MifareClassic")
                    && data.sector_count == 16
                    && data.tag_size_bytes == 1024
                    && data.block(1).is_some_and(|ids| {
                        !text(&ids, 0, 8).is_empty() && !text(&ids, 8, 8).is_empty()
                    })
            }
            _ => false,
        }
    }

    pub fn interpret(&self, data: &DecryptedScanData) -> Option<FilamentInfo> {
        super::settle(Self::NAME, data, self.decode(data))
    }

    fn decode(&self, data: &DecryptedScanData) -> Result<FilamentInfo> {
        if !data.has_data() {
            return Err(SpoolTagError::DataAbsent);
        }

        let ids = data.block(1).unwrap_or([0; BLOCK_SIZE]);
        let variant_id = text(&ids, 0, 8);
        let material_id = text(&ids, 8, 8);
        if variant_id.is_empty() {
            return Err(SpoolTagError::MissingIdentifier("variant id"));
        }
        if material_id.is_empty() {
            return Err(SpoolTagError::MissingIdentifier("material id"));
        }

        let mut info = FilamentInfo::new(data.tag_uid.clone(), TagFormat::BambuLab);
        info.manufacturer = MANUFACTURER.to_string();
        info.rfid_code = format!("{}:{}", material_id, variant_id);
        info.material_id = material_id;
        info.material_variant_id = variant_id;

        info.filament_type = string_block(data, 2);
        info.detailed_filament_type = string_block(data, 4);

        let rgb = match data.block(5) {
            Some(b) => {
                info.spool_weight_g = block::u16_le(&b, 4).unwrap_or(0) as u32;
                info.filament_diameter_mm = block::f64_le(&b, 8)
                    .filter(|d| d.is_finite() && *d > 0.0)
                    .unwrap_or(DEFAULT_DIAMETER_MM);
                (b[0], b[1], b[2])
            }
            None => {
                debug!("Block 5 missing on tag {}", data.tag_uid);
                (0, 0, 0)
            }
        };

        if let Some(b) = data.block(6) {
            info.temperatures = temperatures(&b);
        }

        if let Some(b) = data.block(8) {
            info.nozzle_diameter_mm = block::f32_le(&b, 12)
                .filter(|d| d.is_finite() && *d > 0.0)
                .unwrap_or(0.0);
        }

        info.tray_uid = tray_uid(data.block(9), &data.tag_uid);

        if let Some(b) = data.block(10) {
            info.spool_width_mm = block::u16_le(&b, 4).unwrap_or(0) as f64 / 100.0;
        }

        info.production_date = string_block(data, 12);

        if let Some(b) = data.block(14) {
            info.filament_length_mm = block::u16_le(&b, 4).unwrap_or(0) as u32 * 1000;
        }

        if let Some(b) = data.block(16) {
            let format_id = block::u16_le(&b, 0).unwrap_or(0);
            let count = block::u16_le(&b, 2).unwrap_or(0);
            if count > 0 {
                info.color_count = count;
            }
            if format_id != 0 && count > 1 {
                // second color is stored ABGR
                info.additional_colors.push(color::to_hex(b[7], b[6], b[5]));
            }
        }

        info.color_hex = if rgb == (0, 0, 0) {
            let material = if info.filament_type.is_empty() {
                &info.detailed_filament_type
            } else {
                &info.filament_type
            };
            color::material_default_hex(material).to_string()
        } else {
            color::to_hex(rgb.0, rgb.1, rgb.2)
        };

        self.enrich(&mut info, rgb);
        Ok(info)
    }

    fn enrich(&self, info: &mut FilamentInfo, rgb: (u8, u8, u8)) {
        if let Some(mapping) = self
            .catalog
            .lookup_by_code(&info.material_id, &info.material_variant_id)
        {
            debug!("Exact mapping for {}", info.rfid_code);
            apply_mapping(info, mapping);
            return;
        }

        if let Some(product) = self.nearest_product(info, rgb) {
            debug!(
                "Nearest catalog color for {}: {} ({})",
                info.rfid_code, product.color_name, product.sku
            );
            info.color_name = product.color_name;
            info.sku = Some(product.sku);
            info.product_url = product.url;
            return;
        }

        info.color_name = format!("Unknown Color ({})", info.color_hex);
    }

    fn nearest_product(&self, info: &FilamentInfo, rgb: (u8, u8, u8)) -> Option<ProductEntry> {
        let mut candidates = Vec::new();
        if !info.detailed_filament_type.is_empty() {
            candidates = self.catalog.find_products(
                MANUFACTURER,
                None,
                Some(&info.detailed_filament_type),
            );
        }
        if candidates.is_empty() && !info.filament_type.is_empty() {
            candidates = self
                .catalog
                .find_products(MANUFACTURER, None, Some(&info.filament_type));
        }

        candidates
            .into_iter()
            .filter_map(|p| {
                let distance = color::rgb_distance(rgb, color::parse_hex(&p.color_hex)?);
                Some((distance, p))
            })
            .filter(|(distance, _)| *distance < self.color_match_threshold)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, p)| p)
    }
}

fn apply_mapping(info: &mut FilamentInfo, mapping: MaterialMapping) {
    if !mapping.material.is_empty() {
        if info.detailed_filament_type.is_empty() {
            info.detailed_filament_type = mapping.material.clone();
        }
        info.filament_type = mapping.material;
    }
    if !mapping.color.is_empty() {
        info.color_name = mapping.color;
    }
    if let Some(hex) = color::normalize_hex(&mapping.hex) {
        info.color_hex = hex;
    }
    info.sku = mapping.sku;
}

fn string_block(data: &DecryptedScanData, index: u8) -> String {
    data.block(index)
        .map(|b| text(&b, 0, BLOCK_SIZE))
        .unwrap_or_default()
}

fn temperatures(b: &[u8; BLOCK_SIZE]) -> TemperatureProfile {
    let plausible = |offset: usize, max: u16| {
        block::u16_le(b, offset)
            .filter(|v| *v <= max)
            .unwrap_or(0)
    };

    TemperatureProfile {
        drying_temp: plausible(0, MAX_DRYING_C),
        drying_time_hours: plausible(2, MAX_DRYING_HOURS),
        bed_temp_type: plausible(4, MAX_BED_TYPE),
        bed_temp: plausible(6, MAX_BED_C),
        max_hotend: plausible(8, MAX_HOTEND_C),
        min_hotend: plausible(10, MAX_HOTEND_C),
    }
}

/// Tray UID from block 9: printable id, else leading 8 bytes as hex, else
/// the tag's own UID
fn tray_uid(raw: Option<[u8; BLOCK_SIZE]>, tag_uid: &str) -> String {
    let Some(raw) = raw else {
        return tag_uid.to_string();
    };

    if let Ok(decoded) = std::str::from_utf8(&raw) {
        let candidate = block::clean_text(decoded);
        if tray_uid_pattern().is_match(&candidate) {
            return candidate;
        }
    }

    if raw[..8].iter().any(|b| *b != 0) {
        return hex::encode_upper(&raw[..8]);
    }

    tag_uid.to_string()
}

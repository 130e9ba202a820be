//! Structured filament metadata produced by the interpreters

use crate::scan::TagFormat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Temperature profile in °C (hours for drying time)
///
/// A value of 0 means the tag did not carry a usable value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureProfile {
    pub min_hotend: u16,
    pub max_hotend: u16,
    pub bed_temp: u16,
    pub bed_temp_type: u16,
    pub drying_temp: u16,
    pub drying_time_hours: u16,
}

/// Decoded spool metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilamentInfo {
    /// Hardware UID of the tag
    pub tag_uid: String,
    /// Manufacturer-assigned spool identifier
    pub tray_uid: String,
    pub tag_format: TagFormat,
    pub manufacturer: String,

    pub filament_type: String,
    pub detailed_filament_type: String,
    /// Uppercase `#RRGGBB`
    pub color_hex: String,
    pub color_name: String,
    pub color_count: u16,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_colors: Vec<String>,

    pub spool_weight_g: u32,
    pub filament_diameter_mm: f64,
    pub filament_length_mm: u32,
    pub spool_width_mm: f64,
    pub nozzle_diameter_mm: f32,
    pub production_date: String,
    pub temperatures: TemperatureProfile,

    pub material_id: String,
    pub material_variant_id: String,
    /// `materialId:variantId` lookup code (Bambu only)
    pub rfid_code: String,

    /// Catalog SKU when the spool matched a known product
    pub sku: Option<String>,
    pub product_url: Option<String>,

    /// Manufacturer-specific fields
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, String>,
}

impl FilamentInfo {
    /// Blank record for a tag, to be filled in by an interpreter
    pub fn new(tag_uid: impl Into<String>, tag_format: TagFormat) -> Self {
        FilamentInfo {
            tag_uid: tag_uid.into(),
            tray_uid: String::new(),
            tag_format,
            manufacturer: String::new(),
            filament_type: String::new(),
            detailed_filament_type: String::new(),
            color_hex: String::new(),
            color_name: String::new(),
            color_count: 1,
            additional_colors: Vec::new(),
            spool_weight_g: 0,
            filament_diameter_mm: 1.75,
            filament_length_mm: 0,
            spool_width_mm: 0.0,
            nozzle_diameter_mm: 0.0,
            production_date: String::new(),
            temperatures: TemperatureProfile::default(),
            material_id: String::new(),
            material_variant_id: String::new(),
            rfid_code: String::new(),
            sku: None,
            product_url: None,
            extensions: BTreeMap::new(),
        }
    }

    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }

    pub fn extension_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.extension(key).unwrap_or(default)
    }

    /// Matched a catalog product
    pub fn is_enriched(&self) -> bool {
        self.sku.is_some()
    }

    pub(crate) fn set_extension(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        if !value.is_empty() {
            self.extensions.insert(key.to_string(), value);
        }
    }
}

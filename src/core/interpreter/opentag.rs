//! OpenTag open standard layout
//!
//! Blocks are laid out flat (block `i` at byte `i * 16`) and fields are read
//! from fixed offsets, big-endian. Fields past the end of the reconstructed
//! buffer are treated as absent, which is how the optional extended region
//! (serial, date, length, drying) is detected.

use crate::block::{self, text};
use crate::color;
use crate::error::{Result, SpoolTagError};
use crate::filament::FilamentInfo;
use crate::scan::{DecryptedScanData, TagFormat, BLOCK_SIZE};
use chrono::NaiveDate;
use std::f64::consts::PI;
use tracing::debug;

const SIGNATURE: &[u8; 2] = b"OT";

mod offset {
    pub const SIGNATURE: usize = 0x10;
    pub const VERSION: usize = 0x12;
    pub const MANUFACTURER: usize = 0x14;
    pub const BASE_MATERIAL: usize = 0x24;
    pub const MODIFIERS: usize = 0x29;
    pub const COLOR_NAME: usize = 0x2E;
    pub const RGB: usize = 0x4E;
    pub const DIAMETER_UM: usize = 0x51;
    pub const WEIGHT_G: usize = 0x53;
    pub const PRINT_TEMP: usize = 0x55;
    pub const BED_TEMP: usize = 0x56;
    pub const DENSITY: usize = 0x57;

    // extended region
    pub const SERIAL: usize = 0x60;
    pub const MFG_YEAR: usize = 0x70;
    pub const MFG_MONTH: usize = 0x72;
    pub const MFG_DAY: usize = 0x73;
    pub const CORE_DIAMETER_MM: usize = 0x74;
    pub const LENGTH_M: usize = 0x75;
    pub const DRYING_TEMP: usize = 0x77;
    pub const DRYING_HOURS: usize = 0x78;
}

const TEMP_SCALE: u16 = 5;
const DEFAULT_DIAMETER_MM: f64 = 1.75;
/// g/cm³, used when the tag carries no density
const DEFAULT_DENSITY: f64 = 1.24;
const MIN_ESTIMATED_LENGTH_MM: f64 = 1_000.0;
const MAX_ESTIMATED_LENGTH_MM: f64 = 5_000_000.0;

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenTagInterpreter;

impl OpenTagInterpreter {
    pub const NAME: &'static str = "OpenTagInterpreter";

    pub fn new() -> Self {
        OpenTagInterpreter
    }

    pub fn can_interpret(&self, data: &DecryptedScanData) -> bool {
        match data.tag_format {
            TagFormat::OpenTag => true,
            TagFormat::Unknown => has_signature(&flat_buffer(data)),
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
        let buf = flat_buffer(data);
        if !has_signature(&buf) {
            return Err(SpoolTagError::FormatMismatch("OpenTag"));
        }

        let mut info = FilamentInfo::new(data.tag_uid.clone(), TagFormat::OpenTag);
        info.manufacturer = text(&buf, offset::MANUFACTURER, 16);

        let base = text(&buf, offset::BASE_MATERIAL, 5);
        let modifiers = text(&buf, offset::MODIFIERS, 5);
        info.detailed_filament_type = if modifiers.is_empty() {
            base.clone()
        } else {
            format!("{} {}", base, modifiers)
        };
        info.filament_type = base;

        let rgb = buf
            .get(offset::RGB..offset::RGB + 3)
            .map(|c| (c[0], c[1], c[2]));
        info.color_hex = match rgb {
            Some((r, g, b)) => color::to_hex(r, g, b),
            None => color::material_default_hex(&info.filament_type).to_string(),
        };
        info.color_name = text(&buf, offset::COLOR_NAME, 32);
        if info.color_name.is_empty() {
            if let Some((r, g, b)) = rgb {
                info.color_name = color::hsv_color_name(r, g, b).to_string();
            }
        }

        info.filament_diameter_mm = block::u16_be(&buf, offset::DIAMETER_UM)
            .filter(|um| *um > 0)
            .map(|um| um as f64 / 1000.0)
            .unwrap_or(DEFAULT_DIAMETER_MM);
        info.spool_weight_g = block::u16_be(&buf, offset::WEIGHT_G).unwrap_or(0) as u32;

        let scaled = |at: usize| block::u8_at(&buf, at).map(|v| v as u16 * TEMP_SCALE).unwrap_or(0);
        let print_temp = scaled(offset::PRINT_TEMP);
        info.temperatures.min_hotend = print_temp;
        info.temperatures.max_hotend = print_temp;
        info.temperatures.bed_temp = scaled(offset::BED_TEMP);
        info.temperatures.drying_temp = scaled(offset::DRYING_TEMP);
        info.temperatures.drying_time_hours =
            block::u8_at(&buf, offset::DRYING_HOURS).unwrap_or(0) as u16;

        let density = block::u16_be(&buf, offset::DENSITY)
            .filter(|d| *d > 0)
            .map(|d| d as f64 / 1000.0);

        info.filament_length_mm = match block::u16_be(&buf, offset::LENGTH_M).filter(|m| *m > 0) {
            Some(meters) => meters as u32 * 1000,
            None => {
                let estimate = estimate_length_mm(info.spool_weight_g, density);
                if estimate > 0 {
                    info.set_extension("length_estimated", "true");
                }
                estimate
            }
        };

        info.production_date = manufacture_date(&buf).unwrap_or_default();

        let serial = text(&buf, offset::SERIAL, 16);
        info.tray_uid = if serial.is_empty() {
            synthesize_tray_id(&info, &data.tag_uid)
        } else {
            serial
        };

        if let Some(version) = block::u16_be(&buf, offset::VERSION) {
            info.set_extension("opentag_version", version.to_string());
        }
        info.set_extension("modifiers", modifiers);
        if let Some(d) = density {
            info.set_extension("density_g_cm3", format!("{:.3}", d));
        }
        if let Some(core) = block::u8_at(&buf, offset::CORE_DIAMETER_MM).filter(|c| *c > 0) {
            info.set_extension("spool_core_diameter_mm", core.to_string());
        }

        debug!(
            "OpenTag {} buffer {} bytes, extended region {}",
            data.tag_uid,
            buf.len(),
            if buf.len() > offset::SERIAL { "present" } else { "absent" }
        );
        Ok(info)
    }
}

/// Place every decodable block at `index * 16`; gaps stay zeroed
fn flat_buffer(data: &DecryptedScanData) -> Vec<u8> {
    let Some(last) = data.decrypted_blocks.keys().next_back() else {
        return Vec::new();
    };

    let mut buf = vec![0u8; (*last as usize + 1) * BLOCK_SIZE];
    for index in data.decrypted_blocks.keys() {
        if let Some(bytes) = data.block(*index) {
            let start = *index as usize * BLOCK_SIZE;
            buf[start..start + BLOCK_SIZE].copy_from_slice(&bytes);
        }
    }
    buf
}

fn has_signature(buf: &[u8]) -> bool {
    buf.get(offset::SIGNATURE..offset::SIGNATURE + 2) == Some(SIGNATURE.as_slice())
}

fn manufacture_date(buf: &[u8]) -> Option<String> {
    let year = block::u16_be(buf, offset::MFG_YEAR).filter(|y| *y > 0)?;
    let month = block::u8_at(buf, offset::MFG_MONTH)?;
    let day = block::u8_at(buf, offset::MFG_DAY)?;
    let date = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Length implied by net weight at 1.75 mm, clamped to 1 m ..= 5000 m
fn estimate_length_mm(weight_g: u32, density: Option<f64>) -> u32 {
    if weight_g == 0 {
        return 0;
    }
    let density = density.unwrap_or(DEFAULT_DENSITY);
    let radius_cm = DEFAULT_DIAMETER_MM / 10.0 / 2.0;
    let area_cm2 = PI * radius_cm * radius_cm;
    let length_mm = weight_g as f64 / density / area_cm2 * 10.0;
    length_mm.clamp(MIN_ESTIMATED_LENGTH_MM, MAX_ESTIMATED_LENGTH_MM) as u32
}

/// `MANU-MATE-COLO` from manufacturer, material and color name
fn synthesize_tray_id(info: &FilamentInfo, tag_uid: &str) -> String {
    let abbreviate = |s: &str| -> String {
        s.chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .take(4)
            .collect::<String>()
            .to_ascii_uppercase()
    };

    let parts: Vec<String> = [&info.manufacturer, &info.filament_type, &info.color_name]
        .iter()
        .map(|s| abbreviate(s))
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        tag_uid.to_string()
    } else {
        parts.join("-")
    }
}

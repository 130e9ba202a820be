//! Creality ASCII tag layout
//!
//! Blocks 4, 5 and 6 carry one whitespace-separated record:
//!
//! ```text
//! <batch> <YYMDD> <supplier> <material id> <#RRGGBB> <spool id> [remainder...]
//! ```
//!
//! The month in the date is a single hex digit (1-9, A-C).

use crate::catalog::CatalogSource;
use crate::color;
use crate::error::{Result, SpoolTagError};
use crate::filament::FilamentInfo;
use crate::scan::{DecryptedScanData, TagFormat};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub const MANUFACTURER: &str = "Creality";

const PAYLOAD_BLOCKS: [u8; 3] = [4, 5, 6];
const MIN_TOKENS: usize = 6;

fn color_token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("static pattern"))
}

/// One tokenized Creality record
#[derive(Debug, Clone, PartialEq, Eq)]
struct CrealityRecord {
    batch_code: String,
    date: String,
    supplier_id: String,
    material_id: String,
    color: String,
    spool_id: String,
    remainder: String,
}

impl CrealityRecord {
    fn parse(payload: &str) -> Result<Self> {
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        if tokens.len() < MIN_TOKENS {
            return Err(SpoolTagError::FormatMismatch("Creality"));
        }

        Ok(CrealityRecord {
            batch_code: tokens[0].to_string(),
            date: tokens[1].to_string(),
            supplier_id: tokens[2].to_string(),
            material_id: tokens[3].to_string(),
            color: tokens[4].to_string(),
            spool_id: tokens[5].to_string(),
            remainder: tokens[MIN_TOKENS..].join(" "),
        })
    }

    /// Structural check used for untagged dumps
    fn looks_valid(&self) -> bool {
        self.date.len() == 5 && color_token_pattern().is_match(&self.color)
    }
}

pub struct CrealityFormatInterpreter {
    catalog: Arc<dyn CatalogSource>,
}

impl CrealityFormatInterpreter {
    pub const NAME: &'static str = "CrealityFormatInterpreter";

    pub fn new(catalog: Arc<dyn CatalogSource>) -> Self {
        CrealityFormatInterpreter { catalog }
    }

    pub fn can_interpret(&self, data: &DecryptedScanData) -> bool {
        match data.tag_format {
            TagFormat::Creality => true,
            TagFormat::Unknown => payload(data)
                .and_then(|p| CrealityRecord::parse(&p))
                .map(|record| record.looks_valid())
                .unwrap_or(false),
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
        let record = CrealityRecord::parse(&payload(data)?)?;

        let mut info = FilamentInfo::new(data.tag_uid.clone(), TagFormat::Creality);
        info.manufacturer = MANUFACTURER.to_string();
        info.filament_type = material_name(&record.material_id);
        info.detailed_filament_type = info.filament_type.clone();
        info.material_id = record.material_id.clone();
        info.production_date = production_date(&record.date);
        info.tray_uid = record.spool_id.clone();

        let rgb = color::parse_hex(&record.color);
        info.color_hex = match rgb {
            Some((r, g, b)) => color::to_hex(r, g, b),
            None => {
                debug!("Unparsable Creality color token '{}'", record.color);
                color::material_default_hex(&info.filament_type).to_string()
            }
        };

        let catalog = self.catalog.current();
        let exact = catalog
            .find_products(MANUFACTURER, Some(&info.color_hex), Some(&info.filament_type))
            .into_iter()
            .next()
            .or_else(|| {
                catalog
                    .find_products(MANUFACTURER, Some(&info.color_hex), None)
                    .into_iter()
                    .next()
            });

        match exact {
            Some(product) => {
                info.color_name = product.color_name;
                info.sku = Some(product.sku);
                info.product_url = product.url;
            }
            None => {
                let (r, g, b) = color::parse_hex(&info.color_hex).unwrap_or((0x80, 0x80, 0x80));
                info.color_name = color::hsv_color_name(r, g, b).to_string();
            }
        }

        info.set_extension("batch_code", record.batch_code);
        info.set_extension("supplier_id", record.supplier_id);
        info.set_extension("spool_id", record.spool_id);
        info.set_extension("remainder", record.remainder);

        Ok(info)
    }
}

/// Blocks 4-6 as text with NULs removed
fn payload(data: &DecryptedScanData) -> Result<String> {
    let mut raw = Vec::with_capacity(PAYLOAD_BLOCKS.len() * 16);
    for index in PAYLOAD_BLOCKS {
        let bytes = data.block(index).ok_or_else(|| SpoolTagError::FieldExtraction {
            block: index,
            reason: "payload block missing".to_string(),
        })?;
        raw.extend_from_slice(&bytes);
    }

    Ok(String::from_utf8_lossy(&raw)
        .chars()
        .filter(|c| *c != '\0')
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect())
}

fn material_name(material_id: &str) -> String {
    let name = match material_id.get(..2) {
        Some("01") => "PLA",
        Some("02") => "ABS",
        Some("03") => "PETG",
        Some("04") => "TPU",
        _ => return format!("Unknown Material (ID: {})", material_id),
    };
    name.to_string()
}

/// `YYMDD` with a hex month digit to `YYYY-MM-DD`; anything else verbatim
fn production_date(raw: &str) -> String {
    parse_date(raw)
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| raw.to_string())
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    if raw.len() != 5 || !raw.is_ascii() {
        return None;
    }
    let year: i32 = raw[0..2].parse().ok()?;
    let month = u32::from_str_radix(&raw[2..3], 16).ok()?;
    let day: u32 = raw[3..5].parse().ok()?;
    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

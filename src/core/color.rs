//! Color helpers shared by the interpreters

/// Format RGB as uppercase `#RRGGBB`
pub fn to_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{:02X}{:02X}{:02X}", r, g, b)
}

/// Parse `#RRGGBB` or `RRGGBB` (any case)
pub fn parse_hex(value: &str) -> Option<(u8, u8, u8)> {
    let digits = value.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some((r, g, b))
}

/// Normalize any accepted hex spelling to uppercase `#RRGGBB`
pub fn normalize_hex(value: &str) -> Option<String> {
    parse_hex(value).map(|(r, g, b)| to_hex(r, g, b))
}

/// Euclidean distance in RGB space
pub fn rgb_distance(a: (u8, u8, u8), b: (u8, u8, u8)) -> f64 {
    let dr = a.0 as f64 - b.0 as f64;
    let dg = a.1 as f64 - b.1 as f64;
    let db = a.2 as f64 - b.2 as f64;
    (dr * dr + dg * dg + db * db).sqrt()
}

/// Display color used when a tag reports pure black for its material
///
/// Matching is on the leading material family, so "PLA Matte" and
/// "PETG-CF" resolve like "PLA" and "PETG".
pub fn material_default_hex(material: &str) -> &'static str {
    let material = material.trim().to_uppercase();
    let family = |prefix: &str| material.starts_with(prefix);

    if family("PLA") {
        "#4CAF50"
    } else if family("PETG") {
        "#2196F3"
    } else if family("ABS") {
        "#FF9800"
    } else if family("ASA") {
        "#9C27B0"
    } else if family("TPU") {
        "#E91E63"
    } else if family("PC") {
        "#607D8B"
    } else if family("PA") || material.contains("NYLON") {
        "#795548"
    } else {
        "#808080"
    }
}

/// Coarse color name from HSV buckets
pub fn hsv_color_name(r: u8, g: u8, b: u8) -> &'static str {
    let (hue, saturation, value) = rgb_to_hsv(r, g, b);

    if value < 0.2 {
        return "Black";
    }
    if value > 0.9 && saturation < 0.1 {
        return "White";
    }
    if saturation < 0.2 {
        return "Grey";
    }

    match ((hue + 30.0) % 360.0 / 60.0) as u32 {
        0 => "Red",
        1 => "Yellow",
        2 => "Green",
        3 => "Cyan",
        4 => "Blue",
        _ => "Magenta",
    }
}

/// Hue in degrees [0, 360), saturation and value in [0, 1]
fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (f64, f64, f64) {
    let r = r as f64 / 255.0;
    let g = g as f64 / 255.0;
    let b = b as f64 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    (hue, saturation, max)
}

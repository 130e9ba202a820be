//! Fixed-offset field readers for tag memory
//!
//! All readers are bounds-checked and return `None` instead of panicking
//! when the requested range falls outside the slice. Little-endian is the
//! default; the `_be` variants serve the OpenTag layout.

/// Read a little-endian u16 at `offset`
pub fn u16_le(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_le_bytes([raw[0], raw[1]]))
}

/// Read a big-endian u16 at `offset`
pub fn u16_be(bytes: &[u8], offset: usize) -> Option<u16> {
    let raw = bytes.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([raw[0], raw[1]]))
}

/// Read a single byte at `offset`
pub fn u8_at(bytes: &[u8], offset: usize) -> Option<u8> {
    bytes.get(offset).copied()
}

/// Read a little-endian f32 at `offset`
pub fn f32_le(bytes: &[u8], offset: usize) -> Option<f32> {
    let raw = bytes.get(offset..offset + 4)?;
    Some(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Read a little-endian f64 at `offset`
pub fn f64_le(bytes: &[u8], offset: usize) -> Option<f64> {
    let raw = bytes.get(offset..offset + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    Some(f64::from_le_bytes(buf))
}

/// Decode `len` bytes at `offset` as text
///
/// Invalid UTF-8 is replaced, NUL and control characters are dropped, and the
/// result is trimmed. Out-of-range requests yield an empty string.
pub fn text(bytes: &[u8], offset: usize, len: usize) -> String {
    match bytes.get(offset..offset + len) {
        Some(raw) => clean_text(&String::from_utf8_lossy(raw)),
        None => String::new(),
    }
}

/// Strip NUL/control characters and surrounding whitespace
pub fn clean_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

//! Capture-device filename conventions.
//!
//! The scanner names every capture `<MMDDYYYYhhmmss>_<serial>.<ext>`, with a
//! zero-padded serial that restarts whenever the device counter is reset.

use chrono::{NaiveDate, NaiveDateTime};
use std::path::Path;

/// Format used for batch start/end timestamps in `batches.json`.
pub const BATCH_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp and serial parsed from a capture filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureStamp {
    pub taken_at: NaiveDateTime,
    pub serial: u32,
}

/// Filename without its final extension.
pub fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(name)
}

/// Final extension including the leading dot, or an empty string.
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default()
}

/// Parse a full `<timestamp>_<serial>` capture filename.
pub fn parse_capture_filename(name: &str) -> Option<CaptureStamp> {
    let stem = file_stem(name);
    let mut parts = stem.split('_');
    let (ts, serial) = match (parts.next(), parts.next(), parts.next()) {
        (Some(ts), Some(serial), None) => (ts, serial),
        _ => return None,
    };
    if serial.is_empty() || !serial.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let taken_at = parse_device_timestamp(ts)?;
    let serial = serial.parse().ok()?;
    Some(CaptureStamp { taken_at, serial })
}

/// Capture time embedded in a filename, ignoring whatever follows the
/// first underscore.
pub fn capture_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stem = file_stem(name);
    let ts = stem.split('_').next().unwrap_or(stem);
    parse_device_timestamp(ts)
}

/// Parse the device's 14-digit `MMDDYYYYhhmmss` timestamp.
fn parse_device_timestamp(ts: &str) -> Option<NaiveDateTime> {
    if ts.len() != 14 || !ts.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let field = |range: std::ops::Range<usize>| ts[range].parse::<u32>().ok();
    let month = field(0..2)?;
    let day = field(2..4)?;
    let year = field(4..8)? as i32;
    let hour = field(8..10)?;
    let minute = field(10..12)?;
    let second = field(12..14)?;
    NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)
}

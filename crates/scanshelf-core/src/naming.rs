//! Canonical archive names for accepted documents.
//!
//! A dated document lands in `<year>/<MM>` and is displayed as
//! `2024年3月5日 09：41 Name`. An undated document falls back to the capture
//! timestamp in its original filename and lands in `<year>/undated`.

use anyhow::{bail, Context, Result};
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};

use crate::capture::capture_timestamp;
use crate::models::Decision;

/// Colon used between hour and minute; `:` is not allowed in filenames.
pub const FULLWIDTH_COLON: char = '\u{ff1a}';

/// Replace filesystem-forbidden characters with fullwidth look-alikes and
/// trim trailing dots and spaces.
pub fn sanitize_filename(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| match c {
            '<' => '＜',
            '>' => '＞',
            ':' => '：',
            '"' => '＂',
            '/' => '／',
            '\\' => '＼',
            '|' => '｜',
            '?' => '？',
            '*' => '＊',
            other => other,
        })
        .collect();
    mapped.trim_end_matches(['.', ' ']).to_string()
}

/// Ordering hint for documents whose names collide to the minute.
///
/// Known seconds sort first, ascending; unknown seconds sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TieBreak {
    Second(u32),
    Unknown,
}

/// Where an accepted document belongs in the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveName {
    /// `"{year}/{month:02}"` or `"{year}/undated"`.
    pub folder: String,
    /// Display stem before any collision suffix.
    pub base: String,
    pub tie_break: TieBreak,
}

/// Derive folder, display base and tie-break for a decision.
pub fn build_archive_name(decision: &Decision, filename: &str) -> Result<ArchiveName> {
    let safe_name = sanitize_filename(&decision.name);

    if !decision.date.is_empty() {
        let (year, month, day) = parse_date(&decision.date)
            .with_context(|| format!("invalid date '{}' for {}", decision.date, filename))?;
        let (hour, minute, second) = parse_time(&decision.time)
            .with_context(|| format!("invalid time '{}' for {}", decision.time, filename))?;
        return Ok(ArchiveName {
            folder: format!("{}/{:02}", year, month),
            base: display_base(year, month, day, hour, minute, &safe_name),
            tie_break: second.map(TieBreak::Second).unwrap_or(TieBreak::Unknown),
        });
    }

    let Some(taken_at) = capture_timestamp(filename) else {
        bail!(
            "{} is undated and its filename carries no capture timestamp",
            filename
        );
    };
    Ok(ArchiveName {
        folder: format!("{}/undated", taken_at.year()),
        base: display_base(
            taken_at.year(),
            taken_at.month(),
            taken_at.day(),
            taken_at.hour(),
            taken_at.minute(),
            &safe_name,
        ),
        tie_break: TieBreak::Second(taken_at.second()),
    })
}

fn display_base(year: i32, month: u32, day: u32, hour: u32, minute: u32, name: &str) -> String {
    format!(
        "{}年{}月{}日 {:02}{}{:02} {}",
        year, month, day, hour, FULLWIDTH_COLON, minute, name
    )
}

/// Year, month and day of a `YYYY-MM-DD` calendar date.
fn parse_date(date: &str) -> Result<(i32, u32, u32)> {
    let parts: Vec<&str> = date.split('-').collect();
    if parts.len() != 3 {
        bail!("expected YYYY-MM-DD");
    }
    let (year, month, day) = (
        parts[0].trim().parse()?,
        parts[1].trim().parse()?,
        parts[2].trim().parse()?,
    );
    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
        bail!("no such calendar date");
    };
    Ok((date.year(), date.month(), date.day()))
}

/// Hour, minute and (when given) seconds. An empty time reads as 00:00.
fn parse_time(time: &str) -> Result<(u32, u32, Option<u32>)> {
    if time.trim().is_empty() {
        return Ok((0, 0, None));
    }
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() > 3 {
        bail!("expected HH:MM[:SS]");
    }
    let hour: u32 = parts[0].trim().parse()?;
    let minute: u32 = match parts.get(1) {
        Some(m) => m.trim().parse()?,
        None => 0,
    };
    let second: Option<u32> = match parts.get(2) {
        Some(s) => Some(s.trim().parse()?),
        None => None,
    };
    if NaiveTime::from_hms_opt(hour, minute, second.unwrap_or(0)).is_none() {
        bail!("time of day out of range");
    }
    Ok((hour, minute, second))
}

/// True when `stem` is `base` itself or `base (N)` for a numeric `N`.
pub fn stem_matches_base(stem: &str, base: &str) -> bool {
    if stem == base {
        return true;
    }
    stem.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix(" ("))
        .and_then(|rest| rest.strip_suffix(')'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentType, Verdict};

    fn decision(name: &str, date: &str, time: &str) -> Decision {
        Decision {
            verdict: Verdict::Accepted,
            document_type: DocumentType::Other,
            name: name.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            cost: 0.0,
            currency: String::new(),
        }
    }

    #[test]
    fn test_dated_name() {
        let name = build_archive_name(&decision("Cafe", "2024-03-05", "9:41"), "x.jpg").unwrap();
        assert_eq!(name.folder, "2024/03");
        assert_eq!(name.base, "2024年3月5日 09：41 Cafe");
        assert_eq!(name.tie_break, TieBreak::Unknown);
    }

    #[test]
    fn test_dated_name_with_seconds() {
        let name =
            build_archive_name(&decision("Cafe", "2024-12-25", "18:07:33"), "x.jpg").unwrap();
        assert_eq!(name.folder, "2024/12");
        assert_eq!(name.base, "2024年12月25日 18：07 Cafe");
        assert_eq!(name.tie_break, TieBreak::Second(33));
    }

    #[test]
    fn test_empty_time_is_midnight() {
        let name = build_archive_name(&decision("Lease", "2023-01-09", ""), "x.jpg").unwrap();
        assert_eq!(name.base, "2023年1月9日 00：00 Lease");
    }

    #[test]
    fn test_undated_uses_capture_timestamp() {
        let name =
            build_archive_name(&decision("Note", "", ""), "07042023081502_0003.jpg").unwrap();
        assert_eq!(name.folder, "2023/undated");
        assert_eq!(name.base, "2023年7月4日 08：15 Note");
        assert_eq!(name.tie_break, TieBreak::Second(2));
    }

    #[test]
    fn test_undated_without_timestamp_fails() {
        assert!(build_archive_name(&decision("Note", "", ""), "scan.jpg").is_err());
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_filename("A/B: C?"), "A／B： C？");
        assert_eq!(sanitize_filename("Cafe. . "), "Cafe");
        assert_eq!(sanitize_filename("<x|y*\"z\\>"), "＜x｜y＊＂z＼＞");
    }

    #[test]
    fn test_stem_matches_base() {
        assert!(stem_matches_base("base", "base"));
        assert!(stem_matches_base("base (2)", "base"));
        assert!(stem_matches_base("base (17)", "base"));
        assert!(!stem_matches_base("base ()", "base"));
        assert!(!stem_matches_base("base (x)", "base"));
        assert!(!stem_matches_base("base 2", "base"));
        assert!(!stem_matches_base("based", "base"));
    }

    #[test]
    fn test_tie_break_ordering() {
        assert!(TieBreak::Second(59) < TieBreak::Unknown);
        assert!(TieBreak::Second(3) < TieBreak::Second(4));
    }

    #[test]
    fn test_out_of_range_date_is_rejected() {
        for date in ["2024-13-05", "2024-02-30", "2024-00-10", "2023-02-29"] {
            let err = build_archive_name(&decision("Cafe", date, "10:00"), "x.jpg").unwrap_err();
            assert!(err.to_string().contains("invalid date"), "{}: {}", date, err);
        }
        assert!(build_archive_name(&decision("Cafe", "2024-02-29", "10:00"), "x.jpg").is_ok());
    }

    #[test]
    fn test_out_of_range_time_is_rejected() {
        for time in ["25:99", "24:00", "10:60", "10:00:61", "10:00:00:00"] {
            let err =
                build_archive_name(&decision("Cafe", "2024-03-05", time), "x.jpg").unwrap_err();
            assert!(err.to_string().contains("invalid time"), "{}: {}", time, err);
        }
        assert!(build_archive_name(&decision("Cafe", "2024-03-05", "23:59:59"), "x.jpg").is_ok());
    }
}

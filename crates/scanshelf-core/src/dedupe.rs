//! Probable duplicate captures among accepted receipts.
//!
//! The same receipt scanned twice ends up with the same cost and nearly the
//! same timestamp. Receipts are chained in time order while consecutive gaps
//! stay within [`MAX_GAP_MINUTES`]; each chain is then split by exact cost
//! and any cost group with two or more members is a candidate.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ordered_float::OrderedFloat;
use std::collections::BTreeMap;

use crate::models::{Decision, Verdict};

/// Largest gap between neighbouring receipts that keeps a chain going.
pub const MAX_GAP_MINUTES: i64 = 5;

fn max_gap() -> Duration {
    Duration::minutes(MAX_GAP_MINUTES)
}

/// Parse a decision's `YYYY-MM-DD` date and `HH:MM[:SS]` time to the minute.
///
/// Seconds are ignored. Returns `None` for anything malformed.
pub fn parse_decision_datetime(date: &str, time: &str) -> Option<NaiveDateTime> {
    let date_parts: Vec<&str> = date.split('-').collect();
    if date_parts.len() != 3 || !date_parts.iter().all(|p| is_digits(p)) {
        return None;
    }
    let time_parts: Vec<&str> = time.split(':').collect();
    if time_parts.len() < 2 || !is_digits(time_parts[0]) || !is_digits(time_parts[1]) {
        return None;
    }
    let day = NaiveDate::from_ymd_opt(
        date_parts[0].parse().ok()?,
        date_parts[1].parse().ok()?,
        date_parts[2].parse().ok()?,
    )?;
    day.and_hms_opt(time_parts[0].parse().ok()?, time_parts[1].parse().ok()?, 0)
}

fn is_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn is_candidate(decision: &Decision) -> bool {
    decision.verdict != Verdict::Tossed && decision.is_receipt()
}

/// Receipts with a usable timestamp, oldest first.
fn receipt_timeline(decisions: &BTreeMap<String, Decision>) -> Vec<(&str, NaiveDateTime)> {
    let mut timeline: Vec<(&str, NaiveDateTime)> = decisions
        .iter()
        .filter(|(_, d)| is_candidate(d))
        .filter_map(|(name, d)| {
            parse_decision_datetime(&d.date, &d.time).map(|at| (name.as_str(), at))
        })
        .collect();
    timeline.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    timeline
}

/// Groups of filenames that are probably the same receipt.
pub fn find_dedupe_clusters(decisions: &BTreeMap<String, Decision>) -> Vec<Vec<String>> {
    let mut chains: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut prev: Option<NaiveDateTime> = None;

    for (name, at) in receipt_timeline(decisions) {
        match prev {
            Some(p) if at - p <= max_gap() => current.push(name),
            _ => {
                if current.len() >= 2 {
                    chains.push(std::mem::take(&mut current));
                }
                current = vec![name];
            }
        }
        prev = Some(at);
    }
    if current.len() >= 2 {
        chains.push(current);
    }

    let mut clusters = Vec::new();
    for chain in chains {
        let mut by_cost: Vec<(OrderedFloat<f64>, Vec<String>)> = Vec::new();
        for name in chain {
            let cost = OrderedFloat(decisions[name].cost);
            match by_cost.iter_mut().find(|(c, _)| *c == cost) {
                Some((_, group)) => group.push(name.to_string()),
                None => by_cost.push((cost, vec![name.to_string()])),
            }
        }
        clusters.extend(
            by_cost
                .into_iter()
                .map(|(_, group)| group)
                .filter(|group| group.len() >= 2),
        );
    }
    clusters
}

/// Receipts within five minutes of a timestamp that share its cost.
///
/// Sorted by absolute time distance, nearest first. `exclude` is typically
/// the document being reviewed.
pub fn find_adjacent_documents(
    date: &str,
    time: &str,
    cost: f64,
    decisions: &BTreeMap<String, Decision>,
    exclude: &str,
) -> Vec<String> {
    let Some(target) = parse_decision_datetime(date, time) else {
        return Vec::new();
    };

    let mut adjacent: Vec<(&str, Duration)> = decisions
        .iter()
        .filter(|(name, d)| name.as_str() != exclude && is_candidate(d))
        .filter(|(_, d)| OrderedFloat(d.cost) == OrderedFloat(cost))
        .filter_map(|(name, d)| {
            let at = parse_decision_datetime(&d.date, &d.time)?;
            let distance = (at - target).abs();
            (distance <= max_gap()).then_some((name.as_str(), distance))
        })
        .collect();
    adjacent.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
    adjacent.into_iter().map(|(name, _)| name.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentType;

    fn receipt(time: &str, cost: f64) -> Decision {
        Decision {
            verdict: Verdict::Accepted,
            document_type: DocumentType::Receipt,
            name: "Shop".to_string(),
            date: "2024-05-01".to_string(),
            time: time.to_string(),
            cost,
            currency: "JPY".to_string(),
        }
    }

    fn decisions(items: &[(&str, &str, f64)]) -> BTreeMap<String, Decision> {
        items
            .iter()
            .map(|(name, time, cost)| (name.to_string(), receipt(time, *cost)))
            .collect()
    }

    #[test]
    fn test_chain_breaks_on_large_gap() {
        let d = decisions(&[
            ("a", "10:00", 5.0),
            ("b", "10:02", 5.0),
            ("c", "10:10", 7.0),
            ("d", "10:11", 7.0),
        ]);
        let clusters = find_dedupe_clusters(&d);
        assert_eq!(clusters, vec![vec!["a", "b"], vec!["c", "d"]]);
    }

    #[test]
    fn test_chain_splits_by_cost() {
        let d = decisions(&[
            ("a", "10:00", 5.0),
            ("b", "10:03", 6.0),
            ("c", "10:06", 5.0),
            ("d", "10:09", 9.0),
        ]);
        // one chain (gaps of 3 minutes) but only cost 5 repeats
        assert_eq!(find_dedupe_clusters(&d), vec![vec!["a", "c"]]);
    }

    #[test]
    fn test_gap_of_exactly_five_minutes_chains() {
        let d = decisions(&[("a", "10:00", 5.0), ("b", "10:05", 5.0)]);
        assert_eq!(find_dedupe_clusters(&d).len(), 1);
    }

    #[test]
    fn test_ignores_tossed_and_non_receipts() {
        let mut d = decisions(&[("a", "10:00", 5.0), ("b", "10:01", 5.0), ("c", "10:02", 5.0)]);
        d.get_mut("b").unwrap().verdict = Verdict::Tossed;
        d.get_mut("c").unwrap().document_type = DocumentType::Other;
        assert!(find_dedupe_clusters(&d).is_empty());
    }

    #[test]
    fn test_unparseable_times_are_skipped() {
        let d = decisions(&[("a", "10:00", 5.0), ("b", "", 5.0), ("c", "ten", 5.0)]);
        assert!(find_dedupe_clusters(&d).is_empty());
    }

    #[test]
    fn test_adjacent_sorted_by_distance() {
        let d = decisions(&[
            ("self", "12:00", 3.0),
            ("far", "11:56", 3.0),
            ("near", "12:01", 3.0),
            ("other_cost", "12:00", 4.0),
            ("outside", "12:06", 3.0),
        ]);
        let adjacent = find_adjacent_documents("2024-05-01", "12:00", 3.0, &d, "self");
        assert_eq!(adjacent, vec!["near", "far"]);
    }

    #[test]
    fn test_adjacent_with_bad_target() {
        let d = decisions(&[("a", "10:00", 5.0)]);
        assert!(find_adjacent_documents("May 1", "10:00", 5.0, &d, "").is_empty());
    }

    #[test]
    fn test_parse_decision_datetime_ignores_seconds() {
        let a = parse_decision_datetime("2024-05-01", "10:00:59").unwrap();
        let b = parse_decision_datetime("2024-05-01", "10:00").unwrap();
        assert_eq!(a, b);
        assert!(parse_decision_datetime("2024-5", "10:00").is_none());
        assert!(parse_decision_datetime("2024-02-30", "10:00").is_none());
    }
}

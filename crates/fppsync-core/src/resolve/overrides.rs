use chrono::NaiveDate;
use regex::Regex;

use crate::error::{Result, SyncError};
use crate::primitives::Interval;

/// Extracts `EXDATE` lines from a recurrence line set (Google's `recurrence`
/// array interleaves `RRULE:` and `EXDATE:` entries) into concrete
/// exclusion dates. Time-of-day and `Z`/TZID suffixes are ignored — EXDATE
/// carving operates at day granularity.
pub fn parse_exdates(recurrence_lines: &[String]) -> Result<Vec<NaiveDate>> {
    let date_token = Regex::new(r"^(\d{8})").expect("valid regex");
    let mut out = Vec::new();

    for line in recurrence_lines {
        let Some(body) = line.strip_prefix("EXDATE").map(|rest| {
            rest.split_once(':').map(|(_, v)| v).unwrap_or(rest)
        }) else {
            continue;
        };

        for token in body.split(',') {
            let token = token.trim();
            if token.is_empty() {
                continue;
            }
            let captured = date_token
                .captures(token)
                .and_then(|c| c.get(1))
                .ok_or_else(|| {
                    SyncError::UnresolvableRecurrence(format!("unrecognized EXDATE token '{token}'"))
                })?;
            let date = NaiveDate::parse_from_str(captured.as_str(), "%Y%m%d").map_err(|_| {
                SyncError::UnresolvableRecurrence(format!("invalid EXDATE date '{token}'"))
            })?;
            out.push(date);
        }
    }

    Ok(out)
}

/// Carves `coverage` into contiguous half-open segments by subtracting each
/// exclusion date in turn.
pub fn carve_segments(coverage: Interval, exdates: &[NaiveDate]) -> Vec<Interval> {
    let mut segments = vec![coverage];
    for date in exdates {
        let hole = Interval::new(*date, Some(*date + chrono::Duration::days(1)));
        segments = segments
            .into_iter()
            .flat_map(|segment| segment.subtract(&hole))
            .collect();
    }
    segments
}

/// Locates the segment(s) an override's date range intersects. Returns one
/// entry per intersecting segment with the clipped sub-range — almost
/// always a single entry; more than one only when the override straddles
/// an EXDATE-carved boundary.
pub fn host_segments(segments: &[Interval], override_range: Interval) -> Vec<(usize, Interval)> {
    segments
        .iter()
        .enumerate()
        .filter_map(|(idx, segment)| segment.intersection(&override_range).map(|clip| (idx, clip)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn parses_single_exdate() {
        let lines = vec!["EXDATE;TZID=America/Chicago:20260210T000000".to_string()];
        let dates = parse_exdates(&lines).expect("parse");
        assert_eq!(dates, vec![d(2026, 2, 10)]);
    }

    #[test]
    fn parses_comma_separated_exdates() {
        let lines = vec!["EXDATE:20260210,20260215".to_string()];
        let dates = parse_exdates(&lines).expect("parse");
        assert_eq!(dates, vec![d(2026, 2, 10), d(2026, 2, 15)]);
    }

    #[test]
    fn s1_carves_three_segments() {
        let coverage = Interval::new(d(2026, 2, 1), Some(d(2026, 3, 1)));
        let exdates = vec![d(2026, 2, 10), d(2026, 2, 15)];
        let segments = carve_segments(coverage, &exdates);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0], Interval::new(d(2026, 2, 1), Some(d(2026, 2, 10))));
        assert_eq!(segments[1], Interval::new(d(2026, 2, 11), Some(d(2026, 2, 15))));
        assert_eq!(segments[2], Interval::new(d(2026, 2, 16), Some(d(2026, 3, 1))));
    }

    #[test]
    fn override_fully_inside_one_segment() {
        let segments = vec![Interval::new(d(2026, 2, 1), Some(d(2026, 3, 1)))];
        let override_range = Interval::new(d(2026, 2, 10), Some(d(2026, 2, 11)));
        let hosts = host_segments(&segments, override_range);
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].0, 0);
    }

    #[test]
    fn override_straddling_two_segments_splits() {
        let segments = vec![
            Interval::new(d(2026, 2, 1), Some(d(2026, 2, 10))),
            Interval::new(d(2026, 2, 11), Some(d(2026, 3, 1))),
        ];
        let override_range = Interval::new(d(2026, 2, 9), Some(d(2026, 2, 12)));
        let hosts = host_segments(&segments, override_range);
        assert_eq!(hosts.len(), 2);
    }
}

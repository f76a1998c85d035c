use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use regex::Regex;

use crate::error::{Result, SyncError};
use crate::primitives::{Weekday, WeekdayConstraint, Weekdays};

/// A supported recurrence subset: `FREQ=DAILY` or `FREQ=WEEKLY;BYDAY=...`,
/// optionally bounded by `UNTIL`. `INTERVAL` other than 1 and `COUNT` are
/// unsupported constructs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRRule {
    pub weekly: Weekdays,
    pub until: Option<NaiveDate>,
    pub until_is_date_only: bool,
}

/// Parses a single `RRULE:` line. Multiple RRULE lines (disjoint windows)
/// are rejected upstream by the caller, not here. `dtstart_tz` is DTSTART's
/// own timezone, needed to convert a UTC `UNTIL` instant into DTSTART's
/// local date.
pub fn parse_rrule(raw: &str, dtstart_is_all_day: bool, dtstart_tz: Tz) -> Result<ParsedRRule> {
    let body = raw.strip_prefix("RRULE:").unwrap_or(raw);

    let mut freq: Option<String> = None;
    let mut byday: Option<String> = None;
    let mut until: Option<String> = None;
    let mut interval: Option<i64> = None;
    let mut count_present = false;

    for part in body.split(';') {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        match key.to_ascii_uppercase().as_str() {
            "FREQ" => freq = Some(value.to_ascii_uppercase()),
            "BYDAY" => byday = Some(value.to_string()),
            "UNTIL" => until = Some(value.to_string()),
            "INTERVAL" => {
                interval = Some(value.parse().map_err(|_| {
                    SyncError::UnresolvableRecurrence(format!("invalid INTERVAL in '{raw}'"))
                })?);
            }
            "COUNT" => count_present = true,
            _ => {}
        }
    }

    if count_present {
        return Err(SyncError::UnresolvableRecurrence(format!(
            "COUNT-bounded recurrences are unsupported: '{raw}'"
        )));
    }
    if let Some(n) = interval {
        if n != 1 {
            return Err(SyncError::UnresolvableRecurrence(format!(
                "INTERVAL other than 1 is unsupported: '{raw}'"
            )));
        }
    }

    let weekly = match freq.as_deref() {
        Some("DAILY") => {
            if byday.is_some() {
                return Err(SyncError::UnresolvableRecurrence(format!(
                    "BYDAY on FREQ=DAILY is unsupported: '{raw}'"
                )));
            }
            None
        }
        Some("WEEKLY") => {
            let days = byday
                .ok_or_else(|| {
                    SyncError::UnresolvableRecurrence(format!(
                        "FREQ=WEEKLY requires BYDAY: '{raw}'"
                    ))
                })?
                .split(',')
                .map(Weekday::parse)
                .collect::<Result<Vec<_>>>()?;
            Some(WeekdayConstraint::weekly(&days)?)
        }
        Some(other) => {
            return Err(SyncError::UnresolvableRecurrence(format!(
                "unsupported FREQ '{other}' in '{raw}'"
            )));
        }
        None => {
            return Err(SyncError::UnresolvableRecurrence(format!(
                "missing FREQ in '{raw}'"
            )));
        }
    };

    let (until_date, until_is_date_only) = match until {
        Some(raw_until) => parse_until(&raw_until, dtstart_tz)?,
        None => (None, dtstart_is_all_day),
    };

    Ok(ParsedRRule {
        weekly,
        until: until_date,
        until_is_date_only,
    })
}

/// Parses an `UNTIL` value. A bare `YYYYMMDD` is a date-only bound, taken
/// verbatim (no timezone applies to an all-day recurrence). A
/// `YYYYMMDDTHHMMSSZ` form is a UTC instant and is converted into
/// `dtstart_tz` before its date component is taken, so a negative UTC
/// offset correctly rolls the date back to the local calendar day the
/// instant falls on.
fn parse_until(raw: &str, dtstart_tz: Tz) -> Result<(Option<NaiveDate>, bool)> {
    let date_only = Regex::new(r"^\d{8}$").expect("valid regex");
    let date_time = Regex::new(r"^(\d{8})T(\d{6})Z?$").expect("valid regex");

    if date_only.is_match(raw) {
        let date = NaiveDate::parse_from_str(raw, "%Y%m%d")
            .map_err(|_| SyncError::UnresolvableRecurrence(format!("invalid UNTIL '{raw}'")))?;
        return Ok((Some(date), true));
    }
    if let Some(caps) = date_time.captures(raw) {
        let naive: NaiveDateTime =
            NaiveDateTime::parse_from_str(&format!("{}T{}", &caps[1], &caps[2]), "%Y%m%dT%H%M%S")
                .map_err(|_| SyncError::UnresolvableRecurrence(format!("invalid UNTIL '{raw}'")))?;
        let utc_instant = Utc.from_utc_datetime(&naive);
        let local_date = utc_instant.with_timezone(&dtstart_tz).date_naive();
        return Ok((Some(local_date), false));
    }
    Err(SyncError::UnresolvableRecurrence(format!(
        "unrecognized UNTIL format '{raw}'"
    )))
}

/// Derives the coverage end-date-exclusive: for timed events UNTIL is
/// exclusive and the end date is DTSTART's local day preceding UNTIL
/// (already computed by `parse_until`); for all-day events UNTIL is
/// inclusive, so the exclusive end date is the day *after* UNTIL.
pub fn coverage_end_exclusive(rule: &ParsedRRule) -> Option<NaiveDate> {
    rule.until.map(|until| {
        if rule.until_is_date_only {
            until + chrono::Duration::days(1)
        } else {
            until
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHICAGO: Tz = chrono_tz::America::Chicago;
    const UTC_TZ: Tz = chrono_tz::UTC;

    #[test]
    fn parses_daily_with_until() {
        let rule = parse_rrule("RRULE:FREQ=DAILY;UNTIL=20260301T000000Z", false, UTC_TZ)
            .expect("parse");
        assert!(rule.weekly.is_none());
        assert_eq!(rule.until, NaiveDate::from_ymd_opt(2026, 3, 1));
        assert!(!rule.until_is_date_only);
    }

    #[test]
    fn parses_weekly_byday() {
        let rule = parse_rrule("RRULE:FREQ=WEEKLY;BYDAY=MO,WE,FR", false, UTC_TZ).expect("parse");
        match rule.weekly {
            Some(WeekdayConstraint::Weekly(set)) => assert_eq!(set.len(), 3),
            _ => panic!("expected weekly constraint"),
        }
    }

    #[test]
    fn rejects_count() {
        assert!(parse_rrule("RRULE:FREQ=DAILY;COUNT=10", false, UTC_TZ).is_err());
    }

    #[test]
    fn rejects_interval_other_than_one() {
        assert!(parse_rrule("RRULE:FREQ=DAILY;INTERVAL=2", false, UTC_TZ).is_err());
    }

    #[test]
    fn all_day_until_is_inclusive() {
        let rule = parse_rrule("RRULE:FREQ=DAILY;UNTIL=20260228", true, UTC_TZ).expect("parse");
        let end = coverage_end_exclusive(&rule).expect("end");
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));
    }

    #[test]
    fn timed_until_is_exclusive_in_utc() {
        let rule = parse_rrule("RRULE:FREQ=DAILY;UNTIL=20260301T000000Z", false, UTC_TZ)
            .expect("parse");
        let end = coverage_end_exclusive(&rule).expect("end");
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 3, 1).expect("date"));
    }

    #[test]
    fn timed_until_rolls_back_a_day_in_a_negative_offset_zone() {
        let rule = parse_rrule("RRULE:FREQ=DAILY;UNTIL=20260301T000000Z", false, CHICAGO)
            .expect("parse");
        let end = coverage_end_exclusive(&rule).expect("end");
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 2, 28).expect("date"));
    }
}

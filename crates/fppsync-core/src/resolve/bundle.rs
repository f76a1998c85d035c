use chrono::NaiveDate;
use chrono_tz::Tz;

use crate::error::{Result, SyncError};
use crate::ingest::calendar_raw::{CalendarDateTime, RawCalendarEvent};
use crate::primitives::Weekdays;
use crate::resolve::overrides::{carve_segments, host_segments, parse_exdates};
use crate::resolve::rrule::{coverage_end_exclusive, parse_rrule};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubEventRole {
    Base,
    Override,
}

/// One resolved execution unit: a date range (carved by EXDATE and override
/// boundaries) plus the time-of-day geometry and opaque settings text
/// carried verbatim from whichever calendar row defines it. Normalization
/// turns this into a `SubEvent`.
#[derive(Debug, Clone)]
pub struct ResolvedSubEvent {
    pub role: SubEventRole,
    pub source_event_uid: String,
    pub parent_uid: String,
    pub start_date: NaiveDate,
    pub end_date_exclusive: NaiveDate,
    pub days: Weekdays,
    pub dtstart: CalendarDateTime,
    pub dtend: CalendarDateTime,
    pub summary: String,
    pub description: String,
}

/// `{base, [overrides...]}` corresponding to one contiguous execution
/// segment.
#[derive(Debug, Clone)]
pub struct Bundle {
    pub bundle_id: String,
    pub base: ResolvedSubEvent,
    pub overrides: Vec<ResolvedSubEvent>,
}

impl Bundle {
    /// All sub-events in internal bundle order: overrides whose window
    /// overlaps the base come first, remaining overrides chronological by
    /// daily start, tie-broken by source uid.
    pub fn sub_events_in_order(&self) -> Vec<&ResolvedSubEvent> {
        let mut overlapping: Vec<&ResolvedSubEvent> = Vec::new();
        let mut disjoint: Vec<&ResolvedSubEvent> = Vec::new();

        for over in &self.overrides {
            if ranges_overlap(over, &self.base) {
                overlapping.push(over);
            } else {
                disjoint.push(over);
            }
        }

        overlapping.sort_by(|a, b| {
            daily_start_key(a)
                .cmp(&daily_start_key(b))
                .then_with(|| a.source_event_uid.cmp(&b.source_event_uid))
        });
        disjoint.sort_by(|a, b| {
            daily_start_key(a)
                .cmp(&daily_start_key(b))
                .then_with(|| a.source_event_uid.cmp(&b.source_event_uid))
        });

        let mut ordered = overlapping;
        ordered.push(&self.base);
        ordered.extend(disjoint);
        ordered
    }
}

fn ranges_overlap(over: &ResolvedSubEvent, base: &ResolvedSubEvent) -> bool {
    over.start_date < base.end_date_exclusive && base.start_date < over.end_date_exclusive
}

fn daily_start_key(event: &ResolvedSubEvent) -> Option<String> {
    event.dtstart.date_time.clone()
}

/// Converts a master `RawCalendarEvent` plus its override rows (rows whose
/// `parent_uid` equals the master's `uid`) into bundles.
pub fn resolve_bundles(
    master: &RawCalendarEvent,
    override_rows: &[RawCalendarEvent],
) -> Result<Vec<Bundle>> {
    if master.rrule.is_empty() {
        return Err(SyncError::UnresolvableRecurrence(format!(
            "event {} has no RRULE to resolve",
            master.uid
        )));
    }

    let rrule_line = master
        .rrule
        .iter()
        .find(|line| line.starts_with("RRULE"))
        .ok_or_else(|| {
            SyncError::UnresolvableRecurrence(format!(
                "event {} recurrence has no RRULE line",
                master.uid
            ))
        })?;

    let dtstart_date = extract_date(&master.dtstart)?;
    let dtstart_tz = extract_tz(&master.dtstart)?;
    let rule = parse_rrule(rrule_line, master.dtstart.is_all_day(), dtstart_tz)?;
    let end_exclusive = coverage_end_exclusive(&rule).ok_or_else(|| {
        SyncError::PartiallyResolved {
            reason: format!("event {} has no UNTIL bound; open-ended recurrences are not supported", master.uid),
            resolved_segments: 0,
        }
    })?;

    let exdates = parse_exdates(&master.rrule)?;
    let coverage = crate::primitives::Interval::new(dtstart_date, Some(end_exclusive));
    let segments = carve_segments(coverage, &exdates);

    let mut bases: Vec<ResolvedSubEvent> = segments
        .iter()
        .map(|segment| ResolvedSubEvent {
            role: SubEventRole::Base,
            source_event_uid: master.uid.clone(),
            parent_uid: master.uid.clone(),
            start_date: segment.start,
            end_date_exclusive: segment.end.expect("carved segment is always bounded"),
            days: rule.weekly.clone(),
            dtstart: master.dtstart.clone(),
            dtend: master.dtend.clone(),
            summary: master.summary.clone(),
            description: master.description.clone(),
        })
        .collect();

    let mut overrides_by_segment: Vec<Vec<ResolvedSubEvent>> = vec![Vec::new(); segments.len()];

    for override_row in override_rows {
        let override_start = extract_date(&override_row.dtstart)?;
        let override_end = extract_date(&override_row.dtend)?;
        let override_range = crate::primitives::Interval::new(
            override_start,
            Some(if override_end > override_start {
                override_end
            } else {
                override_start + chrono::Duration::days(1)
            }),
        );

        let hosts = host_segments(&segments, override_range);
        if hosts.is_empty() {
            return Err(SyncError::UnresolvableRecurrence(format!(
                "override {} falls outside the resolved coverage of {}",
                override_row.uid, master.uid
            )));
        }

        for (segment_idx, clipped) in hosts {
            overrides_by_segment[segment_idx].push(ResolvedSubEvent {
                role: SubEventRole::Override,
                source_event_uid: override_row.uid.clone(),
                parent_uid: master.uid.clone(),
                start_date: clipped.start,
                end_date_exclusive: clipped.end.expect("clipped range is always bounded"),
                days: rule.weekly.clone(),
                dtstart: override_row.dtstart.clone(),
                dtend: override_row.dtend.clone(),
                summary: override_row.summary.clone(),
                description: override_row.description.clone(),
            });
        }
    }

    let bundles = bases
        .drain(..)
        .enumerate()
        .map(|(idx, base)| Bundle {
            bundle_id: format!("{}::segment-{idx}", master.uid),
            base,
            overrides: std::mem::take(&mut overrides_by_segment[idx]),
        })
        .collect();

    Ok(bundles)
}

/// DTSTART's own timezone, used to interpret a UTC `UNTIL` instant in
/// local terms. Falls back to UTC when the row carries no explicit zone
/// (an all-day DTSTART, for instance, has none to give).
fn extract_tz(dt: &CalendarDateTime) -> Result<Tz> {
    match &dt.time_zone {
        Some(raw) => raw
            .parse::<Tz>()
            .map_err(|_| SyncError::MalformedRow(format!("invalid time zone '{raw}'"))),
        None => Ok(chrono_tz::UTC),
    }
}

fn extract_date(dt: &CalendarDateTime) -> Result<NaiveDate> {
    if let Some(date_only) = &dt.date {
        return NaiveDate::parse_from_str(date_only, "%Y-%m-%d")
            .map_err(|_| SyncError::MalformedRow(format!("invalid date '{date_only}'")));
    }
    if let Some(date_time) = &dt.date_time {
        return chrono::DateTime::parse_from_rfc3339(date_time)
            .map(|parsed| parsed.naive_local().date())
            .map_err(|_| SyncError::MalformedRow(format!("invalid dateTime '{date_time}'")));
    }
    Err(SyncError::MalformedRow(
        "calendar date value has neither date nor dateTime".to_string(),
    ))
}

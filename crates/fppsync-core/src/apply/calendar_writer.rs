//! Calendar write protocol. Translates the
//! structured intent layer back into provider rows: one insert/update per
//! manifest event, EXDATE lines for each override, and an opaque `[settings]`
//! mirror in the description so re-ingest recovers symbolic values exactly.
//!
//! Symbolic dates/times never materialize into a calendar-native field —
//! RFC5545 has none. DTSTART/DTEND still need *some* concrete instant for
//! the provider UI, so a best-effort display time is computed the same way
//! the FPP writer does; the description block, not DTSTART/DTEND, is what
//! re-ingest actually trusts (`normalize::build_time_value` reads
//! `start_symbolic`/`start_hard` from settings before ever looking at the
//! raw instant).

use chrono::NaiveDate;

use crate::error::{Result, SyncError};
use crate::ingest::calendar_raw::{CalendarDateTime, CalendarRow, ExtendedProperties};
use crate::normalize::{ManifestEvent, SubEvent, SubEventRoleTag};
use crate::order::OrderingContext;
use crate::primitives::{DatePattern, HardTime, WeekdayConstraint};
use crate::provider::{CalendarProvider, ProviderEvent};

const MANIFEST_EVENT_ID_KEY: &str = "cs.manifestEventId";
const PROVIDER_KEY: &str = "cs.provider";
const SCHEMA_VERSION_KEY: &str = "cs.schemaVersion";
const SCHEMA_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalendarOpKind {
    Create,
    Update,
    Delete,
}

/// One calendar-side action: `{op, manifestEventId, providerEventId?, etag?,
/// baseSubEvent, exceptionSubEvents[]}`.
#[derive(Debug, Clone)]
pub struct ApplyOp {
    pub op: CalendarOpKind,
    pub manifest_event_id: String,
    pub provider_event_id: Option<String>,
    pub etag: Option<String>,
    pub base_sub_event: SubEvent,
    pub exception_sub_events: Vec<SubEvent>,
}

impl ApplyOp {
    pub fn from_manifest_event(
        op: CalendarOpKind,
        event: &ManifestEvent,
        provider_event_id: Option<String>,
        etag: Option<String>,
    ) -> Result<Self> {
        let base = event
            .base_sub_event()
            .ok_or_else(|| SyncError::InvariantViolation("manifest event has no base sub-event".into()))?
            .clone();
        let exceptions = event
            .sub_events
            .iter()
            .filter(|se| matches!(se.role, SubEventRoleTag::Override))
            .cloned()
            .collect();
        Ok(Self {
            op,
            manifest_event_id: event.identity_hash.clone(),
            provider_event_id,
            etag,
            base_sub_event: base,
            exception_sub_events: exceptions,
        })
    }
}

/// Executes one `ApplyOp` against a calendar provider, returning the
/// resulting `ProviderEvent` for create/update (None for delete).
pub async fn apply_calendar_op(
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    provider_name: &str,
    op: &ApplyOp,
    ctx: &OrderingContext,
) -> Result<Option<ProviderEvent>> {
    match op.op {
        CalendarOpKind::Delete => {
            let provider_event_id = op.provider_event_id.as_deref().ok_or_else(|| {
                SyncError::InvariantViolation("DELETE requires a providerEventId".into())
            })?;
            provider.delete_event(calendar_id, provider_event_id).await?;
            Ok(None)
        }
        CalendarOpKind::Create => {
            let row = build_row(op, provider_name, ctx, None)?;
            let inserted = provider.insert_event(calendar_id, row).await?;
            for exception in &op.exception_sub_events {
                let exception_row =
                    build_exception_row(op, exception, provider_name, ctx, &inserted.provider_event_id)?;
                provider.insert_event(calendar_id, exception_row).await?;
            }
            Ok(Some(inserted))
        }
        CalendarOpKind::Update => {
            let provider_event_id = op.provider_event_id.clone().ok_or_else(|| {
                SyncError::InvariantViolation("UPDATE requires a providerEventId".into())
            })?;
            let row = build_row(op, provider_name, ctx, Some(provider_event_id.clone()))?;
            let updated = provider
                .update_event(calendar_id, &provider_event_id, row, op.etag.as_deref())
                .await?;
            for exception in &op.exception_sub_events {
                let exception_row =
                    build_exception_row(op, exception, provider_name, ctx, &provider_event_id)?;
                provider.insert_event(calendar_id, exception_row).await?;
            }
            Ok(Some(updated))
        }
    }
}

fn build_row(
    op: &ApplyOp,
    provider_name: &str,
    ctx: &OrderingContext,
    provider_event_id: Option<String>,
) -> Result<CalendarRow> {
    let base = &op.base_sub_event;
    let start_date = hard_date(base.timing.start_date.hard).ok_or_else(|| {
        SyncError::InvariantViolation("base sub-event missing a concrete start date".into())
    })?;

    let mut recurrence = vec![encode_rrule(base)?];
    for exception in &op.exception_sub_events {
        if let Some(exdate) = encode_exdate(exception, &base.timing.timezone)? {
            recurrence.push(exdate);
        }
    }

    let (start, end) = if base.timing.all_day {
        let end_date = hard_date(base.timing.end_date.hard).ok_or_else(|| {
            SyncError::InvariantViolation("all-day base sub-event missing a concrete end date".into())
        })?;
        (
            CalendarDateTime {
                date_time: None,
                date: Some(start_date.format("%Y-%m-%d").to_string()),
                time_zone: None,
            },
            CalendarDateTime {
                date_time: None,
                date: Some(end_date.format("%Y-%m-%d").to_string()),
                time_zone: None,
            },
        )
    } else {
        (
            timed_instant(base.timing.start_time.as_ref(), start_date, &base.timing.timezone, ctx)?,
            timed_instant(base.timing.end_time.as_ref(), start_date, &base.timing.timezone, ctx)?,
        )
    };

    let mut extended = ExtendedProperties::default();
    extended
        .private
        .insert(MANIFEST_EVENT_ID_KEY.to_string(), op.manifest_event_id.clone());
    extended.private.insert(PROVIDER_KEY.to_string(), provider_name.to_string());
    extended
        .private
        .insert(SCHEMA_VERSION_KEY.to_string(), SCHEMA_VERSION.to_string());

    Ok(CalendarRow {
        id: provider_event_id.unwrap_or_default(),
        summary: base.target.clone(),
        description: serialize_settings(base),
        start,
        end,
        recurrence,
        updated: String::new(),
        status: "confirmed".to_string(),
        extended_properties: extended,
        recurring_event_id: None,
    })
}

fn build_exception_row(
    op: &ApplyOp,
    exception: &SubEvent,
    provider_name: &str,
    ctx: &OrderingContext,
    base_provider_event_id: &str,
) -> Result<CalendarRow> {
    let start_date = hard_date(exception.timing.start_date.hard).ok_or_else(|| {
        SyncError::InvariantViolation("override sub-event missing a concrete start date".into())
    })?;
    let end_date = hard_date(exception.timing.end_date.hard).ok_or_else(|| {
        SyncError::InvariantViolation("override sub-event missing a concrete end date".into())
    })?;

    let (start, end) = if exception.timing.all_day {
        (
            CalendarDateTime {
                date_time: None,
                date: Some(start_date.format("%Y-%m-%d").to_string()),
                time_zone: None,
            },
            CalendarDateTime {
                date_time: None,
                date: Some(end_date.format("%Y-%m-%d").to_string()),
                time_zone: None,
            },
        )
    } else {
        (
            timed_instant(exception.timing.start_time.as_ref(), start_date, &exception.timing.timezone, ctx)?,
            timed_instant(exception.timing.end_time.as_ref(), start_date, &exception.timing.timezone, ctx)?,
        )
    };

    let mut extended = ExtendedProperties::default();
    extended
        .private
        .insert(MANIFEST_EVENT_ID_KEY.to_string(), op.manifest_event_id.clone());
    extended.private.insert(PROVIDER_KEY.to_string(), provider_name.to_string());
    extended
        .private
        .insert(SCHEMA_VERSION_KEY.to_string(), SCHEMA_VERSION.to_string());

    Ok(CalendarRow {
        id: String::new(),
        summary: exception.target.clone(),
        description: serialize_settings(exception),
        start,
        end,
        recurrence: Vec::new(),
        updated: String::new(),
        status: "confirmed".to_string(),
        extended_properties: extended,
        recurring_event_id: Some(base_provider_event_id.to_string()),
    })
}

fn timed_instant(
    time: Option<&crate::primitives::TimeValue>,
    date: NaiveDate,
    timezone: &str,
    ctx: &OrderingContext,
) -> Result<CalendarDateTime> {
    let time = time.ok_or_else(|| {
        SyncError::InvariantViolation("timed sub-event missing a start/end time".into())
    })?;

    let hard = match time.hard {
        Some(hard) => hard,
        None => {
            let symbolic = time.symbolic.ok_or_else(|| {
                SyncError::InvariantViolation("TimeValue has neither hard nor symbolic".into())
            })?;
            let lat = ctx.latitude_deg.ok_or_else(|| {
                SyncError::InvariantViolation(
                    "symbolic time requires a configured latitude for display materialization".into(),
                )
            })?;
            let estimated = crate::primitives::estimate_symbolic_seconds(
                date,
                symbolic,
                lat,
                ctx.longitude_offset_minutes,
                ctx.timezone_offset_minutes,
                ctx.step_minutes,
            )
            .ok_or_else(|| {
                SyncError::InvariantViolation("symbolic time could not be estimated for display".into())
            })?;
            let adjusted = ((estimated as i64 + (time.offset as i64 * 60)).rem_euclid(86_400)) as u32;
            HardTime::new((adjusted / 3600) as u8, ((adjusted % 3600) / 60) as u8, (adjusted % 60) as u8)?
        }
    };

    let naive = if hard.hour == 24 {
        date.succ_opt()
            .ok_or_else(|| SyncError::InvariantViolation("date overflow rolling 24:00:00 to the next day".into()))?
            .and_hms_opt(0, hard.minute as u32, hard.second as u32)
    } else {
        date.and_hms_opt(hard.hour as u32, hard.minute as u32, hard.second as u32)
    }
    .ok_or_else(|| SyncError::InvariantViolation("invalid wall-clock time for display".into()))?;

    Ok(CalendarDateTime {
        date_time: Some(format!("{}", naive.format("%Y-%m-%dT%H:%M:%S"))),
        date: None,
        time_zone: Some(timezone.to_string()),
    })
}

fn hard_date(pattern: Option<DatePattern>) -> Option<NaiveDate> {
    let pattern = pattern?;
    NaiveDate::from_ymd_opt(pattern.year?, pattern.month?, pattern.day?)
}

/// Inverse of `resolve::rrule::parse_rrule`: derives a single RRULE line
/// from structured timing. Date-parity constraints have no RRULE
/// representation and block export loudly rather than approximating one.
fn encode_rrule(sub_event: &SubEvent) -> Result<String> {
    let until_clause = encode_until(sub_event)?;

    match &sub_event.timing.days {
        None => Ok(format!("RRULE:FREQ=DAILY{until_clause}")),
        Some(WeekdayConstraint::Weekly(set)) => {
            let days = set.iter().map(|d| d.as_str()).collect::<Vec<_>>().join(",");
            Ok(format!("RRULE:FREQ=WEEKLY;BYDAY={days}{until_clause}"))
        }
        Some(WeekdayConstraint::DateParity(_)) => Err(SyncError::UnresolvableRecurrence(
            "date-parity recurrence has no RRULE representation; calendar export blocked".into(),
        )),
    }
}

fn encode_until(sub_event: &SubEvent) -> Result<String> {
    let end_pattern = sub_event.timing.end_date.hard.ok_or_else(|| {
        SyncError::InvariantViolation(
            "symbolic-only end date cannot be exported to calendar (hard export failure)".into(),
        )
    })?;
    let end_exclusive = NaiveDate::from_ymd_opt(
        end_pattern.year.ok_or_else(|| wildcard_err("end year"))?,
        end_pattern.month.ok_or_else(|| wildcard_err("end month"))?,
        end_pattern.day.ok_or_else(|| wildcard_err("end day"))?,
    )
    .ok_or_else(|| SyncError::InvariantViolation("invalid end date".into()))?;

    if sub_event.timing.all_day {
        let until = end_exclusive - chrono::Duration::days(1);
        Ok(format!(";UNTIL={}", until.format("%Y%m%d")))
    } else {
        Ok(format!(";UNTIL={}T000000Z", end_exclusive.format("%Y%m%d")))
    }
}

fn wildcard_err(field: &str) -> SyncError {
    SyncError::InvariantViolation(format!("{field} is wildcarded; cannot export to calendar"))
}

/// EXDATE for one override sub-event, keyed to the override's own start
/// date/time. All-day overrides are skipped: Google represents
/// an all-day exception purely through the override instance itself.
fn encode_exdate(exception: &SubEvent, timezone: &str) -> Result<Option<String>> {
    if exception.timing.all_day {
        return Ok(None);
    }
    let date = hard_date(exception.timing.start_date.hard).ok_or_else(|| {
        SyncError::InvariantViolation("override sub-event missing a concrete start date".into())
    })?;
    let time = exception
        .timing
        .start_time
        .as_ref()
        .and_then(|t| t.hard)
        .ok_or_else(|| {
            SyncError::InvariantViolation(
                "symbolic-only override start time cannot be exported as EXDATE".into(),
            )
        })?;
    Ok(Some(format!(
        "EXDATE;TZID={timezone}:{}T{}",
        date.format("%Y%m%d"),
        time.to_canonical_string().replace(':', "")
    )))
}

/// Mirrors the `[settings]` block an override/base sub-event was built
/// from, the opaque inverse of `normalize::settings::parse_settings`.
/// Round-trip fidelity (not readability) is the goal: every field
/// `parse_settings` recognizes is re-emitted verbatim.
fn serialize_settings(sub_event: &SubEvent) -> String {
    let mut out = String::from("[settings]\n");
    out.push_str(&format!("type={}\n", type_key(sub_event)));
    out.push_str(&format!("enabled={}\n", sub_event.behavior.enabled));
    out.push_str(&format!("stopType={}\n", sub_event.behavior.stop_type));
    out.push_str(&format!("repeat={}\n", sub_event.behavior.repeat));
    out.push_str(&format!("all_day={}\n", sub_event.timing.all_day));

    write_time_fields(&mut out, "start", sub_event.timing.start_time.as_ref());
    write_time_fields(&mut out, "end", sub_event.timing.end_time.as_ref());

    for (key, value) in &sub_event.payload {
        out.push_str(&format!("{key}={value}\n"));
    }

    out
}

fn write_time_fields(out: &mut String, prefix: &str, time: Option<&crate::primitives::TimeValue>) {
    let Some(time) = time else { return };
    if let Some(hard) = time.hard {
        out.push_str(&format!("{prefix}_hard={}\n", hard.to_canonical_string()));
    }
    if let Some(symbolic) = time.symbolic {
        out.push_str(&format!("{prefix}_symbolic={}\n", symbolic.as_str()));
        out.push_str(&format!("{prefix}_offset={}\n", time.offset));
    }
}

fn type_key(sub_event: &SubEvent) -> &'static str {
    match sub_event.kind {
        crate::normalize::EventKind::Playlist => "playlist",
        crate::normalize::EventKind::Command => "command",
        crate::normalize::EventKind::Sequence => "sequence",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{Behavior, EventKind, SubEventRoleTag, Timing};
    use crate::primitives::{DateValue, TimeValue};
    use std::collections::BTreeMap;

    fn base_sub_event() -> SubEvent {
        SubEvent {
            kind: EventKind::Playlist,
            target: "Playlist A".to_string(),
            timing: Timing {
                all_day: false,
                start_date: DateValue::hard(DatePattern::exact(2026, 2, 1).expect("date")),
                end_date: DateValue::hard(DatePattern::exact(2026, 3, 1).expect("date")),
                start_time: Some(TimeValue::hard(HardTime::parse("18:00:00").expect("time"))),
                end_time: Some(TimeValue::hard(HardTime::parse("22:00:00").expect("time"))),
                days: None,
                timezone: "America/Chicago".to_string(),
            },
            behavior: Behavior {
                enabled: true,
                repeat: 0,
                stop_type: 0,
            },
            payload: BTreeMap::new(),
            role: SubEventRoleTag::Base,
            bundle_id: "bundle-1".to_string(),
            execution_order: None,
            source_event_uid: "master-1".to_string(),
            parent_uid: String::new(),
            state_hash: "deadbeef".to_string(),
        }
    }

    #[test]
    fn encodes_daily_rrule_with_until() {
        let rule = encode_rrule(&base_sub_event()).expect("encode");
        assert_eq!(rule, "RRULE:FREQ=DAILY;UNTIL=20260301T000000Z");
    }

    #[test]
    fn encodes_weekly_byday() {
        let mut sub_event = base_sub_event();
        sub_event.timing.days = Some(
            WeekdayConstraint::weekly(&[crate::primitives::Weekday::Mo, crate::primitives::Weekday::We])
                .expect("weekly"),
        );
        let rule = encode_rrule(&sub_event).expect("encode");
        assert!(rule.starts_with("RRULE:FREQ=WEEKLY;BYDAY=MO,WE"));
    }

    #[test]
    fn rejects_date_parity_export() {
        let mut sub_event = base_sub_event();
        sub_event.timing.days = Some(WeekdayConstraint::DateParity(crate::primitives::DateParity::Odd));
        assert!(encode_rrule(&sub_event).is_err());
    }

    #[test]
    fn serialized_settings_round_trip_through_parser() {
        let sub_event = base_sub_event();
        let text = serialize_settings(&sub_event);
        let parsed = crate::normalize::settings::parse_settings(&text).expect("parse");
        assert_eq!(parsed.event_type.as_deref(), Some("playlist"));
        assert_eq!(parsed.start_hard.as_deref(), Some("18:00:00"));
        assert_eq!(parsed.end_hard.as_deref(), Some("22:00:00"));
    }
}

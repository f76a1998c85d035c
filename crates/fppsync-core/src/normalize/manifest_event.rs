use std::collections::BTreeMap;

use chrono::{Datelike, NaiveTime, TimeZone};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::normalize::hash::{canonical_json, identity_hash, sha256_hex, state_hash};
use crate::normalize::settings::Settings;
use crate::primitives::{self, DatePattern, DateValue, HardTime, SymbolicToken, TimeValue, Weekdays};
use crate::resolve::bundle::{Bundle, ResolvedSubEvent, SubEventRole};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Playlist,
    Command,
    Sequence,
}

impl EventKind {
    /// Clamps an arbitrary settings `type` value to a known kind, defaulting
    /// to `playlist`.
    pub fn clamp(raw: Option<&str>) -> Self {
        match raw.map(str::to_ascii_lowercase).as_deref() {
            Some("command") => EventKind::Command,
            Some("sequence") => EventKind::Sequence,
            _ => EventKind::Playlist,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timing {
    pub all_day: bool,
    pub start_date: DateValue,
    pub end_date: DateValue,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub days: Weekdays,
    pub timezone: String,
}

impl Timing {
    pub fn validate(&self) -> Result<()> {
        self.start_date.validate()?;
        self.end_date.validate()?;
        if self.all_day {
            if self.start_time.is_some() || self.end_time.is_some() {
                return Err(SyncError::InvariantViolation(
                    "all_day timing must have null start_time and end_time".into(),
                ));
            }
        } else {
            let start = self
                .start_time
                .as_ref()
                .ok_or_else(|| SyncError::InvariantViolation("missing start_time".into()))?;
            let end = self
                .end_time
                .as_ref()
                .ok_or_else(|| SyncError::InvariantViolation("missing end_time".into()))?;
            start.validate()?;
            end.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Behavior {
    pub enabled: bool,
    pub repeat: i64,
    pub stop_type: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubEventRoleTag {
    Base,
    Override,
}

impl From<SubEventRole> for SubEventRoleTag {
    fn from(role: SubEventRole) -> Self {
        match role {
            SubEventRole::Base => SubEventRoleTag::Base,
            SubEventRole::Override => SubEventRoleTag::Override,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub target: String,
    pub timing: Timing,
    pub behavior: Behavior,
    pub payload: BTreeMap<String, String>,
    pub role: SubEventRoleTag,
    pub bundle_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub execution_order: Option<u64>,
    pub source_event_uid: String,
    pub parent_uid: String,
    pub state_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Controller {
    Calendar,
    Manual,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ownership {
    pub managed: bool,
    pub controller: Controller,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correlation {
    pub source: String,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub source_calendar_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusFlags {
    pub enabled: bool,
    pub deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provenance {
    pub source: String,
    pub provider: String,
    pub imported_at_epoch: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimingIdentity {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub days: Weekdays,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<TimeValue>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<TimeValue>,
    pub all_day: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub target: String,
    pub timing_identity: TimingIdentity,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEvent {
    pub id: String,
    pub identity: Identity,
    pub sub_events: Vec<SubEvent>,
    pub ownership: Ownership,
    pub correlation: Correlation,
    pub status: StatusFlags,
    pub provenance: Provenance,
    pub identity_hash: String,
    pub state_hash: String,
}

impl ManifestEvent {
    pub fn base_sub_event(&self) -> Option<&SubEvent> {
        self.sub_events
            .iter()
            .find(|se| matches!(se.role, SubEventRoleTag::Base))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sub_events.is_empty() {
            return Err(SyncError::InvariantViolation(
                "ManifestEvent requires at least one sub-event".into(),
            ));
        }
        let base_count = self
            .sub_events
            .iter()
            .filter(|se| matches!(se.role, SubEventRoleTag::Base))
            .count();
        if base_count != 1 {
            return Err(SyncError::InvariantViolation(format!(
                "ManifestEvent must have exactly one base sub-event, found {base_count}"
            )));
        }
        for sub_event in &self.sub_events {
            sub_event.timing.validate()?;
        }
        Ok(())
    }
}

/// Builds a `ManifestEvent` from a resolved bundle, settings pulled from
/// each sub-event's defining row, the FPP local timezone, and provenance
/// context.
pub struct NormalizeContext<'a> {
    pub local_timezone: Tz,
    pub source: &'a str,
    pub provider: &'a str,
    pub imported_at_epoch: i64,
    pub managed: bool,
    pub controller: Controller,
    pub locked: bool,
    pub source_calendar_id: Option<String>,
}

pub fn normalize_bundle(bundle: &Bundle, ctx: &NormalizeContext) -> Result<ManifestEvent> {
    let ordered = bundle.sub_events_in_order();

    let mut sub_events_raw: Vec<(SubEvent, SortKey)> = Vec::with_capacity(ordered.len());
    for resolved in ordered {
        let settings = crate::normalize::settings::parse_settings(&resolved.description)?;
        let mut sub_event = build_sub_event(resolved, &settings, ctx)?;
        sub_event.bundle_id = bundle.bundle_id.clone();
        let key = sort_key(&sub_event);
        sub_events_raw.push((sub_event, key));
    }

    sub_events_raw.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.state_hash.cmp(&b.0.state_hash)));
    let representative = sub_events_raw.first().ok_or_else(|| {
        SyncError::InvariantViolation("bundle resolved to zero sub-events".into())
    })?;

    let identity = Identity {
        kind: representative.0.kind,
        target: representative.0.target.clone(),
        timing_identity: TimingIdentity {
            days: representative.0.timing.days.clone(),
            start_time: representative.0.timing.start_time.clone(),
            end_time: representative.0.timing.end_time.clone(),
            all_day: representative.0.timing.all_day,
        },
    };

    let id_hash = identity_hash(&identity)?;
    let sub_events: Vec<SubEvent> = sub_events_raw.into_iter().map(|(se, _)| se).collect();
    let base = sub_events
        .iter()
        .find(|se| matches!(se.role, SubEventRoleTag::Base))
        .ok_or_else(|| SyncError::InvariantViolation("bundle missing a base sub-event".into()))?;

    let st_hash = state_hash(
        &id_hash,
        sub_events.iter().map(|se| se.state_hash.clone()).collect(),
    );

    let manifest_event = ManifestEvent {
        id: id_hash.clone(),
        identity,
        sub_events,
        ownership: Ownership {
            managed: ctx.managed,
            controller: ctx.controller,
            locked: ctx.locked,
        },
        correlation: Correlation {
            source: ctx.source.to_string(),
            external_id: base.source_event_uid.clone(),
            source_calendar_id: ctx.source_calendar_id.clone(),
        },
        status: StatusFlags {
            enabled: base.behavior.enabled,
            deleted: false,
        },
        provenance: Provenance {
            source: ctx.source.to_string(),
            provider: ctx.provider.to_string(),
            imported_at_epoch: ctx.imported_at_epoch,
        },
        identity_hash: id_hash,
        state_hash: st_hash,
    };

    manifest_event.validate()?;
    Ok(manifest_event)
}

fn build_sub_event(
    resolved: &ResolvedSubEvent,
    settings: &Settings,
    ctx: &NormalizeContext,
) -> Result<SubEvent> {
    let kind = EventKind::clamp(settings.event_type.as_deref());
    let target = resolved.summary.clone();

    let all_day = settings.all_day;
    let start_date_pattern = DatePattern::exact(
        resolved.start_date.year(),
        resolved.start_date.month(),
        resolved.start_date.day(),
    )?;
    let end_date_pattern = DatePattern::exact(
        resolved.end_date_exclusive.year(),
        resolved.end_date_exclusive.month(),
        resolved.end_date_exclusive.day(),
    )?;

    let start_date = annotate_with_holiday(start_date_pattern, resolved.start_date);
    let end_date = annotate_with_holiday(end_date_pattern, resolved.end_date_exclusive);

    let (start_time, end_time) = if all_day {
        (None, None)
    } else {
        let start_time = build_time_value(
            settings.start_symbolic.as_deref(),
            settings.start_offset,
            settings.start_hard.as_deref(),
            &resolved.dtstart.date_time,
            resolved.dtstart.time_zone.as_deref(),
            ctx.local_timezone,
        )?;
        let end_time = build_time_value(
            settings.end_symbolic.as_deref(),
            settings.end_offset,
            settings.end_hard.as_deref(),
            &resolved.dtend.date_time,
            resolved.dtend.time_zone.as_deref(),
            ctx.local_timezone,
        )?;
        (Some(start_time), Some(end_time))
    };

    let timing = Timing {
        all_day,
        start_date,
        end_date,
        start_time,
        end_time,
        days: resolved.days.clone(),
        timezone: ctx.local_timezone.to_string(),
    };
    timing.validate()?;

    let behavior = Behavior {
        enabled: settings.enabled.unwrap_or(true),
        repeat: settings.repeat.unwrap_or(0),
        stop_type: settings.stop_type.unwrap_or(0),
    };

    let payload = settings.extra.clone();

    let state_hash_input = canonical_json(&SubEventStateInput {
        start_date: &timing.start_date,
        end_date: &timing.end_date,
        start_time: &timing.start_time,
        end_time: &timing.end_time,
        days: &timing.days,
        timezone: &timing.timezone,
        behavior: &behavior,
        payload: &payload,
        execution_order: None,
    })?;

    Ok(SubEvent {
        kind,
        target,
        timing,
        behavior,
        payload,
        role: resolved.role.into(),
        bundle_id: String::new(),
        execution_order: None,
        source_event_uid: resolved.source_event_uid.clone(),
        parent_uid: resolved.parent_uid.clone(),
        state_hash: sha256_hex(&state_hash_input),
    })
}

/// Fields that participate in a sub-event's state hash: dates, time-of-day,
/// weekday constraint, timezone, behavior, payload and execution order.
/// `start_time`/`end_time` are included alongside `dates` so a time-only
/// override produces a state change even though it never touches identity.
#[derive(Serialize)]
struct SubEventStateInput<'a> {
    start_date: &'a DateValue,
    end_date: &'a DateValue,
    start_time: &'a Option<TimeValue>,
    end_time: &'a Option<TimeValue>,
    days: &'a Weekdays,
    timezone: &'a str,
    behavior: &'a Behavior,
    payload: &'a BTreeMap<String, String>,
    execution_order: Option<u64>,
}

fn annotate_with_holiday(pattern: DatePattern, date: chrono::NaiveDate) -> DateValue {
    match primitives::holiday::resolve(date) {
        Some(token) => DateValue::annotated(pattern, token),
        None => DateValue::hard(pattern),
    }
}

#[allow(clippy::too_many_arguments)]
fn build_time_value(
    symbolic: Option<&str>,
    offset: i32,
    hard_override: Option<&str>,
    raw_date_time: &Option<String>,
    raw_time_zone: Option<&str>,
    local_timezone: Tz,
) -> Result<TimeValue> {
    if let Some(token) = symbolic {
        let parsed = SymbolicToken::parse(token)?;
        return Ok(TimeValue::symbolic(parsed, offset));
    }

    if let Some(hard) = hard_override {
        let time = HardTime::parse(hard)?;
        return Ok(TimeValue::hard(time));
    }

    let raw = raw_date_time
        .as_ref()
        .ok_or_else(|| SyncError::InvariantViolation("timing requires a start/end instant".into()))?;
    let parsed = chrono::DateTime::parse_from_rfc3339(raw)
        .map_err(|_| SyncError::MalformedRow(format!("invalid dateTime '{raw}'")))?;

    let source_tz: Tz = match raw_time_zone {
        Some(tz) => tz
            .parse()
            .map_err(|_| SyncError::MalformedRow(format!("invalid time zone '{tz}'")))?,
        None => local_timezone,
    };
    let local_instant = source_tz
        .from_utc_datetime(&parsed.naive_utc())
        .with_timezone(&local_timezone);
    let time_of_day = local_instant.time();

    Ok(TimeValue::hard(naive_time_to_hard(time_of_day)))
}

fn naive_time_to_hard(time: NaiveTime) -> HardTime {
    use chrono::Timelike;
    HardTime::new(time.hour() as u8, time.minute() as u8, time.second() as u8)
        .expect("chrono NaiveTime components are always in range")
}

type SortKey = (String, String, String, String, i32, bool);

/// Sentinel greater than every real symbolic-token string (`as_str()`
/// values are lowercase ASCII words), so an absent symbolic value sorts
/// *after* any present one instead of before it as bare `Option`
/// ordering would give.
const NO_SYMBOLIC: &str = "~";

fn sort_key(sub_event: &SubEvent) -> SortKey {
    let start = &sub_event.timing.start_date;
    let symbolic_date_key = start
        .symbolic
        .as_ref()
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| NO_SYMBOLIC.to_string());
    let hard_date_key = start
        .hard
        .map(|p| p.to_canonical_string())
        .unwrap_or_else(|| "9999-99-99".to_string());

    let time = sub_event.timing.start_time.as_ref();
    let symbolic_time_key = time
        .and_then(|t| t.symbolic)
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|| NO_SYMBOLIC.to_string());
    let hard_time_key = time
        .and_then(|t| t.hard)
        .map(|h| h.to_canonical_string())
        .unwrap_or_else(|| "99:99:99".to_string());
    let offset_key = time.map(|t| t.offset).unwrap_or(0);

    (
        symbolic_date_key,
        hard_date_key,
        symbolic_time_key,
        hard_time_key,
        offset_key,
        sub_event.timing.all_day,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::calendar_raw::{CalendarDateTime, RawCalendarEvent};
    use crate::resolve::bundle::resolve_bundles;
    use std::collections::BTreeMap as Map;

    fn ctx() -> NormalizeContext<'static> {
        NormalizeContext {
            local_timezone: chrono_tz::America::Chicago,
            source: "google",
            provider: "google-calendar",
            imported_at_epoch: 0,
            managed: true,
            controller: Controller::Calendar,
            locked: false,
            source_calendar_id: Some("primary".to_string()),
        }
    }

    fn hard_dt(raw: &str) -> CalendarDateTime {
        CalendarDateTime {
            date_time: Some(raw.to_string()),
            date: None,
            time_zone: Some("America/Chicago".to_string()),
        }
    }

    fn master_event() -> RawCalendarEvent {
        RawCalendarEvent {
            source: "google".to_string(),
            summary: "Playlist A".to_string(),
            description: "[settings]\ntype=playlist\nenabled=true\n".to_string(),
            dtstart: hard_dt("2026-02-01T18:00:00-06:00"),
            dtend: hard_dt("2026-02-01T22:00:00-06:00"),
            rrule: vec!["RRULE:FREQ=DAILY;UNTIL=20260301T000000Z".to_string()],
            uid: "master-1".to_string(),
            parent_uid: None,
            updated_at_epoch: 0,
            extended_properties: Map::new(),
        }
    }

    #[test]
    fn normalizes_single_base_bundle() {
        let master = master_event();
        let bundles = resolve_bundles(&master, &[]).expect("resolve");
        let event = normalize_bundle(&bundles[0], &ctx()).expect("normalize");
        assert_eq!(event.sub_events.len(), 1);
        assert_eq!(event.identity.target, "Playlist A");
        assert_eq!(event.identity.kind, EventKind::Playlist);
    }

    #[test]
    fn identity_hash_excludes_dates() {
        let master = master_event();
        let mut other_dates = master.clone();
        other_dates.dtstart = hard_dt("2027-06-01T18:00:00-05:00");
        other_dates.dtend = hard_dt("2027-06-01T22:00:00-05:00");
        other_dates.rrule = vec!["RRULE:FREQ=DAILY;UNTIL=20270701T000000Z".to_string()];

        let bundles_a = resolve_bundles(&master, &[]).expect("resolve");
        let bundles_b = resolve_bundles(&other_dates, &[]).expect("resolve");

        let event_a = normalize_bundle(&bundles_a[0], &ctx()).expect("normalize");
        let event_b = normalize_bundle(&bundles_b[0], &ctx()).expect("normalize");

        assert_eq!(event_a.identity_hash, event_b.identity_hash);
    }

    #[test]
    fn s2_override_and_base_share_identity_hash() {
        let master = master_event();
        let mut override_row = master.clone();
        override_row.uid = "override-1".to_string();
        override_row.parent_uid = Some(master.uid.clone());
        override_row.rrule = vec![];
        override_row.dtstart = hard_dt("2026-02-10T18:00:00-06:00");
        override_row.dtend = hard_dt("2026-02-10T21:00:00-06:00");

        let bundles = resolve_bundles(&master, std::slice::from_ref(&override_row)).expect("resolve");
        let event = normalize_bundle(&bundles[0], &ctx()).expect("normalize");
        assert_eq!(event.sub_events.len(), 2);

        let hashes: std::collections::HashSet<_> =
            event.sub_events.iter().map(|se| se.state_hash.clone()).collect();
        assert_eq!(hashes.len(), 2, "base and override must have distinct state hashes");
    }
}

//! Bridges a single ingested FPP scheduler row into manifest shape. FPP
//! rows carry no recurrence expansion or per-occurrence overrides — each
//! row is already its own one-sub-event bundle, so this skips the
//! `Bundle`/`resolve_bundles` machinery `normalize_bundle` needs for the
//! calendar side and builds the `ManifestEvent` directly.

use std::collections::BTreeMap;

use chrono_tz::Tz;
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::ingest::fpp_raw::{IDENTITY_HINT_MARKER, IngestedFppEvent, LOCKED_MARKER, MANAGED_MARKER};
use crate::normalize::hash::{canonical_json, identity_hash, sha256_hex, state_hash};
use crate::normalize::manifest_event::{
    Behavior, Controller, Correlation, EventKind, Identity, ManifestEvent, Ownership, Provenance,
    StatusFlags, SubEvent, SubEventRoleTag, Timing, TimingIdentity,
};
use crate::primitives::{DateValue, TimeValue};

pub struct FppNormalizeContext<'a> {
    pub local_timezone: Tz,
    pub source: &'a str,
    pub provider: &'a str,
    pub imported_at_epoch: i64,
}

pub fn normalize_fpp_event(event: &IngestedFppEvent, ctx: &FppNormalizeContext) -> Result<ManifestEvent> {
    let kind = EventKind::clamp(Some(event.entry_type.as_str()));
    let target = event.target.clone();

    let bundle_id = fpp_bundle_id(event);

    let timing = Timing {
        all_day: false,
        start_date: DateValue::hard(event.start_date),
        end_date: DateValue::hard(event.end_date),
        start_time: Some(TimeValue::hard(event.start_time)),
        end_time: Some(TimeValue::hard(event.end_time)),
        days: event.days.clone(),
        timezone: ctx.local_timezone.to_string(),
    };
    timing.validate()?;

    let behavior = Behavior {
        enabled: event.enabled,
        repeat: event.repeat,
        stop_type: event.stop_type,
    };

    let payload = extra_args_as_payload(&event.args);

    let state_hash_input = canonical_json(&SubEventStateInput {
        start_date: &timing.start_date,
        end_date: &timing.end_date,
        start_time: &timing.start_time,
        end_time: &timing.end_time,
        days: &timing.days,
        timezone: &timing.timezone,
        behavior: &behavior,
        payload: &payload,
    })?;
    let sub_state_hash = sha256_hex(&state_hash_input);

    let identity = Identity {
        kind,
        target: target.clone(),
        timing_identity: TimingIdentity {
            days: timing.days.clone(),
            start_time: timing.start_time.clone(),
            end_time: timing.end_time.clone(),
            all_day: timing.all_day,
        },
    };
    let id_hash = identity_hash(&identity)?;
    let st_hash = state_hash(&id_hash, vec![sub_state_hash.clone()]);

    let sub_event = SubEvent {
        kind,
        target,
        timing,
        behavior,
        payload,
        role: SubEventRoleTag::Base,
        bundle_id,
        execution_order: None,
        source_event_uid: event.identity_hint.clone().unwrap_or_else(|| fpp_bundle_id(event)),
        parent_uid: event.identity_hint.clone().unwrap_or_else(|| fpp_bundle_id(event)),
        state_hash: sub_state_hash,
    };

    let controller = if event.managed { Controller::Calendar } else { Controller::Manual };

    let manifest_event = ManifestEvent {
        id: id_hash.clone(),
        identity,
        sub_events: vec![sub_event],
        ownership: Ownership {
            managed: event.managed,
            controller,
            locked: event.locked,
        },
        correlation: Correlation {
            source: ctx.source.to_string(),
            external_id: event.identity_hint.clone().unwrap_or_else(|| fpp_bundle_id(event)),
            source_calendar_id: None,
        },
        status: StatusFlags {
            enabled: event.enabled,
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

fn fpp_bundle_id(event: &IngestedFppEvent) -> String {
    format!("fpp-row-{}", event.row_index)
}

fn extra_args_as_payload(args: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    args.iter()
        .filter(|(key, _)| {
            key.as_str() != MANAGED_MARKER && key.as_str() != LOCKED_MARKER && key.as_str() != IDENTITY_HINT_MARKER
        })
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (key.clone(), rendered)
        })
        .collect()
}

#[derive(Serialize)]
struct SubEventStateInput<'a> {
    start_date: &'a DateValue,
    end_date: &'a DateValue,
    start_time: &'a Option<TimeValue>,
    end_time: &'a Option<TimeValue>,
    days: &'a crate::primitives::Weekdays,
    timezone: &'a str,
    behavior: &'a Behavior,
    payload: &'a BTreeMap<String, String>,
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Provider-native row, Google Calendar-shaped. Deserialized
/// directly from `CalendarProvider::list_events` payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarRow {
    pub id: String,
    pub summary: String,
    #[serde(default)]
    pub description: String,
    pub start: CalendarDateTime,
    pub end: CalendarDateTime,
    #[serde(default)]
    pub recurrence: Vec<String>,
    pub updated: String,
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub extended_properties: ExtendedProperties,
    #[serde(default)]
    pub recurring_event_id: Option<String>,
}

fn default_status() -> String {
    "confirmed".to_string()
}

/// Google's dual-shaped start/end: either an RFC3339 instant (`dateTime`)
/// or a bare `YYYY-MM-DD` all-day marker (`date`). Exactly one is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarDateTime {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub time_zone: Option<String>,
}

impl CalendarDateTime {
    pub fn is_all_day(&self) -> bool {
        self.date.is_some() && self.date_time.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedProperties {
    #[serde(default)]
    pub private: BTreeMap<String, String>,
}

/// Canonical raw calendar event, shorn of provider-specific field names.
/// Carries the opaque `[settings]` block verbatim — the normalizer, not
/// this adapter, parses it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawCalendarEvent {
    pub source: String,
    pub summary: String,
    pub description: String,
    pub dtstart: CalendarDateTime,
    pub dtend: CalendarDateTime,
    pub rrule: Vec<String>,
    pub uid: String,
    pub parent_uid: Option<String>,
    pub updated_at_epoch: i64,
    pub extended_properties: BTreeMap<String, String>,
}

/// Translates provider rows into canonical raw events. Cancelled rows are
/// filtered; nothing here repairs malformed input.
pub fn adapt_rows(rows: Vec<CalendarRow>, source: &str) -> Result<Vec<RawCalendarEvent>> {
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        if row.status == "cancelled" {
            continue;
        }
        out.push(adapt_row(row, source)?);
    }
    Ok(out)
}

fn adapt_row(row: CalendarRow, source: &str) -> Result<RawCalendarEvent> {
    if row.id.trim().is_empty() {
        return Err(SyncError::MalformedRow(
            "calendar row missing id".to_string(),
        ));
    }
    if row.summary.trim().is_empty() {
        return Err(SyncError::MalformedRow(format!(
            "calendar row {} missing summary",
            row.id
        )));
    }

    let updated_at_epoch = parse_rfc3339_epoch(&row.updated)
        .ok_or_else(|| SyncError::MalformedRow(format!("invalid updated timestamp: {}", row.updated)))?;

    Ok(RawCalendarEvent {
        source: source.to_string(),
        summary: row.summary,
        description: row.description,
        dtstart: row.start,
        dtend: row.end,
        rrule: row.recurrence,
        uid: row.id,
        parent_uid: row.recurring_event_id,
        updated_at_epoch,
        extended_properties: row.extended_properties.private,
    })
}

fn parse_rfc3339_epoch(raw: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.timestamp())
}

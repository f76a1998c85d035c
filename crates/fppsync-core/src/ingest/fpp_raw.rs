use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SyncError};
use crate::primitives::{DateParity, DatePattern, HardTime, Weekday, WeekdayConstraint, Weekdays};

/// One entry of the on-disk scheduler array: `{type, target,
/// startTime, endTime, startDate, endDate, dayEnum, repeat, stopType,
/// enabled, args, ...}`. `startTime`/`endTime` are raw `HH:MM:SS` strings;
/// `24:00:00` is preserved verbatim, never normalized at this layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FppSchedulerRow {
    #[serde(rename = "type")]
    pub entry_type: String,
    pub target: String,
    pub start_time: String,
    pub end_time: String,
    pub start_date: String,
    pub end_date: String,
    pub day_enum: u8,
    #[serde(default)]
    pub repeat: i64,
    #[serde(default)]
    pub stop_type: i64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub args: BTreeMap<String, Value>,
}

fn default_enabled() -> bool {
    true
}

/// Provenance marker keys the adapter inspects in `args` to infer ownership.
/// Absence means unmanaged: the system never assumes write access to a row
/// it didn't create.
pub const MANAGED_MARKER: &str = "fppsync.managed";
pub const LOCKED_MARKER: &str = "fppsync.locked";
pub const IDENTITY_HINT_MARKER: &str = "fppsync.identityHash";

/// Scheduler row reinterpreted with a derived initial order and ownership
/// inference. `identity_hint` is carried through for diagnostics only — the
/// normalizer re-derives identity from geometry, never trusts this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestedFppEvent {
    pub entry_type: String,
    pub target: String,
    pub start_time: HardTime,
    pub end_time: HardTime,
    pub start_date: DatePattern,
    pub end_date: DatePattern,
    pub days: Weekdays,
    pub repeat: i64,
    pub stop_type: i64,
    pub enabled: bool,
    pub row_index: usize,
    pub managed: bool,
    pub locked: bool,
    pub identity_hint: Option<String>,
    pub args: BTreeMap<String, Value>,
}

/// Reads an ordered list of scheduler rows, producing manifest-shape events
/// with row index implying initial execution order.
pub fn adapt_rows(rows: Vec<FppSchedulerRow>) -> Result<Vec<IngestedFppEvent>> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| adapt_row(row, idx))
        .collect()
}

fn adapt_row(row: FppSchedulerRow, row_index: usize) -> Result<IngestedFppEvent> {
    if row.target.trim().is_empty() {
        return Err(SyncError::MalformedRow(format!(
            "scheduler row {row_index} missing target"
        )));
    }

    let start_time = HardTime::parse(&row.start_time).map_err(|_| {
        SyncError::MalformedRow(format!(
            "scheduler row {row_index} has invalid startTime '{}'",
            row.start_time
        ))
    })?;
    let end_time = HardTime::parse(&row.end_time).map_err(|_| {
        SyncError::MalformedRow(format!(
            "scheduler row {row_index} has invalid endTime '{}'",
            row.end_time
        ))
    })?;
    let start_date = DatePattern::parse(&row.start_date).map_err(|_| {
        SyncError::MalformedRow(format!(
            "scheduler row {row_index} has invalid startDate '{}'",
            row.start_date
        ))
    })?;
    let end_date = DatePattern::parse(&row.end_date).map_err(|_| {
        SyncError::MalformedRow(format!(
            "scheduler row {row_index} has invalid endDate '{}'",
            row.end_date
        ))
    })?;
    let days = decode_day_enum(row.day_enum, row_index)?;

    let managed = row
        .args
        .get(MANAGED_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let locked = row
        .args
        .get(LOCKED_MARKER)
        .and_then(Value::as_bool)
        .unwrap_or(false);
    let identity_hint = row
        .args
        .get(IDENTITY_HINT_MARKER)
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(IngestedFppEvent {
        entry_type: row.entry_type,
        target: row.target,
        start_time,
        end_time,
        start_date,
        end_date,
        days,
        repeat: row.repeat,
        stop_type: row.stop_type,
        enabled: row.enabled,
        row_index,
        managed,
        locked,
        identity_hint,
        args: row.args,
    })
}

/// `dayEnum` is a 0..15 integer: 0-6 select a single weekday (Sunday-first,
/// matching the Weekday primitive's wire order), 7 means every day (no
/// constraint), 8 means weekdays (Mon-Fri), 9 means weekends (Sat/Sun), 10
/// means odd dates, 11 means even dates. 12-15 are reserved and rejected.
fn decode_day_enum(value: u8, row_index: usize) -> Result<Weekdays> {
    let single = [
        Weekday::Su,
        Weekday::Mo,
        Weekday::Tu,
        Weekday::We,
        Weekday::Th,
        Weekday::Fr,
        Weekday::Sa,
    ];

    match value {
        0..=6 => Ok(Some(WeekdayConstraint::weekly(&[single[value as usize]])?)),
        7 => Ok(None),
        8 => Ok(Some(WeekdayConstraint::weekly(&[
            Weekday::Mo,
            Weekday::Tu,
            Weekday::We,
            Weekday::Th,
            Weekday::Fr,
        ])?)),
        9 => Ok(Some(WeekdayConstraint::weekly(&[Weekday::Sa, Weekday::Su])?)),
        10 => Ok(Some(WeekdayConstraint::DateParity(DateParity::Odd))),
        11 => Ok(Some(WeekdayConstraint::DateParity(DateParity::Even))),
        other => Err(SyncError::MalformedRow(format!(
            "scheduler row {row_index} has unsupported dayEnum {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> FppSchedulerRow {
        FppSchedulerRow {
            entry_type: "playlist".to_string(),
            target: "Playlist A".to_string(),
            start_time: "18:00:00".to_string(),
            end_time: "22:00:00".to_string(),
            start_date: "2026-02-01".to_string(),
            end_date: "2026-02-28".to_string(),
            day_enum: 7,
            repeat: 0,
            stop_type: 0,
            enabled: true,
            args: BTreeMap::new(),
        }
    }

    #[test]
    fn row_index_implies_order() {
        let rows = vec![sample_row(), sample_row()];
        let out = adapt_rows(rows).expect("adapt");
        assert_eq!(out[0].row_index, 0);
        assert_eq!(out[1].row_index, 1);
    }

    #[test]
    fn preserves_24_00_00_end_time() {
        let mut row = sample_row();
        row.end_time = "24:00:00".to_string();
        let out = adapt_rows(vec![row]).expect("adapt");
        assert_eq!(out[0].end_time.to_canonical_string(), "24:00:00");
    }

    #[test]
    fn unmanaged_by_default() {
        let out = adapt_rows(vec![sample_row()]).expect("adapt");
        assert!(!out[0].managed);
    }

    #[test]
    fn managed_marker_inferred_from_args() {
        let mut row = sample_row();
        row.args
            .insert(MANAGED_MARKER.to_string(), Value::Bool(true));
        let out = adapt_rows(vec![row]).expect("adapt");
        assert!(out[0].managed);
    }

    #[test]
    fn rejects_reserved_day_enum() {
        let mut row = sample_row();
        row.day_enum = 15;
        assert!(adapt_rows(vec![row]).is_err());
    }

    #[test]
    fn decodes_weekend_day_enum() {
        let mut row = sample_row();
        row.day_enum = 9;
        let out = adapt_rows(vec![row]).expect("adapt");
        match out[0].days.as_ref().expect("constraint") {
            WeekdayConstraint::Weekly(set) => {
                assert!(set.contains(&Weekday::Sa));
                assert!(set.contains(&Weekday::Su));
                assert_eq!(set.len(), 2);
            }
            _ => panic!("expected weekly"),
        }
    }
}

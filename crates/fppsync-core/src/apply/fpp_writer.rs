use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Result, SyncError};
use crate::ingest::fpp_raw::{FppSchedulerRow, IDENTITY_HINT_MARKER, MANAGED_MARKER};
use crate::normalize::{ManifestEvent, SubEventRoleTag};
use crate::order::{OrderingContext, SubEventRef, compute_execution_order};
use crate::persistence::atomic::write_json_atomic;
use crate::primitives::{DateParity, Weekday, WeekdayConstraint, Weekdays};

/// Exclusive advisory lock over the scheduler file, held for the minimum
/// critical section (backup → write staging → rename). Implemented as a
/// sibling lock file created with `create_new` — a second concurrent run
/// observes the file already existing and fails fast with `ConcurrentRun`
/// rather than blocking, since this crate carries no
/// platform file-locking dependency.
pub struct FppScheduleLock {
    lock_path: PathBuf,
}

impl FppScheduleLock {
    pub fn acquire(schedule_path: &Path) -> Result<Self> {
        let lock_path = schedule_path.with_extension("lock");
        fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|_| SyncError::ConcurrentRun)?;
        Ok(Self { lock_path })
    }
}

impl Drop for FppScheduleLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

/// Loads the scheduler file as an ordered JSON array (empty if absent).
pub fn load_schedule(schedule_path: &Path) -> Result<Vec<FppSchedulerRow>> {
    if !schedule_path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(schedule_path)?;
    let rows: Vec<FppSchedulerRow> = serde_json::from_str(&raw)?;
    Ok(rows)
}

/// Identifies which original rows this system owns, so the write protocol can preserve unmanaged rows
/// verbatim at their original positions.
fn is_managed_row(row: &FppSchedulerRow) -> bool {
    row.args
        .get(MANAGED_MARKER)
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

/// Builds one scheduler row per sub-event of `events`, in the execution
/// order computed by the ordering engine, resolving any symbolic time to a
/// concrete `HH:MM:SS` — this is the final scheduler materialization step.
pub fn build_managed_rows(
    events: &[ManifestEvent],
    ctx: &OrderingContext,
) -> Result<Vec<FppSchedulerRow>> {
    let assignment = compute_execution_order(events, ctx)?;

    let mut indexed: Vec<(u64, &ManifestEvent, usize)> = Vec::new();
    for event in events {
        for (index, _) in event.sub_events.iter().enumerate() {
            let key = SubEventRef {
                identity_hash: event.identity_hash.clone(),
                index,
            };
            let order = assignment.get(&key).copied().ok_or_else(|| {
                SyncError::InvariantViolation(format!(
                    "no execution order assigned to sub-event {index} of {}",
                    event.identity_hash
                ))
            })?;
            indexed.push((order, event, index));
        }
    }
    indexed.sort_by_key(|(order, _, _)| *order);

    indexed
        .into_iter()
        .map(|(_, event, index)| build_row(event, index, ctx))
        .collect()
}

fn build_row(event: &ManifestEvent, sub_event_index: usize, ctx: &OrderingContext) -> Result<FppSchedulerRow> {
    let sub_event = &event.sub_events[sub_event_index];
    let timing = &sub_event.timing;

    let start_date = timing
        .start_date
        .hard
        .ok_or_else(|| SyncError::InvariantViolation("managed event missing hard start date".into()))?;
    let end_date = timing
        .end_date
        .hard
        .ok_or_else(|| SyncError::InvariantViolation("managed event missing hard end date".into()))?;

    let (start_time, end_time) = if timing.all_day {
        ("00:00:00".to_string(), "24:00:00".to_string())
    } else {
        let start_date_value = chrono::NaiveDate::from_ymd_opt(
            start_date.year.unwrap_or(1970),
            start_date.month.unwrap_or(1),
            start_date.day.unwrap_or(1),
        )
        .ok_or_else(|| SyncError::InvariantViolation("managed event start date out of range".into()))?;

        let start = resolve_seconds_to_hms(timing.start_time.as_ref(), start_date_value, ctx)?;
        let end = resolve_seconds_to_hms(timing.end_time.as_ref(), start_date_value, ctx)?;
        (start, end)
    };

    let mut args = sub_event
        .payload
        .clone()
        .into_iter()
        .map(|(k, v)| (k, serde_json::Value::String(v)))
        .collect::<std::collections::BTreeMap<_, _>>();
    args.insert(MANAGED_MARKER.to_string(), serde_json::Value::Bool(true));
    args.insert(
        IDENTITY_HINT_MARKER.to_string(),
        serde_json::Value::String(event.identity_hash.clone()),
    );

    Ok(FppSchedulerRow {
        entry_type: format!("{:?}", sub_event.kind).to_ascii_lowercase(),
        target: sub_event.target.clone(),
        start_time,
        end_time,
        start_date: start_date.to_canonical_string(),
        end_date: end_date.to_canonical_string(),
        day_enum: encode_weekdays(&timing.days)?,
        repeat: sub_event.behavior.repeat,
        stop_type: sub_event.behavior.stop_type,
        enabled: sub_event.behavior.enabled && matches!(sub_event.role, SubEventRoleTag::Base | SubEventRoleTag::Override),
        args,
    })
}

fn resolve_seconds_to_hms(
    time: Option<&crate::primitives::TimeValue>,
    date: chrono::NaiveDate,
    ctx: &OrderingContext,
) -> Result<String> {
    let time = time.ok_or_else(|| SyncError::InvariantViolation("missing time for non-all-day timing".into()))?;

    if let Some(hard) = time.hard {
        return Ok(hard.to_canonical_string());
    }

    let symbolic = time
        .symbolic
        .ok_or_else(|| SyncError::InvariantViolation("TimeValue has neither hard nor symbolic".into()))?;
    let latitude = ctx.latitude_deg.ok_or_else(|| {
        SyncError::InvariantViolation("symbolic time export requires latitude configuration".into())
    })?;
    let estimated = crate::primitives::estimate_symbolic_seconds(
        date,
        symbolic,
        latitude,
        ctx.longitude_offset_minutes,
        ctx.timezone_offset_minutes,
        ctx.step_minutes,
    )
    .ok_or_else(|| SyncError::InvariantViolation("symbolic time estimate unavailable".into()))?;

    let total = (estimated as i64 + (time.offset as i64 * 60)).rem_euclid(86_400) as u32;
    let hour = (total / 3600) as u8;
    let minute = ((total % 3600) / 60) as u8;
    let second = (total % 60) as u8;
    crate::primitives::HardTime::new(hour, minute, second).map(|t| t.to_canonical_string())
}

fn encode_weekdays(days: &Weekdays) -> Result<u8> {
    match days {
        None => Ok(7),
        Some(WeekdayConstraint::DateParity(DateParity::Odd)) => Ok(10),
        Some(WeekdayConstraint::DateParity(DateParity::Even)) => Ok(11),
        Some(WeekdayConstraint::Weekly(set)) => {
            let weekdays: std::collections::BTreeSet<Weekday> = set.iter().copied().collect();
            let single = [
                Weekday::Su,
                Weekday::Mo,
                Weekday::Tu,
                Weekday::We,
                Weekday::Th,
                Weekday::Fr,
                Weekday::Sa,
            ];
            if weekdays.len() == 1 {
                let day = *weekdays.iter().next().unwrap();
                let position = single.iter().position(|d| *d == day).unwrap();
                return Ok(position as u8);
            }
            let mon_fri: std::collections::BTreeSet<Weekday> =
                [Weekday::Mo, Weekday::Tu, Weekday::We, Weekday::Th, Weekday::Fr].into();
            let sat_sun: std::collections::BTreeSet<Weekday> = [Weekday::Sa, Weekday::Su].into();
            if weekdays == mon_fri {
                return Ok(8);
            }
            if weekdays == sat_sun {
                return Ok(9);
            }
            Err(SyncError::InvariantViolation(
                "weekly constraint does not map to a representable dayEnum".into(),
            ))
        }
    }
}

/// Merges unmanaged rows (kept at their original relative order) with
/// freshly computed managed rows (in the final execution order): each
/// managed row position in the original array is filled by the next
/// computed row; surplus computed rows (new creates) are appended at the
/// end.
pub fn merge_rows(
    original: &[FppSchedulerRow],
    new_managed_rows: Vec<FppSchedulerRow>,
) -> Vec<FppSchedulerRow> {
    let mut incoming = new_managed_rows.into_iter();
    let mut out = Vec::with_capacity(original.len());

    for row in original {
        if is_managed_row(row) {
            if let Some(replacement) = incoming.next() {
                out.push(replacement);
            }
        } else {
            out.push(row.clone());
        }
    }

    out.extend(incoming);
    out
}

/// Writes the final row array under lock, with a single overwritten
/// backup file, atomic staged rename-replace.
pub fn write_schedule_atomic(schedule_path: &Path, rows: &[FppSchedulerRow]) -> Result<()> {
    if rows.is_empty() && schedule_path.exists() {
        warn!("refusing to write an empty scheduler file over an existing one");
        return Err(SyncError::InvariantViolation(
            "scheduler write would produce an empty file".into(),
        ));
    }

    let _lock = FppScheduleLock::acquire(schedule_path)?;

    if schedule_path.exists() {
        let backup_path = schedule_path.with_file_name("schedule.backup.json");
        fs::copy(schedule_path, &backup_path)?;
    }

    write_json_atomic(schedule_path, &rows.to_vec())?;
    info!(rows = rows.len(), "wrote scheduler file");
    Ok(())
}

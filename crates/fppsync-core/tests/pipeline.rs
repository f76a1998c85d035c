//! End-to-end pipeline test ("post-apply convergence", scenario
//! S1-shaped calendar input) exercising `sync::run_sync` against a stub
//! `CalendarProvider` and a real temp-dir FPP schedule file.

use std::collections::BTreeMap;
use std::fs;

use async_trait::async_trait;
use proptest::prelude::*;
use tempfile::TempDir;

use fppsync_core::apply::{ApplyMode, WritabilityPolicy};
use fppsync_core::error::Result;
use fppsync_core::ingest::calendar_raw::{CalendarDateTime, CalendarRow, ExtendedProperties};
use fppsync_core::ingest::fpp_raw::FppSchedulerRow;
use fppsync_core::primitives::{estimate_symbolic_seconds, SymbolicToken};
use fppsync_core::provider::{CalendarProvider, ProviderEvent};
use fppsync_core::reconcile::SyncMode;
use fppsync_core::{run_sync, Config};

struct StubProvider {
    rows: Vec<CalendarRow>,
}

#[async_trait]
impl CalendarProvider for StubProvider {
    async fn list_events(&self, _calendar_id: &str) -> Result<Vec<CalendarRow>> {
        Ok(self.rows.clone())
    }

    async fn insert_event(&self, _calendar_id: &str, _row: CalendarRow) -> Result<ProviderEvent> {
        unimplemented!("preview mode never writes to the calendar")
    }

    async fn update_event(
        &self,
        _calendar_id: &str,
        _provider_event_id: &str,
        _row: CalendarRow,
        _etag: Option<&str>,
    ) -> Result<ProviderEvent> {
        unimplemented!("preview mode never writes to the calendar")
    }

    async fn delete_event(&self, _calendar_id: &str, _provider_event_id: &str) -> Result<()> {
        unimplemented!("preview mode never writes to the calendar")
    }
}

fn hard_dt(raw: &str) -> CalendarDateTime {
    CalendarDateTime {
        date_time: Some(raw.to_string()),
        date: None,
        time_zone: Some("America/Chicago".to_string()),
    }
}

fn daily_playlist_row() -> CalendarRow {
    CalendarRow {
        id: "master-1".to_string(),
        summary: "Playlist A".to_string(),
        description: "[settings]\ntype=playlist\n".to_string(),
        start: hard_dt("2026-02-01T18:00:00-06:00"),
        end: hard_dt("2026-02-01T22:00:00-06:00"),
        recurrence: vec!["RRULE:FREQ=DAILY;UNTIL=20260301T000000Z".to_string()],
        updated: "2026-01-01T00:00:00Z".to_string(),
        status: "confirmed".to_string(),
        extended_properties: ExtendedProperties::default(),
        recurring_event_id: None,
    }
}

fn test_config(data_dir: &std::path::Path, schedule_path: &std::path::Path) -> Config {
    Config {
        data_dir: data_dir.to_path_buf(),
        schedule_path: schedule_path.to_path_buf(),
        local_timezone: chrono_tz::America::Chicago,
        latitude_deg: None,
        longitude_offset_minutes: 0,
        timezone_offset_minutes: 0,
        calendar_id: "primary".to_string(),
        provider: "google-calendar".to_string(),
        sync_mode: SyncMode::Both,
        writability: WritabilityPolicy {
            fpp: true,
            calendar: true,
            fail_on_blocked: true,
        },
        loaded_from: None,
    }
}

#[tokio::test]
async fn first_preview_creates_one_event_from_a_daily_master() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let cfg = test_config(tmp.path(), &schedule_path);
    let provider = StubProvider {
        rows: vec![daily_playlist_row()],
    };

    let outcome = run_sync(&cfg, &provider, ApplyMode::Plan, 1_770_000_000)
        .await
        .expect("run_sync");

    assert_eq!(outcome.plan.creates, 1);
    assert_eq!(outcome.plan.updates, 0);
    assert_eq!(outcome.plan.deletes, 0);
    assert_eq!(outcome.apply.fpp_rows_written, 0, "plan mode never writes");
}

#[tokio::test]
async fn apply_then_reread_manifest_is_idempotent() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let cfg = test_config(tmp.path(), &schedule_path);
    let provider = StubProvider {
        rows: vec![daily_playlist_row()],
    };

    let first = run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_000)
        .await
        .expect("first run_sync");
    assert_eq!(first.plan.creates, 1);
    assert_eq!(first.apply.fpp_rows_written, 1);

    let written = fs::read_to_string(&schedule_path).expect("read written schedule");
    let rows: Vec<BTreeMap<String, serde_json::Value>> =
        serde_json::from_str(&written).expect("parse written schedule");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("target").and_then(|v| v.as_str()), Some("Playlist A"));

    let second = run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_100)
        .await
        .expect("second run_sync");
    assert_eq!(second.plan.creates, 0);
    assert_eq!(second.plan.updates, 0);
    assert_eq!(second.plan.deletes, 0, "post-apply convergence: re-preview is a noop");
}

fn master_row(uid: &str, summary: &str, start: &str, end: &str, until: &str) -> CalendarRow {
    CalendarRow {
        id: uid.to_string(),
        summary: summary.to_string(),
        description: "[settings]\ntype=playlist\n".to_string(),
        start: hard_dt(start),
        end: hard_dt(end),
        recurrence: vec![format!("RRULE:FREQ=DAILY;UNTIL={until}")],
        updated: "2026-01-01T00:00:00Z".to_string(),
        status: "confirmed".to_string(),
        extended_properties: ExtendedProperties::default(),
        recurring_event_id: None,
    }
}

fn read_schedule(schedule_path: &std::path::Path) -> Vec<FppSchedulerRow> {
    let raw = fs::read_to_string(schedule_path).expect("read schedule");
    serde_json::from_str(&raw).expect("parse schedule")
}

/// S2: a single override row narrows one day of a daily master without
/// splitting the master's coverage into separate bundles, and both the
/// base and the override land as their own scheduler rows under one
/// manifest identity.
#[tokio::test]
async fn s2_override_attaches_to_the_master_bundle_as_one_identity() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let cfg = test_config(tmp.path(), &schedule_path);

    let master = daily_playlist_row();
    let mut override_row = master.clone();
    override_row.id = "override-1".to_string();
    override_row.recurring_event_id = Some(master.id.clone());
    override_row.start = hard_dt("2026-02-10T18:00:00-06:00");
    override_row.end = hard_dt("2026-02-10T21:00:00-06:00");
    override_row.recurrence = vec![];

    let provider = StubProvider {
        rows: vec![master, override_row],
    };

    let outcome = run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_000)
        .await
        .expect("run_sync");
    assert_eq!(outcome.plan.creates, 1, "override and base share one bundle identity");

    let rows = read_schedule(&schedule_path);
    assert_eq!(rows.len(), 2, "base and override each get their own scheduler row");

    let second = run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_100)
        .await
        .expect("second run_sync");
    assert_eq!(second.plan.creates, 0);
    assert_eq!(second.plan.updates, 0);
}

/// S3: two bundles whose daily windows overlap (one nested inside the
/// other) must be ordered deterministically by the later-start-wins rule,
/// not by calendar insertion order.
#[tokio::test]
async fn s3_overlapping_bundles_order_by_later_daily_start() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let cfg = test_config(tmp.path(), &schedule_path);

    let playlist_a = master_row(
        "master-a",
        "Playlist A",
        "2026-02-01T18:00:00-06:00",
        "2026-02-01T22:00:00-06:00",
        "20260301T000000Z",
    );
    let playlist_b = master_row(
        "master-b",
        "Playlist B",
        "2026-02-01T19:00:00-06:00",
        "2026-02-01T20:00:00-06:00",
        "20260301T000000Z",
    );

    let provider = StubProvider {
        rows: vec![playlist_a, playlist_b],
    };

    let outcome = run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_000)
        .await
        .expect("run_sync");
    assert_eq!(outcome.plan.creates, 2);

    let rows = read_schedule(&schedule_path);
    let index_of = |target: &str| rows.iter().position(|r| r.target == target).expect("row present");
    assert!(
        index_of("Playlist B") < index_of("Playlist A"),
        "the later daily start (Playlist B, 19:00) must get the earlier scheduler row"
    );
}

/// S4: a symbolic start/end time declared in the `[settings]` block is
/// carried as a symbolic `TimeValue` through normalization and only
/// resolved to a concrete `HH:MM:SS` at the final scheduler-materialization
/// step, using the configured latitude.
#[tokio::test]
async fn s4_symbolic_time_resolves_to_a_concrete_clock_time_on_write() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let mut cfg = test_config(tmp.path(), &schedule_path);
    cfg.latitude_deg = Some(40.0);

    let mut row = daily_playlist_row();
    row.description = "[settings]\ntype=playlist\nstart_symbolic=SunSet\nstart_offset=-15\n\
                        end_symbolic=SunRise\nend_offset=15\n"
        .to_string();

    let provider = StubProvider { rows: vec![row] };

    run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_000)
        .await
        .expect("run_sync");

    let rows = read_schedule(&schedule_path);
    assert_eq!(rows.len(), 1);

    let start_date = chrono::NaiveDate::from_ymd_opt(2026, 2, 1).expect("date");
    let expected_start_seconds = estimate_symbolic_seconds(start_date, SymbolicToken::SunSet, 40.0, 0, 0, 1)
        .expect("sunset estimate");
    let expected_start = hms_from_seconds((expected_start_seconds as i64 - 15 * 60).rem_euclid(86_400) as u32);
    assert_eq!(rows[0].start_time, expected_start);

    let expected_end_seconds = estimate_symbolic_seconds(start_date, SymbolicToken::SunRise, 40.0, 0, 0, 1)
        .expect("sunrise estimate");
    let expected_end = hms_from_seconds((expected_end_seconds as i64 + 15 * 60).rem_euclid(86_400) as u32);
    assert_eq!(rows[0].end_time, expected_end);
}

fn hms_from_seconds(total: u32) -> String {
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// S5: once the calendar side drops an event this tool previously created
/// in FPP, the row is torn down and a tombstone is recorded so a later
/// re-appearance of the identical identity is never silently recreated.
#[tokio::test]
async fn s5_calendar_deletion_tombstones_and_suppresses_resurrection() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let cfg = test_config(tmp.path(), &schedule_path);
    let row = daily_playlist_row();

    let with_event = StubProvider { rows: vec![row.clone()] };
    let first = run_sync(&cfg, &with_event, ApplyMode::Apply, 1_770_000_000)
        .await
        .expect("first run_sync");
    assert_eq!(first.plan.creates, 1);
    assert_eq!(read_schedule(&schedule_path).len(), 1);

    let without_event = StubProvider { rows: vec![] };
    let second = run_sync(&cfg, &without_event, ApplyMode::Apply, 1_770_000_100)
        .await
        .expect("second run_sync");
    assert_eq!(second.plan.deletes, 1, "calendar-sourced row vanished from the calendar: tombstone delete");
    assert!(read_schedule(&schedule_path).is_empty());

    let event_reappears = StubProvider { rows: vec![row] };
    let third = run_sync(&cfg, &event_reappears, ApplyMode::Apply, 1_770_000_200)
        .await
        .expect("third run_sync");
    assert_eq!(third.plan.creates, 0, "tombstone suppresses resurrection of the identical identity");
    assert!(read_schedule(&schedule_path).is_empty());
}

/// S6: a manually reordered pair of managed scheduler rows neither looks
/// like a state change (identity/state hashes never include row position)
/// nor survives the next apply — the ordering engine rewrites the rows
/// back into its own canonical order every time.
#[tokio::test]
async fn s6_manual_reorder_of_managed_rows_does_not_drift_the_plan() {
    let tmp = TempDir::new().expect("tempdir");
    let schedule_path = tmp.path().join("schedule.json");
    fs::write(&schedule_path, "[]").expect("seed empty schedule");

    let cfg = test_config(tmp.path(), &schedule_path);

    let playlist_a = master_row(
        "master-a",
        "Playlist A",
        "2026-02-01T06:00:00-06:00",
        "2026-02-01T08:00:00-06:00",
        "20260301T000000Z",
    );
    let playlist_b = master_row(
        "master-b",
        "Playlist B",
        "2026-02-01T18:00:00-06:00",
        "2026-02-01T20:00:00-06:00",
        "20260301T000000Z",
    );
    let provider = StubProvider {
        rows: vec![playlist_a, playlist_b],
    };

    run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_000)
        .await
        .expect("first run_sync");

    let canonical = read_schedule(&schedule_path);
    assert_eq!(canonical.len(), 2);

    let mut drifted = canonical.clone();
    drifted.swap(0, 1);
    fs::write(&schedule_path, serde_json::to_string_pretty(&drifted).expect("serialize")).expect("write drifted");

    let preview = run_sync(&cfg, &provider, ApplyMode::Plan, 1_770_000_100)
        .await
        .expect("preview after manual reorder");
    assert_eq!(preview.plan.creates, 0);
    assert_eq!(preview.plan.updates, 0);
    assert_eq!(preview.plan.deletes, 0, "manual reorder of managed rows is not a state change");

    run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_200)
        .await
        .expect("apply after manual reorder");
    let restored = read_schedule(&schedule_path);
    assert_eq!(
        restored.iter().map(|r| r.target.clone()).collect::<Vec<_>>(),
        canonical.iter().map(|r| r.target.clone()).collect::<Vec<_>>(),
        "the ordering engine restores its own canonical row order, ignoring the manual drift"
    );
}

proptest! {
    /// Universal invariant: applying the same desired calendar state twice
    /// in a row always converges to zero further diffs on the second
    /// pass, regardless of how many independent daily playlists are in
    /// play.
    #[test]
    fn apply_twice_converges_for_any_number_of_independent_playlists(count in 1usize..=5) {
        let tmp = TempDir::new().expect("tempdir");
        let schedule_path = tmp.path().join("schedule.json");
        fs::write(&schedule_path, "[]").expect("seed empty schedule");
        let cfg = test_config(tmp.path(), &schedule_path);

        let rows: Vec<CalendarRow> = (0..count)
            .map(|i| master_row(
                &format!("master-{i}"),
                &format!("Playlist {i}"),
                "2026-02-01T18:00:00-06:00",
                "2026-02-01T22:00:00-06:00",
                "20260301T000000Z",
            ))
            .collect();
        let provider = StubProvider { rows };

        let rt = tokio::runtime::Builder::new_current_thread().build().expect("runtime");

        let first = rt
            .block_on(run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_000))
            .expect("first run_sync");
        prop_assert_eq!(first.plan.creates, count);

        let second = rt
            .block_on(run_sync(&cfg, &provider, ApplyMode::Apply, 1_770_000_100))
            .expect("second run_sync");
        prop_assert_eq!(second.plan.creates, 0);
        prop_assert_eq!(second.plan.updates, 0);
        prop_assert_eq!(second.plan.deletes, 0);
    }
}

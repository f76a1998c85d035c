//! Top-level orchestration: wires ingest → resolve → normalize → diff →
//! authority → reconcile → apply → persist into one sync run. This is the
//! entry point the CLI drives; every stage below is otherwise independently
//! testable and this module just sequences them ("one run").

use std::collections::{BTreeMap, BTreeSet};
use std::fs;

use tracing::{info, warn};

use crate::apply::{ApplyContext, ApplyMode, ApplyOutcome, apply_plan, finish_apply};
use crate::authority::{self, AuthorityDecision, AuthorityInput};
use crate::config::Config;
use crate::diff::diff_manifests;
use crate::error::Result;
use crate::ingest::calendar_raw::{RawCalendarEvent, adapt_rows as adapt_calendar_rows};
use crate::ingest::fpp_raw::adapt_rows as adapt_fpp_rows;
use crate::normalize::{
    Controller, FppNormalizeContext, ManifestEvent, NormalizeContext, normalize_bundle,
    normalize_fpp_event,
};
use crate::persistence::{ManifestStore, SnapshotCache, TimestampStore, TombstoneStore};
use crate::persistence::{manifest_store, snapshot_cache, timestamp_store, tombstone_store};
use crate::provider::CalendarProvider;
use crate::reconcile::{ReconcileInput, ReconciliationPlan, reconcile};
use crate::resolve::bundle::resolve_bundles;

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub plan: PlanSummary,
    pub apply: ApplyOutcome,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PlanSummary {
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
    pub noops: usize,
    pub conflicts: usize,
    pub blocked: usize,
}

impl PlanSummary {
    fn from_plan(plan: &ReconciliationPlan) -> Self {
        let mut summary = Self::default();
        for item in &plan.items {
            use crate::reconcile::Operation::*;
            match item.operation {
                Create => summary.creates += 1,
                Update => summary.updates += 1,
                Delete => summary.deletes += 1,
                Noop => summary.noops += 1,
                Conflict => summary.conflicts += 1,
                Blocked => summary.blocked += 1,
            }
        }
        summary
    }
}

/// Runs one full sync pass against the configured calendar and FPP
/// scheduler. `mode` governs whether anything is actually written.
/// `now_epoch` is supplied by the caller since the core library never
/// reads the clock itself (keeps every stage replayable in tests).
pub async fn run_sync(
    cfg: &Config,
    provider: &dyn CalendarProvider,
    mode: ApplyMode,
    now_epoch: i64,
) -> Result<SyncOutcome> {
    let manifest_store = ManifestStore::new(manifest_store::path_under(&cfg.data_dir));
    let tombstone_store = TombstoneStore::new(tombstone_store::path_under(&cfg.data_dir));
    let timestamp_store = TimestampStore::new(timestamp_store::path_under(&cfg.data_dir));
    let snapshot_cache = SnapshotCache::new(snapshot_cache::path_under(&cfg.data_dir));

    let current = manifest_store.load()?.map(|f| f.events).unwrap_or_default();
    let current_vec: Vec<ManifestEvent> = current.values().cloned().collect();
    let current_by_identity: BTreeMap<String, &ManifestEvent> =
        current.iter().map(|(k, v)| (k.clone(), v)).collect();

    let tombstones = tombstone_store.load()?;

    info!(calendar_id = %cfg.calendar_id, "reading calendar events");
    let raw_rows = provider.list_events(&cfg.calendar_id).await?;
    let calendar_events = adapt_calendar_rows(raw_rows, "google")?;

    snapshot_cache.save(&crate::persistence::CalendarSnapshot {
        calendar_id: cfg.calendar_id.clone(),
        events: calendar_events.clone(),
        generated_at_epoch: now_epoch,
    })?;

    let (desired_calendar, calendar_timestamps) =
        build_desired_calendar(&calendar_events, cfg, now_epoch)?;

    info!(schedule = %cfg.schedule_path.display(), "reading fpp schedule");
    let schedule_rows = crate::apply::fpp_writer::load_schedule(&cfg.schedule_path)?;
    let fpp_events = adapt_fpp_rows(schedule_rows)?;
    let fpp_ctx = FppNormalizeContext {
        local_timezone: cfg.local_timezone,
        source: "fpp",
        provider: "fpp-scheduler",
        imported_at_epoch: now_epoch,
    };
    let mut desired_fpp: BTreeMap<String, ManifestEvent> = BTreeMap::new();
    for event in &fpp_events {
        let manifest_event = normalize_fpp_event(event, &fpp_ctx)?;
        desired_fpp.insert(manifest_event.identity_hash.clone(), manifest_event);
    }

    let fpp_timestamps = timestamp_store.load()?;
    let schedule_mtime = fs::metadata(&cfg.schedule_path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64);

    // Tombstones suppress resurrection: an identity recorded as tombstoned
    // and absent from current is dropped from the desired sets entirely.
    let tombstoned_identities: BTreeSet<String> = tombstones
        .sources
        .calendar
        .keys()
        .map(|key| key.rsplit("::").next().unwrap_or(key).to_string())
        .chain(tombstones.sources.fpp.keys().cloned())
        .collect();

    let desired_calendar: BTreeMap<String, ManifestEvent> = desired_calendar
        .into_iter()
        .filter(|(id, _)| !tombstoned_identities.contains(id) || current_by_identity.contains_key(id))
        .collect();
    let desired_fpp: BTreeMap<String, ManifestEvent> = desired_fpp
        .into_iter()
        .filter(|(id, _)| !tombstoned_identities.contains(id) || current_by_identity.contains_key(id))
        .collect();

    let desired_calendar_vec: Vec<ManifestEvent> = desired_calendar.values().cloned().collect();
    let desired_fpp_vec: Vec<ManifestEvent> = desired_fpp.values().cloned().collect();

    let calendar_diff = diff_manifests(&desired_calendar_vec, &current_vec)?;
    let fpp_diff = diff_manifests(&desired_fpp_vec, &current_vec)?;

    let desired_calendar_by_identity: BTreeMap<String, &ManifestEvent> =
        desired_calendar.iter().map(|(k, v)| (k.clone(), v)).collect();
    let desired_fpp_by_identity: BTreeMap<String, &ManifestEvent> =
        desired_fpp.iter().map(|(k, v)| (k.clone(), v)).collect();

    let mut identity_hashes: BTreeSet<String> = BTreeSet::new();
    identity_hashes.extend(calendar_diff.creates.iter().cloned());
    identity_hashes.extend(calendar_diff.updates.iter().cloned());
    identity_hashes.extend(calendar_diff.deletes.iter().cloned());
    identity_hashes.extend(calendar_diff.noops.iter().cloned());
    identity_hashes.extend(fpp_diff.creates.iter().cloned());
    identity_hashes.extend(fpp_diff.updates.iter().cloned());
    identity_hashes.extend(fpp_diff.deletes.iter().cloned());
    identity_hashes.extend(fpp_diff.noops.iter().cloned());

    let mut authority_by_identity: BTreeMap<String, AuthorityDecision> = BTreeMap::new();
    for identity_hash in &identity_hashes {
        let exists_in_calendar = desired_calendar_by_identity.contains_key(identity_hash);
        let exists_in_fpp = desired_fpp_by_identity.contains_key(identity_hash);
        let exists_in_current = current_by_identity.contains_key(identity_hash);

        let diverges_from_current_calendar = matches!(
            classify_presence(&calendar_diff, identity_hash),
            "create" | "update" | "delete"
        );
        let diverges_from_current_fpp = matches!(
            classify_presence(&fpp_diff, identity_hash),
            "create" | "update" | "delete"
        );

        let input = AuthorityInput {
            identity_hash: identity_hash.clone(),
            exists_in_calendar,
            exists_in_fpp,
            exists_in_current,
            calendar_timestamp: calendar_timestamps.get(identity_hash).copied(),
            fpp_timestamp: fpp_timestamps
                .by_identity
                .get(identity_hash)
                .copied()
                .or(schedule_mtime),
            diverges_from_current_calendar,
            diverges_from_current_fpp,
        };
        authority_by_identity.insert(identity_hash.clone(), authority::decide(&input));
    }

    let plan = reconcile(&ReconcileInput {
        calendar_diff: &calendar_diff,
        fpp_diff: &fpp_diff,
        authority_by_identity: &authority_by_identity,
        current_by_identity: &current_by_identity,
        desired_calendar_by_identity: &desired_calendar_by_identity,
        desired_fpp_by_identity: &desired_fpp_by_identity,
        calendar_scope: &cfg.calendar_id,
        sync_mode: cfg.sync_mode,
    })?;
    let plan_summary = PlanSummary::from_plan(&plan);

    let apply_ctx = ApplyContext {
        mode,
        policy: cfg.writability,
        ordering: cfg.ordering_context(),
        schedule_path: &cfg.schedule_path,
        calendar_id: &cfg.calendar_id,
        provider_name: &cfg.provider,
    };

    let (apply_outcome, new_manifest_events) =
        apply_plan(&plan, &current_vec, provider, &apply_ctx).await?;

    if matches!(mode, ApplyMode::Apply) {
        finish_apply(
            &manifest_store,
            &tombstone_store,
            new_manifest_events,
            &plan.new_tombstones,
            now_epoch,
        )?;
    } else {
        warn!(?mode, "skipping persistence for a non-apply run");
    }

    Ok(SyncOutcome {
        plan: plan_summary,
        apply: apply_outcome,
    })
}

fn classify_presence<'a>(diff: &'a crate::diff::DiffResult, identity_hash: &str) -> &'a str {
    if diff.creates.iter().any(|id| id == identity_hash) {
        "create"
    } else if diff.updates.iter().any(|id| id == identity_hash) {
        "update"
    } else if diff.deletes.iter().any(|id| id == identity_hash) {
        "delete"
    } else {
        "noop"
    }
}

/// Groups raw calendar rows into master/override sets by `parent_uid`,
/// resolves each master's bundles, and normalizes them into manifest
/// shape. Returns the desired-calendar manifest map alongside a
/// per-identity max `updated_at_epoch`, since that timestamp lives on the
/// raw row and doesn't survive into `ManifestEvent`.
fn build_desired_calendar(
    events: &[RawCalendarEvent],
    cfg: &Config,
    imported_at_epoch: i64,
) -> Result<(BTreeMap<String, ManifestEvent>, BTreeMap<String, i64>)> {
    let mut overrides_by_parent: BTreeMap<String, Vec<RawCalendarEvent>> = BTreeMap::new();
    let mut masters: Vec<&RawCalendarEvent> = Vec::new();

    for event in events {
        match &event.parent_uid {
            Some(parent) => overrides_by_parent.entry(parent.clone()).or_default().push(event.clone()),
            None => masters.push(event),
        }
    }

    let normalize_ctx = NormalizeContext {
        local_timezone: cfg.local_timezone,
        source: "google",
        provider: cfg.provider.as_str(),
        imported_at_epoch,
        managed: true,
        controller: Controller::Calendar,
        locked: false,
        source_calendar_id: Some(cfg.calendar_id.clone()),
    };

    let mut desired = BTreeMap::new();
    let mut timestamps = BTreeMap::new();

    for master in masters {
        let overrides = overrides_by_parent.get(&master.uid).cloned().unwrap_or_default();
        let group_max_updated = std::iter::once(master.updated_at_epoch)
            .chain(overrides.iter().map(|o| o.updated_at_epoch))
            .max()
            .unwrap_or(master.updated_at_epoch);

        let bundles = resolve_bundles(master, &overrides)?;
        for bundle in &bundles {
            let manifest_event = normalize_bundle(bundle, &normalize_ctx)?;
            timestamps.insert(manifest_event.identity_hash.clone(), group_max_updated);
            desired.insert(manifest_event.identity_hash.clone(), manifest_event);
        }
    }

    Ok((desired, timestamps))
}

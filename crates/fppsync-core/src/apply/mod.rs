//! Apply engine: executes a `ReconciliationPlan`
//! against FPP and the calendar provider under a writability policy and
//! mode (`plan` computes without touching either side; `dryRun` performs
//! every computation and validation a real apply would but skips the final
//! write; `apply` writes for real). No partial apply: any provider error,
//! blocked action under strict policy, or target-symmetry mismatch aborts
//! before anything is written.

pub mod calendar_writer;
pub mod fpp_writer;

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use crate::authority::Direction;
use crate::error::{Result, SyncError};
use crate::normalize::ManifestEvent;
use crate::order::OrderingContext;
use crate::persistence::{ManifestFile, ManifestStore, TombstoneStore};
use crate::provider::CalendarProvider;
use crate::reconcile::{Operation, PlanItem, ReconciliationPlan};

use calendar_writer::{ApplyOp, CalendarOpKind, apply_calendar_op};
use fpp_writer::{build_managed_rows, load_schedule, merge_rows, write_schedule_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Compute the plan only; never touch FPP or the provider.
    Plan,
    /// Run every validation and write-preparation step but skip the final
    /// write (staging file, provider request) so nothing is persisted.
    DryRun,
    /// Perform the writes.
    Apply,
}

/// Per-target write permission. `fail_on_blocked` turns
/// a plan containing any `Operation::Blocked` item into a hard error
/// instead of a silent skip.
#[derive(Debug, Clone, Copy)]
pub struct WritabilityPolicy {
    pub fpp: bool,
    pub calendar: bool,
    pub fail_on_blocked: bool,
}

impl Default for WritabilityPolicy {
    fn default() -> Self {
        Self {
            fpp: true,
            calendar: true,
            fail_on_blocked: true,
        }
    }
}

pub struct ApplyContext<'a> {
    pub mode: ApplyMode,
    pub policy: WritabilityPolicy,
    pub ordering: OrderingContext,
    pub schedule_path: &'a Path,
    pub calendar_id: &'a str,
    pub provider_name: &'a str,
}

#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ApplyOutcome {
    pub fpp_rows_written: usize,
    pub calendar_ops_applied: usize,
    pub blocked_skipped: usize,
}

/// Executes `plan` against `current_manifest` (the manifest as persisted
/// before this run). Returns the outcome and, on success, the new manifest
/// to persist. Nothing is persisted by this function itself — callers run
/// the post-apply step (`finish_apply`) once they're satisfied the whole
/// run succeeded.
pub async fn apply_plan(
    plan: &ReconciliationPlan,
    current_manifest: &[ManifestEvent],
    provider: &dyn CalendarProvider,
    ctx: &ApplyContext<'_>,
) -> Result<(ApplyOutcome, Vec<ManifestEvent>)> {
    let current_by_identity: BTreeMap<String, &ManifestEvent> = current_manifest
        .iter()
        .map(|e| (e.identity_hash.clone(), e))
        .collect();

    if !matches!(ctx.mode, ApplyMode::Plan) {
        let conflicted: Vec<&str> = plan
            .items
            .iter()
            .filter(|item| matches!(item.operation, Operation::Conflict))
            .map(|item| item.identity_hash.as_str())
            .collect();
        if !conflicted.is_empty() {
            return Err(SyncError::Conflict(conflicted.join(", ")));
        }
    }

    let mut outcome = ApplyOutcome::default();
    let mut fpp_final: BTreeMap<String, ManifestEvent> = current_manifest
        .iter()
        .map(|e| (e.identity_hash.clone(), e.clone()))
        .collect();
    let mut calendar_ops: Vec<ApplyOp> = Vec::new();

    for item in &plan.items {
        match item.operation {
            Operation::Noop | Operation::Conflict => continue,
            Operation::Blocked => {
                outcome.blocked_skipped += 1;
                if ctx.policy.fail_on_blocked {
                    return Err(SyncError::BlockedAction(item.reason.clone()));
                }
                warn!(identity_hash = %item.identity_hash, "skipping blocked action");
                continue;
            }
            Operation::Create | Operation::Update | Operation::Delete => {}
        }

        match item.direction {
            Some(Direction::CalendarToFpp) => {
                apply_to_fpp_side(item, &mut fpp_final)?;
            }
            Some(Direction::FppToCalendar) => {
                calendar_ops.push(build_calendar_op(item, &current_by_identity)?);
            }
            None => {
                return Err(SyncError::InvariantViolation(format!(
                    "executable plan item {} has no direction",
                    item.identity_hash
                )));
            }
        }
    }

    if matches!(ctx.mode, ApplyMode::Plan) {
        let final_events: Vec<ManifestEvent> = fpp_final.into_values().collect();
        return Ok((outcome, final_events));
    }

    if ctx.policy.calendar {
        for op in &calendar_ops {
            if matches!(ctx.mode, ApplyMode::Apply) {
                apply_calendar_op(provider, ctx.calendar_id, ctx.provider_name, op, &ctx.ordering).await?;
            }
            outcome.calendar_ops_applied += 1;
        }
    } else if !calendar_ops.is_empty() {
        return Err(SyncError::BlockedAction(
            "calendar writes required but calendar writability is disabled".into(),
        ));
    }

    let final_events: Vec<ManifestEvent> = fpp_final.into_values().collect();

    if ctx.policy.fpp {
        let managed_rows = build_managed_rows(&final_events, &ctx.ordering)?;
        let original = load_schedule(ctx.schedule_path)?;
        let merged = merge_rows(&original, managed_rows);
        if matches!(ctx.mode, ApplyMode::Apply) {
            write_schedule_atomic(ctx.schedule_path, &merged)?;
        }
        outcome.fpp_rows_written = merged.len();
    } else if fpp_writes_required(plan) {
        return Err(SyncError::BlockedAction(
            "fpp writes required but fpp writability is disabled".into(),
        ));
    }

    info!(
        fpp_rows = outcome.fpp_rows_written,
        calendar_ops = outcome.calendar_ops_applied,
        blocked = outcome.blocked_skipped,
        "apply complete"
    );

    Ok((outcome, final_events))
}

fn fpp_writes_required(plan: &ReconciliationPlan) -> bool {
    plan.items
        .iter()
        .any(|item| item.direction == Some(Direction::CalendarToFpp) && executable(item.operation))
}

fn executable(operation: Operation) -> bool {
    matches!(operation, Operation::Create | Operation::Update | Operation::Delete)
}

fn apply_to_fpp_side(item: &PlanItem, fpp_final: &mut BTreeMap<String, ManifestEvent>) -> Result<()> {
    match item.operation {
        Operation::Delete => {
            fpp_final.remove(&item.identity_hash);
        }
        Operation::Create | Operation::Update => {
            let payload = item.payload.clone().ok_or_else(|| {
                SyncError::InvariantViolation(format!(
                    "plan item {} has no payload for a {:?}",
                    item.identity_hash, item.operation
                ))
            })?;
            fpp_final.insert(item.identity_hash.clone(), payload);
        }
        _ => unreachable!("non-executable operations filtered before this call"),
    }
    Ok(())
}

fn build_calendar_op(
    item: &PlanItem,
    current_by_identity: &BTreeMap<String, &ManifestEvent>,
) -> Result<ApplyOp> {
    let current = current_by_identity.get(&item.identity_hash).copied();

    match item.operation {
        Operation::Delete => {
            let current = current.ok_or_else(|| {
                SyncError::InvariantViolation(format!(
                    "calendar DELETE for {} has no current event to source a providerEventId from",
                    item.identity_hash
                ))
            })?;
            ApplyOp::from_manifest_event(
                CalendarOpKind::Delete,
                current,
                Some(current.correlation.external_id.clone()),
                None,
            )
        }
        Operation::Create => {
            let payload = item.payload.as_ref().ok_or_else(|| {
                SyncError::InvariantViolation(format!("calendar CREATE for {} has no payload", item.identity_hash))
            })?;
            ApplyOp::from_manifest_event(CalendarOpKind::Create, payload, None, None)
        }
        Operation::Update => {
            let payload = item.payload.as_ref().ok_or_else(|| {
                SyncError::InvariantViolation(format!("calendar UPDATE for {} has no payload", item.identity_hash))
            })?;
            let provider_event_id = current.map(|c| c.correlation.external_id.clone());
            ApplyOp::from_manifest_event(CalendarOpKind::Update, payload, provider_event_id, None)
        }
        _ => unreachable!("non-executable operations filtered before this call"),
    }
}

/// Post-apply persistence: the new manifest
/// replaces the old one atomically, and tombstones are pruned to whatever
/// is still absent from both sides after this run.
pub fn finish_apply(
    manifest_store: &ManifestStore,
    tombstone_store: &TombstoneStore,
    new_manifest_events: Vec<ManifestEvent>,
    new_tombstones: &std::collections::BTreeSet<String>,
    generated_at_epoch: i64,
) -> Result<()> {
    let still_present: std::collections::BTreeSet<String> =
        new_manifest_events.iter().map(|e| e.identity_hash.clone()).collect();

    let manifest = ManifestFile::new(generated_at_epoch, new_manifest_events);
    manifest_store.save(&manifest)?;

    let mut tombstones = tombstone_store.load()?;
    for key in new_tombstones {
        tombstones.sources.calendar.insert(key.clone(), generated_at_epoch);
    }
    tombstones.retain_active(|key| {
        let identity_hash = key.rsplit("::").next().unwrap_or(key);
        still_present.contains(identity_hash)
    });
    tombstone_store.save(&tombstones)?;

    Ok(())
}

//! Reconciler: combines the calendar-side and
//! fpp-side diffs against the current manifest with tombstones, the
//! managed boundary, and the sync-mode gate into one deterministically
//! ordered `ReconciliationPlan`.

use std::collections::{BTreeMap, BTreeSet};

use crate::authority::{Authority, AuthorityDecision, Direction};
use crate::diff::DiffResult;
use crate::error::{Result, SyncError};
use crate::normalize::{Controller, ManifestEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    Noop,
    Conflict,
    /// Permitted by authority but forbidden by the active sync mode.
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    Both,
    CalendarToFpp,
    FppToCalendar,
}

impl SyncMode {
    fn permits(&self, direction: Direction) -> bool {
        match self {
            SyncMode::Both => true,
            SyncMode::CalendarToFpp => direction == Direction::CalendarToFpp,
            SyncMode::FppToCalendar => direction == Direction::FppToCalendar,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlanItem {
    pub identity_hash: String,
    pub operation: Operation,
    pub direction: Option<Direction>,
    pub authoritative_side: Option<Authority>,
    pub reason: String,
    pub payload: Option<ManifestEvent>,
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationPlan {
    pub items: Vec<PlanItem>,
    /// New calendar tombstones inferred this run, keyed `calendarScope::identityHash`.
    pub new_tombstones: BTreeSet<String>,
}

pub struct ReconcileInput<'a> {
    pub calendar_diff: &'a DiffResult,
    pub fpp_diff: &'a DiffResult,
    pub authority_by_identity: &'a BTreeMap<String, AuthorityDecision>,
    pub current_by_identity: &'a BTreeMap<String, &'a ManifestEvent>,
    pub desired_calendar_by_identity: &'a BTreeMap<String, &'a ManifestEvent>,
    pub desired_fpp_by_identity: &'a BTreeMap<String, &'a ManifestEvent>,
    pub calendar_scope: &'a str,
    pub sync_mode: SyncMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiffClass {
    Create,
    Update,
    Delete,
    Noop,
    Absent,
}

fn classify(diff: &DiffResult, identity_hash: &str) -> DiffClass {
    if diff.creates.iter().any(|id| id == identity_hash) {
        DiffClass::Create
    } else if diff.updates.iter().any(|id| id == identity_hash) {
        DiffClass::Update
    } else if diff.deletes.iter().any(|id| id == identity_hash) {
        DiffClass::Delete
    } else if diff.noops.iter().any(|id| id == identity_hash) {
        DiffClass::Noop
    } else {
        DiffClass::Absent
    }
}

fn diff_class_to_operation(class: DiffClass) -> Operation {
    match class {
        DiffClass::Create => Operation::Create,
        DiffClass::Update => Operation::Update,
        DiffClass::Delete => Operation::Delete,
        DiffClass::Noop | DiffClass::Absent => Operation::Noop,
    }
}

/// Builds the plan. Deterministic ordering (conflicts, then
/// deletes, then updates, then creates, each sorted by identityHash) is
/// applied by `order_plan_items` after this returns; callers that only
/// need the raw per-identity decisions may skip it.
pub fn reconcile(input: &ReconcileInput) -> Result<ReconciliationPlan> {
    let mut identity_hashes: BTreeSet<String> = BTreeSet::new();
    identity_hashes.extend(input.calendar_diff.creates.iter().cloned());
    identity_hashes.extend(input.calendar_diff.updates.iter().cloned());
    identity_hashes.extend(input.calendar_diff.deletes.iter().cloned());
    identity_hashes.extend(input.calendar_diff.noops.iter().cloned());
    identity_hashes.extend(input.fpp_diff.creates.iter().cloned());
    identity_hashes.extend(input.fpp_diff.updates.iter().cloned());
    identity_hashes.extend(input.fpp_diff.deletes.iter().cloned());
    identity_hashes.extend(input.fpp_diff.noops.iter().cloned());

    let mut items = Vec::with_capacity(identity_hashes.len());
    let mut new_tombstones = BTreeSet::new();

    for identity_hash in &identity_hashes {
        let current_event = input.current_by_identity.get(identity_hash).copied();

        if let Some(event) = current_event {
            if !event.ownership.managed {
                items.push(PlanItem {
                    identity_hash: identity_hash.clone(),
                    operation: Operation::Noop,
                    direction: None,
                    authoritative_side: None,
                    reason: "unmanaged-protected".to_string(),
                    payload: None,
                });
                continue;
            }
        }

        let calendar_class = classify(input.calendar_diff, identity_hash);
        let fpp_class = classify(input.fpp_diff, identity_hash);

        if let Some(tombstone_item) = try_tombstone(
            input,
            identity_hash,
            current_event,
            calendar_class,
            fpp_class,
            &mut new_tombstones,
        ) {
            items.push(tombstone_item);
            continue;
        }

        let authority = input.authority_by_identity.get(identity_hash).ok_or_else(|| {
            SyncError::InvariantViolation(format!(
                "missing authority decision for identity {identity_hash}"
            ))
        })?;

        if authority.conflict {
            items.push(PlanItem {
                identity_hash: identity_hash.clone(),
                operation: Operation::Conflict,
                direction: None,
                authoritative_side: None,
                reason: "both sides diverge, neither provably newer".to_string(),
                payload: None,
            });
            continue;
        }

        let (class, payload) = match authority.direction {
            Direction::CalendarToFpp => (
                calendar_class,
                input.desired_calendar_by_identity.get(identity_hash).copied(),
            ),
            Direction::FppToCalendar => (
                fpp_class,
                input.desired_fpp_by_identity.get(identity_hash).copied(),
            ),
        };

        let operation = diff_class_to_operation(class);

        if matches!(operation, Operation::Noop) {
            items.push(PlanItem {
                identity_hash: identity_hash.clone(),
                operation,
                direction: Some(authority.direction),
                authoritative_side: Some(authority.authority),
                reason: "no state change".to_string(),
                payload: None,
            });
            continue;
        }

        if !input.sync_mode.permits(authority.direction) {
            items.push(PlanItem {
                identity_hash: identity_hash.clone(),
                operation: Operation::Blocked,
                direction: Some(authority.direction),
                authoritative_side: Some(authority.authority),
                reason: "sync mode forbids this direction".to_string(),
                payload: None,
            });
            continue;
        }

        items.push(PlanItem {
            identity_hash: identity_hash.clone(),
            operation,
            direction: Some(authority.direction),
            authoritative_side: Some(authority.authority),
            reason: format!("{:?} authoritative", authority.authority),
            payload: payload.cloned(),
        });
    }

    order_plan_items(&mut items);

    Ok(ReconciliationPlan {
        items,
        new_tombstones,
    })
}

/// Calendar tombstone inference: an identity that was
/// calendar-sourced in current, scoped to the active calendar, absent from
/// desired-calendar, and present in desired-fpp must not be recreated on
/// the calendar — instead its fpp row is deleted.
fn try_tombstone(
    input: &ReconcileInput,
    identity_hash: &str,
    current_event: Option<&ManifestEvent>,
    calendar_class: DiffClass,
    fpp_class: DiffClass,
    new_tombstones: &mut BTreeSet<String>,
) -> Option<PlanItem> {
    let current_event = current_event?;
    let calendar_sourced = current_event.ownership.controller == Controller::Calendar;
    let in_scope = current_event.correlation.source_calendar_id.as_deref() == Some(input.calendar_scope);
    let absent_from_calendar = calendar_class == DiffClass::Delete;
    let present_in_fpp = matches!(fpp_class, DiffClass::Create | DiffClass::Update | DiffClass::Noop);

    if calendar_sourced && in_scope && absent_from_calendar && present_in_fpp {
        new_tombstones.insert(format!("{}::{}", input.calendar_scope, identity_hash));
        return Some(PlanItem {
            identity_hash: identity_hash.to_string(),
            operation: Operation::Delete,
            direction: Some(Direction::CalendarToFpp),
            authoritative_side: Some(Authority::Calendar),
            reason: "tombstone".to_string(),
            payload: None,
        });
    }

    None
}

/// Deterministic plan ordering: conflicts, then deletes, then updates,
/// then creates; within each group, sorted by identityHash. Blocked and
/// noop items sort after creates, also by identityHash, since only the
/// four executable classes have a defined relative order.
fn order_plan_items(items: &mut [PlanItem]) {
    items.sort_by(|a, b| {
        rank(a.operation)
            .cmp(&rank(b.operation))
            .then_with(|| a.identity_hash.cmp(&b.identity_hash))
    });
}

fn rank(operation: Operation) -> u8 {
    match operation {
        Operation::Conflict => 0,
        Operation::Delete => 1,
        Operation::Update => 2,
        Operation::Create => 3,
        Operation::Blocked => 4,
        Operation::Noop => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffResult;
    use crate::normalize::{
        Behavior, Correlation, EventKind, Identity, Ownership, Provenance, StatusFlags, SubEvent,
        SubEventRoleTag, Timing, TimingIdentity,
    };
    use std::collections::BTreeMap as Map;

    fn authority_decision(direction: Direction, conflict: bool) -> AuthorityDecision {
        AuthorityDecision {
            identity_hash: "id-1".to_string(),
            authority: match direction {
                Direction::CalendarToFpp => Authority::Calendar,
                Direction::FppToCalendar => Authority::Fpp,
            },
            direction,
            conflict,
        }
    }

    fn minimal_event(identity_hash: &str, managed: bool, controller: Controller) -> ManifestEvent {
        let timing = Timing {
            all_day: true,
            start_date: crate::primitives::DateValue::hard(
                crate::primitives::DatePattern::exact(2026, 1, 1).unwrap(),
            ),
            end_date: crate::primitives::DateValue::hard(
                crate::primitives::DatePattern::exact(2026, 1, 2).unwrap(),
            ),
            start_time: None,
            end_time: None,
            days: None,
            timezone: "America/Chicago".to_string(),
        };
        let sub_event = SubEvent {
            kind: EventKind::Playlist,
            target: "Playlist A".to_string(),
            timing,
            behavior: Behavior {
                enabled: true,
                repeat: 0,
                stop_type: 0,
            },
            payload: Map::new(),
            role: SubEventRoleTag::Base,
            bundle_id: "bundle-1".to_string(),
            execution_order: Some(0),
            source_event_uid: "uid-1".to_string(),
            parent_uid: "uid-1".to_string(),
            state_hash: "state-1".to_string(),
        };
        ManifestEvent {
            id: identity_hash.to_string(),
            identity: Identity {
                kind: EventKind::Playlist,
                target: "Playlist A".to_string(),
                timing_identity: TimingIdentity {
                    days: None,
                    start_time: None,
                    end_time: None,
                    all_day: true,
                },
            },
            sub_events: vec![sub_event],
            ownership: Ownership {
                managed,
                controller,
                locked: false,
            },
            correlation: Correlation {
                source: "google".to_string(),
                external_id: "uid-1".to_string(),
                source_calendar_id: Some("primary".to_string()),
            },
            status: StatusFlags {
                enabled: true,
                deleted: false,
            },
            provenance: Provenance {
                source: "google".to_string(),
                provider: "google-calendar".to_string(),
                imported_at_epoch: 0,
            },
            identity_hash: identity_hash.to_string(),
            state_hash: "state-1".to_string(),
        }
    }

    #[test]
    fn managed_false_forces_noop() {
        let current_event = minimal_event("id-1", false, Controller::Manual);
        let mut current = BTreeMap::new();
        current.insert("id-1".to_string(), &current_event);

        let calendar_diff = DiffResult {
            updates: vec!["id-1".to_string()],
            ..Default::default()
        };
        let fpp_diff = DiffResult::default();
        let authority_map = BTreeMap::new();
        let desired_calendar = BTreeMap::new();
        let desired_fpp = BTreeMap::new();

        let plan = reconcile(&ReconcileInput {
            calendar_diff: &calendar_diff,
            fpp_diff: &fpp_diff,
            authority_by_identity: &authority_map,
            current_by_identity: &current,
            desired_calendar_by_identity: &desired_calendar,
            desired_fpp_by_identity: &desired_fpp,
            calendar_scope: "primary",
            sync_mode: SyncMode::Both,
        })
        .expect("reconcile");

        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].operation, Operation::Noop);
        assert_eq!(plan.items[0].reason, "unmanaged-protected");
    }

    #[test]
    fn tombstone_inferred_when_removed_from_calendar_but_present_in_fpp() {
        let current_event = minimal_event("id-1", true, Controller::Calendar);
        let mut current = BTreeMap::new();
        current.insert("id-1".to_string(), &current_event);

        let calendar_diff = DiffResult {
            deletes: vec!["id-1".to_string()],
            ..Default::default()
        };
        let fpp_diff = DiffResult {
            noops: vec!["id-1".to_string()],
            ..Default::default()
        };
        let authority_map = BTreeMap::new();
        let desired_calendar = BTreeMap::new();
        let desired_fpp = BTreeMap::new();

        let plan = reconcile(&ReconcileInput {
            calendar_diff: &calendar_diff,
            fpp_diff: &fpp_diff,
            authority_by_identity: &authority_map,
            current_by_identity: &current,
            desired_calendar_by_identity: &desired_calendar,
            desired_fpp_by_identity: &desired_fpp,
            calendar_scope: "primary",
            sync_mode: SyncMode::Both,
        })
        .expect("reconcile");

        assert_eq!(plan.items.len(), 1);
        assert_eq!(plan.items[0].operation, Operation::Delete);
        assert_eq!(plan.items[0].reason, "tombstone");
        assert!(plan.new_tombstones.contains("primary::id-1"));
    }

    #[test]
    fn plan_items_sort_conflicts_before_deletes_before_updates_before_creates() {
        let mut items = vec![
            PlanItem {
                identity_hash: "z-create".to_string(),
                operation: Operation::Create,
                direction: None,
                authoritative_side: None,
                reason: String::new(),
                payload: None,
            },
            PlanItem {
                identity_hash: "a-conflict".to_string(),
                operation: Operation::Conflict,
                direction: None,
                authoritative_side: None,
                reason: String::new(),
                payload: None,
            },
            PlanItem {
                identity_hash: "m-delete".to_string(),
                operation: Operation::Delete,
                direction: None,
                authoritative_side: None,
                reason: String::new(),
                payload: None,
            },
        ];
        order_plan_items(&mut items);
        let operations: Vec<Operation> = items.iter().map(|i| i.operation).collect();
        assert_eq!(
            operations,
            vec![Operation::Conflict, Operation::Delete, Operation::Create]
        );
    }

    #[test]
    fn sync_mode_blocks_wrong_direction() {
        assert!(!SyncMode::CalendarToFpp.permits(Direction::FppToCalendar));
        assert!(SyncMode::CalendarToFpp.permits(Direction::CalendarToFpp));
        assert!(SyncMode::Both.permits(Direction::FppToCalendar));
    }

    #[test]
    fn conflict_decision_short_circuits_classification() {
        let decision = authority_decision(Direction::CalendarToFpp, true);
        assert!(decision.conflict);
    }
}

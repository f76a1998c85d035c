//! Diff Engine: identity-keyed comparison of a desired manifest against an
//! existing (current) manifest. Produces only create/update/delete
//! classifications — no direction, no field-level comparison, no ordering
//! inference.

use std::collections::BTreeMap;

use crate::error::{Result, SyncError};
use crate::normalize::ManifestEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffClass {
    Create,
    Update,
    Delete,
    /// Present on both sides with an identical state hash: no action.
    Noop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub identity_hash: String,
    pub class: DiffClass,
}

#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub creates: Vec<String>,
    pub updates: Vec<String>,
    pub deletes: Vec<String>,
    pub noops: Vec<String>,
}

/// Compares `desired` against `current`, keyed exactly on `identityHash`.
/// Fails with `DuplicateIdentity` if either side carries two entries
/// sharing an identity hash.
pub fn diff_manifests(desired: &[ManifestEvent], current: &[ManifestEvent]) -> Result<DiffResult> {
    let desired_by_id = index_by_identity(desired)?;
    let current_by_id = index_by_identity(current)?;

    let mut result = DiffResult::default();

    for (identity_hash, desired_event) in &desired_by_id {
        match current_by_id.get(identity_hash) {
            None => result.creates.push(identity_hash.clone()),
            Some(current_event) => {
                if desired_event.state_hash == current_event.state_hash {
                    result.noops.push(identity_hash.clone());
                } else {
                    result.updates.push(identity_hash.clone());
                }
            }
        }
    }

    for identity_hash in current_by_id.keys() {
        if !desired_by_id.contains_key(identity_hash) {
            result.deletes.push(identity_hash.clone());
        }
    }

    result.creates.sort();
    result.updates.sort();
    result.deletes.sort();
    result.noops.sort();

    Ok(result)
}

fn index_by_identity(events: &[ManifestEvent]) -> Result<BTreeMap<String, &ManifestEvent>> {
    let mut by_id = BTreeMap::new();
    for event in events {
        if by_id.insert(event.identity_hash.clone(), event).is_some() {
            return Err(SyncError::DuplicateIdentity(event.identity_hash.clone()));
        }
    }
    Ok(by_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{
        Behavior, Controller, Correlation, EventKind, Identity, Ownership, Provenance, StatusFlags,
        SubEvent, SubEventRoleTag, Timing, TimingIdentity,
    };
    use std::collections::BTreeMap as Map;

    fn event(identity_hash: &str, state_hash: &str) -> ManifestEvent {
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
            timing: timing.clone(),
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
            state_hash: state_hash.to_string(),
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
                managed: true,
                controller: Controller::Calendar,
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
            state_hash: state_hash.to_string(),
        }
    }

    #[test]
    fn new_identity_is_a_create() {
        let desired = vec![event("id-1", "state-1")];
        let result = diff_manifests(&desired, &[]).expect("diff");
        assert_eq!(result.creates, vec!["id-1".to_string()]);
    }

    #[test]
    fn missing_identity_is_a_delete() {
        let current = vec![event("id-1", "state-1")];
        let result = diff_manifests(&[], &current).expect("diff");
        assert_eq!(result.deletes, vec!["id-1".to_string()]);
    }

    #[test]
    fn differing_state_hash_is_an_update() {
        let desired = vec![event("id-1", "state-2")];
        let current = vec![event("id-1", "state-1")];
        let result = diff_manifests(&desired, &current).expect("diff");
        assert_eq!(result.updates, vec!["id-1".to_string()]);
    }

    #[test]
    fn identical_state_hash_is_noop() {
        let desired = vec![event("id-1", "state-1")];
        let current = vec![event("id-1", "state-1")];
        let result = diff_manifests(&desired, &current).expect("diff");
        assert_eq!(result.noops, vec!["id-1".to_string()]);
        assert!(result.updates.is_empty());
    }

    #[test]
    fn duplicate_identity_within_one_side_fails() {
        let desired = vec![event("id-1", "state-1"), event("id-1", "state-2")];
        let result = diff_manifests(&desired, &[]);
        assert!(matches!(result, Err(SyncError::DuplicateIdentity(_))));
    }
}

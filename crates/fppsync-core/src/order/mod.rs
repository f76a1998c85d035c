//! Ordering Engine: computes a total execution order over all sub-events
//! in a manifest. Two phases — baseline chronology, then an overlap-aware
//! precedence DAG over bundles — are combined into contiguous
//! `executionOrder` integers.
//!
//! Forbidden heuristics (never used here): provider row order, UID-only
//! comparisons, insertion order, hash-only ordering, calendar-side reorder
//! authority.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;

use crate::error::{Result, SyncError};
use crate::normalize::{EventKind, ManifestEvent, SubEventRoleTag};
use crate::primitives::weekday::WeekdayConstraint;
use crate::primitives::{DailyWindow, Interval, SymbolicToken, Weekdays, estimate_symbolic_seconds};

/// Geolocation/timezone knobs for the symbolic-time display estimator,
/// used only as an ordering heuristic, never for identity or state.
#[derive(Debug, Clone, Copy)]
pub struct OrderingContext {
    pub latitude_deg: Option<f64>,
    pub longitude_offset_minutes: i32,
    pub timezone_offset_minutes: i32,
    pub step_minutes: i32,
}

impl Default for OrderingContext {
    fn default() -> Self {
        Self {
            latitude_deg: None,
            longitude_offset_minutes: 0,
            timezone_offset_minutes: 0,
            step_minutes: 1,
        }
    }
}

/// A reference to one sub-event, identified by its owning event's identity
/// hash plus its index within `sub_events`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubEventRef {
    pub identity_hash: String,
    pub index: usize,
}

/// Geometry of one atomic bundle, derived from its base sub-event.
#[derive(Debug, Clone)]
struct BundleGeometry {
    bundle_id: String,
    kind: EventKind,
    target: String,
    start_date: NaiveDate,
    end_date_exclusive: NaiveDate,
    days: Weekdays,
    daily_window: Option<DailyWindow>,
    members: Vec<SubEventRef>,
}

/// Assigns contiguous `executionOrder` values (0..N-1) to every sub-event
/// across `events`. Returns a map from `SubEventRef` to its assigned order.
pub fn compute_execution_order(
    events: &[ManifestEvent],
    ctx: &OrderingContext,
) -> Result<HashMap<SubEventRef, u64>> {
    let bundles = group_into_bundles(events, ctx)?;
    let bundle_order = topological_order(&bundles)?;

    let mut assignment = HashMap::new();
    let mut next_order: u64 = 0;

    for bundle_idx in bundle_order {
        let bundle = &bundles[bundle_idx];
        let intra_order = intra_bundle_order(bundle, events);
        for member in intra_order {
            assignment.insert(member, next_order);
            next_order += 1;
        }
    }

    Ok(assignment)
}

fn group_into_bundles(
    events: &[ManifestEvent],
    ctx: &OrderingContext,
) -> Result<Vec<BundleGeometry>> {
    let mut by_bundle: BTreeMap<String, BundleGeometry> = BTreeMap::new();

    for event in events {
        for (index, sub_event) in event.sub_events.iter().enumerate() {
            let member = SubEventRef {
                identity_hash: event.identity_hash.clone(),
                index,
            };

            let entry = by_bundle
                .entry(sub_event.bundle_id.clone())
                .or_insert_with(|| BundleGeometry {
                    bundle_id: sub_event.bundle_id.clone(),
                    kind: sub_event.kind,
                    target: sub_event.target.clone(),
                    start_date: NaiveDate::MAX,
                    end_date_exclusive: NaiveDate::MIN,
                    days: sub_event.timing.days.clone(),
                    daily_window: None,
                    members: Vec::new(),
                });

            entry.members.push(member);

            if matches!(sub_event.role, SubEventRoleTag::Base) {
                let start = hard_date(sub_event.timing.start_date.hard)
                    .ok_or_else(|| SyncError::InvariantViolation(
                        "base sub-event missing a concrete start date".into(),
                    ))?;
                let end = hard_date(sub_event.timing.end_date.hard)
                    .ok_or_else(|| SyncError::InvariantViolation(
                        "base sub-event missing a concrete end date".into(),
                    ))?;
                entry.start_date = start;
                entry.end_date_exclusive = end;
                entry.days = sub_event.timing.days.clone();
                entry.daily_window = daily_window_for(sub_event, start, ctx);
            }
        }
    }

    Ok(by_bundle.into_values().collect())
}

fn hard_date(pattern: Option<crate::primitives::DatePattern>) -> Option<NaiveDate> {
    let pattern = pattern?;
    NaiveDate::from_ymd_opt(pattern.year?, pattern.month?, pattern.day?)
}

fn daily_window_for(
    sub_event: &crate::normalize::SubEvent,
    date: NaiveDate,
    ctx: &OrderingContext,
) -> Option<DailyWindow> {
    if sub_event.timing.all_day {
        return Some(DailyWindow::new(0, 86_400));
    }
    let start = effective_seconds(sub_event.timing.start_time.as_ref(), date, ctx)?;
    let end = effective_seconds(sub_event.timing.end_time.as_ref(), date, ctx)?;
    Some(DailyWindow::new(start, end))
}

fn effective_seconds(
    time: Option<&crate::primitives::TimeValue>,
    date: NaiveDate,
    ctx: &OrderingContext,
) -> Option<u32> {
    let time = time?;
    if let Some(hard) = time.hard {
        return Some(hard.seconds_since_midnight());
    }
    let symbolic: SymbolicToken = time.symbolic?;
    let lat = ctx.latitude_deg?;
    let estimated = estimate_symbolic_seconds(
        date,
        symbolic,
        lat,
        ctx.longitude_offset_minutes,
        ctx.timezone_offset_minutes,
        ctx.step_minutes,
    )?;
    let offset_seconds = time.offset.saturating_mul(60);
    Some(((estimated as i64 + offset_seconds as i64).rem_euclid(86_400)) as u32)
}

/// Decides whether bundle `a` takes precedence over bundle `b` when their
/// footprints overlap. `None` means no confirmed overlap (no edge should
/// be added).
fn precedence(a: &BundleGeometry, b: &BundleGeometry) -> Option<CmpOrdering> {
    if !footprints_overlap(a, b) {
        return None;
    }

    // Rule 1: later effective daily start wins (gets the earlier row).
    if let (Some(wa), Some(wb)) = (a.daily_window, b.daily_window) {
        if wa.start_seconds != wb.start_seconds {
            return Some(wb.start_seconds.cmp(&wa.start_seconds));
        }
    }

    // Rule 2: later calendar start date wins when daily start is equal.
    if a.start_date != b.start_date {
        return Some(b.start_date.cmp(&a.start_date));
    }

    // Rule 3: specificity — narrower (scope_span_days, weekday_coverage,
    // daily_window_span) wins, ascending.
    let spec_a = specificity(a);
    let spec_b = specificity(b);
    if spec_a != spec_b {
        return Some(spec_a.cmp(&spec_b));
    }

    // Rule 4: starvation guard. An identical active footprint means
    // neither side can dominate without starving the other every time
    // they're compared — fall back to a true tie (rule 5's group-affinity
    // tie-break decides). Footprints that overlap but are NOT identical
    // (e.g. same span and daily window but a different, partially
    // overlapping weekday set) must not collapse to the same Equal: doing
    // so would leave no stable edge between two genuinely distinct
    // bundles, which is exactly the starvation rule 4 exists to forbid.
    // Settle those deterministically instead, by end date then bundle id,
    // so the outcome never flips between runs.
    if same_active_footprint(a, b) {
        return Some(CmpOrdering::Equal);
    }

    Some(
        a.end_date_exclusive
            .cmp(&b.end_date_exclusive)
            .then_with(|| a.bundle_id.cmp(&b.bundle_id)),
    )
}

fn footprints_overlap(a: &BundleGeometry, b: &BundleGeometry) -> bool {
    let date_range_a = Interval::new(a.start_date, Some(a.end_date_exclusive));
    let date_range_b = Interval::new(b.start_date, Some(b.end_date_exclusive));
    if !date_range_a.overlaps(&date_range_b) {
        return false;
    }

    if !weekday_sets_overlap(&a.days, &b.days) {
        return false;
    }

    match (a.daily_window, b.daily_window) {
        (Some(wa), Some(wb)) => wa.overlaps(&wb),
        // Estimate unavailable: treated as potentially overlapping.
        _ => true,
    }
}

fn weekday_sets_overlap(a: &Weekdays, b: &Weekdays) -> bool {
    match (a, b) {
        (None, _) | (_, None) => true,
        (Some(WeekdayConstraint::DateParity(_)), _) | (_, Some(WeekdayConstraint::DateParity(_))) => {
            // Date parity spans every weekday across the month; treat it as
            // always potentially overlapping any weekly constraint.
            true
        }
        (Some(WeekdayConstraint::Weekly(sa)), Some(WeekdayConstraint::Weekly(sb))) => {
            sa.intersection(sb).next().is_some()
        }
    }
}

fn specificity(bundle: &BundleGeometry) -> (i64, usize, u32) {
    let scope_span_days = (bundle.end_date_exclusive - bundle.start_date).num_days();
    let weekday_coverage = bundle
        .days
        .as_ref()
        .map(|c| c.weekday_coverage_count())
        .unwrap_or(7);
    let daily_span = bundle.daily_window.map(|w| w.span_seconds()).unwrap_or(86_400);
    (scope_span_days, weekday_coverage, daily_span)
}

fn same_active_footprint(a: &BundleGeometry, b: &BundleGeometry) -> bool {
    a.start_date == b.start_date
        && a.end_date_exclusive == b.end_date_exclusive
        && a.days == b.days
        && a.daily_window == b.daily_window
}

/// Builds the precedence DAG and topologically sorts it with a soft
/// tie-break preferring the next bundle from the same `(type, target)`
/// group, then deterministic bundle-identity compare.
fn topological_order(bundles: &[BundleGeometry]) -> Result<Vec<usize>> {
    let n = bundles.len();
    let mut edges: Vec<HashSet<usize>> = vec![HashSet::new(); n];
    let mut indegree = vec![0usize; n];

    for i in 0..n {
        for j in (i + 1)..n {
            match precedence(&bundles[i], &bundles[j]) {
                Some(CmpOrdering::Less) => {
                    if edges[i].insert(j) {
                        indegree[j] += 1;
                    }
                }
                Some(CmpOrdering::Greater) => {
                    if edges[j].insert(i) {
                        indegree[i] += 1;
                    }
                }
                Some(CmpOrdering::Equal) | None => {}
            }
        }
    }

    let mut ready: Vec<usize> = (0..n).filter(|&i| indegree[i] == 0).collect();
    let mut result = Vec::with_capacity(n);
    let mut last_group: Option<(EventKind, String)> = None;

    while !ready.is_empty() {
        ready.sort_by(|&a, &b| {
            let a_group = (bundles[a].kind, bundles[a].target.clone());
            let b_group = (bundles[b].kind, bundles[b].target.clone());
            let a_matches = last_group.as_ref() == Some(&a_group);
            let b_matches = last_group.as_ref() == Some(&b_group);
            b_matches
                .cmp(&a_matches)
                .then_with(|| bundles[a].bundle_id.cmp(&bundles[b].bundle_id))
        });

        let next = ready.remove(0);
        result.push(next);
        last_group = Some((bundles[next].kind, bundles[next].target.clone()));

        for &successor in &edges[next] {
            indegree[successor] -= 1;
            if indegree[successor] == 0 {
                ready.push(successor);
            }
        }
    }

    if result.len() != n {
        // Cycle (pathological, not expected): fall back to chronological
        // tie-break among the remaining nodes.
        let mut remaining: Vec<usize> = (0..n).filter(|i| !result.contains(i)).collect();
        remaining.sort_by(|&a, &b| bundles[a].bundle_id.cmp(&bundles[b].bundle_id));
        result.extend(remaining);
    }

    Ok(result)
}

/// Intra-bundle order: overrides whose window overlaps the base come
/// first, then the base, then remaining overrides chronologically.
/// Mirrors `Bundle::sub_events_in_order` at the resolution layer,
/// recomputed here from stored sub-event geometry since storage order in
/// the manifest is not itself an ordering authority.
fn intra_bundle_order(bundle: &BundleGeometry, events: &[ManifestEvent]) -> Vec<SubEventRef> {
    let lookup = |member: &SubEventRef| -> &crate::normalize::SubEvent {
        let event = events
            .iter()
            .find(|e| e.identity_hash == member.identity_hash)
            .expect("bundle member references a known event");
        &event.sub_events[member.index]
    };

    let base_idx = bundle
        .members
        .iter()
        .position(|m| matches!(lookup(m).role, SubEventRoleTag::Base));

    let Some(base_idx) = base_idx else {
        let mut members = bundle.members.clone();
        members.sort_by_key(|m| m.identity_hash.clone());
        return members;
    };

    let base_ref = bundle.members[base_idx].clone();
    let base = lookup(&base_ref);
    let base_start = hard_date(base.timing.start_date.hard).unwrap_or(NaiveDate::MAX);
    let base_end = hard_date(base.timing.end_date.hard).unwrap_or(NaiveDate::MIN);

    let mut overlapping = Vec::new();
    let mut disjoint = Vec::new();

    for member in &bundle.members {
        if member == &base_ref {
            continue;
        }
        let sub_event = lookup(member);
        let start = hard_date(sub_event.timing.start_date.hard).unwrap_or(NaiveDate::MIN);
        let end = hard_date(sub_event.timing.end_date.hard).unwrap_or(NaiveDate::MAX);
        if start < base_end && base_start < end {
            overlapping.push(member.clone());
        } else {
            disjoint.push(member.clone());
        }
    }

    let sort_by_start = |refs: &mut Vec<SubEventRef>| {
        refs.sort_by(|a, b| {
            let sa = lookup(a);
            let sb = lookup(b);
            let da = hard_date(sa.timing.start_date.hard).unwrap_or(NaiveDate::MAX);
            let db = hard_date(sb.timing.start_date.hard).unwrap_or(NaiveDate::MAX);
            da.cmp(&db).then_with(|| a.identity_hash.cmp(&b.identity_hash))
        });
    };

    sort_by_start(&mut overlapping);
    sort_by_start(&mut disjoint);

    let mut ordered = overlapping;
    ordered.push(base_ref);
    ordered.extend(disjoint);
    ordered
}

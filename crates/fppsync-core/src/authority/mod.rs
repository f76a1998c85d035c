//! Authority & Direction: for each identity appearing on either side,
//! decides which side is temporally authoritative, derives a sync
//! direction, and flags unprovable conflicts. Pure decision logic — no
//! I/O, no manifest mutation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authority {
    Calendar,
    Fpp,
    /// Neither side's timestamp is provably newer; the desired-calendar
    /// side wins by convention to preserve deterministic idempotence.
    PlannerDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    CalendarToFpp,
    FppToCalendar,
}

/// Per-identity facts gathered from presence checks, timestamp stores, and
/// the calendar/fpp diffs against the current manifest.
#[derive(Debug, Clone)]
pub struct AuthorityInput {
    pub identity_hash: String,
    pub exists_in_calendar: bool,
    pub exists_in_fpp: bool,
    pub exists_in_current: bool,
    /// Provider `updated`, max over master + override rows for the group.
    pub calendar_timestamp: Option<i64>,
    /// Persisted per-identity/per-stateHash timestamp, or scheduler file mtime.
    pub fpp_timestamp: Option<i64>,
    /// Whether the desired-calendar manifest diverges from current for this identity.
    pub diverges_from_current_calendar: bool,
    /// Whether the desired-fpp manifest diverges from current for this identity.
    pub diverges_from_current_fpp: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityDecision {
    pub identity_hash: String,
    pub authority: Authority,
    pub direction: Direction,
    /// True when both sides diverge from current and neither is provably newer.
    pub conflict: bool,
}

/// Temporal authority resolution: exactly one timestamp wins outright,
/// both present means newer wins, equal or both missing falls back to
/// `PlannerDefault`.
fn resolve_authority(calendar_timestamp: Option<i64>, fpp_timestamp: Option<i64>) -> Authority {
    match (calendar_timestamp, fpp_timestamp) {
        (Some(_), None) => Authority::Calendar,
        (None, Some(_)) => Authority::Fpp,
        (None, None) => Authority::PlannerDefault,
        (Some(c), Some(f)) => {
            if c > f {
                Authority::Calendar
            } else if f > c {
                Authority::Fpp
            } else {
                Authority::PlannerDefault
            }
        }
    }
}

fn direction_for(authority: Authority) -> Direction {
    match authority {
        Authority::Calendar => Direction::CalendarToFpp,
        Authority::Fpp => Direction::FppToCalendar,
        Authority::PlannerDefault => Direction::CalendarToFpp,
    }
}

/// Decides authority, direction, and conflict status for one identity.
pub fn decide(input: &AuthorityInput) -> AuthorityDecision {
    let authority = resolve_authority(input.calendar_timestamp, input.fpp_timestamp);
    let conflict = authority == Authority::PlannerDefault
        && input.diverges_from_current_calendar
        && input.diverges_from_current_fpp;

    AuthorityDecision {
        identity_hash: input.identity_hash.clone(),
        authority,
        direction: direction_for(authority),
        conflict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_input() -> AuthorityInput {
        AuthorityInput {
            identity_hash: "id-1".to_string(),
            exists_in_calendar: true,
            exists_in_fpp: true,
            exists_in_current: true,
            calendar_timestamp: None,
            fpp_timestamp: None,
            diverges_from_current_calendar: false,
            diverges_from_current_fpp: false,
        }
    }

    #[test]
    fn sole_timestamp_is_authoritative() {
        let mut input = base_input();
        input.calendar_timestamp = Some(100);
        let decision = decide(&input);
        assert_eq!(decision.authority, Authority::Calendar);
        assert_eq!(decision.direction, Direction::CalendarToFpp);
    }

    #[test]
    fn newer_side_wins_when_both_present() {
        let mut input = base_input();
        input.calendar_timestamp = Some(100);
        input.fpp_timestamp = Some(200);
        let decision = decide(&input);
        assert_eq!(decision.authority, Authority::Fpp);
        assert_eq!(decision.direction, Direction::FppToCalendar);
    }

    #[test]
    fn equal_timestamps_fall_back_to_planner_default() {
        let mut input = base_input();
        input.calendar_timestamp = Some(100);
        input.fpp_timestamp = Some(100);
        let decision = decide(&input);
        assert_eq!(decision.authority, Authority::PlannerDefault);
        assert_eq!(decision.direction, Direction::CalendarToFpp);
    }

    #[test]
    fn missing_timestamps_both_sides_diverging_is_a_conflict() {
        let mut input = base_input();
        input.diverges_from_current_calendar = true;
        input.diverges_from_current_fpp = true;
        let decision = decide(&input);
        assert_eq!(decision.authority, Authority::PlannerDefault);
        assert!(decision.conflict);
    }

    #[test]
    fn single_side_divergence_is_not_a_conflict() {
        let mut input = base_input();
        input.diverges_from_current_calendar = true;
        let decision = decide(&input);
        assert!(!decision.conflict);
    }
}

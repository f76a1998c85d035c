use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Two-letter weekday code, ordered `SU < MO < TU < WE < TH < FR < SA` to
/// match the lexicographic sort required for identity hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Weekday {
    #[serde(rename = "SU")]
    Su,
    #[serde(rename = "MO")]
    Mo,
    #[serde(rename = "TU")]
    Tu,
    #[serde(rename = "WE")]
    We,
    #[serde(rename = "TH")]
    Th,
    #[serde(rename = "FR")]
    Fr,
    #[serde(rename = "SA")]
    Sa,
}

impl Weekday {
    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Su => "SU",
            Weekday::Mo => "MO",
            Weekday::Tu => "TU",
            Weekday::We => "WE",
            Weekday::Th => "TH",
            Weekday::Fr => "FR",
            Weekday::Sa => "SA",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "SU" => Ok(Weekday::Su),
            "MO" => Ok(Weekday::Mo),
            "TU" => Ok(Weekday::Tu),
            "WE" => Ok(Weekday::We),
            "TH" => Ok(Weekday::Th),
            "FR" => Ok(Weekday::Fr),
            "SA" => Ok(Weekday::Sa),
            other => Err(SyncError::InvalidTiming(format!(
                "unknown weekday code: '{other}'"
            ))),
        }
    }

    pub fn from_chrono(w: chrono::Weekday) -> Self {
        match w {
            chrono::Weekday::Mon => Weekday::Mo,
            chrono::Weekday::Tue => Weekday::Tu,
            chrono::Weekday::Wed => Weekday::We,
            chrono::Weekday::Thu => Weekday::Th,
            chrono::Weekday::Fri => Weekday::Fr,
            chrono::Weekday::Sat => Weekday::Sa,
            chrono::Weekday::Sun => Weekday::Su,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateParity {
    Odd,
    Even,
}

impl DateParity {
    pub fn matches(&self, day_of_month: u32) -> bool {
        match self {
            DateParity::Odd => day_of_month % 2 == 1,
            DateParity::Even => day_of_month % 2 == 0,
        }
    }
}

/// `days` weekday constraint: `null` (every day), a weekly set, or date
/// parity. Normalized weekly sets are sorted and deduplicated; duplicate
/// entries are treated as invalid rather than silently collapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WeekdayConstraint {
    Weekly(BTreeSet<Weekday>),
    DateParity(DateParity),
}

impl WeekdayConstraint {
    /// Builds a normalized weekly constraint, rejecting duplicate entries
    /// in the source list (the sorted `BTreeSet` would otherwise silently
    /// absorb them, masking an operator mistake).
    pub fn weekly(days: &[Weekday]) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for day in days {
            if !seen.insert(*day) {
                return Err(SyncError::InvalidTiming(format!(
                    "duplicate weekday in constraint: {}",
                    day.as_str()
                )));
            }
        }
        if seen.is_empty() {
            return Err(SyncError::InvalidTiming(
                "weekly constraint requires at least one weekday".into(),
            ));
        }
        Ok(WeekdayConstraint::Weekly(seen))
    }

    pub fn matches(&self, weekday: chrono::Weekday, day_of_month: u32) -> bool {
        match self {
            WeekdayConstraint::Weekly(set) => set.contains(&Weekday::from_chrono(weekday)),
            WeekdayConstraint::DateParity(parity) => parity.matches(day_of_month),
        }
    }

    /// Count of distinct weekdays this constraint covers in a calendar
    /// week, used by the ordering engine's specificity tiebreak.
    pub fn weekday_coverage_count(&self) -> usize {
        match self {
            WeekdayConstraint::Weekly(set) => set.len(),
            WeekdayConstraint::DateParity(_) => 7,
        }
    }
}

/// `None` means every day (no constraint).
pub type Weekdays = Option<WeekdayConstraint>;

pub fn matches_day(constraint: &Weekdays, weekday: chrono::Weekday, day_of_month: u32) -> bool {
    match constraint {
        None => true,
        Some(c) => c.matches(weekday, day_of_month),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekly_rejects_duplicates() {
        assert!(WeekdayConstraint::weekly(&[Weekday::Mo, Weekday::Mo]).is_err());
    }

    #[test]
    fn weekly_sorts_lexicographically() {
        let c = WeekdayConstraint::weekly(&[Weekday::Fr, Weekday::Mo, Weekday::Su]).expect("ok");
        if let WeekdayConstraint::Weekly(set) = c {
            let ordered: Vec<_> = set.into_iter().collect();
            assert_eq!(ordered, vec![Weekday::Su, Weekday::Mo, Weekday::Fr]);
        } else {
            panic!("expected weekly");
        }
    }

    #[test]
    fn date_parity_matches_day_of_month() {
        assert!(DateParity::Odd.matches(11));
        assert!(!DateParity::Odd.matches(12));
        assert!(DateParity::Even.matches(12));
    }
}

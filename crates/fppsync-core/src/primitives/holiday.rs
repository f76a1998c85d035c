use chrono::{Datelike, NaiveDate, Weekday as ChronoWeekday};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// A named holiday token, preserved verbatim through normalization and
/// identity/state hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd)]
pub enum HolidayToken {
    NewYearsDay,
    ValentinesDay,
    StPatricksDay,
    Easter,
    MemorialDay,
    IndependenceDay,
    LaborDay,
    Halloween,
    Thanksgiving,
    ChristmasEve,
    Christmas,
    NewYearsEve,
    /// Any token not in the known set above, kept verbatim for round-trip
    /// fidelity. Rejected by `resolve`/`parse_strict` in strict mode.
    Other(String),
}

impl HolidayToken {
    pub fn as_str(&self) -> &str {
        match self {
            HolidayToken::NewYearsDay => "NewYearsDay",
            HolidayToken::ValentinesDay => "ValentinesDay",
            HolidayToken::StPatricksDay => "StPatricksDay",
            HolidayToken::Easter => "Easter",
            HolidayToken::MemorialDay => "MemorialDay",
            HolidayToken::IndependenceDay => "IndependenceDay",
            HolidayToken::LaborDay => "LaborDay",
            HolidayToken::Halloween => "Halloween",
            HolidayToken::Thanksgiving => "Thanksgiving",
            HolidayToken::ChristmasEve => "ChristmasEve",
            HolidayToken::Christmas => "Christmas",
            HolidayToken::NewYearsEve => "NewYearsEve",
            HolidayToken::Other(raw) => raw.as_str(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw {
            "NewYearsDay" => HolidayToken::NewYearsDay,
            "ValentinesDay" => HolidayToken::ValentinesDay,
            "StPatricksDay" => HolidayToken::StPatricksDay,
            "Easter" => HolidayToken::Easter,
            "MemorialDay" => HolidayToken::MemorialDay,
            "IndependenceDay" => HolidayToken::IndependenceDay,
            "LaborDay" => HolidayToken::LaborDay,
            "Halloween" => HolidayToken::Halloween,
            "Thanksgiving" => HolidayToken::Thanksgiving,
            "ChristmasEve" => HolidayToken::ChristmasEve,
            "Christmas" => HolidayToken::Christmas,
            "NewYearsEve" => HolidayToken::NewYearsEve,
            other => HolidayToken::Other(other.to_string()),
        }
    }

    pub fn parse_strict(raw: &str) -> Result<Self> {
        let token = Self::parse(raw);
        if matches!(token, HolidayToken::Other(_)) {
            return Err(SyncError::InvalidHoliday(raw.to_string()));
        }
        Ok(token)
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, HolidayToken::Other(_))
    }
}

impl Serialize for HolidayToken {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for HolidayToken {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(HolidayToken::parse(&raw))
    }
}

/// Resolves a local calendar date to the holiday it falls on, if any.
/// Deterministic, stateless, used only to annotate `DateValue.symbolic`
/// fields at ingest time; never derives `hard` from the resolution.
pub fn resolve(date: NaiveDate) -> Option<HolidayToken> {
    let (month, day) = (date.month(), date.day());

    match (month, day) {
        (1, 1) => return Some(HolidayToken::NewYearsDay),
        (2, 14) => return Some(HolidayToken::ValentinesDay),
        (3, 17) => return Some(HolidayToken::StPatricksDay),
        (7, 4) => return Some(HolidayToken::IndependenceDay),
        (10, 31) => return Some(HolidayToken::Halloween),
        (12, 24) => return Some(HolidayToken::ChristmasEve),
        (12, 25) => return Some(HolidayToken::Christmas),
        (12, 31) => return Some(HolidayToken::NewYearsEve),
        _ => {}
    }

    if date == easter_sunday(date.year()) {
        return Some(HolidayToken::Easter);
    }
    if date == nth_weekday_of_month(date.year(), 9, ChronoWeekday::Mon, 1) {
        return Some(HolidayToken::LaborDay);
    }
    if date == last_weekday_of_month(date.year(), 5, ChronoWeekday::Mon) {
        return Some(HolidayToken::MemorialDay);
    }
    if date == nth_weekday_of_month(date.year(), 11, ChronoWeekday::Thu, 4) {
        return Some(HolidayToken::Thanksgiving);
    }

    None
}

/// `nth` occurrence (1-indexed) of `weekday` in `month`/`year`.
fn nth_weekday_of_month(year: i32, month: u32, weekday: ChronoWeekday, nth: u32) -> NaiveDate {
    let first_of_month = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    let first_weekday = first_of_month.weekday();
    let offset = (7 + weekday.num_days_from_monday() as i64
        - first_weekday.num_days_from_monday() as i64)
        % 7;
    let day = 1 + offset + 7 * (nth as i64 - 1);
    first_of_month + chrono::Duration::days(day - 1)
}

fn last_weekday_of_month(year: i32, month: u32, weekday: ChronoWeekday) -> NaiveDate {
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid month");
    let last_of_month = next_month_first - chrono::Duration::days(1);
    let back = (7 + last_of_month.weekday().num_days_from_monday() as i64
        - weekday.num_days_from_monday() as i64)
        % 7;
    last_of_month - chrono::Duration::days(back)
}

/// Anonymous Gregorian algorithm for the date of Easter Sunday.
fn easter_sunday(year: i32) -> NaiveDate {
    let a = year % 19;
    let b = year / 100;
    let c = year % 100;
    let d = b / 4;
    let e = b % 4;
    let f = (b + 8) / 25;
    let g = (b - f + 1) / 3;
    let h = (19 * a + b - d - g + 15) % 30;
    let i = c / 4;
    let k = c % 4;
    let l = (32 + 2 * e + 2 * i - h - k) % 7;
    let m = (a + 11 * h + 22 * l) / 451;
    let month = (h + l - 7 * m + 114) / 31;
    let day = (h + l - 7 * m + 114) % 31 + 1;
    NaiveDate::from_ymd_opt(year, month as u32, day as u32).expect("valid easter date")
}

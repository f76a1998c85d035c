use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};
use crate::primitives::holiday::HolidayToken;

/// A date pattern: `YYYY-MM-DD` with any of year/month/day independently
/// wildcarded (`0000` for year, `00` for month or day). Each field is kept
/// as `Option<u32>`, `None` meaning wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DatePattern {
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
}

impl DatePattern {
    pub fn exact(year: i32, month: u32, day: u32) -> Result<Self> {
        let pattern = Self {
            year: Some(year),
            month: Some(month),
            day: Some(day),
        };
        pattern.validate()?;
        Ok(pattern)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split('-').collect();
        if parts.len() != 3 {
            return Err(SyncError::InvalidTiming(format!(
                "date pattern must be YYYY-MM-DD, got '{raw}'"
            )));
        }

        let year = parse_field(parts[0], "0000")?;
        let month = parse_field(parts[1], "00")?;
        let day = parse_field(parts[2], "00")?;

        let pattern = Self { year, month, day };
        pattern.validate()?;
        Ok(pattern)
    }

    fn validate(&self) -> Result<()> {
        if let Some(m) = self.month {
            if !(1..=12).contains(&m) {
                return Err(SyncError::InvalidTiming(format!(
                    "month out of range: {m}"
                )));
            }
        }
        if let Some(d) = self.day {
            if !(1..=31).contains(&d) {
                return Err(SyncError::InvalidTiming(format!("day out of range: {d}")));
            }
        }
        Ok(())
    }

    pub fn is_wildcarded(&self) -> bool {
        self.year.is_none() || self.month.is_none() || self.day.is_none()
    }

    pub fn to_canonical_string(&self) -> String {
        let year = self
            .year
            .map(|y| format!("{y:04}"))
            .unwrap_or_else(|| "0000".to_string());
        let month = self
            .month
            .map(|m| format!("{m:02}"))
            .unwrap_or_else(|| "00".to_string());
        let day = self
            .day
            .map(|d| format!("{d:02}"))
            .unwrap_or_else(|| "00".to_string());
        format!("{year}-{month}-{day}")
    }

    /// Does this pattern match a concrete calendar date, field-by-field,
    /// treating wildcards as always-matching.
    pub fn matches(&self, year: i32, month: u32, day: u32) -> bool {
        self.year.map(|y| y == year).unwrap_or(true)
            && self.month.map(|m| m == month).unwrap_or(true)
            && self.day.map(|d| d == day).unwrap_or(true)
    }
}

fn parse_field(raw: &str, wildcard: &str) -> Result<Option<i32>> {
    if raw == wildcard {
        return Ok(None);
    }
    raw.parse::<i32>()
        .map(Some)
        .map_err(|_| SyncError::InvalidTiming(format!("invalid date field: '{raw}'")))
}

impl Serialize for DatePattern {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for DatePattern {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DatePattern::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// `DateValue`: `{hard, symbolic}`, at least one present. `hard` is never
/// derived from `symbolic` during normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateValue {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hard: Option<DatePattern>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub symbolic: Option<HolidayToken>,
}

impl DateValue {
    pub fn hard(pattern: DatePattern) -> Self {
        Self {
            hard: Some(pattern),
            symbolic: None,
        }
    }

    pub fn symbolic(token: HolidayToken) -> Self {
        Self {
            hard: None,
            symbolic: Some(token),
        }
    }

    pub fn annotated(pattern: DatePattern, token: HolidayToken) -> Self {
        Self {
            hard: Some(pattern),
            symbolic: Some(token),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.hard.is_none() && self.symbolic.is_none() {
            return Err(SyncError::InvalidTiming(
                "DateValue requires a hard or symbolic value".into(),
            ));
        }
        Ok(())
    }

    pub fn is_symbolic_only(&self) -> bool {
        self.hard.is_none() && self.symbolic.is_some()
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Result, SyncError};

/// Symbolic time-of-day token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub enum SymbolicToken {
    Dawn,
    SunRise,
    SunSet,
    Dusk,
}

impl SymbolicToken {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolicToken::Dawn => "Dawn",
            SymbolicToken::SunRise => "SunRise",
            SymbolicToken::SunSet => "SunSet",
            SymbolicToken::Dusk => "Dusk",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "Dawn" => Ok(SymbolicToken::Dawn),
            "SunRise" => Ok(SymbolicToken::SunRise),
            "SunSet" => Ok(SymbolicToken::SunSet),
            "Dusk" => Ok(SymbolicToken::Dusk),
            other => Err(SyncError::InvalidTiming(format!(
                "unknown symbolic time token: '{other}'"
            ))),
        }
    }
}

/// `TimeValue`: `{hard: "HH:MM:SS"|null, symbolic, offset}`. Exactly one of
/// hard/symbolic must be set unless representing an all-day field (which
/// must be entirely null, see `Timing::validate`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeValue {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub hard: Option<HardTime>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub symbolic: Option<SymbolicToken>,
    #[serde(default)]
    pub offset: i32,
}

impl TimeValue {
    pub fn hard(time: HardTime) -> Self {
        Self {
            hard: Some(time),
            symbolic: None,
            offset: 0,
        }
    }

    pub fn symbolic(token: SymbolicToken, offset: i32) -> Self {
        Self {
            hard: None,
            symbolic: Some(token),
            offset,
        }
    }

    pub fn validate(&self) -> Result<()> {
        match (&self.hard, &self.symbolic) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            (None, None) => Err(SyncError::InvalidTiming(
                "TimeValue requires a hard or symbolic value".into(),
            )),
            (Some(_), Some(_)) => Err(SyncError::InvalidTiming(
                "TimeValue cannot mix hard and symbolic without explicit provenance".into(),
            )),
        }
    }

    pub fn is_symbolic(&self) -> bool {
        self.symbolic.is_some()
    }
}

/// A validated `HH:MM:SS` wall-clock time. `24:00:00` is representable
/// because FPP scheduler end-times preserve it verbatim; it is never
/// collapsed to `00:00:00` of the next day during normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HardTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl HardTime {
    pub fn new(hour: u8, minute: u8, second: u8) -> Result<Self> {
        if hour > 24 || minute > 59 || second > 59 || (hour == 24 && (minute != 0 || second != 0))
        {
            return Err(SyncError::InvalidTiming(format!(
                "invalid time {hour:02}:{minute:02}:{second:02}"
            )));
        }
        Ok(Self {
            hour,
            minute,
            second,
        })
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let parts: Vec<&str> = raw.split(':').collect();
        if parts.len() != 3 {
            return Err(SyncError::InvalidTiming(format!(
                "time must be HH:MM:SS, got '{raw}'"
            )));
        }
        let hour: u8 = parts[0]
            .parse()
            .map_err(|_| SyncError::InvalidTiming(format!("invalid hour in '{raw}'")))?;
        let minute: u8 = parts[1]
            .parse()
            .map_err(|_| SyncError::InvalidTiming(format!("invalid minute in '{raw}'")))?;
        let second: u8 = parts[2]
            .parse()
            .map_err(|_| SyncError::InvalidTiming(format!("invalid second in '{raw}'")))?;
        Self::new(hour, minute, second)
    }

    pub fn to_canonical_string(&self) -> String {
        format!("{:02}:{:02}:{:02}", self.hour, self.minute, self.second)
    }

    pub fn seconds_since_midnight(&self) -> u32 {
        self.hour as u32 * 3600 + self.minute as u32 * 60 + self.second as u32
    }
}

impl Serialize for HardTime {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_canonical_string())
    }
}

impl<'de> Deserialize<'de> for HardTime {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        HardTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

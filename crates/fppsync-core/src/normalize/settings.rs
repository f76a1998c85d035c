use std::collections::BTreeMap;

use crate::error::{Result, SyncError};

/// Typed view of the opaque `[settings]` INI block carried verbatim by the
/// ingest adapter. Unknown keys are
/// preserved in `extra` for round-trip fidelity; nothing here repairs a
/// malformed block, it only fails loudly or leaves fields `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    pub event_type: Option<String>,
    pub enabled: Option<bool>,
    pub stop_type: Option<i64>,
    pub repeat: Option<i64>,
    pub all_day: bool,
    pub start_hard: Option<String>,
    pub start_symbolic: Option<String>,
    pub start_offset: i32,
    pub end_hard: Option<String>,
    pub end_symbolic: Option<String>,
    pub end_offset: i32,
    pub extra: BTreeMap<String, String>,
}

const KNOWN_KEYS: &[&str] = &[
    "type",
    "enabled",
    "stoptype",
    "repeat",
    "all_day",
    "start_hard",
    "start_symbolic",
    "start_offset",
    "end_hard",
    "end_symbolic",
    "end_offset",
];

/// Parses the `[settings]` block out of an event description. Lines before
/// the `[settings]` header (free-text notes) are ignored; `#`-prefixed
/// lines and blanks are skipped.
pub fn parse_settings(description: &str) -> Result<Settings> {
    let mut settings = Settings::default();
    let mut in_block = false;

    for raw_line in description.lines() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.eq_ignore_ascii_case("[settings]") {
            in_block = true;
            continue;
        }
        if !in_block {
            continue;
        }
        if line.starts_with('[') {
            break;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| {
            SyncError::MalformedRow(format!("invalid settings line: '{raw_line}'"))
        })?;
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        match key.as_str() {
            "type" => settings.event_type = Some(value),
            "enabled" => settings.enabled = Some(parse_bool(&value)),
            "stoptype" => {
                settings.stop_type = Some(value.parse().map_err(|_| {
                    SyncError::MalformedRow(format!("invalid stopType '{value}'"))
                })?)
            }
            "repeat" => {
                settings.repeat = Some(
                    value
                        .parse()
                        .map_err(|_| SyncError::MalformedRow(format!("invalid repeat '{value}'")))?,
                )
            }
            "all_day" => settings.all_day = parse_bool(&value),
            "start_hard" => settings.start_hard = non_empty(value),
            "start_symbolic" => settings.start_symbolic = non_empty(value),
            "start_offset" => {
                settings.start_offset = value.parse().map_err(|_| {
                    SyncError::MalformedRow(format!("invalid start_offset '{value}'"))
                })?
            }
            "end_hard" => settings.end_hard = non_empty(value),
            "end_symbolic" => settings.end_symbolic = non_empty(value),
            "end_offset" => {
                settings.end_offset = value.parse().map_err(|_| {
                    SyncError::MalformedRow(format!("invalid end_offset '{value}'"))
                })?
            }
            other => {
                if !KNOWN_KEYS.contains(&other) {
                    settings.extra.insert(key, value);
                }
            }
        }
    }

    Ok(settings)
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_block() {
        let text = "Notes first.\n[settings]\ntype=playlist\nenabled=true\nstopType=0\nrepeat=0\n";
        let settings = parse_settings(text).expect("parse");
        assert_eq!(settings.event_type.as_deref(), Some("playlist"));
        assert_eq!(settings.enabled, Some(true));
        assert_eq!(settings.stop_type, Some(0));
    }

    #[test]
    fn parses_symbolic_time_with_offset() {
        let text = "[settings]\ntype=playlist\nstart_symbolic=SunSet\nstart_offset=-30\n";
        let settings = parse_settings(text).expect("parse");
        assert_eq!(settings.start_symbolic.as_deref(), Some("SunSet"));
        assert_eq!(settings.start_offset, -30);
    }

    #[test]
    fn preserves_unknown_keys() {
        let text = "[settings]\ntype=playlist\ncustom_flag=42\n";
        let settings = parse_settings(text).expect("parse");
        assert_eq!(settings.extra.get("custom_flag").map(String::as_str), Some("42"));
    }

    #[test]
    fn rejects_malformed_line() {
        let text = "[settings]\nnotakeyvalue\n";
        assert!(parse_settings(text).is_err());
    }

    #[test]
    fn ignores_trailing_sections() {
        let text = "[settings]\ntype=command\n[other]\nignored=true\n";
        let settings = parse_settings(text).expect("parse");
        assert!(settings.extra.is_empty());
        assert_eq!(settings.event_type.as_deref(), Some("command"));
    }
}

//! Ambient configuration: one TOML file resolved via an explicit
//! override, then an environment variable, then a well-known default
//! path, merged over built-in defaults.

use std::fs;
use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{info, warn};

use crate::apply::WritabilityPolicy;
use crate::error::{Result, SyncError};
use crate::reconcile::SyncMode;

#[derive(Debug, Clone, Deserialize, Default)]
struct RawConfig {
    data_dir: Option<PathBuf>,
    schedule_path: Option<PathBuf>,
    local_timezone: Option<String>,
    latitude_deg: Option<f64>,
    longitude_offset_minutes: Option<i32>,
    timezone_offset_minutes: Option<i32>,
    calendar_id: Option<String>,
    provider: Option<String>,
    sync_mode: Option<String>,
    fpp_writable: Option<bool>,
    calendar_writable: Option<bool>,
    fail_on_blocked: Option<bool>,
}

/// Resolved runtime configuration for one sync run.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub schedule_path: PathBuf,
    pub local_timezone: Tz,
    pub latitude_deg: Option<f64>,
    pub longitude_offset_minutes: i32,
    pub timezone_offset_minutes: i32,
    pub calendar_id: String,
    pub provider: String,
    pub sync_mode: SyncMode,
    pub writability: WritabilityPolicy,
    pub loaded_from: Option<PathBuf>,
}

impl Config {
    /// Loads config from `override_path`, or `FPPSYNC_CONFIG`, or
    /// `~/.config/fppsync/config.toml`, falling back to built-in defaults
    /// when none exists.
    #[tracing::instrument(skip(override_path))]
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let path = resolve_config_path(override_path);
        let raw = match &path {
            Some(path) if path.exists() => {
                info!(config = %path.display(), "loading config file");
                let text = fs::read_to_string(path)?;
                toml::from_str(&text)
                    .map_err(|err| SyncError::InvariantViolation(format!("invalid config at {}: {err}", path.display())))?
            }
            Some(path) => {
                warn!(config = %path.display(), "config file not found; using defaults");
                RawConfig::default()
            }
            None => {
                warn!("no config path resolvable; using defaults");
                RawConfig::default()
            }
        };

        let data_dir = raw.data_dir.unwrap_or(default_data_dir()?);
        let schedule_path = raw
            .schedule_path
            .unwrap_or_else(|| PathBuf::from("/home/fpp/media/config/schedule.json"));
        let local_timezone: Tz = raw
            .local_timezone
            .as_deref()
            .unwrap_or("UTC")
            .parse()
            .map_err(|_| SyncError::InvariantViolation(format!(
                "invalid local_timezone '{}'",
                raw.local_timezone.as_deref().unwrap_or("UTC")
            )))?;
        let sync_mode = parse_sync_mode(raw.sync_mode.as_deref().unwrap_or("both"))?;

        Ok(Self {
            data_dir,
            schedule_path,
            local_timezone,
            latitude_deg: raw.latitude_deg,
            longitude_offset_minutes: raw.longitude_offset_minutes.unwrap_or(0),
            timezone_offset_minutes: raw.timezone_offset_minutes.unwrap_or(0),
            calendar_id: raw.calendar_id.unwrap_or_else(|| "primary".to_string()),
            provider: raw.provider.unwrap_or_else(|| "google-calendar".to_string()),
            sync_mode,
            writability: WritabilityPolicy {
                fpp: raw.fpp_writable.unwrap_or(true),
                calendar: raw.calendar_writable.unwrap_or(true),
                fail_on_blocked: raw.fail_on_blocked.unwrap_or(true),
            },
            loaded_from: path,
        })
    }

    /// Applies `key=value` overrides on top of an already-loaded config,
    /// Taskwarrior `rc.key=value`-style: process-lifetime only, never
    /// written back to the TOML file. Unknown keys and malformed values are
    /// rejected rather than silently ignored.
    pub fn apply_overrides(&mut self, overrides: &[String]) -> Result<()> {
        for raw in overrides {
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                SyncError::InvariantViolation(format!("invalid --set override '{raw}', expected key=value"))
            })?;
            self.apply_override(key.trim(), value.trim())?;
        }
        Ok(())
    }

    fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "schedule_path" => self.schedule_path = PathBuf::from(value),
            "local_timezone" => {
                self.local_timezone = value
                    .parse()
                    .map_err(|_| SyncError::InvariantViolation(format!("invalid local_timezone '{value}'")))?;
            }
            "latitude_deg" => {
                self.latitude_deg = Some(value.parse().map_err(|_| {
                    SyncError::InvariantViolation(format!("invalid latitude_deg '{value}'"))
                })?);
            }
            "longitude_offset_minutes" => {
                self.longitude_offset_minutes = value.parse().map_err(|_| {
                    SyncError::InvariantViolation(format!("invalid longitude_offset_minutes '{value}'"))
                })?;
            }
            "timezone_offset_minutes" => {
                self.timezone_offset_minutes = value.parse().map_err(|_| {
                    SyncError::InvariantViolation(format!("invalid timezone_offset_minutes '{value}'"))
                })?;
            }
            "calendar_id" => self.calendar_id = value.to_string(),
            "provider" => self.provider = value.to_string(),
            "sync_mode" => self.sync_mode = parse_sync_mode(value)?,
            "fpp_writable" => self.writability.fpp = parse_bool_override(value)?,
            "calendar_writable" => self.writability.calendar = parse_bool_override(value)?,
            "fail_on_blocked" => self.writability.fail_on_blocked = parse_bool_override(value)?,
            other => {
                return Err(SyncError::InvariantViolation(format!(
                    "unknown --set key '{other}'"
                )));
            }
        }
        Ok(())
    }

    pub fn ordering_context(&self) -> crate::order::OrderingContext {
        crate::order::OrderingContext {
            latitude_deg: self.latitude_deg,
            longitude_offset_minutes: self.longitude_offset_minutes,
            timezone_offset_minutes: self.timezone_offset_minutes,
            step_minutes: 1,
        }
    }
}

fn parse_bool_override(raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(SyncError::InvariantViolation(format!("invalid boolean override '{other}'"))),
    }
}

fn parse_sync_mode(raw: &str) -> Result<SyncMode> {
    match raw.to_ascii_lowercase().as_str() {
        "both" => Ok(SyncMode::Both),
        "calendar-to-fpp" | "calendar_to_fpp" => Ok(SyncMode::CalendarToFpp),
        "fpp-to-calendar" | "fpp_to_calendar" => Ok(SyncMode::FppToCalendar),
        other => Err(SyncError::InvariantViolation(format!(
            "unknown sync_mode '{other}'; expected both, calendar-to-fpp, or fpp-to-calendar"
        ))),
    }
}

fn resolve_config_path(override_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = override_path {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var("FPPSYNC_CONFIG") {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|dir| dir.join("fppsync").join("config.toml"))
}

fn default_data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir().ok_or_else(|| {
        SyncError::InvariantViolation("cannot determine a default data directory".into())
    })?;
    Ok(base.join("fppsync"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_sync_modes() {
        assert_eq!(parse_sync_mode("both").unwrap(), SyncMode::Both);
        assert_eq!(parse_sync_mode("calendar-to-fpp").unwrap(), SyncMode::CalendarToFpp);
        assert_eq!(parse_sync_mode("fpp-to-calendar").unwrap(), SyncMode::FppToCalendar);
    }

    #[test]
    fn rejects_unknown_sync_mode() {
        assert!(parse_sync_mode("sideways").is_err());
    }

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let cfg = Config::load(Some(Path::new("/nonexistent/fppsync-config-test.toml"))).expect("load");
        assert_eq!(cfg.sync_mode, SyncMode::Both);
        assert_eq!(cfg.calendar_id, "primary");
    }

    #[test]
    fn set_override_replaces_a_loaded_field_without_touching_the_file() {
        let mut cfg = Config::load(Some(Path::new("/nonexistent/fppsync-config-test.toml"))).expect("load");
        cfg.apply_overrides(&["calendar_id=holiday-lights".to_string(), "sync_mode=calendar-to-fpp".to_string()])
            .expect("apply overrides");
        assert_eq!(cfg.calendar_id, "holiday-lights");
        assert_eq!(cfg.sync_mode, SyncMode::CalendarToFpp);
    }

    #[test]
    fn set_override_rejects_unknown_key() {
        let mut cfg = Config::load(Some(Path::new("/nonexistent/fppsync-config-test.toml"))).expect("load");
        assert!(cfg.apply_overrides(&["not_a_real_key=x".to_string()]).is_err());
    }

    #[test]
    fn set_override_rejects_missing_equals() {
        let mut cfg = Config::load(Some(Path::new("/nonexistent/fppsync-config-test.toml"))).expect("load");
        assert!(cfg.apply_overrides(&["calendar_id".to_string()]).is_err());
    }
}

//! Thin control-plane shell: every command here resolves a
//! `Config`, does the minimum work the command implies, and renders the
//! stable `Envelope`. No reconciliation logic lives here — it all comes
//! from `fppsync_core`.

use std::fs;

use serde_json::json;
use tracing::info;
use uuid::Uuid;

use fppsync_core::apply::ApplyMode;
use fppsync_core::persistence::{manifest_store, tombstone_store, ManifestStore, TombstoneStore};
use fppsync_core::provider::GoogleCalendarProvider;
use fppsync_core::{run_sync, Config, SyncError};

use crate::auth::{FileTokenStore, TokenStore};
use crate::cli::Command;
use crate::envelope::Envelope;

pub async fn dispatch(
    cfg: &Config,
    command: Command,
    access_token: Option<String>,
    now_epoch: i64,
) -> (Envelope, Option<SyncError>) {
    match command {
        Command::Status => status(cfg),
        Command::Diagnostics => diagnostics(cfg),
        Command::Preview => run_pipeline(cfg, access_token, ApplyMode::Plan, now_epoch).await,
        Command::Apply { dry_run } => {
            let mode = if dry_run { ApplyMode::DryRun } else { ApplyMode::Apply };
            run_pipeline(cfg, access_token, mode, now_epoch).await
        }
        Command::SetCalendar { calendar_id } => set_config_string(cfg, "calendar_id", &calendar_id),
        Command::SetSyncMode { mode } => set_sync_mode(cfg, &mode),
        Command::AuthStatus => auth_status(cfg),
        Command::AuthClear => auth_clear(cfg),
    }
}

fn status(cfg: &Config) -> (Envelope, Option<SyncError>) {
    let manifest_store = ManifestStore::new(manifest_store::path_under(&cfg.data_dir));
    let tombstone_store = TombstoneStore::new(tombstone_store::path_under(&cfg.data_dir));

    let manifest = match manifest_store.load() {
        Ok(m) => m,
        Err(err) => return (Envelope::from_error(&err), Some(err)),
    };
    let tombstones = match tombstone_store.load() {
        Ok(t) => t,
        Err(err) => return (Envelope::from_error(&err), Some(err)),
    };

    let details = json!({
        "calendarId": cfg.calendar_id,
        "syncMode": format!("{:?}", cfg.sync_mode),
        "schedulePath": cfg.schedule_path.display().to_string(),
        "manifestEventCount": manifest.as_ref().map(|m| m.events.len()).unwrap_or(0),
        "manifestGeneratedAtEpoch": manifest.as_ref().map(|m| m.generated_at_epoch),
        "pendingCalendarTombstones": tombstones.sources.calendar.len(),
        "pendingFppTombstones": tombstones.sources.fpp.len(),
    });
    (Envelope::ok(details), None)
}

fn diagnostics(cfg: &Config) -> (Envelope, Option<SyncError>) {
    let manifest_store = ManifestStore::new(manifest_store::path_under(&cfg.data_dir));
    let tombstone_store = TombstoneStore::new(tombstone_store::path_under(&cfg.data_dir));

    let manifest = match manifest_store.load() {
        Ok(m) => m,
        Err(err) => return (Envelope::from_error(&err), Some(err)),
    };
    let tombstones = match tombstone_store.load() {
        Ok(t) => t,
        Err(err) => return (Envelope::from_error(&err), Some(err)),
    };

    let events = manifest
        .as_ref()
        .map(|m| m.events.values().collect::<Vec<_>>())
        .unwrap_or_default();
    let managed = events.iter().filter(|e| e.ownership.managed).count();
    let unmanaged = events.len() - managed;

    let details = json!({
        "managedEvents": managed,
        "unmanagedEvents": unmanaged,
        "pendingTombstones": tombstones.sources.calendar.len() + tombstones.sources.fpp.len(),
        "lastApplyEpoch": manifest.as_ref().map(|m| m.generated_at_epoch),
    });
    (Envelope::ok(details), None)
}

async fn run_pipeline(
    cfg: &Config,
    access_token: Option<String>,
    mode: ApplyMode,
    now_epoch: i64,
) -> (Envelope, Option<SyncError>) {
    let access_token = match access_token {
        Some(t) => t,
        None => {
            let err = SyncError::InvariantViolation(
                "an access token is required: pass --access-token or set FPPSYNC_ACCESS_TOKEN".into(),
            );
            return (Envelope::from_error(&err), Some(err));
        }
    };
    let provider = GoogleCalendarProvider::new(access_token);

    let correlation_id = Uuid::new_v4().to_string();
    info!(%correlation_id, ?mode, "running sync pipeline");

    match run_sync(cfg, &provider, mode, now_epoch).await {
        Ok(outcome) => {
            let details = json!({
                "correlationId": correlation_id,
                "mode": format!("{mode:?}"),
                "plan": outcome.plan,
                "apply": outcome.apply,
            });
            (Envelope::ok(details), None)
        }
        Err(err) => (Envelope::from_error(&err), Some(err)),
    }
}

fn set_config_string(cfg: &Config, key: &str, value: &str) -> (Envelope, Option<SyncError>) {
    match update_config_field(cfg, key, toml::Value::String(value.to_string())) {
        Ok(()) => (Envelope::ok(json!({ key: value })), None),
        Err(err) => (Envelope::from_error(&err), Some(err)),
    }
}

fn set_sync_mode(cfg: &Config, mode: &str) -> (Envelope, Option<SyncError>) {
    let normalized = mode.to_ascii_lowercase();
    if !matches!(normalized.as_str(), "both" | "calendar-to-fpp" | "fpp-to-calendar") {
        let err = SyncError::InvariantViolation(format!(
            "unknown sync_mode '{mode}'; expected both, calendar-to-fpp, or fpp-to-calendar"
        ));
        return (Envelope::from_error(&err), Some(err));
    }
    set_config_string(cfg, "sync_mode", &normalized)
}

fn update_config_field(cfg: &Config, key: &str, value: toml::Value) -> fppsync_core::Result<()> {
    let path = cfg.loaded_from.clone().ok_or_else(|| {
        SyncError::InvariantViolation("no config path resolvable; cannot persist a setting".into())
    })?;

    let mut doc: toml::Value = if path.exists() {
        let text = fs::read_to_string(&path)?;
        toml::from_str(&text).map_err(|err| {
            SyncError::InvariantViolation(format!("invalid config at {}: {err}", path.display()))
        })?
    } else {
        toml::Value::Table(toml::value::Table::new())
    };

    if let Some(table) = doc.as_table_mut() {
        table.insert(key.to_string(), value);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let rendered = toml::to_string_pretty(&doc)
        .map_err(|err| SyncError::InvariantViolation(format!("failed to render config: {err}")))?;
    fs::write(&path, rendered)?;
    Ok(())
}

fn auth_status(cfg: &Config) -> (Envelope, Option<SyncError>) {
    let store = FileTokenStore::new(&cfg.data_dir);
    match store.read() {
        Ok(Some(token)) => (
            Envelope::ok(json!({ "authenticated": true, "obtainedAtEpoch": token.obtained_at_epoch })),
            None,
        ),
        Ok(None) => (Envelope::ok(json!({ "authenticated": false })), None),
        Err(err) => {
            let err = SyncError::Io(err.to_string());
            (Envelope::from_error(&err), Some(err))
        }
    }
}

fn auth_clear(cfg: &Config) -> (Envelope, Option<SyncError>) {
    let store = FileTokenStore::new(&cfg.data_dir);
    match store.clear() {
        Ok(()) => (Envelope::ok(json!({ "cleared": true })), None),
        Err(err) => {
            let err = SyncError::Io(err.to_string());
            (Envelope::from_error(&err), Some(err))
        }
    }
}

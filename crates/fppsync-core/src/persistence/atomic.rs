use std::fs;
use std::io::Write;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{Result, SyncError};

/// Reads and parses a JSON file, returning `None` if it does not exist yet
/// (every store in this module is create-on-first-write).
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let value = serde_json::from_str(&raw)?;
    Ok(Some(value))
}

/// Atomic write via temp-file + rename, creating the parent directory if
/// needed.
#[tracing::instrument(skip(value), fields(path = %path.display()))]
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let serialized = serde_json::to_string_pretty(value)?;
    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(serialized.as_bytes())?;
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| SyncError::Io(format!("failed to persist {}: {err}", path.display())))?;

    debug!(bytes = serialized.len(), "wrote file atomically");
    Ok(())
}

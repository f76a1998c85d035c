use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::persistence::atomic::{read_json, write_json_atomic};

/// FPP event timestamps: `{identityHash → epoch}` and
/// `{stateHash → epoch}`, best-effort — a miss just means the FPP side
/// falls back to the scheduler file's mtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FppTimestampFile {
    #[serde(default)]
    pub by_identity: BTreeMap<String, i64>,
    #[serde(default)]
    pub by_state_hash: BTreeMap<String, i64>,
}

pub struct TimestampStore {
    path: PathBuf,
}

impl TimestampStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<FppTimestampFile> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    #[tracing::instrument(skip(self, file))]
    pub fn save(&self, file: &FppTimestampFile) -> Result<()> {
        write_json_atomic(&self.path, file)
    }
}

pub fn path_under(data_dir: &Path) -> PathBuf {
    data_dir.join("runtime").join("fpp_timestamps.json")
}

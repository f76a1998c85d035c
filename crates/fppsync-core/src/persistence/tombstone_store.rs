use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::persistence::atomic::{read_json, write_json_atomic};

const CURRENT_VERSION: u32 = 1;

/// `runtime/tombstones.json`: calendar entries are keyed
/// `calendarScope::identityHash`; fpp entries are keyed by identity hash.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TombstoneSources {
    #[serde(default)]
    pub calendar: BTreeMap<String, i64>,
    #[serde(default)]
    pub fpp: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TombstoneFile {
    pub version: u32,
    pub generated_at_epoch: i64,
    pub sources: TombstoneSources,
}

impl TombstoneFile {
    pub fn new(generated_at_epoch: i64, sources: TombstoneSources) -> Self {
        Self {
            version: CURRENT_VERSION,
            generated_at_epoch,
            sources,
        }
    }

    /// Tombstones expire when both sides converge to absence.
    /// `still_present` returns true for any scoped/identity key that should
    /// be kept (its identity still appears on at least one side this run).
    pub fn retain_active(&mut self, still_present: impl Fn(&str) -> bool) {
        self.sources.calendar.retain(|key, _| still_present(key));
        self.sources.fpp.retain(|key, _| still_present(key));
    }
}

pub struct TombstoneStore {
    path: PathBuf,
}

impl TombstoneStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<TombstoneFile> {
        Ok(read_json(&self.path)?.unwrap_or_else(|| TombstoneFile::new(0, TombstoneSources::default())))
    }

    #[tracing::instrument(skip(self, file))]
    pub fn save(&self, file: &TombstoneFile) -> Result<()> {
        write_json_atomic(&self.path, file)?;
        info!(
            calendar = file.sources.calendar.len(),
            fpp = file.sources.fpp.len(),
            "persisted tombstones"
        );
        Ok(())
    }
}

pub fn path_under(data_dir: &Path) -> PathBuf {
    data_dir.join("runtime").join("tombstones.json")
}

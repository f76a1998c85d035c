use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ingest::calendar_raw::RawCalendarEvent;
use crate::persistence::atomic::{read_json, write_json_atomic};

/// Calendar snapshot cache: the last raw provider rows read,
/// used for diagnostics and to compute calendar-side timestamps without a
/// live provider round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarSnapshot {
    pub calendar_id: String,
    pub events: Vec<RawCalendarEvent>,
    pub generated_at_epoch: i64,
}

pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<Option<CalendarSnapshot>> {
        read_json(&self.path)
    }

    #[tracing::instrument(skip(self, snapshot))]
    pub fn save(&self, snapshot: &CalendarSnapshot) -> Result<()> {
        write_json_atomic(&self.path, snapshot)
    }
}

pub fn path_under(data_dir: &Path) -> PathBuf {
    data_dir.join("runtime").join("calendar_snapshot.json")
}

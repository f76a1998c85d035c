use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::normalize::ManifestEvent;
use crate::persistence::atomic::{read_json, write_json_atomic};

const CURRENT_VERSION: u32 = 1;

/// `manifest.json`: the persisted current manifest, keyed by
/// identity hash so the on-disk representation is naturally sorted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestFile {
    pub version: u32,
    pub generated_at_epoch: i64,
    pub events: BTreeMap<String, ManifestEvent>,
}

impl ManifestFile {
    pub fn new(generated_at_epoch: i64, events: Vec<ManifestEvent>) -> Self {
        let mut map = BTreeMap::new();
        for event in events {
            map.insert(event.identity_hash.clone(), event);
        }
        Self {
            version: CURRENT_VERSION,
            generated_at_epoch,
            events: map,
        }
    }
}

pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[tracing::instrument(skip(self))]
    pub fn load(&self) -> Result<Option<ManifestFile>> {
        read_json(&self.path)
    }

    #[tracing::instrument(skip(self, manifest))]
    pub fn save(&self, manifest: &ManifestFile) -> Result<()> {
        write_json_atomic(&self.path, manifest)?;
        info!(events = manifest.events.len(), "persisted current manifest");
        Ok(())
    }
}

pub fn path_under(data_dir: &Path) -> PathBuf {
    data_dir.join("manifest.json")
}

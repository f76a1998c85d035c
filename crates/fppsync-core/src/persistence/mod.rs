//! Persistence: four atomic-write JSON stores
//! — current manifest, tombstones, FPP timestamps, calendar snapshot
//! cache — all sharing the temp-file-then-rename pattern in `atomic`.

pub mod atomic;
pub mod manifest_store;
pub mod snapshot_cache;
pub mod timestamp_store;
pub mod tombstone_store;

pub use manifest_store::{ManifestFile, ManifestStore};
pub use snapshot_cache::{CalendarSnapshot, SnapshotCache};
pub use timestamp_store::{FppTimestampFile, TimestampStore};
pub use tombstone_store::{TombstoneFile, TombstoneSources, TombstoneStore};

//! Intent normalizer: turns a resolved bundle
//! plus its opaque settings text into a `ManifestEvent` with identity hash
//! and state hash, enforcing the data-model invariants.

pub mod fpp_event;
pub mod hash;
pub mod manifest_event;
pub mod settings;

pub use fpp_event::{FppNormalizeContext, normalize_fpp_event};
pub use manifest_event::{
    Behavior, Controller, Correlation, EventKind, Identity, ManifestEvent, NormalizeContext,
    Ownership, Provenance, StatusFlags, SubEvent, SubEventRoleTag, Timing, TimingIdentity,
    normalize_bundle,
};
pub use settings::{Settings, parse_settings};

//! Resolution Engine: expands a recurring
//! calendar event plus its EXDATEs and per-occurrence overrides into
//! contiguous `Bundle`s of `{base, overrides}` execution units, preserving
//! reversibility metadata so Apply→Calendar can reconstruct a single
//! parent recurring event.

pub mod bundle;
pub mod overrides;
pub mod rrule;

pub use bundle::{Bundle, ResolvedSubEvent, SubEventRole, resolve_bundles};

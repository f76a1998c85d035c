//! Raw ingest adapters: translate provider-native
//! rows into canonical raw events, with no semantic interpretation. The
//! calendar side yields `RawCalendarEvent`; the FPP side reads scheduler
//! rows directly into manifest-shape events (identity re-derived from
//! geometry, not from row order).

pub mod calendar_raw;
pub mod fpp_raw;

pub use calendar_raw::{CalendarRow, RawCalendarEvent};
pub use fpp_raw::{FppSchedulerRow, IngestedFppEvent};

//! Provider & scheduler-backend contracts. The Google Calendar client is
//! modeled as an abstract external collaborator; this module defines the
//! trait boundary and one reference HTTP implementation.

pub mod google_calendar;

use async_trait::async_trait;

use crate::error::Result;
use crate::ingest::calendar_raw::CalendarRow;

/// One calendar CRUD round-trip result, carrying the provider's assigned
/// id and optimistic-concurrency etag back to the caller.
#[derive(Debug, Clone)]
pub struct ProviderEvent {
    pub row: CalendarRow,
    pub provider_event_id: String,
    pub etag: Option<String>,
}

/// Abstract calendar provider contract. Implementations own their own
/// authentication; tokens are never passed through this trait.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    async fn list_events(&self, calendar_id: &str) -> Result<Vec<CalendarRow>>;
    async fn insert_event(&self, calendar_id: &str, row: CalendarRow) -> Result<ProviderEvent>;
    async fn update_event(
        &self,
        calendar_id: &str,
        provider_event_id: &str,
        row: CalendarRow,
        etag: Option<&str>,
    ) -> Result<ProviderEvent>;
    async fn delete_event(&self, calendar_id: &str, provider_event_id: &str) -> Result<()>;
}

/// Abstract scheduler backend contract. The file-backed implementation
/// lives in `apply::fpp_writer`; this trait exists so the apply engine
/// can be exercised against a stub in tests.
pub trait SchedulerBackend {
    fn load_schedule(&self) -> Result<Vec<crate::ingest::fpp_raw::FppSchedulerRow>>;
    fn write_schedule(&self, rows: &[crate::ingest::fpp_raw::FppSchedulerRow]) -> Result<()>;
}

pub use google_calendar::GoogleCalendarProvider;

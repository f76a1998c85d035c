//! Reference `CalendarProvider` implementation against the Google Calendar
//! v3 REST API. Grounded in a plain HTTP client pattern: a bare
//! `reqwest::Client`, bearer auth, JSON in/out, status-code-driven error
//! mapping (no retries or backoff here — that belongs to the caller's
//! sync loop, not the provider).

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use crate::error::{Result, SyncError};
use crate::ingest::calendar_raw::CalendarRow;
use crate::provider::{CalendarProvider, ProviderEvent};

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Authenticates with a caller-supplied bearer access token. Token
/// refresh is out of scope for this provider; callers are expected to
/// hand in a live token per call site.
pub struct GoogleCalendarProvider {
    client: Client,
    access_token: String,
}

impl GoogleCalendarProvider {
    pub fn new(access_token: String) -> Self {
        Self {
            client: Client::new(),
            access_token,
        }
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{API_BASE}/calendars/{}/events",
            urlencoding_path_segment(calendar_id)
        )
    }

    fn event_url(&self, calendar_id: &str, event_id: &str) -> String {
        format!(
            "{API_BASE}/calendars/{}/events/{}",
            urlencoding_path_segment(calendar_id),
            urlencoding_path_segment(event_id)
        )
    }

    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        if status == StatusCode::PRECONDITION_FAILED {
            return Err(SyncError::EtagMismatch(
                "calendar event changed since it was last read".to_string(),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Provider(format!(
                "google calendar returned HTTP {status}: {body}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|err| SyncError::Provider(format!("failed to parse response: {err}")))
    }
}

#[async_trait::async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    async fn list_events(&self, calendar_id: &str) -> Result<Vec<CalendarRow>> {
        let mut rows = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(self.events_url(calendar_id))
                .bearer_auth(&self.access_token)
                .query(&[("singleEvents", "false"), ("showDeleted", "true")]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request
                .send()
                .await
                .map_err(|err| SyncError::Provider(format!("list_events request failed: {err}")))?;
            let page: EventListResponse = Self::handle_response(response).await?;

            rows.extend(page.items);
            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        Ok(rows)
    }

    async fn insert_event(&self, calendar_id: &str, row: CalendarRow) -> Result<ProviderEvent> {
        let response = self
            .client
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(&row)
            .send()
            .await
            .map_err(|err| SyncError::Provider(format!("insert_event request failed: {err}")))?;

        let inserted: CalendarRow = Self::handle_response(response).await?;
        Ok(ProviderEvent {
            provider_event_id: inserted.id.clone(),
            etag: extract_etag(&inserted),
            row: inserted,
        })
    }

    async fn update_event(
        &self,
        calendar_id: &str,
        provider_event_id: &str,
        row: CalendarRow,
        etag: Option<&str>,
    ) -> Result<ProviderEvent> {
        let mut request = self
            .client
            .put(self.event_url(calendar_id, provider_event_id))
            .bearer_auth(&self.access_token)
            .json(&row);
        if let Some(etag) = etag {
            request = request.header(reqwest::header::IF_MATCH, etag);
        }

        let response = request
            .send()
            .await
            .map_err(|err| SyncError::Provider(format!("update_event request failed: {err}")))?;

        let updated: CalendarRow = Self::handle_response(response).await?;
        Ok(ProviderEvent {
            provider_event_id: updated.id.clone(),
            etag: extract_etag(&updated),
            row: updated,
        })
    }

    async fn delete_event(&self, calendar_id: &str, provider_event_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.event_url(calendar_id, provider_event_id))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|err| SyncError::Provider(format!("delete_event request failed: {err}")))?;

        let status = response.status();
        // Google returns 410 Gone for events already deleted server-side;
        // deletion is idempotent from the caller's point of view.
        if status.is_success() || status == StatusCode::GONE || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        if status == StatusCode::PRECONDITION_FAILED {
            return Err(SyncError::EtagMismatch(
                "calendar event changed since it was last read".to_string(),
            ));
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Provider(format!(
            "google calendar returned HTTP {status}: {body}"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct EventListResponse {
    #[serde(default)]
    items: Vec<CalendarRow>,
    #[serde(default, rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Google's etag is carried in a top-level field, not exposed on our
/// trimmed `CalendarRow`. Until the wire type grows an explicit field,
/// `ExtendedProperties` never carries it, so there is nothing to
/// extract — a live integration would add an `etag: Option<String>`
/// field to `CalendarRow` itself rather than smuggling it through here.
fn extract_etag(_row: &CalendarRow) -> Option<String> {
    None
}

fn urlencoding_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'@' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_segment_escapes_reserved_characters() {
        assert_eq!(urlencoding_path_segment("primary"), "primary");
        assert_eq!(
            urlencoding_path_segment("team@example.com"),
            "team@example.com"
        );
        assert_eq!(urlencoding_path_segment("a b"), "a%20b");
    }
}

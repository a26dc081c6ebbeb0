//! Fetching raw calendar text from remote feeds.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::error::IngestError;

pub const GOOGLE_CALENDAR_BASE_URL: &str = "https://calendar.google.com/calendar/ical";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of raw calendar text, addressed by an opaque identifier.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, calendar_id: &str) -> Result<String, IngestError>;
}

/// Public Google Calendar iCal export.
#[derive(Debug, Clone)]
pub struct GoogleCalendarFeed {
    client: Client,
    base_url: String,
}

impl GoogleCalendarFeed {
    pub fn new() -> Result<Self, IngestError> {
        Self::with_base_url(GOOGLE_CALENDAR_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, IngestError> {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(concat!("chunky-ingest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| IngestError::Fetch(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn feed_url(&self, calendar_id: &str) -> Result<String, IngestError> {
        let id = calendar_id.trim();
        if id.is_empty() || id.contains('/') || id.chars().any(char::is_whitespace) {
            return Err(IngestError::InvalidInput(format!(
                "Invalid calendar id: '{calendar_id}'"
            )));
        }
        Ok(format!("{}/{id}/public/basic.ics", self.base_url))
    }
}

#[async_trait]
impl FeedSource for GoogleCalendarFeed {
    async fn fetch(&self, calendar_id: &str) -> Result<String, IngestError> {
        let url = self.feed_url(calendar_id)?;
        tracing::info!("Fetching calendar feed {url}");

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| IngestError::Fetch(format!("{url}: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(IngestError::Fetch(format!("{url}: HTTP {status}")));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| IngestError::Fetch(format!("{url}: {e}")))?;
        if !text.contains("BEGIN:VCALENDAR") {
            return Err(IngestError::Fetch(format!("{url}: invalid iCal data received")));
        }

        tracing::info!(
            "Fetched {} characters, {} events",
            text.len(),
            text.matches("BEGIN:VEVENT").count()
        );
        Ok(text)
    }
}

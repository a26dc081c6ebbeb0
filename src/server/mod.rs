mod conversions;
mod types;

pub(crate) use conversions::*;
pub(crate) use types::*;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_router,
};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::calendar::attributes::AttributeBag;
use crate::calendar::diagnostics::ParseDiagnostics;
use crate::calendar::event::{Link, LogicalEvent};
use crate::calendar::{filter_events_by_date_range, CalendarStore};
use crate::config::IngestOptions;
use crate::error::IngestError;
use crate::feed::{FeedSource, GoogleCalendarFeed};
use crate::ical_bridge::CalendarParser;

const DEFAULT_CALENDAR: &str = "default";

#[derive(Clone)]
pub struct IngestServer {
    store: Arc<RwLock<CalendarStore>>,
    options: IngestOptions,
    feed: Arc<dyn FeedSource>,
}

#[derive(Debug, Serialize)]
struct LoadReport {
    calendar_name: String,
    events_loaded: usize,
    diagnostics: ParseDiagnostics,
}

#[derive(Debug, Serialize)]
struct EffectiveView {
    uid: String,
    name: String,
    date: NaiveDate,
    is_exception: bool,
    attributes: AttributeBag,
    links: Vec<Link>,
}

impl ServerHandler for IngestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "chunky-ingest".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Chunky Ingest normalizes public event calendars. \
                 Load a calendar with load_ical (raw ICS text) or load_google_feed (public Google Calendar id). \
                 Each load replaces the named calendar and reports parse diagnostics. \
                 Recurring events are merged with their date-specific exceptions: use list_occurrences or list_period \
                 to see concrete dates, and get_effective_attributes to see what applies on one date."
                    .into(),
            ),
        }
    }
}

// -- Tool implementations --

#[tool_router]
impl IngestServer {
    pub fn new(options: IngestOptions) -> Result<Self, IngestError> {
        Ok(Self::with_feed(options, GoogleCalendarFeed::new()?))
    }

    // === Hydration ===

    #[tool(description = "Parse iCal/ICS text into normalized events and store them under a calendar name, replacing what was there. Recurring events are merged with their exceptions. Returns parse diagnostics.")]
    async fn load_ical(
        &self,
        params: Parameters<LoadIcalParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let report = self
            .ingest(
                &params.ical_data,
                params.calendar_name.as_deref(),
                params.default_timezone.as_deref(),
                None,
            )
            .await
            .map_err(ingest_err)?;
        Ok(json_text(&report))
    }

    #[tool(description = "Fetch a public Google Calendar feed by calendar id, parse it, and store it under a calendar name, replacing what was there. Returns parse diagnostics.")]
    async fn load_google_feed(
        &self,
        params: Parameters<LoadGoogleFeedParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let text = self.feed.fetch(&params.calendar_id).await.map_err(ingest_err)?;
        let report = self
            .ingest(
                &text,
                params.calendar_name.as_deref(),
                params.default_timezone.as_deref(),
                Some(format!("google:{}", params.calendar_id)),
            )
            .await
            .map_err(ingest_err)?;
        Ok(json_text(&report))
    }

    // === Querying ===

    #[tool(description = "List loaded calendars with event counts, source and whether the last parse was degraded.")]
    async fn list_calendars(&self) -> Result<CallToolResult, McpError> {
        let store = self.store.read().await;
        Ok(json_text(&store.summaries()))
    }

    #[tool(description = "List the normalized events of a calendar, with exceptions. With start and end, only events that occur in that range are returned.")]
    async fn list_events(
        &self,
        params: Parameters<ListEventsParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let store = self.store.read().await;
        let events = Self::events_in(&store, &params).map_err(ingest_err)?;
        Ok(json_text(&events))
    }

    #[tool(description = "List concrete event occurrences within a time range. Expands recurring events and applies date-specific exceptions. Returns occurrences sorted by start time.")]
    async fn list_occurrences(
        &self,
        params: Parameters<ListOccurrencesParams>,
    ) -> Result<CallToolResult, McpError> {
        let start = parse_datetime(&params.0.start).map_err(ingest_err)?;
        let end = parse_datetime(&params.0.end).map_err(ingest_err)?;

        let store = self.store.read().await;
        let occs = store
            .occurrences_in_range(start, end, params.0.calendar_name.as_deref())
            .map_err(ingest_err)?;

        Ok(json_text(&occs))
    }

    #[tool(description = "List occurrences for the week (Sunday to Saturday) or month containing a date, in the server's default timezone.")]
    async fn list_period(
        &self,
        params: Parameters<ListPeriodParams>,
    ) -> Result<CallToolResult, McpError> {
        let date = match params.0.date.as_deref() {
            Some(date) => parse_date(date).map_err(ingest_err)?,
            None => Utc::now().date_naive(),
        };
        let (start, end) = period_range(
            &params.0.period,
            date,
            self.options.default_timezone.as_deref(),
        )
        .map_err(ingest_err)?;

        let store = self.store.read().await;
        let occs = store
            .occurrences_in_range(start, end, params.0.calendar_name.as_deref())
            .map_err(ingest_err)?;

        Ok(json_text(&occs))
    }

    #[tool(description = "Get the attributes and links in force for an event on one date: the master's values with that date's exception applied.")]
    async fn get_effective_attributes(
        &self,
        params: Parameters<EffectiveAttributesParams>,
    ) -> Result<CallToolResult, McpError> {
        let params = params.0;
        let date = parse_date(&params.date).map_err(ingest_err)?;
        let store = self.store.read().await;
        let event = store
            .find_event(calendar_or_default(params.calendar_name.as_deref()), &params.event)
            .map_err(ingest_err)?;
        Ok(json_text(&effective_view(event, date)))
    }

    #[tool(description = "Get the diagnostics of the last parse of a calendar: occurrences seen and parsed, skipped blocks, invalid lines, defaulted timestamps, zone fallbacks and rejected URLs.")]
    async fn get_diagnostics(
        &self,
        params: Parameters<CalendarParams>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.store.read().await;
        let cal = store
            .get_calendar(calendar_or_default(params.0.calendar_name.as_deref()))
            .map_err(ingest_err)?;
        Ok(json_text(cal.diagnostics()))
    }

    // === Mutations ===

    #[tool(description = "Remove all events from a calendar.")]
    async fn clear_calendar(
        &self,
        params: Parameters<CalendarParams>,
    ) -> Result<CallToolResult, McpError> {
        let mut store = self.store.write().await;
        store
            .get_calendar_mut(calendar_or_default(params.0.calendar_name.as_deref()))
            .map_err(ingest_err)?
            .clear();

        Ok(json_text(&serde_json::json!({ "cleared": true })))
    }

    // === Export ===

    #[tool(description = "Export a calendar's normalized events as a JSON array.")]
    async fn export_json(
        &self,
        params: Parameters<CalendarParams>,
    ) -> Result<CallToolResult, McpError> {
        let store = self.store.read().await;
        let cal = store
            .get_calendar(calendar_or_default(params.0.calendar_name.as_deref()))
            .map_err(ingest_err)?;
        Ok(json_text(&cal.events()))
    }
}

impl IngestServer {
    pub fn with_feed(options: IngestOptions, feed: impl FeedSource + 'static) -> Self {
        Self {
            store: Arc::new(RwLock::new(CalendarStore::new())),
            options,
            feed: Arc::new(feed),
        }
    }

    pub fn into_router(self) -> rmcp::handler::server::router::Router<Self> {
        let mut router = rmcp::handler::server::router::Router::new(self);
        router.tool_router = Self::tool_router();
        router
    }

    async fn ingest(
        &self,
        text: &str,
        calendar_name: Option<&str>,
        zone: Option<&str>,
        source: Option<String>,
    ) -> Result<LoadReport, IngestError> {
        let options = call_options(&self.options, zone)?;
        let outcome = CalendarParser::new(options).parse(text);
        let name = calendar_or_default(calendar_name);
        let report = LoadReport {
            calendar_name: name.to_string(),
            events_loaded: outcome.events.len(),
            diagnostics: outcome.diagnostics.clone(),
        };

        let mut store = self.store.write().await;
        store
            .get_or_create_calendar(name)
            .load(outcome, source.or_else(|| Some("inline".to_string())));
        Ok(report)
    }

    fn events_in<'s>(
        store: &'s CalendarStore,
        params: &ListEventsParams,
    ) -> Result<Vec<&'s LogicalEvent>, IngestError> {
        let cal = store.get_calendar(calendar_or_default(params.calendar_name.as_deref()))?;
        match (params.start.as_deref(), params.end.as_deref()) {
            (Some(start), Some(end)) => {
                filter_events_by_date_range(cal.events(), parse_datetime(start)?, parse_datetime(end)?)
            }
            (None, None) => Ok(cal.events().iter().collect()),
            _ => Err(IngestError::InvalidTimeRange(
                "Both start and end are required to filter events".to_string(),
            )),
        }
    }
}

fn calendar_or_default(name: Option<&str>) -> &str {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_CALENDAR)
}

fn effective_view(event: &LogicalEvent, date: NaiveDate) -> EffectiveView {
    EffectiveView {
        uid: event.uid.clone(),
        name: event
            .exception_for(date)
            .and_then(|ex| ex.name.clone())
            .unwrap_or_else(|| event.name.clone()),
        date,
        is_exception: event.exception_for(date).is_some(),
        attributes: event.effective_attributes(date),
        links: event.effective_links(date),
    }
}

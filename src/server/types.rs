use schemars::JsonSchema;
use serde::Deserialize;

// -- Tool parameter structs --

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct LoadIcalParams {
    #[schemars(description = "The iCal/ICS data as a string")]
    pub(crate) ical_data: String,
    #[schemars(description = "Calendar name. Replaces the calendar's events. Defaults to 'default'.")]
    pub(crate) calendar_name: Option<String>,
    #[schemars(description = "IANA timezone for floating times (e.g. 'America/New_York'). Overrides the server default and, when enabled, the feed's X-WR-TIMEZONE.")]
    pub(crate) default_timezone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct LoadGoogleFeedParams {
    #[schemars(description = "Public Google Calendar id (e.g. 'abc123@group.calendar.google.com')")]
    pub(crate) calendar_id: String,
    #[schemars(description = "Calendar name. Replaces the calendar's events. Defaults to 'default'.")]
    pub(crate) calendar_name: Option<String>,
    #[schemars(description = "IANA timezone for floating times. Overrides the server default and, when enabled, the feed's X-WR-TIMEZONE.")]
    pub(crate) default_timezone: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ListEventsParams {
    #[schemars(description = "Calendar name. Defaults to 'default'.")]
    pub(crate) calendar_name: Option<String>,
    #[schemars(description = "Only events occurring at or after this time (ISO 8601). Requires 'end'.")]
    pub(crate) start: Option<String>,
    #[schemars(description = "Only events occurring before this time (ISO 8601). Requires 'start'.")]
    pub(crate) end: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ListOccurrencesParams {
    #[schemars(description = "Start of time range (ISO 8601)")]
    pub(crate) start: String,
    #[schemars(description = "End of time range (ISO 8601)")]
    pub(crate) end: String,
    #[schemars(description = "Calendar name. If omitted, queries all calendars.")]
    pub(crate) calendar_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct ListPeriodParams {
    #[schemars(description = "Either 'week' (Sunday to Saturday) or 'month'")]
    pub(crate) period: String,
    #[schemars(description = "Any date inside the period (YYYY-MM-DD). Defaults to today.")]
    pub(crate) date: Option<String>,
    #[schemars(description = "Calendar name. If omitted, queries all calendars.")]
    pub(crate) calendar_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct EffectiveAttributesParams {
    #[schemars(description = "Event uid or slug")]
    pub(crate) event: String,
    #[schemars(description = "Calendar date (YYYY-MM-DD)")]
    pub(crate) date: String,
    #[schemars(description = "Calendar name. Defaults to 'default'.")]
    pub(crate) calendar_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub(crate) struct CalendarParams {
    #[schemars(description = "Calendar name. Defaults to 'default'.")]
    pub(crate) calendar_name: Option<String>,
}

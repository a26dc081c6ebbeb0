pub mod assemble;
pub mod attributes;
pub mod diagnostics;
pub mod event;
pub mod lines;
pub mod merge;
pub mod time_utils;

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::IngestError;
use crate::ical_bridge::ParseOutcome;
use diagnostics::ParseDiagnostics;
use event::{EventOccurrence, LogicalEvent};

const MAX_RECURRENCE_OCCURRENCES: u16 = 1000;

#[derive(Debug)]
pub struct Calendar {
    name: String,
    events: Vec<LogicalEvent>,
    diagnostics: ParseDiagnostics,
    source: Option<String>,
    loaded_at: Option<DateTime<Utc>>,
}

/// What a listing shows about a loaded calendar.
#[derive(Debug, Clone, Serialize)]
pub struct CalendarSummary {
    pub name: String,
    pub event_count: usize,
    pub source: Option<String>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub degraded: bool,
}

impl Calendar {
    pub fn new(name: String) -> Self {
        Self {
            name,
            events: Vec::new(),
            diagnostics: ParseDiagnostics::default(),
            source: None,
            loaded_at: None,
        }
    }

    /// Replace the calendar contents with a fresh parse.
    pub fn load(&mut self, outcome: ParseOutcome, source: Option<String>) {
        self.events = outcome.events;
        self.diagnostics = outcome.diagnostics;
        self.source = source;
        self.loaded_at = Some(Utc::now());
    }

    pub fn events(&self) -> &[LogicalEvent] {
        &self.events
    }

    pub fn diagnostics(&self) -> &ParseDiagnostics {
        &self.diagnostics
    }

    /// Look up by uid, or by slug ignoring case.
    pub fn find_event(&self, key: &str) -> Option<&LogicalEvent> {
        self.events
            .iter()
            .find(|e| e.uid == key)
            .or_else(|| self.events.iter().find(|e| e.slug.eq_ignore_ascii_case(key)))
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.diagnostics = ParseDiagnostics::default();
        self.source = None;
        self.loaded_at = None;
    }

    pub fn summary(&self) -> CalendarSummary {
        CalendarSummary {
            name: self.name.clone(),
            event_count: self.events.len(),
            source: self.source.clone(),
            loaded_at: self.loaded_at,
            degraded: self.diagnostics.is_degraded(),
        }
    }

    pub fn occurrences_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventOccurrence>, IngestError> {
        check_range(start, end)?;
        let mut occurrences = Vec::new();
        for event in &self.events {
            match expand_event(event, start, end) {
                Ok(mut event_occs) => occurrences.append(&mut event_occs),
                Err(e) => tracing::warn!("Skipping \"{}\": {e}", event.name),
            }
        }
        occurrences.sort_by_key(|o| o.start);
        Ok(occurrences)
    }
}

fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), IngestError> {
    if start >= end {
        return Err(IngestError::InvalidTimeRange(format!(
            "start ({start}) must be before end ({end})"
        )));
    }
    Ok(())
}

impl LogicalEvent {
    /// Concrete occurrences within `[start, end)`, exceptions applied.
    pub fn occurrences_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EventOccurrence>, IngestError> {
        check_range(start, end)?;
        expand_event(self, start, end)
    }
}

/// Calendar date of `instant` in the event's zone, UTC when the zone is unknown.
fn local_date(instant: DateTime<Utc>, zone: Option<&Tz>) -> NaiveDate {
    match zone {
        Some(tz) => instant.with_timezone(tz).date_naive(),
        None => instant.date_naive(),
    }
}

fn occurrence_on(
    event: &LogicalEvent,
    date: NaiveDate,
    start: DateTime<Utc>,
    duration: Option<TimeDelta>,
) -> EventOccurrence {
    let exception = event.exception_for(date);
    let (start, end) = match exception {
        Some(ex) => (ex.start_date, ex.end_date.or_else(|| duration.map(|d| ex.start_date + d))),
        None => (start, duration.map(|d| start + d)),
    };
    EventOccurrence {
        uid: event.uid.clone(),
        name: exception
            .and_then(|ex| ex.name.clone())
            .unwrap_or_else(|| event.name.clone()),
        slug: event.slug.clone(),
        date,
        start,
        end,
        is_recurring: event.recurring,
        is_exception: exception.is_some(),
        attributes: event.effective_attributes(date),
    }
}

/// Expand an event (possibly recurring) into concrete occurrences within a range.
fn expand_event(
    event: &LogicalEvent,
    range_start: DateTime<Utc>,
    range_end: DateTime<Utc>,
) -> Result<Vec<EventOccurrence>, IngestError> {
    let zone = event.timezone.as_deref().and_then(|z| z.parse::<Tz>().ok());
    let duration = event.end_date.map(|end| end - event.start_date);

    let Some(ref recurrence) = event.recurrence else {
        let event_end = event.end_date.unwrap_or(event.start_date);
        let overlaps = if event_end > event.start_date {
            event.start_date < range_end && event_end > range_start
        } else {
            event.start_date >= range_start && event.start_date < range_end
        };
        if overlaps {
            let date = local_date(event.start_date, zone.as_ref());
            return Ok(vec![occurrence_on(event, date, event.start_date, duration)]);
        }
        return Ok(vec![]);
    };

    // Expanding in the event's own zone keeps the wall-clock time stable
    // across DST changes.
    let dtstart = match zone {
        Some(tz) => format!(
            "DTSTART;TZID={}:{}",
            tz.name(),
            event.start_date.with_timezone(&tz).format("%Y%m%dT%H%M%S")
        ),
        None => format!("DTSTART:{}", event.start_date.format("%Y%m%dT%H%M%SZ")),
    };
    let rrule_str = format!("{dtstart}\nRRULE:{recurrence}");

    let rrule_set: rrule::RRuleSet = rrule_str
        .parse()
        .map_err(|e| IngestError::InvalidRrule(format!("{recurrence}: {e}")))?;

    let tz_start = range_start.with_timezone(&rrule::Tz::UTC);
    let tz_end = range_end.with_timezone(&rrule::Tz::UTC);

    let result = rrule_set
        .after(tz_start)
        .before(tz_end)
        .all(MAX_RECURRENCE_OCCURRENCES);
    if result.limited {
        tracing::warn!(
            "Recurrence of \"{}\" truncated at {MAX_RECURRENCE_OCCURRENCES} occurrences",
            event.name
        );
    }

    Ok(result
        .dates
        .into_iter()
        .map(|dt| {
            let date = dt.date_naive();
            occurrence_on(event, date, dt.with_timezone(&Utc), duration)
        })
        .collect())
}

/// Events with at least one occurrence in `[start, end)`. Events whose
/// recurrence rule cannot be expanded are left out.
pub fn filter_events_by_date_range(
    events: &[LogicalEvent],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<&LogicalEvent>, IngestError> {
    check_range(start, end)?;
    Ok(events
        .iter()
        .filter(|event| match expand_event(event, start, end) {
            Ok(occurrences) => !occurrences.is_empty(),
            Err(e) => {
                tracing::warn!("Skipping \"{}\": {e}", event.name);
                false
            }
        })
        .collect())
}

#[derive(Debug)]
pub struct CalendarStore {
    calendars: HashMap<String, Calendar>,
}

impl Default for CalendarStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalendarStore {
    pub fn new() -> Self {
        let mut calendars = HashMap::new();
        calendars.insert("default".to_string(), Calendar::new("default".to_string()));
        Self { calendars }
    }

    /// Get or create a calendar by name (case-insensitive).
    pub fn get_or_create_calendar(&mut self, name: &str) -> &mut Calendar {
        let key = name.to_lowercase();
        self.calendars
            .entry(key.clone())
            .or_insert_with(|| Calendar::new(key))
    }

    pub fn get_calendar(&self, name: &str) -> Result<&Calendar, IngestError> {
        self.calendars
            .get(&name.to_lowercase())
            .ok_or_else(|| IngestError::CalendarNotFound(name.to_string()))
    }

    pub fn get_calendar_mut(&mut self, name: &str) -> Result<&mut Calendar, IngestError> {
        self.calendars
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| IngestError::CalendarNotFound(name.to_string()))
    }

    pub fn summaries(&self) -> Vec<CalendarSummary> {
        let mut summaries: Vec<_> = self.calendars.values().map(Calendar::summary).collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    pub fn find_event(&self, calendar_name: &str, key: &str) -> Result<&LogicalEvent, IngestError> {
        self.get_calendar(calendar_name)?
            .find_event(key)
            .ok_or_else(|| IngestError::EventNotFound(key.to_string()))
    }

    /// Collect occurrences across all calendars or a specific one.
    pub fn occurrences_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        calendar_name: Option<&str>,
    ) -> Result<Vec<EventOccurrence>, IngestError> {
        let mut all = Vec::new();
        match calendar_name {
            Some(name) => {
                all = self.get_calendar(name)?.occurrences_in_range(start, end)?;
            }
            None => {
                for cal in self.calendars.values() {
                    let mut occs = cal.occurrences_in_range(start, end)?;
                    all.append(&mut occs);
                }
                all.sort_by_key(|o| o.start);
            }
        }
        Ok(all)
    }
}

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::attributes::AttributeBag;
use super::time_utils::{ResolvedTime, TimeSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Website,
    Instagram,
    Facebook,
    Gmaps,
}

impl LinkKind {
    pub fn label(self) -> &'static str {
        match self {
            LinkKind::Website => "🌐 Website",
            LinkKind::Instagram => "📷 Instagram",
            LinkKind::Facebook => "📘 Facebook",
            LinkKind::Gmaps => "🗺️ Google Maps",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub url: String,
    pub label: String,
}

impl Link {
    pub fn new(kind: LinkKind, url: String) -> Self {
        Self {
            kind,
            url,
            label: kind.label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Parse a `"lat,lng"` location string.
    pub fn parse(raw: &str) -> Option<Self> {
        let (lat, lng) = raw.split_once(',')?;
        let lat: f64 = lat.trim().parse().ok()?;
        let lng: f64 = lng.trim().parse().ok()?;
        (lat.is_finite() && lng.is_finite()).then_some(Self { lat, lng })
    }
}

/// One titled `VEVENT` block after timestamp resolution and description
/// extraction. Lives only for the duration of a parse call.
#[derive(Debug, Clone, PartialEq)]
pub struct RawOccurrence {
    pub number: usize,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: ResolvedTime,
    pub end: Option<ResolvedTime>,
    pub rrule: Option<String>,
    pub uid: Option<String>,
    /// Calendar date named by `RECURRENCE-ID`; `Some` marks an exception.
    pub recurrence_date: Option<NaiveDate>,
    pub attributes: Option<AttributeBag>,
}

impl RawOccurrence {
    pub fn is_exception(&self) -> bool {
        self.recurrence_date.is_some()
    }

    pub fn timezone(&self) -> Option<&str> {
        self.start.zone.as_deref()
    }
}

/// Date-specific replacement values for a recurring event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceptionOverride {
    /// Set only when the exception renames the event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub time: String,
    pub attributes: AttributeBag,
}

/// A master occurrence merged with its exceptions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogicalEvent {
    pub uid: String,
    pub name: String,
    pub slug: String,
    pub short_name: String,
    pub day: String,
    pub time: String,
    pub event_type: String,
    pub recurring: bool,
    pub recurrence: Option<String>,
    pub start_date: DateTime<Utc>,
    pub start_source: TimeSource,
    pub end_date: Option<DateTime<Utc>>,
    pub timezone: Option<String>,
    pub location: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub attributes: AttributeBag,
    pub links: Vec<Link>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub exceptions: BTreeMap<NaiveDate, ExceptionOverride>,
}

impl LogicalEvent {
    pub fn exception_for(&self, date: NaiveDate) -> Option<&ExceptionOverride> {
        self.exceptions.get(&date)
    }

    /// Attributes in force on `date`: the master's, with that date's
    /// exception applied key by key.
    pub fn effective_attributes(&self, date: NaiveDate) -> AttributeBag {
        match self.exception_for(date) {
            Some(exception) => self.attributes.overlay(&exception.attributes),
            None => self.attributes.clone(),
        }
    }

    pub fn effective_links(&self, date: NaiveDate) -> Vec<Link> {
        match self.exception_for(date) {
            Some(_) => self.effective_attributes(date).links(),
            None => self.links.clone(),
        }
    }
}

/// One concrete date of a [`LogicalEvent`] within a queried range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventOccurrence {
    pub uid: String,
    pub name: String,
    pub slug: String,
    pub date: NaiveDate,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub is_recurring: bool,
    pub is_exception: bool,
    pub attributes: AttributeBag,
}

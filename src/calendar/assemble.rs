//! Turns merged groups into output records.

use std::collections::BTreeMap;

use super::event::{Coordinates, ExceptionOverride, LogicalEvent, RawOccurrence};
use super::merge::MergedGroup;
use super::time_utils::{day_name, format_time_range, ResolvedTime, TimeSource, TimestampResolver};

const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "at", "in", "on", "with", "for", "of", "to", "a", "an",
];

const UNKNOWN_DAY: &str = "TBD";

/// Lowercase, keep `[a-z0-9]`, whitespace and `-`, then hyphenate.
/// Leading and trailing hyphens are trimmed, so `"Foo -"` gives `"foo"`.
pub fn generate_slug(name: &str) -> String {
    let kept: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace() || *c == '-')
        .collect();

    let mut slug = String::with_capacity(kept.len());
    for c in kept.trim().chars() {
        let c = if c.is_whitespace() { '-' } else { c };
        if c == '-' && slug.ends_with('-') {
            continue;
        }
        slug.push(c);
    }
    slug.trim_matches('-').to_string()
}

/// Name without stop words; the name itself when nothing would remain.
pub fn generate_short_name(name: &str) -> String {
    let words: Vec<&str> = name
        .split_whitespace()
        .filter(|word| !STOP_WORDS.contains(&word.to_lowercase().as_str()))
        .collect();
    if words.is_empty() {
        name.trim().to_string()
    } else {
        words.join(" ")
    }
}

pub fn event_type_for(recurrence: Option<&str>) -> &'static str {
    let Some(rule) = recurrence else {
        return "routine";
    };
    let rule = rule.to_ascii_uppercase();
    if rule.contains("WEEKLY") {
        "weekly"
    } else if rule.contains("MONTHLY") {
        "monthly"
    } else if rule.contains("DAILY") {
        "daily"
    } else {
        "recurring"
    }
}

pub struct EventAssembler<'r> {
    resolver: &'r TimestampResolver<'r>,
}

impl<'r> EventAssembler<'r> {
    pub fn new(resolver: &'r TimestampResolver<'r>) -> Self {
        Self { resolver }
    }

    pub fn assemble(&self, group: MergedGroup) -> LogicalEvent {
        let MergedGroup {
            identity,
            master,
            exceptions,
            ..
        } = group;

        let zone = master.timezone().map(str::to_string);
        let (day, time) = self.day_and_time(&master.start, master.end.as_ref(), zone.as_deref());
        let attributes = master.attributes.clone().unwrap_or_default();
        let recurrence = master.rrule.clone().filter(|r| !r.trim().is_empty());

        let event_type = attributes
            .event_type
            .clone()
            .unwrap_or_else(|| event_type_for(recurrence.as_deref()).to_string());
        let short_name = attributes
            .short_name
            .clone()
            .unwrap_or_else(|| generate_short_name(&master.title));

        let exceptions: BTreeMap<_, _> = exceptions
            .into_iter()
            .map(|(date, occurrence)| (date, self.exception_override(&master, occurrence)))
            .collect();

        tracing::debug!(
            "Assembled \"{}\" ({} exceptions, {event_type})",
            master.title,
            exceptions.len()
        );

        LogicalEvent {
            uid: identity,
            slug: generate_slug(&master.title),
            short_name,
            day,
            time,
            event_type,
            recurring: recurrence.is_some(),
            recurrence,
            start_date: master.start.instant,
            start_source: master.start.source,
            end_date: master.end.as_ref().map(|end| end.instant),
            timezone: zone,
            coordinates: master.location.as_deref().and_then(Coordinates::parse),
            location: master.location,
            links: attributes.links(),
            attributes,
            description: master.description,
            name: master.title,
            exceptions,
        }
    }

    fn day_and_time(
        &self,
        start: &ResolvedTime,
        end: Option<&ResolvedTime>,
        zone: Option<&str>,
    ) -> (String, String) {
        if start.source == TimeSource::Defaulted {
            return (UNKNOWN_DAY.to_string(), UNKNOWN_DAY.to_string());
        }
        let local_start = self.resolver.local_view(start.instant, zone);
        let local_end = end
            .filter(|end| end.source != TimeSource::Defaulted)
            .map(|end| self.resolver.local_view(end.instant, zone));
        (
            day_name(local_start).to_string(),
            format_time_range(local_start, local_end),
        )
    }

    fn exception_override(&self, master: &RawOccurrence, occurrence: RawOccurrence) -> ExceptionOverride {
        let zone = occurrence.timezone().or(master.timezone());
        let (_, time) = self.day_and_time(&occurrence.start, occurrence.end.as_ref(), zone);
        ExceptionOverride {
            name: (occurrence.title != master.title).then_some(occurrence.title),
            start_date: occurrence.start.instant,
            end_date: occurrence.end.map(|end| end.instant),
            time,
            attributes: occurrence.attributes.unwrap_or_default(),
        }
    }
}

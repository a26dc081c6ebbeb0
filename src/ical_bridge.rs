use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::calendar::assemble::EventAssembler;
use crate::calendar::attributes::{extract_attributes, MarkupStripper, RegexMarkupStripper};
use crate::calendar::diagnostics::ParseDiagnostics;
use crate::calendar::event::{LogicalEvent, RawOccurrence};
use crate::calendar::lines::{unfold, EventBlock, PropertyExtractor};
use crate::calendar::merge::{merge_occurrences, IdentityStrategy, UidOrSynthesized};
use crate::calendar::time_utils::{
    ChronoTzFormatter, ResolvedTime, TimeSource, TimestampResolver, ZoneFormatter,
};
use crate::config::IngestOptions;

/// Result of one parse call. Diagnostics never influence `events`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseOutcome {
    pub events: Vec<LogicalEvent>,
    pub diagnostics: ParseDiagnostics,
}

/// Calendar text parser with its collaborators wired in.
pub struct CalendarParser {
    options: IngestOptions,
    formatter: Box<dyn ZoneFormatter>,
    stripper: Box<dyn MarkupStripper>,
    identity: Box<dyn IdentityStrategy>,
    now: Option<DateTime<Utc>>,
}

impl CalendarParser {
    pub fn new(options: IngestOptions) -> Self {
        Self {
            options,
            formatter: Box::new(ChronoTzFormatter),
            stripper: Box::new(RegexMarkupStripper),
            identity: Box::new(UidOrSynthesized),
            now: None,
        }
    }

    pub fn with_formatter(mut self, formatter: impl ZoneFormatter + 'static) -> Self {
        self.formatter = Box::new(formatter);
        self
    }

    pub fn with_markup_stripper(mut self, stripper: impl MarkupStripper + 'static) -> Self {
        self.stripper = Box::new(stripper);
        self
    }

    pub fn with_identity_strategy(mut self, identity: impl IdentityStrategy + 'static) -> Self {
        self.identity = Box::new(identity);
        self
    }

    /// Pin "now" for missing or unusable timestamps.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Parse calendar text. Never fails: malformed input shows up in the
    /// diagnostics and yields fewer (possibly zero) events.
    pub fn parse(&self, text: &str) -> ParseOutcome {
        tracing::info!("Starting iCal parsing ({} bytes)", text.len());

        let mut diagnostics = ParseDiagnostics::default();
        let lines = unfold(text);
        let blocks = PropertyExtractor::new(&mut diagnostics, self.options.max_invalid_line_samples)
            .extract(&lines);

        let metadata = &diagnostics.metadata;
        if metadata.name.is_some() || metadata.timezone.is_some() {
            tracing::info!(
                "Calendar metadata: name={:?} timezone={:?} version={:?}",
                metadata.name,
                metadata.timezone,
                metadata.version
            );
        }

        let options = match (&self.options.default_timezone, &metadata.timezone) {
            (None, Some(zone)) if self.options.use_calendar_timezone => {
                Cow::Owned(self.options.clone().with_default_timezone(zone.clone()))
            }
            _ => Cow::Borrowed(&self.options),
        };
        let mut resolver = TimestampResolver::new(&options, self.formatter.as_ref());
        if let Some(now) = self.now {
            resolver = resolver.with_now(now);
        }

        let occurrences: Vec<RawOccurrence> = blocks
            .into_iter()
            .map(|block| self.occurrence(block, &resolver, &mut diagnostics))
            .collect();
        diagnostics.occurrences_parsed = occurrences.len();

        let groups = merge_occurrences(occurrences, self.identity.as_ref());
        diagnostics.duplicates_collapsed = groups.iter().map(|g| g.duplicates).sum();

        let assembler = EventAssembler::new(&resolver);
        let events: Vec<LogicalEvent> = groups.into_iter().map(|g| assembler.assemble(g)).collect();
        diagnostics.logical_events = events.len();

        if diagnostics.invalid_line_count > 0 {
            tracing::warn!(
                "Found {} invalid lines during parsing",
                diagnostics.invalid_line_count
            );
            for sample in &diagnostics.invalid_line_samples {
                tracing::warn!("  Event #{}: {}", sample.occurrence, sample.line);
            }
        }
        match diagnostics.success_rate() {
            Some(rate) => tracing::info!(
                "Parsing complete. Found {} total events, {} with valid data ({rate}% success rate), {} logical events",
                diagnostics.occurrences_seen,
                diagnostics.occurrences_parsed,
                diagnostics.logical_events
            ),
            None => tracing::warn!("Parsing complete. No events found in calendar text"),
        }

        ParseOutcome { events, diagnostics }
    }

    fn occurrence(
        &self,
        block: EventBlock,
        resolver: &TimestampResolver<'_>,
        diagnostics: &mut ParseDiagnostics,
    ) -> RawOccurrence {
        let start = resolver.resolve(block.start.as_ref());
        let end = block.end.as_ref().map(|token| resolver.resolve(Some(token)));
        for time in std::iter::once(&start).chain(end.as_ref()) {
            count_source(time, diagnostics);
        }

        let recurrence_date = block.recurrence_id.as_ref().map(|token| {
            resolver
                .calendar_date(token, start.zone.as_deref())
                .unwrap_or_else(|e| {
                    tracing::warn!(
                        "Event #{} has unusable RECURRENCE-ID ({e}), keying by its start date",
                        block.number
                    );
                    resolver.local_view(start.instant, start.zone.as_deref()).date()
                })
        });

        let attributes = block.description.as_deref().and_then(|description| {
            let extracted = extract_attributes(description, self.stripper.as_ref());
            diagnostics.rejected_urls += extracted.rejected_urls;
            extracted.attributes
        });

        RawOccurrence {
            number: block.number,
            title: block.title.unwrap_or_default(),
            description: block.description,
            location: block.location,
            start,
            end,
            rrule: block.rrule,
            uid: block.uid,
            recurrence_date,
            attributes,
        }
    }
}

fn count_source(time: &ResolvedTime, diagnostics: &mut ParseDiagnostics) {
    match time.source {
        TimeSource::Defaulted => diagnostics.defaulted_timestamps += 1,
        TimeSource::ZoneFallback => diagnostics.zone_fallbacks += 1,
        _ => {}
    }
}

/// Parse calendar text with the default collaborators.
pub fn parse_ical(text: &str, options: &IngestOptions) -> ParseOutcome {
    CalendarParser::new(options.clone()).parse(text)
}

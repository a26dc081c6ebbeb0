//! Line unfolding and the `VEVENT` property extractor.

use super::diagnostics::{CalendarMetadata, ParseDiagnostics};
use super::time_utils::DateToken;

/// Properties that are valid inside a `VEVENT` but carry nothing we use.
/// RRULE parts appear here because some producers emit them as lines.
const IGNORED_PROPERTIES: &[&str] = &[
    "DTSTAMP",
    "CREATED",
    "LAST-MODIFIED",
    "SEQUENCE",
    "STATUS",
    "TRANSP",
    "ORGANIZER",
    "ATTENDEE",
    "CLASS",
    "PRIORITY",
    "CATEGORIES",
    "COMMENT",
    "CONTACT",
    "REQUEST-STATUS",
    "RELATED-TO",
    "RESOURCES",
    "RDATE",
    "EXDATE",
    "EXRULE",
    "ATTACH",
    "ALARM",
    "VALARM",
    "FREEBUSY",
    "DURATION",
    "TZID",
    "TZOFFSETFROM",
    "TZOFFSETTO",
    "TZNAME",
    "URL",
    "GEO",
    "FREQ",
    "UNTIL",
    "COUNT",
    "INTERVAL",
    "BYSECOND",
    "BYMINUTE",
    "BYHOUR",
    "BYDAY",
    "BYMONTHDAY",
    "BYYEARDAY",
    "BYWEEKNO",
    "BYMONTH",
    "BYSETPOS",
    "WKST",
];

/// Join folded continuation lines (leading space or tab) onto the line
/// before them and drop trailing carriage returns.
pub fn unfold(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    if text.is_empty() {
        return lines;
    }

    for physical in text.split('\n') {
        let physical = physical.strip_suffix('\r').unwrap_or(physical);
        match (physical.strip_prefix([' ', '\t']), lines.last_mut()) {
            (Some(continuation), Some(previous)) => previous.push_str(continuation),
            _ => lines.push(physical.to_string()),
        }
    }
    lines
}

/// Undo iCalendar TEXT escaping: `\,` `\;` `\n` `\N` `\\`.
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n' | 'N') => out.push('\n'),
            Some(escaped @ (',' | ';' | '\\')) => out.push(escaped),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// A content line split into `NAME`, `;PARAMS` and value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentLine<'a> {
    pub name: &'a str,
    pub params: &'a str,
    pub value: &'a str,
}

impl<'a> ContentLine<'a> {
    pub fn split(line: &'a str) -> Option<Self> {
        let (head, value) = line.split_once(':')?;
        let (name, params) = match head.find(';') {
            Some(idx) => (&head[..idx], &head[idx..]),
            None => (head, ""),
        };
        let valid_name = !name.is_empty()
            && name
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-');
        valid_name.then_some(Self {
            name,
            params,
            value,
        })
    }

    fn is(&self, property: &str) -> bool {
        self.name.eq_ignore_ascii_case(property)
    }
}

/// Textual fields of one `BEGIN:VEVENT`/`END:VEVENT` block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBlock {
    /// 1-based position of the block in the source.
    pub number: usize,
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start: Option<DateToken>,
    pub end: Option<DateToken>,
    pub rrule: Option<String>,
    pub uid: Option<String>,
    pub recurrence_id: Option<DateToken>,
}

enum State {
    Outside,
    Inside {
        block: EventBlock,
        /// Depth of nested components such as `VALARM`.
        nested: usize,
    },
}

/// Two-state extractor over unfolded lines. Blocks without a title are
/// dropped and counted; unknown lines are sampled into the diagnostics.
pub struct PropertyExtractor<'d> {
    diagnostics: &'d mut ParseDiagnostics,
    sample_limit: usize,
    state: State,
    seen: usize,
    blocks: Vec<EventBlock>,
}

impl<'d> PropertyExtractor<'d> {
    pub fn new(diagnostics: &'d mut ParseDiagnostics, sample_limit: usize) -> Self {
        Self {
            diagnostics,
            sample_limit,
            state: State::Outside,
            seen: 0,
            blocks: Vec::new(),
        }
    }

    pub fn extract(mut self, lines: &[String]) -> Vec<EventBlock> {
        for line in lines {
            self.feed(line);
        }
        if let State::Inside { block, .. } = &self.state {
            tracing::warn!("Event #{} was never closed, discarding", block.number);
        }
        self.diagnostics.occurrences_seen = self.seen;
        self.blocks
    }

    fn feed(&mut self, line: &str) {
        if line == "BEGIN:VEVENT" {
            if let State::Inside { block, .. } = &self.state {
                tracing::warn!("Event #{} restarted before END:VEVENT", block.number);
            }
            self.seen += 1;
            tracing::debug!("Starting to parse event #{}", self.seen);
            self.state = State::Inside {
                block: EventBlock {
                    number: self.seen,
                    ..Default::default()
                },
                nested: 0,
            };
            return;
        }

        if line == "END:VEVENT" {
            if let State::Inside { block, .. } = std::mem::replace(&mut self.state, State::Outside) {
                self.finish(block);
            }
            return;
        }

        match &mut self.state {
            State::Outside => record_metadata(line, &mut self.diagnostics.metadata),
            State::Inside { block, nested } => {
                let number = block.number;
                if !accept_line(line, block, nested) && !line.trim().is_empty() {
                    self.diagnostics
                        .record_invalid_line(line, number, self.sample_limit);
                }
            }
        }
    }

    fn finish(&mut self, block: EventBlock) {
        if block.title.as_deref().is_some_and(|t| !t.is_empty()) {
            self.blocks.push(block);
        } else {
            tracing::warn!("Event #{} has no title, skipping", block.number);
            self.diagnostics.untitled_skipped += 1;
        }
    }
}

/// Apply one line to the open block; `false` means the line is invalid.
fn accept_line(line: &str, block: &mut EventBlock, nested: &mut usize) -> bool {
    if line.trim().is_empty() {
        return true;
    }
    let Some(content) = ContentLine::split(line) else {
        return false;
    };

    if content.is("BEGIN") {
        *nested += 1;
        return true;
    }
    if content.is("END") {
        *nested = nested.saturating_sub(1);
        return true;
    }
    // Properties of sub-components (alarm descriptions and the like) must
    // not leak into the event.
    if *nested > 0 {
        return true;
    }

    let name = content.name.to_ascii_uppercase();
    match name.as_str() {
        "SUMMARY" => block.title = Some(unescape_text(content.value)),
        "DESCRIPTION" => block.description = Some(unescape_text(content.value)),
        "LOCATION" => block.location = Some(unescape_text(content.value)),
        "DTSTART" => block.start = Some(DateToken::from_property(content.params, content.value)),
        "DTEND" => block.end = Some(DateToken::from_property(content.params, content.value)),
        "RRULE" => block.rrule = Some(content.value.trim().to_string()),
        "UID" => block.uid = Some(content.value.trim().to_string()).filter(|u| !u.is_empty()),
        "RECURRENCE-ID" => {
            block.recurrence_id = Some(DateToken::from_property(content.params, content.value));
        }
        other if other.starts_with("X-") || IGNORED_PROPERTIES.contains(&other) => {}
        _ => return false,
    }
    true
}

fn record_metadata(line: &str, metadata: &mut CalendarMetadata) {
    let Some(content) = ContentLine::split(line) else {
        return;
    };
    let value = Some(unescape_text(content.value.trim()));
    if content.is("X-WR-CALNAME") {
        metadata.name = value;
    } else if content.is("X-WR-TIMEZONE") {
        metadata.timezone = value;
    } else if content.is("VERSION") {
        metadata.version = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(text: &str) -> (Vec<EventBlock>, ParseDiagnostics) {
        let mut diagnostics = ParseDiagnostics::default();
        let blocks = PropertyExtractor::new(&mut diagnostics, 5).extract(&unfold(text));
        (blocks, diagnostics)
    }

    // -- unfold --

    #[test]
    fn empty_input_unfolds_to_nothing() {
        assert!(unfold("").is_empty());
    }

    #[test]
    fn folded_line_matches_unfolded_equivalent() {
        assert_eq!(unfold("SUMMARY:Foo\n Bar"), unfold("SUMMARY:FooBar"));
        assert_eq!(unfold("SUMMARY:Foo\n Bar"), vec!["SUMMARY:FooBar".to_string()]);
    }

    #[test]
    fn unfold_handles_crlf_tabs_and_multiple_continuations() {
        let lines = unfold("DESCRIPTION:a\r\n b\r\n\tc\r\nUID:1\r\n");
        assert_eq!(lines, vec!["DESCRIPTION:abc".to_string(), "UID:1".to_string(), String::new()]);
    }

    #[test]
    fn continuation_keeps_inner_spaces() {
        let lines = unfold("SUMMARY:Bear\n  Happy Hour");
        assert_eq!(lines, vec!["SUMMARY:Bear Happy Hour".to_string()]);
    }

    // -- escaping --

    #[test]
    fn unescape_handles_all_sequences() {
        assert_eq!(unescape_text(r"a\, b\; c\nd\Ne\\f"), "a, b; c\nd\ne\\f");
        assert_eq!(unescape_text(r"keep \x and trailing \"), r"keep \x and trailing \");
    }

    // -- content lines --

    #[test]
    fn content_line_split() {
        let line = ContentLine::split("DTSTART;TZID=America/New_York:20251025T210000").unwrap();
        assert_eq!(line.name, "DTSTART");
        assert_eq!(line.params, ";TZID=America/New_York");
        assert_eq!(line.value, "20251025T210000");
        assert!(ContentLine::split("no colon here").is_none());
        assert!(ContentLine::split("bad name:value").is_none());
    }

    // -- extractor --

    #[test]
    fn extracts_recognized_properties() {
        let text = "BEGIN:VCALENDAR\n\
            X-WR-CALNAME:New York\n\
            X-WR-TIMEZONE:America/New_York\n\
            BEGIN:VEVENT\n\
            UID:abc@google.com\n\
            SUMMARY:Bear Night\\, Downtown\n\
            DESCRIPTION:Bar: Eagle\\nCover: $10\n\
            LOCATION:40.7\\,-74.0\n\
            DTSTART;TZID=America/New_York:20251018T210000\n\
            DTEND;TZID=America/New_York:20251019T020000\n\
            RRULE:FREQ=WEEKLY;BYDAY=SA\n\
            DTSTAMP:20250101T000000Z\n\
            X-APPLE-TRAVEL-ADVISORY-BEHAVIOR:AUTOMATIC\n\
            END:VEVENT\n\
            END:VCALENDAR\n";
        let (blocks, diagnostics) = extract(text);

        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert_eq!(block.number, 1);
        assert_eq!(block.title.as_deref(), Some("Bear Night, Downtown"));
        assert_eq!(block.description.as_deref(), Some("Bar: Eagle\nCover: $10"));
        assert_eq!(block.location.as_deref(), Some("40.7,-74.0"));
        assert_eq!(block.rrule.as_deref(), Some("FREQ=WEEKLY;BYDAY=SA"));
        assert_eq!(block.uid.as_deref(), Some("abc@google.com"));
        assert_eq!(
            block.start.as_ref().and_then(|t| t.tzid.as_deref()),
            Some("America/New_York")
        );
        assert_eq!(block.recurrence_id, None);
        assert_eq!(diagnostics.occurrences_seen, 1);
        assert_eq!(diagnostics.invalid_line_count, 0);
        assert_eq!(diagnostics.metadata.name.as_deref(), Some("New York"));
        assert_eq!(diagnostics.metadata.timezone.as_deref(), Some("America/New_York"));
    }

    #[test]
    fn untitled_blocks_are_dropped_and_counted() {
        let text = "BEGIN:VEVENT\nDTSTART:20250101T100000Z\nEND:VEVENT\n\
                    BEGIN:VEVENT\nSUMMARY:\nEND:VEVENT\n\
                    BEGIN:VEVENT\nSUMMARY:Kept\nEND:VEVENT\n";
        let (blocks, diagnostics) = extract(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].number, 3);
        assert_eq!(diagnostics.occurrences_seen, 3);
        assert_eq!(diagnostics.untitled_skipped, 2);
    }

    #[test]
    fn invalid_lines_are_recorded_without_aborting() {
        let text = "BEGIN:VEVENT\nSUMMARY:Still Parsed\nthis is junk\nFOOBAR:1\n\nEND:VEVENT\n";
        let (blocks, diagnostics) = extract(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(diagnostics.invalid_line_count, 2);
        assert_eq!(diagnostics.invalid_line_samples[0].line, "this is junk");
        assert_eq!(diagnostics.invalid_line_samples[1].occurrence, 1);
    }

    #[test]
    fn alarm_properties_do_not_leak_into_event() {
        let text = "BEGIN:VEVENT\nSUMMARY:Event\nDESCRIPTION:Bar: Eagle\n\
                    BEGIN:VALARM\nACTION:DISPLAY\nDESCRIPTION:Reminder\nTRIGGER:-PT15M\nEND:VALARM\n\
                    END:VEVENT\n";
        let (blocks, diagnostics) = extract(text);
        assert_eq!(blocks[0].description.as_deref(), Some("Bar: Eagle"));
        assert_eq!(diagnostics.invalid_line_count, 0);
    }

    #[test]
    fn recurrence_id_is_captured() {
        let text = "BEGIN:VEVENT\nSUMMARY:GOLDILOXX\nUID:x\n\
                    RECURRENCE-ID;TZID=America/New_York:20251025T210000\nEND:VEVENT\n";
        let (blocks, _) = extract(text);
        let rid = blocks[0].recurrence_id.as_ref().unwrap();
        assert_eq!(rid.tzid.as_deref(), Some("America/New_York"));
        assert_eq!(rid.value, "20251025T210000");
    }

    #[test]
    fn no_blocks_means_zero_occurrences() {
        let (blocks, diagnostics) = extract("BEGIN:VCALENDAR\nVERSION:2.0\nEND:VCALENDAR\n");
        assert!(blocks.is_empty());
        assert_eq!(diagnostics.occurrences_seen, 0);
        assert_eq!(diagnostics.metadata.version.as_deref(), Some("2.0"));
    }
}

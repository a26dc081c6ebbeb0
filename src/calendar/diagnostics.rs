use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidLine {
    pub line: String,
    /// 1-based number of the `VEVENT` block the line appeared in.
    pub occurrence: usize,
}

/// `X-WR-*` / `VERSION` headers found outside event blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CalendarMetadata {
    pub name: Option<String>,
    pub timezone: Option<String>,
    pub version: Option<String>,
}

/// Observational side channel of a parse call. Nothing here feeds back into
/// the returned events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseDiagnostics {
    pub occurrences_seen: usize,
    pub occurrences_parsed: usize,
    pub untitled_skipped: usize,
    pub invalid_line_count: usize,
    pub invalid_line_samples: Vec<InvalidLine>,
    pub defaulted_timestamps: usize,
    pub zone_fallbacks: usize,
    pub rejected_urls: usize,
    pub duplicates_collapsed: usize,
    pub logical_events: usize,
    pub metadata: CalendarMetadata,
}

impl ParseDiagnostics {
    pub fn record_invalid_line(&mut self, line: &str, occurrence: usize, sample_limit: usize) {
        self.invalid_line_count += 1;
        if self.invalid_line_samples.len() < sample_limit {
            self.invalid_line_samples.push(InvalidLine {
                line: line.to_string(),
                occurrence,
            });
        }
    }

    /// Percentage of seen occurrences that produced a record.
    pub fn success_rate(&self) -> Option<u32> {
        if self.occurrences_seen == 0 {
            return None;
        }
        let rate = (self.occurrences_parsed as f64 / self.occurrences_seen as f64) * 100.0;
        Some(rate.round() as u32)
    }

    pub fn is_degraded(&self) -> bool {
        self.untitled_skipped > 0
            || self.invalid_line_count > 0
            || self.defaulted_timestamps > 0
            || self.zone_fallbacks > 0
            || self.rejected_urls > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_line_samples_are_capped() {
        let mut diagnostics = ParseDiagnostics::default();
        for i in 0..8 {
            diagnostics.record_invalid_line(&format!("JUNK{i}"), 1, 5);
        }
        assert_eq!(diagnostics.invalid_line_count, 8);
        assert_eq!(diagnostics.invalid_line_samples.len(), 5);
        assert_eq!(diagnostics.invalid_line_samples[0].line, "JUNK0");
        assert!(diagnostics.is_degraded());
    }

    #[test]
    fn success_rate_is_none_without_occurrences() {
        let mut diagnostics = ParseDiagnostics::default();
        assert_eq!(diagnostics.success_rate(), None);
        assert!(!diagnostics.is_degraded());

        diagnostics.occurrences_seen = 3;
        diagnostics.occurrences_parsed = 2;
        assert_eq!(diagnostics.success_rate(), Some(67));
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Calendar not found: {0}")]
    CalendarNotFound(String),

    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Invalid RRULE: {0}")]
    InvalidRrule(String),

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Feed fetch failed: {0}")]
    Fetch(String),
}

/// Failures inside the timestamp resolver. These never escape a parse call;
/// they are counted in the diagnostics and the timestamp is defaulted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("Unparsable timestamp: {0:?}")]
    Unparsable(String),

    #[error("Floating local time {0:?} with no default timezone")]
    AmbiguousLocalTime(String),

    #[error("Zone formatter failed for {zone}: {reason}")]
    Formatter { zone: String, reason: String },
}

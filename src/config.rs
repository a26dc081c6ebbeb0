use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IngestError;

pub const DEFAULT_INVALID_LINE_SAMPLES: usize = 5;

/// How `TZID`-qualified local times are turned into instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimezonePolicy {
    /// chrono-tz lookup, static table for zones it does not know.
    #[default]
    Database,
    /// Bisection against a [`ZoneFormatter`](crate::calendar::time_utils::ZoneFormatter),
    /// static table when the formatter fails.
    Search,
    /// Static offset table with the DST heuristic only.
    StaticTable,
}

/// What to do with a floating local time when no default zone is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FloatingTimePolicy {
    /// Interpret in the zone of the machine running the parse.
    #[default]
    SystemLocal,
    Utc,
    /// Refuse to guess: the timestamp is defaulted and reported.
    Reject,
}

impl FromStr for TimezonePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "database" => Ok(Self::Database),
            "search" => Ok(Self::Search),
            "static" | "static_table" => Ok(Self::StaticTable),
            other => Err(IngestError::InvalidInput(format!(
                "Unknown timezone policy '{other}'"
            ))),
        }
    }
}

impl FromStr for FloatingTimePolicy {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "system_local" | "local" => Ok(Self::SystemLocal),
            "utc" => Ok(Self::Utc),
            "reject" => Ok(Self::Reject),
            other => Err(IngestError::InvalidInput(format!(
                "Unknown floating time policy '{other}'"
            ))),
        }
    }
}

fn parse_flag(value: &str) -> Result<bool, IngestError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(IngestError::InvalidInput(format!("Invalid boolean '{other}'"))),
    }
}

/// Per-call parse configuration. Nothing here is global, so distinct feeds
/// can be parsed in parallel with different settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    pub default_timezone: Option<String>,
    pub timezone_policy: TimezonePolicy,
    pub floating_policy: FloatingTimePolicy,
    /// Use the feed's `X-WR-TIMEZONE` as the default zone when none is set.
    pub use_calendar_timezone: bool,
    pub max_invalid_line_samples: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            default_timezone: None,
            timezone_policy: TimezonePolicy::default(),
            floating_policy: FloatingTimePolicy::default(),
            use_calendar_timezone: false,
            max_invalid_line_samples: DEFAULT_INVALID_LINE_SAMPLES,
        }
    }
}

impl IngestOptions {
    pub fn with_default_timezone(mut self, zone: impl Into<String>) -> Self {
        self.default_timezone = Some(zone.into());
        self
    }

    pub fn with_timezone_policy(mut self, policy: TimezonePolicy) -> Self {
        self.timezone_policy = policy;
        self
    }

    pub fn with_floating_policy(mut self, policy: FloatingTimePolicy) -> Self {
        self.floating_policy = policy;
        self
    }

    pub fn with_calendar_timezone(mut self, enabled: bool) -> Self {
        self.use_calendar_timezone = enabled;
        self
    }

    /// Server-wide defaults from `CHUNKY_DEFAULT_TZ`, `CHUNKY_TZ_POLICY`,
    /// `CHUNKY_FLOATING_POLICY` and `CHUNKY_USE_CALENDAR_TZ`.
    pub fn from_env() -> Result<Self, IngestError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, IngestError> {
        let mut options = Self::default();
        if let Some(zone) = lookup("CHUNKY_DEFAULT_TZ").filter(|z| !z.trim().is_empty()) {
            options.default_timezone = Some(zone.trim().to_string());
        }
        if let Some(policy) = lookup("CHUNKY_TZ_POLICY") {
            options.timezone_policy = policy.parse()?;
        }
        if let Some(policy) = lookup("CHUNKY_FLOATING_POLICY") {
            options.floating_policy = policy.parse()?;
        }
        if let Some(flag) = lookup("CHUNKY_USE_CALENDAR_TZ") {
            options.use_calendar_timezone = parse_flag(&flag)?;
        }
        Ok(options)
    }
}

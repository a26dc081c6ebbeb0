use chrono::{
    DateTime, Datelike, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone,
    Timelike, Utc, Weekday,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::config::{FloatingTimePolicy, IngestOptions, TimezonePolicy};
use crate::error::TimestampError;

const SEARCH_WINDOW_SECS: i64 = 24 * 60 * 60;
const MAX_SEARCH_ITERATIONS: usize = 50;

/// A date/time property value, with the `TZID` parameter if one was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateToken {
    pub tzid: Option<String>,
    pub value: String,
}

impl DateToken {
    /// Build from the parameter section (`;TZID=...;VALUE=DATE`) and value of
    /// a content line.
    pub fn from_property(params: &str, value: &str) -> Self {
        let tzid = params
            .split(';')
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("TZID"))
            .map(|(_, v)| v.trim().trim_matches('"').to_string())
            .filter(|v| !v.is_empty());
        Self {
            tzid,
            value: value.trim().to_string(),
        }
    }

    /// Accepts either bare digits (`20251025T210000`) or the qualified form
    /// `TZID=America/New_York:20251025T210000`.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.split_once(':') {
            Some((params, value)) => Self::from_property(params, value),
            None => Self {
                tzid: None,
                value: raw.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenShape {
    Date(NaiveDate),
    Utc(NaiveDateTime),
    Local(NaiveDateTime),
}

fn digits_field(digits: &str, range: std::ops::Range<usize>) -> u32 {
    digits
        .get(range)
        .and_then(|s| s.parse().ok())
        .unwrap_or(0)
}

fn classify(value: &str) -> Result<TokenShape, TimestampError> {
    let unparsable = || TimestampError::Unparsable(value.to_string());
    let value = value.trim();

    if value.contains('T') {
        let is_utc = value.ends_with('Z');
        let digits: String = value.chars().filter(|c| *c != 'T' && *c != 'Z').collect();
        if digits.len() < 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(unparsable());
        }
        let year: i32 = digits[0..4].parse().map_err(|_| unparsable())?;
        let date = NaiveDate::from_ymd_opt(year, digits_field(&digits, 4..6), digits_field(&digits, 6..8))
            .ok_or_else(unparsable)?;
        let time = NaiveTime::from_hms_opt(
            digits_field(&digits, 8..10),
            digits_field(&digits, 10..12),
            digits_field(&digits, 12..14),
        )
        .ok_or_else(unparsable)?;
        let naive = date.and_time(time);
        return Ok(if is_utc {
            TokenShape::Utc(naive)
        } else {
            TokenShape::Local(naive)
        });
    }

    if value.len() == 8 && value.bytes().all(|b| b.is_ascii_digit()) {
        return NaiveDate::parse_from_str(value, "%Y%m%d")
            .map(TokenShape::Date)
            .map_err(|_| unparsable());
    }

    Err(unparsable())
}

/// Where a resolved instant came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSource {
    Utc,
    AllDay,
    Zoned,
    /// Resolved through the static offset table.
    ZoneFallback,
    Floating,
    /// Nothing usable was present; the instant is the parse time.
    Defaulted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTime {
    pub instant: DateTime<Utc>,
    pub source: TimeSource,
    /// Zone the value was expressed in, used for display.
    pub zone: Option<String>,
}

/// Locale-aware formatting capability: local wall-clock fields of an instant
/// in a named zone.
pub trait ZoneFormatter: Send + Sync {
    fn local_fields(&self, instant: DateTime<Utc>, zone: &str)
        -> Result<NaiveDateTime, TimestampError>;
}

/// [`ZoneFormatter`] backed by the chrono-tz database.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChronoTzFormatter;

impl ZoneFormatter for ChronoTzFormatter {
    fn local_fields(
        &self,
        instant: DateTime<Utc>,
        zone: &str,
    ) -> Result<NaiveDateTime, TimestampError> {
        let tz: Tz = zone.parse().map_err(|e| TimestampError::Formatter {
            zone: zone.to_string(),
            reason: format!("{e}"),
        })?;
        Ok(instant.with_timezone(&tz).naive_local())
    }
}

/// Bisect a ±24h window around the fields read as UTC until the formatter
/// reports the target wall-clock time. Works in whole seconds; inside a DST
/// gap it converges on the transition instant.
pub fn search_instant(
    formatter: &dyn ZoneFormatter,
    target: NaiveDateTime,
    zone: &str,
) -> Result<DateTime<Utc>, TimestampError> {
    let seed = target.and_utc().timestamp();
    let mut lo = seed - SEARCH_WINDOW_SECS;
    let mut hi = seed + SEARCH_WINDOW_SECS;
    let at = |secs: i64| {
        DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| TimestampError::Unparsable(target.to_string()))
    };

    for _ in 0..MAX_SEARCH_ITERATIONS {
        if hi - lo <= 1 {
            break;
        }
        let mid = lo + (hi - lo) / 2;
        let local = formatter.local_fields(at(mid)?, zone)?;
        match local.cmp(&target) {
            std::cmp::Ordering::Less => lo = mid,
            std::cmp::Ordering::Greater => hi = mid,
            std::cmp::Ordering::Equal => return at(mid),
        }
    }
    at(hi)
}

// -- Static offset table --

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DstRule {
    None,
    /// Second Sunday of March through first Sunday of November.
    NorthAmerica,
    /// Last Sunday of March through last Sunday of October.
    Europe,
}

/// Standard UTC offsets in minutes.
const STATIC_ZONES: &[(&str, i32, DstRule)] = &[
    ("America/New_York", -300, DstRule::NorthAmerica),
    ("America/Detroit", -300, DstRule::NorthAmerica),
    ("America/Toronto", -300, DstRule::NorthAmerica),
    ("America/Chicago", -360, DstRule::NorthAmerica),
    ("America/Denver", -420, DstRule::NorthAmerica),
    ("America/Phoenix", -420, DstRule::None),
    ("America/Los_Angeles", -480, DstRule::NorthAmerica),
    ("America/Vancouver", -480, DstRule::NorthAmerica),
    ("America/Anchorage", -540, DstRule::NorthAmerica),
    ("America/Mexico_City", -360, DstRule::None),
    ("Pacific/Honolulu", -600, DstRule::None),
    ("Europe/London", 0, DstRule::Europe),
    ("Europe/Dublin", 0, DstRule::Europe),
    ("Europe/Lisbon", 0, DstRule::Europe),
    ("Europe/Berlin", 60, DstRule::Europe),
    ("Europe/Madrid", 60, DstRule::Europe),
    ("Europe/Paris", 60, DstRule::Europe),
    ("Europe/Amsterdam", 60, DstRule::Europe),
    ("Europe/Rome", 60, DstRule::Europe),
    ("Europe/Athens", 120, DstRule::Europe),
    ("UTC", 0, DstRule::None),
    ("Etc/UTC", 0, DstRule::None),
];

fn last_weekday_of_month(year: i32, month: u32, weekday: Weekday) -> Option<NaiveDate> {
    NaiveDate::from_weekday_of_month_opt(year, month, weekday, 5)
        .or_else(|| NaiveDate::from_weekday_of_month_opt(year, month, weekday, 4))
}

fn dst_in_effect(rule: DstRule, date: NaiveDate) -> bool {
    let year = date.year();
    let bounds = match rule {
        DstRule::None => None,
        DstRule::NorthAmerica => NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
            .zip(NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)),
        DstRule::Europe => last_weekday_of_month(year, 3, Weekday::Sun)
            .zip(last_weekday_of_month(year, 10, Weekday::Sun)),
    };
    bounds.is_some_and(|(start, end)| date >= start && date < end)
}

/// UTC offset in minutes for a wall-clock date in `zone`, or `None` when the
/// zone is not in the table. DST is decided per day, so the transition day
/// itself is off by an hour before the 2AM switch.
pub fn static_offset_minutes(zone: &str, local_date: NaiveDate) -> Option<i32> {
    let (_, standard, rule) = STATIC_ZONES.iter().find(|(name, _, _)| *name == zone)?;
    Some(standard + if dst_in_effect(*rule, local_date) { 60 } else { 0 })
}

fn static_instant(naive: NaiveDateTime, zone: &str) -> Option<DateTime<Utc>> {
    let offset = static_offset_minutes(zone, naive.date())?;
    Some(naive.and_utc() - TimeDelta::minutes(i64::from(offset)))
}

fn static_local(instant: DateTime<Utc>, zone: &str) -> Option<NaiveDateTime> {
    let (_, standard, _) = STATIC_ZONES.iter().find(|(name, _, _)| *name == zone)?;
    let guess = instant.naive_utc() + TimeDelta::minutes(i64::from(*standard));
    let offset = static_offset_minutes(zone, guess.date())?;
    Some(instant.naive_utc() + TimeDelta::minutes(i64::from(offset)))
}

// -- Resolver --

/// Turns calendar date tokens into instants and instants back into local
/// wall-clock views, according to the per-call [`IngestOptions`].
pub struct TimestampResolver<'a> {
    options: &'a IngestOptions,
    formatter: &'a dyn ZoneFormatter,
    now: DateTime<Utc>,
}

impl<'a> TimestampResolver<'a> {
    pub fn new(options: &'a IngestOptions, formatter: &'a dyn ZoneFormatter) -> Self {
        Self {
            options,
            formatter,
            now: Utc::now(),
        }
    }

    /// Pin the instant used for defaulted timestamps.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Resolve a token, substituting "now" when it is missing or unusable.
    pub fn resolve(&self, token: Option<&DateToken>) -> ResolvedTime {
        let defaulted = |zone: Option<String>| ResolvedTime {
            instant: self.now,
            source: TimeSource::Defaulted,
            zone,
        };
        let Some(token) = token else {
            return defaulted(self.options.default_timezone.clone());
        };
        match self.try_resolve(token) {
            Ok(resolved) => resolved,
            Err(e) => {
                tracing::warn!("Defaulting timestamp to now: {e}");
                defaulted(self.effective_zone(token).map(str::to_string))
            }
        }
    }

    pub fn try_resolve(&self, token: &DateToken) -> Result<ResolvedTime, TimestampError> {
        let zone = self.effective_zone(token);
        match classify(&token.value)? {
            TokenShape::Utc(naive) => Ok(ResolvedTime {
                instant: naive.and_utc(),
                source: TimeSource::Utc,
                zone: zone.map(str::to_string),
            }),
            TokenShape::Local(naive) => self.resolve_local(naive, zone, &token.value),
            TokenShape::Date(date) => {
                let midnight = date.and_time(NaiveTime::MIN);
                let instant = match zone {
                    Some(zone) => self.resolve_in_zone(midnight, zone).instant,
                    None => self.floating_midnight(midnight),
                };
                Ok(ResolvedTime {
                    instant,
                    source: TimeSource::AllDay,
                    zone: zone.map(str::to_string),
                })
            }
        }
    }

    /// Calendar date a token names, as seen in `display_zone`. Local and
    /// date-only values keep their literal date; UTC values are converted.
    pub fn calendar_date(
        &self,
        token: &DateToken,
        display_zone: Option<&str>,
    ) -> Result<NaiveDate, TimestampError> {
        match classify(&token.value)? {
            TokenShape::Date(date) => Ok(date),
            TokenShape::Local(naive) => Ok(naive.date()),
            TokenShape::Utc(naive) => Ok(self
                .local_view(naive.and_utc(), display_zone.or(token.tzid.as_deref()))
                .date()),
        }
    }

    fn effective_zone<'t>(&'t self, token: &'t DateToken) -> Option<&'t str> {
        token
            .tzid
            .as_deref()
            .or(self.options.default_timezone.as_deref())
    }

    fn resolve_local(
        &self,
        naive: NaiveDateTime,
        zone: Option<&str>,
        raw: &str,
    ) -> Result<ResolvedTime, TimestampError> {
        if let Some(zone) = zone {
            return Ok(self.resolve_in_zone(naive, zone));
        }
        let instant = match self.options.floating_policy {
            FloatingTimePolicy::SystemLocal => chrono::Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| naive.and_utc()),
            FloatingTimePolicy::Utc => naive.and_utc(),
            FloatingTimePolicy::Reject => {
                return Err(TimestampError::AmbiguousLocalTime(raw.to_string()));
            }
        };
        Ok(ResolvedTime {
            instant,
            source: TimeSource::Floating,
            zone: None,
        })
    }

    /// Midnight of a zoneless date. `Reject` reads it like `Utc`.
    fn floating_midnight(&self, midnight: NaiveDateTime) -> DateTime<Utc> {
        match self.options.floating_policy {
            FloatingTimePolicy::SystemLocal => chrono::Local
                .from_local_datetime(&midnight)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| midnight.and_utc()),
            FloatingTimePolicy::Utc | FloatingTimePolicy::Reject => midnight.and_utc(),
        }
    }

    fn resolve_in_zone(&self, naive: NaiveDateTime, zone: &str) -> ResolvedTime {
        let zoned = |instant| ResolvedTime {
            instant,
            source: TimeSource::Zoned,
            zone: Some(zone.to_string()),
        };

        match self.options.timezone_policy {
            TimezonePolicy::Database => {
                if let Ok(tz) = zone.parse::<Tz>() {
                    let found = match tz.from_local_datetime(&naive) {
                        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => Some(dt),
                        // Wall-clock time skipped by a DST jump: take the hour after.
                        LocalResult::None => tz
                            .from_local_datetime(&(naive + TimeDelta::hours(1)))
                            .earliest(),
                    };
                    if let Some(dt) = found {
                        return zoned(dt.with_timezone(&Utc));
                    }
                }
            }
            TimezonePolicy::Search => match search_instant(self.formatter, naive, zone) {
                Ok(instant) => return zoned(instant),
                Err(e) => tracing::debug!("Zone search failed, using static table: {e}"),
            },
            TimezonePolicy::StaticTable => {}
        }

        self.static_fallback(naive, zone)
    }

    fn static_fallback(&self, naive: NaiveDateTime, zone: &str) -> ResolvedTime {
        let instant = static_instant(naive, zone).unwrap_or_else(|| {
            tracing::warn!("Timezone {zone} not in static table, treating {naive} as UTC");
            naive.and_utc()
        });
        ResolvedTime {
            instant,
            source: TimeSource::ZoneFallback,
            zone: Some(zone.to_string()),
        }
    }

    /// Wall-clock view of `instant` in `zone`, or per the floating policy
    /// when no zone is known.
    pub fn local_view(&self, instant: DateTime<Utc>, zone: Option<&str>) -> NaiveDateTime {
        let zone = zone.or(self.options.default_timezone.as_deref());
        let Some(zone) = zone else {
            return match self.options.floating_policy {
                FloatingTimePolicy::SystemLocal => instant.with_timezone(&chrono::Local).naive_local(),
                FloatingTimePolicy::Utc | FloatingTimePolicy::Reject => instant.naive_utc(),
            };
        };

        let viewed = match self.options.timezone_policy {
            TimezonePolicy::Database => zone
                .parse::<Tz>()
                .ok()
                .map(|tz| instant.with_timezone(&tz).naive_local()),
            TimezonePolicy::Search => self.formatter.local_fields(instant, zone).ok(),
            TimezonePolicy::StaticTable => None,
        };
        viewed
            .or_else(|| static_local(instant, zone))
            .unwrap_or_else(|| instant.naive_utc())
    }
}

// -- Display helpers --

pub fn day_name(local: NaiveDateTime) -> &'static str {
    match local.weekday() {
        Weekday::Sun => "Sunday",
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
    }
}

/// `9PM`, `9:30PM`, `12AM`.
pub fn format_clock(local: NaiveDateTime) -> String {
    let (is_pm, hour12) = local.hour12();
    let suffix = if is_pm { "PM" } else { "AM" };
    match local.minute() {
        0 => format!("{hour12}{suffix}"),
        minute => format!("{hour12}:{minute:02}{suffix}"),
    }
}

pub fn format_time_range(start: NaiveDateTime, end: Option<NaiveDateTime>) -> String {
    match end {
        Some(end) => format!("{}-{}", format_clock(start), format_clock(end)),
        None => format_clock(start),
    }
}

/// Sunday through Saturday of the week containing `date`.
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - TimeDelta::days(i64::from(date.weekday().num_days_from_sunday()));
    (start, start + TimeDelta::days(6))
}

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date.with_day(1).unwrap_or(date);
    let next_month = if date.month() == 12 {
        NaiveDate::from_ymd_opt(date.year() + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(date.year(), date.month() + 1, 1)
    };
    let end = next_month.and_then(|d| d.pred_opt()).unwrap_or(date);
    (start, end)
}

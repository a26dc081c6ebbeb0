use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use rmcp::{ErrorData as McpError, model::*};
use serde::Serialize;

use crate::calendar::time_utils::{month_bounds, static_offset_minutes, week_bounds};
use crate::config::IngestOptions;
use crate::error::IngestError;

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, IngestError> {
    // Try RFC 3339 first (with timezone offset)
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    // Try without timezone (assume UTC)
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(naive.and_utc());
    }
    Err(IngestError::InvalidTimeRange(format!(
        "Cannot parse datetime: '{}'. Use ISO 8601 format.",
        s
    )))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, IngestError> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
        IngestError::InvalidInput(format!("Cannot parse date: '{}'. Use YYYY-MM-DD.", s))
    })
}

/// Per-call options: the server defaults with an optional zone override.
pub(crate) fn call_options(
    base: &IngestOptions,
    zone: Option<&str>,
) -> Result<IngestOptions, IngestError> {
    let Some(zone) = zone.map(str::trim).filter(|z| !z.is_empty()) else {
        return Ok(base.clone());
    };
    let known = zone.parse::<Tz>().is_ok()
        || static_offset_minutes(zone, Utc::now().date_naive()).is_some();
    if !known {
        return Err(IngestError::UnknownTimezone(zone.to_string()));
    }
    Ok(base.clone().with_default_timezone(zone))
}

/// Instants spanning the week or month around `date`, midnight to midnight
/// in `zone` (UTC when absent or unknown).
pub(crate) fn period_range(
    period: &str,
    date: NaiveDate,
    zone: Option<&str>,
) -> Result<(DateTime<Utc>, DateTime<Utc>), IngestError> {
    let (first, last) = match period.trim().to_ascii_lowercase().as_str() {
        "week" => week_bounds(date),
        "month" => month_bounds(date),
        other => {
            return Err(IngestError::InvalidInput(format!(
                "Unknown period '{other}'. Use 'week' or 'month'."
            )));
        }
    };
    let after_last = last
        .succ_opt()
        .ok_or_else(|| IngestError::InvalidTimeRange(format!("No day after {last}")))?;
    Ok((midnight(first, zone), midnight(after_last, zone)))
}

fn midnight(date: NaiveDate, zone: Option<&str>) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    zone.and_then(|z| z.parse::<Tz>().ok())
        .and_then(|tz| tz.from_local_datetime(&naive).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc())
}

pub(crate) fn ingest_err(e: IngestError) -> McpError {
    let code = match &e {
        IngestError::CalendarNotFound(_) | IngestError::EventNotFound(_) => {
            ErrorCode::RESOURCE_NOT_FOUND
        }
        IngestError::Fetch(_) => ErrorCode::INTERNAL_ERROR,
        _ => ErrorCode::INVALID_PARAMS,
    };
    McpError::new(code, e.to_string(), None::<serde_json::Value>)
}

pub(crate) fn json_text<T: Serialize>(value: &T) -> CallToolResult {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| serde_json::json!({"error": e.to_string()}).to_string());
    CallToolResult::success(vec![Content::text(json)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_datetime_rfc3339_utc() {
        let dt = parse_datetime("2025-01-15T09:00:00Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-15T09:00:00+00:00");
    }

    #[test]
    fn parse_datetime_rfc3339_with_offset() {
        let dt = parse_datetime("2025-01-15T09:00:00-05:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-15T14:00:00+00:00");
    }

    #[test]
    fn parse_datetime_naive_assumes_utc() {
        let dt = parse_datetime("2025-01-15T09:00:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-01-15T09:00:00+00:00");
    }

    #[test]
    fn parse_datetime_invalid_returns_error() {
        assert!(parse_datetime("not-a-date").is_err());
    }

    #[test]
    fn parse_date_accepts_iso_dates_only() {
        assert_eq!(parse_date("2025-10-25").unwrap(), NaiveDate::from_ymd_opt(2025, 10, 25).unwrap());
        assert!(matches!(parse_date("10/25/2025"), Err(IngestError::InvalidInput(_))));
    }

    #[test]
    fn call_options_validates_zone_override() {
        let base = IngestOptions::default();
        assert_eq!(call_options(&base, None).unwrap(), base);
        assert_eq!(call_options(&base, Some("  ")).unwrap(), base);
        assert_eq!(
            call_options(&base, Some("Europe/Berlin")).unwrap().default_timezone.as_deref(),
            Some("Europe/Berlin")
        );
        assert!(matches!(
            call_options(&base, Some("Mars/Olympus")),
            Err(IngestError::UnknownTimezone(_))
        ));
    }

    #[test]
    fn week_period_runs_sunday_to_sunday() {
        let date = NaiveDate::from_ymd_opt(2025, 10, 22).unwrap();
        let (start, end) = period_range("week", date, None).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-10-19T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-10-26T00:00:00+00:00");
    }

    #[test]
    fn month_period_uses_zone_midnight() {
        let date = NaiveDate::from_ymd_opt(2025, 2, 10).unwrap();
        let (start, end) = period_range("Month", date, Some("America/New_York")).unwrap();
        assert_eq!(start.to_rfc3339(), "2025-02-01T05:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2025-03-01T05:00:00+00:00");
        assert!(period_range("year", date, None).is_err());
    }

    #[test]
    fn ingest_err_maps_not_found_to_resource_not_found() {
        let err = ingest_err(IngestError::CalendarNotFound("test".to_string()));
        assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND);
        let err = ingest_err(IngestError::EventNotFound("test".to_string()));
        assert_eq!(err.code, ErrorCode::RESOURCE_NOT_FOUND);
    }

    #[test]
    fn ingest_err_maps_bad_input_to_invalid_params() {
        let err = ingest_err(IngestError::InvalidInput("bad".to_string()));
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
        let err = ingest_err(IngestError::UnknownTimezone("Mars/Olympus".to_string()));
        assert_eq!(err.code, ErrorCode::INVALID_PARAMS);
    }

    #[test]
    fn ingest_err_maps_fetch_failure_to_internal_error() {
        let err = ingest_err(IngestError::Fetch("timeout".to_string()));
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
    }
}

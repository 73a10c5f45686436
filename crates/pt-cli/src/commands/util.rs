//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use pt_core::{DeviceId, PixelId, PixelRef, TimeWindow};
use regex::Regex;

use crate::cli::{PixelArgs, WindowArgs};

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s+(minute|hour|day|week)s?\s+ago$").unwrap());

/// Conservative bounds for relative time parsing (~1000 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 1000 * 365 * 24 * 60;

/// Parse a datetime string as either ISO 8601 or relative time.
///
/// Relative times are measured back from `now`, the command's single reading of
/// the clock.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Relative: "2 hours ago", "30 minutes ago", "1 day ago", "1 week ago"
pub fn parse_datetime(s: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    // Try ISO 8601 first
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    // Try relative time: "N hours/minutes/days/weeks ago"
    let Some(caps) = RELATIVE_TIME_RE.captures(s) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z) or relative (e.g., '2 hours ago')"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    let duration = Duration::minutes(n * minutes_per_unit);
    Ok(now - duration)
}

/// Validates the pixel selection.
pub fn pixel_ref(args: &PixelArgs) -> anyhow::Result<PixelRef> {
    let device = DeviceId::new(args.device.clone()).context("invalid --device")?;
    let pixel = PixelId::new(args.pixel.clone()).context("invalid --pixel")?;
    Ok(PixelRef::new(device, pixel))
}

/// Resolves the explicit window, if one was given.
pub fn window(args: &WindowArgs, now: DateTime<Utc>) -> anyhow::Result<Option<TimeWindow>> {
    match (&args.start, &args.end) {
        (Some(start), Some(end)) => {
            let start = parse_datetime(start, now).context("invalid --start")?;
            let end = parse_datetime(end, now).context("invalid --end")?;
            Ok(Some(TimeWindow::new(start, end)?))
        }
        (None, None) => Ok(None),
        _ => anyhow::bail!("--start and --end must be given together"),
    }
}

/// Formats a timestamp for human-readable output.
pub fn display_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn parses_rfc3339_with_offset() {
        let parsed = parse_datetime("2025-01-01T13:00:00+01:00", now()).unwrap();
        assert_eq!(parsed, now());
    }

    #[test]
    fn relative_times_count_back_from_now() {
        let parsed = parse_datetime("2 hours ago", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
        let parsed = parse_datetime("1 minute ago", now()).unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2025, 1, 1, 11, 59, 0).unwrap());
    }

    #[test]
    fn rejects_garbage_and_overflow() {
        assert!(parse_datetime("yesterday-ish", now()).is_err());
        let err = parse_datetime("99999999 weeks ago", now()).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn window_rejects_inverted_bounds() {
        let args = WindowArgs {
            start: Some("2025-01-01T12:00:00Z".to_string()),
            end: Some("2025-01-01T10:00:00Z".to_string()),
        };
        let err = window(&args, now()).unwrap_err();
        assert!(err.to_string().contains("start"));
    }

    #[test]
    fn pixel_ref_rejects_blank_device() {
        let args = PixelArgs {
            device: " ".to_string(),
            pixel: "A".to_string(),
        };
        assert!(pixel_ref(&args).is_err());
    }

    #[test]
    fn display_time_drops_zero_fraction() {
        assert_eq!(display_time(now()), "2025-01-01T12:00:00Z");
    }
}

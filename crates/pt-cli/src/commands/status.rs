//! Status command: which pixel each channel holds at an instant.
//!
//! Every registered channel gets a row. Channels with no event up to the instant
//! report null pixel fields.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pt_core::{ChannelId, ChannelStatus, Clock, status_at};
use pt_db::Database;
use serde::Serialize;

use crate::commands::util::{display_time, parse_datetime};

#[derive(Debug, Serialize)]
struct StatusRow {
    board: u32,
    channel: u32,
    device_id: Option<String>,
    pixel_id: Option<String>,
    is_active: u8,
    last_event_time: Option<DateTime<Utc>>,
    last_event_type: Option<&'static str>,
}

impl StatusRow {
    fn new(channel: ChannelId, status: Option<&ChannelStatus>) -> Self {
        Self {
            board: channel.board,
            channel: channel.channel,
            device_id: status.map(|status| status.pixel.device.to_string()),
            pixel_id: status.map(|status| status.pixel.pixel.to_string()),
            is_active: u8::from(status.is_some_and(|status| status.is_active)),
            last_event_time: status.map(|status| status.last_event_time),
            last_event_type: status.map(|status| status.last_event_type.as_str()),
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    at: Option<&str>,
    clock: &dyn Clock,
    json: bool,
) -> Result<()> {
    let now = clock.now();
    let at = match at {
        Some(at) => parse_datetime(at, now)?,
        None => now,
    };

    let snapshot = db.snapshot()?;
    let statuses = status_at(&snapshot, at)?;
    let mut channels: BTreeMap<ChannelId, Option<&ChannelStatus>> = snapshot
        .channels()?
        .into_iter()
        .map(|record| (record.id, None))
        .collect();
    for (channel, status) in &statuses {
        channels.insert(*channel, Some(status));
    }

    if json {
        let rows: Vec<StatusRow> = channels
            .iter()
            .map(|(channel, status)| StatusRow::new(*channel, *status))
            .collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    writeln!(writer, "Channel status at {}", display_time(at))?;
    if channels.is_empty() {
        writeln!(writer, "No channels registered.")?;
        return Ok(());
    }
    for (channel, status) in &channels {
        let Some(status) = status else {
            writeln!(writer, "- {channel}: unused")?;
            continue;
        };
        let state = if status.is_active { "active" } else { "idle" };
        writeln!(
            writer,
            "- {}: {} {state} ({} at {})",
            status.channel,
            status.pixel,
            status.last_event_type,
            display_time(status.last_event_time),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;
    use insta::assert_snapshot;
    use pt_core::FixedClock;

    use crate::commands::test_support::scenario_db;

    fn clock() -> FixedClock {
        FixedClock(Utc.with_ymd_and_hms(2025, 1, 1, 11, 30, 0).unwrap())
    }

    #[test]
    fn status_lists_channels_in_order() {
        let db = scenario_db();
        let mut output = Vec::new();
        run(&mut output, &db, None, &clock(), false).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Channel status at 2025-01-01T11:30:00Z
        - 1:1: cell-1/A active (connected at 2025-01-01T11:00:00Z)
        - 2:1: cell-2/B idle (disconnected at 2025-01-01T10:50:00Z)
        - 3:1: unused
        ");
    }

    #[test]
    fn status_before_first_event_reports_every_channel_unused() {
        let db = scenario_db();
        let mut output = Vec::new();
        run(&mut output, &db, Some("2025-01-01T09:00:00Z"), &clock(), true).unwrap();

        let rows: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert!(row["device_id"].is_null());
            assert!(row["pixel_id"].is_null());
            assert!(row["last_event_time"].is_null());
            assert!(row["last_event_type"].is_null());
            assert_eq!(row["is_active"], 0);
        }
        assert_eq!(rows[2]["board"], 3);
    }

    #[test]
    fn status_json_uses_numeric_activity_flag() {
        let db = scenario_db();
        let mut output = Vec::new();
        run(&mut output, &db, Some("2025-01-01T10:40:00Z"), &clock(), true).unwrap();

        let rows: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["board"], 1);
        assert_eq!(rows[0]["is_active"], 0);
        assert_eq!(rows[0]["last_event_type"], "disconnected");
        assert_eq!(rows[1]["device_id"], "cell-2");
        assert_eq!(rows[1]["pixel_id"], "B");
        assert_eq!(rows[1]["is_active"], 1);
        assert!(rows[2]["device_id"].is_null());
        assert_eq!(rows[2]["is_active"], 0);
    }
}

//! History command: every connection change in a time range.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pt_core::{ChannelEventRecord, Clock, status_history};
use pt_db::Database;
use serde::Serialize;

use crate::commands::util::{display_time, parse_datetime};

#[derive(Debug, Serialize)]
struct HistoryRow {
    board: u32,
    channel: u32,
    device_id: String,
    pixel_id: String,
    is_active: u8,
    event_time: DateTime<Utc>,
    event_type: &'static str,
}

impl From<&ChannelEventRecord> for HistoryRow {
    fn from(record: &ChannelEventRecord) -> Self {
        Self {
            board: record.channel.board,
            channel: record.channel.channel,
            device_id: record.pixel.device.to_string(),
            pixel_id: record.pixel.pixel.to_string(),
            is_active: u8::from(record.is_active),
            event_time: record.event_time,
            event_type: record.event_type.as_str(),
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    start: &str,
    end: &str,
    clock: &dyn Clock,
    json: bool,
) -> Result<()> {
    let now = clock.now();
    let start = parse_datetime(start, now).context("invalid --start")?;
    let end = parse_datetime(end, now).context("invalid --end")?;

    let snapshot = db.snapshot()?;
    let records = status_history(&snapshot, start, end)?;

    if json {
        let rows: Vec<HistoryRow> = records.iter().map(HistoryRow::from).collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
        return Ok(());
    }

    if records.is_empty() {
        writeln!(writer, "No connection changes.")?;
        return Ok(());
    }
    let mut current = None;
    for record in &records {
        if current != Some(record.channel) {
            writeln!(writer, "Channel {}:", record.channel)?;
            current = Some(record.channel);
        }
        writeln!(
            writer,
            "- {} {} {}",
            display_time(record.event_time),
            record.event_type,
            record.pixel,
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
        FixedClock(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap())
    }

    #[test]
    fn history_groups_by_channel_and_includes_end() {
        let db = scenario_db();
        let mut output = Vec::new();
        run(
            &mut output,
            &db,
            "2025-01-01T10:00:00Z",
            "2025-01-01T11:00:00Z",
            &clock(),
            false,
        )
        .unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Channel 1:1:
        - 2025-01-01T10:00:00Z connected cell-1/A
        - 2025-01-01T10:30:00Z disconnected cell-1/A
        - 2025-01-01T11:00:00Z connected cell-1/A
        Channel 2:1:
        - 2025-01-01T10:05:00Z connected cell-2/B
        - 2025-01-01T10:50:00Z disconnected cell-2/B
        ");
    }

    #[test]
    fn history_json_rows() {
        let db = scenario_db();
        let mut output = Vec::new();
        run(&mut output, &db, "90 minutes ago", "75 minutes ago", &clock(), true).unwrap();

        let rows: Vec<serde_json::Value> = serde_json::from_slice(&output).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["board"], 1);
        assert_eq!(rows[0]["event_type"], "disconnected");
        assert_eq!(rows[0]["is_active"], 0);
        assert_eq!(rows[0]["event_time"], "2025-01-01T10:30:00Z");
    }

    #[test]
    fn history_rejects_inverted_range() {
        let db = scenario_db();
        let mut output = Vec::new();
        let err = run(
            &mut output,
            &db,
            "2025-01-01T11:00:00Z",
            "2025-01-01T10:00:00Z",
            &clock(),
            false,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid time window"));
    }
}

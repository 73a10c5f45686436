//! Measurements command: samples attributed to a pixel, as JSONL.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use pt_core::{AttributedSample, Clock, FixedClock, SequencePolicy, join_measurements};
use pt_db::Database;
use serde::Serialize;

use crate::cli::{PixelArgs, WindowArgs};
use crate::commands::util::{pixel_ref, window};

/// One output line.
#[derive(Debug, Serialize)]
struct MeasurementLine {
    timestamp: DateTime<Utc>,
    board: u32,
    channel: u32,
    current: f64,
    voltage: f64,
    power: f64,
    activation_time: DateTime<Utc>,
}

impl From<AttributedSample> for MeasurementLine {
    fn from(sample: AttributedSample) -> Self {
        Self {
            timestamp: sample.timestamp,
            board: sample.channel.board,
            channel: sample.channel.channel,
            current: sample.reading.current,
            voltage: sample.reading.voltage,
            power: sample.reading.power,
            activation_time: sample.activation_time,
        }
    }
}

/// Streams the attributed samples, returning how many were written.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    pixel: &PixelArgs,
    window_args: &WindowArgs,
    clock: &dyn Clock,
    policy: SequencePolicy,
) -> Result<usize> {
    let pixel = pixel_ref(pixel)?;
    let now = clock.now();
    let window = window(window_args, now)?;

    let snapshot = db.snapshot()?;
    let samples = join_measurements(&snapshot, &pixel, window, &FixedClock(now), policy)?;

    let mut written = 0;
    for sample in samples {
        let sample = sample.with_context(|| format!("failed to read samples for {pixel}"))?;
        let line = serde_json::to_string(&MeasurementLine::from(sample))?;
        writeln!(writer, "{line}")?;
        written += 1;
    }
    Ok(written)
}

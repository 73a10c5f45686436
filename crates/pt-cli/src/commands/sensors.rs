//! Sensors command: temperature or irradiance readings attributed to a pixel, as JSONL.

use std::io::Write;

use anyhow::{Context, Result};
use pt_core::{Clock, FixedClock, SensorKind, SequencePolicy, join_sensor_readings};
use pt_db::Database;

use crate::cli::{PixelArgs, WindowArgs};
use crate::commands::util::{pixel_ref, window};

/// Streams the attributed readings of `kind`, returning how many were written.
pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    pixel: &PixelArgs,
    window_args: &WindowArgs,
    kind: SensorKind,
    clock: &dyn Clock,
    policy: SequencePolicy,
) -> Result<usize> {
    let pixel = pixel_ref(pixel)?;
    let now = clock.now();
    let window = window(window_args, now)?;

    let snapshot = db.snapshot()?;
    let readings = join_sensor_readings(&snapshot, &pixel, kind, window, &FixedClock(now), policy)?;

    let mut written = 0;
    for reading in readings {
        let reading =
            reading.with_context(|| format!("failed to read {kind} readings for {pixel}"))?;
        writeln!(writer, "{}", serde_json::to_string(&reading)?)?;
        written += 1;
    }
    Ok(written)
}

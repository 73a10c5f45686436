//! Summary command: MPP and sensor statistics of a pixel's attributed data.

use std::io::Write;

use anyhow::Result;
use pt_core::{
    Clock, FixedClock, SampleSummary, SensorKind, SensorSummary, SequencePolicy,
    join_measurements, join_sensor_readings, summarize, summarize_sensor,
};
use pt_db::Database;
use serde::Serialize;

use crate::cli::{PixelArgs, WindowArgs};
use crate::commands::util::{display_time, pixel_ref, window};

#[derive(Debug, Serialize)]
struct SummaryReport {
    #[serde(flatten)]
    mpp: SampleSummary,
    temperature: SensorSummary,
    irradiance: SensorSummary,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    pixel: &PixelArgs,
    window_args: &WindowArgs,
    clock: &dyn Clock,
    policy: SequencePolicy,
    json: bool,
) -> Result<()> {
    let pixel = pixel_ref(pixel)?;
    let now = clock.now();
    let window = window(window_args, now)?;
    let clock = FixedClock(now);

    let snapshot = db.snapshot()?;
    let samples = join_measurements(&snapshot, &pixel, window, &clock, policy)?;
    let sensor = |kind| -> Result<SensorSummary> {
        let readings = join_sensor_readings(&snapshot, &pixel, kind, window, &clock, policy)?;
        Ok(summarize_sensor(kind, readings)?)
    };
    let report = SummaryReport {
        mpp: summarize(samples)?,
        temperature: sensor(SensorKind::Temperature)?,
        irradiance: sensor(SensorKind::Irradiance)?,
    };

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
        return Ok(());
    }
    write_text(writer, &pixel.to_string(), &report)
}

fn write_text<W: Write>(writer: &mut W, pixel: &str, report: &SummaryReport) -> Result<()> {
    let summary = &report.mpp;
    writeln!(writer, "Pixel {pixel}")?;
    if summary.count == 0 {
        writeln!(writer, "No samples attributed.")?;
    } else {
        writeln!(writer, "Samples: {}", summary.count)?;
        if let (Some(first), Some(last)) = (summary.first, summary.last) {
            writeln!(writer, "Span:    {} .. {}", display_time(first), display_time(last))?;
        }
        if let (Some(min), Some(max), Some(avg)) =
            (summary.min_power, summary.max_power, summary.avg_power)
        {
            writeln!(writer, "Power:   min {min:.6} W, max {max:.6} W, avg {avg:.6} W")?;
        }
        if let (Some(current), Some(voltage)) = (summary.avg_current, summary.avg_voltage) {
            writeln!(writer, "Average: {current:.6} A at {voltage:.6} V")?;
        }
    }
    for sensor in [&report.temperature, &report.irradiance] {
        write_sensor(writer, sensor)?;
    }
    if !summary.per_activation.is_empty() {
        writeln!(writer, "Activations:")?;
    }
    for (activation, count) in &summary.per_activation {
        writeln!(writer, "- {}: {count} samples", display_time(*activation))?;
    }
    Ok(())
}

fn write_sensor<W: Write>(writer: &mut W, sensor: &SensorSummary) -> Result<()> {
    let (Some(min), Some(max), Some(avg)) = (sensor.min, sensor.max, sensor.avg) else {
        return Ok(());
    };
    let (label, unit) = match sensor.kind {
        SensorKind::Temperature => ("Temperature", "°C"),
        SensorKind::Irradiance => ("Irradiance", "W/m²"),
    };
    writeln!(
        writer,
        "{label}: {} readings, min {min:.2} {unit}, max {max:.2} {unit}, avg {avg:.2} {unit}",
        sensor.count,
    )?;
    Ok(())
}

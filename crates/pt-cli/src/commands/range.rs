//! Range command: the default analysis window of a pixel.

use std::io::Write;

use anyhow::Result;
use pt_core::{Clock, resolve_default_range};
use pt_db::Database;
use serde::Serialize;

use crate::cli::PixelArgs;
use crate::commands::util::{display_time, pixel_ref};

#[derive(Debug, Serialize)]
struct RangeOutput {
    device: String,
    pixel: String,
    start: Option<String>,
    end: Option<String>,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    args: &PixelArgs,
    clock: &dyn Clock,
    json: bool,
) -> Result<()> {
    let pixel = pixel_ref(args)?;
    let snapshot = db.snapshot()?;
    let window = resolve_default_range(&snapshot, &pixel, clock)?;

    if json {
        let output = RangeOutput {
            device: pixel.device.to_string(),
            pixel: pixel.pixel.to_string(),
            start: window.map(|window| display_time(window.start())),
            end: window.map(|window| display_time(window.end())),
        };
        writeln!(writer, "{}", serde_json::to_string(&output)?)?;
        return Ok(());
    }

    match window {
        Some(window) => {
            writeln!(writer, "Pixel {pixel}")?;
            writeln!(writer, "Start: {}", display_time(window.start()))?;
            writeln!(writer, "End:   {}", display_time(window.end()))?;
        }
        None => writeln!(writer, "Pixel {pixel} was never connected.")?,
    }
    Ok(())
}

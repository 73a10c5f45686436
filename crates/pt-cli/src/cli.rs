//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pt_core::SensorKind;

/// Pixel connection history and measurement attribution.
///
/// Reconstructs which tracking channel each device pixel was wired to and
/// attributes channel samples to the pixel that held the channel.
#[derive(Debug, Parser)]
#[command(name = "pt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Freeze "now" at this RFC 3339 instant instead of reading the system clock.
    #[arg(long, global = true)]
    pub now: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import channels, connection events, MPP samples and sensor readings as JSONL
    /// from stdin.
    Import,

    /// Show the default analysis window of a pixel.
    Range {
        #[command(flatten)]
        pixel: PixelArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the samples attributed to a pixel as JSONL.
    Measurements {
        #[command(flatten)]
        pixel: PixelArgs,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Print the temperature or irradiance readings attributed to a pixel as JSONL.
    Sensors {
        #[command(flatten)]
        pixel: PixelArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Which sensor stream to read.
        #[arg(long, value_enum)]
        kind: SensorArg,
    },

    /// Summarize the samples and sensor readings attributed to a pixel.
    Summary {
        #[command(flatten)]
        pixel: PixelArgs,

        #[command(flatten)]
        window: WindowArgs,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show what is attached to each channel.
    Status {
        /// Instant to report (ISO 8601 or relative, e.g. "2 hours ago"). Defaults to now.
        #[arg(long)]
        at: Option<String>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// List every connection change between two instants, both inclusive.
    History {
        /// Start of the range (ISO 8601 or relative).
        #[arg(long)]
        start: String,

        /// End of the range (ISO 8601 or relative).
        #[arg(long)]
        end: String,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// Selects one pixel of one device.
#[derive(Debug, Args)]
pub struct PixelArgs {
    /// Device identifier.
    #[arg(long)]
    pub device: String,

    /// Pixel label within the device.
    #[arg(long)]
    pub pixel: String,
}

/// Optional explicit query window; the pixel's default range is used when omitted.
#[derive(Debug, Args)]
pub struct WindowArgs {
    /// Window start (ISO 8601 or relative).
    #[arg(long, requires = "end")]
    pub start: Option<String>,

    /// Window end, exclusive (ISO 8601 or relative).
    #[arg(long, requires = "start")]
    pub end: Option<String>,
}

/// Sensor stream selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SensorArg {
    Temperature,
    Irradiance,
}

impl From<SensorArg> for SensorKind {
    fn from(arg: SensorArg) -> Self {
        match arg {
            SensorArg::Temperature => Self::Temperature,
            SensorArg::Irradiance => Self::Irradiance,
        }
    }
}

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pt_cli::commands::{history, import, measurements, range, sensors, status, summary};
use pt_cli::{Cli, Commands, Config};
use pt_core::{Clock, FixedClock, MonotonicClock, SystemClock};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(pt_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = pt_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

/// A frozen clock when `--now` is given, the system clock otherwise.
fn clock(now: Option<&str>) -> Result<Box<dyn Clock>> {
    match now {
        Some(now) => {
            let now = DateTime::parse_from_rfc3339(now)
                .with_context(|| format!("invalid --now: {now}"))?;
            Ok(Box::new(FixedClock(now.with_timezone(&Utc))))
        }
        None => Ok(Box::new(MonotonicClock::new(SystemClock))),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let clock = clock(cli.now.as_deref())?;
    let (mut db, config) = open_database(cli.config.as_deref())?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match command {
        Commands::Import => {
            let stats = import::run(io::stdin().lock(), &mut db)?;
            eprintln!(
                "Imported {} channels, {} events, {} samples, {} sensor readings",
                stats.channels, stats.events, stats.samples, stats.sensor_readings
            );
        }
        Commands::Range { pixel, json } => {
            range::run(&mut out, &db, pixel, &*clock, *json)?;
        }
        Commands::Measurements { pixel, window } => {
            let written = measurements::run(
                &mut out,
                &db,
                pixel,
                window,
                &*clock,
                config.sequence_policy,
            )?;
            tracing::debug!(written, "measurements written");
        }
        Commands::Sensors {
            pixel,
            window,
            kind,
        } => {
            let written = sensors::run(
                &mut out,
                &db,
                pixel,
                window,
                (*kind).into(),
                &*clock,
                config.sequence_policy,
            )?;
            tracing::debug!(written, "sensor readings written");
        }
        Commands::Summary {
            pixel,
            window,
            json,
        } => {
            summary::run(
                &mut out,
                &db,
                pixel,
                window,
                &*clock,
                config.sequence_policy,
                *json,
            )?;
        }
        Commands::Status { at, json } => {
            status::run(&mut out, &db, at.as_deref(), &*clock, *json)?;
        }
        Commands::History { start, end, json } => {
            history::run(&mut out, &db, start, end, &*clock, *json)?;
        }
    }

    out.flush()?;
    Ok(())
}

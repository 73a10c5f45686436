//! Storage layer for pixeltrace.
//!
//! Persists channels, connection events, MPP samples and sensor readings using
//! `rusqlite`, and
//! serves them to the reconciliation engine through [`Snapshot`].
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! A `Database` instance can be moved between threads but cannot be shared across
//! threads without external synchronization.
//!
//! # Consistency
//!
//! Every query should run against one [`Snapshot`], a read transaction opened with
//! [`Database::snapshot`]. Events and samples read through the same snapshot observe
//! the same state of the database, even while another connection appends.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in fixed-width RFC 3339 with microsecond precision
//! (e.g., `2025-01-15T10:30:00.000000Z`). This keeps lexicographic order equal to
//! chronological order, which the range queries rely on.
//!
//! ## Referential integrity
//!
//! Events and samples reference a row in `channels`. Importing an event or sample
//! registers its channel if it is unknown. Sensor readings are keyed by sensor id
//! only; events name the sensors they were recorded against.

mod snapshot;

use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use pt_core::{ChannelId, ConnectionEvent, Sample, SensorKind, SensorSample};
use rusqlite::{Connection, params};
use thiserror::Error;

pub use snapshot::{SAMPLE_BATCH_SIZE, SampleCursor, SensorCursor, Snapshot};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {context}: {timestamp}")]
    TimestampParse {
        context: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row could not be turned back into a domain value.
    #[error("invalid stored data for {context}: {message}")]
    InvalidData { context: String, message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A physical tracking channel and its wiring details.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRecord {
    pub id: ChannelId,
    pub address: Option<String>,
    pub com_port: Option<String>,
    pub current_limit: Option<f64>,
}

impl ChannelRecord {
    pub const fn bare(id: ChannelId) -> Self {
        Self {
            id,
            address: None,
            com_port: None,
            current_limit: None,
        }
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS channels (
                board INTEGER NOT NULL,
                channel INTEGER NOT NULL,
                address TEXT,
                com_port TEXT,
                current_limit REAL,
                PRIMARY KEY (board, channel)
            );

            -- Connection events: append-only attach/detach log
            -- timestamp: RFC 3339, microseconds (e.g., '2025-01-15T10:30:00.000000Z')
            -- event_type: 'connected' or 'disconnected'
            CREATE TABLE IF NOT EXISTS connection_events (
                device_id TEXT NOT NULL,
                pixel TEXT NOT NULL,
                board INTEGER NOT NULL,
                channel INTEGER NOT NULL,
                event_type TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                mppt_mode TEXT,
                mppt_polarity TEXT,
                temperature_sensor TEXT,
                irradiance_sensor TEXT,
                PRIMARY KEY (device_id, pixel, timestamp),
                FOREIGN KEY (board, channel) REFERENCES channels(board, channel)
            );

            CREATE INDEX IF NOT EXISTS idx_connection_events_timestamp
                ON connection_events(timestamp);
            CREATE INDEX IF NOT EXISTS idx_connection_events_channel
                ON connection_events(board, channel, timestamp);

            CREATE TABLE IF NOT EXISTS mpp_measurements (
                board INTEGER NOT NULL,
                channel INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                current REAL NOT NULL,
                voltage REAL NOT NULL,
                power REAL NOT NULL,
                PRIMARY KEY (board, channel, timestamp),
                FOREIGN KEY (board, channel) REFERENCES channels(board, channel)
            );

            CREATE TABLE IF NOT EXISTS temperature_measurements (
                sensor_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                temperature REAL NOT NULL,
                PRIMARY KEY (sensor_id, timestamp)
            );

            -- raw_reading: the sensor's unconverted count, when reported
            CREATE TABLE IF NOT EXISTS irradiance_measurements (
                sensor_id TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                irradiance REAL NOT NULL,
                raw_reading INTEGER,
                PRIMARY KEY (sensor_id, timestamp)
            );
            ",
        )?;
        Ok(())
    }

    /// Registers channels, filling in wiring details that were previously unknown.
    pub fn insert_channels(&mut self, channels: &[ChannelRecord]) -> Result<usize, DbError> {
        if channels.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO channels (board, channel, address, com_port, current_limit)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(board, channel) DO UPDATE SET
                    address = COALESCE(excluded.address, channels.address),
                    com_port = COALESCE(excluded.com_port, channels.com_port),
                    current_limit = COALESCE(excluded.current_limit, channels.current_limit)
                ",
            )?;
            for record in channels {
                inserted += stmt.execute(params![
                    record.id.board,
                    record.id.channel,
                    record.address,
                    record.com_port,
                    record.current_limit,
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Appends connection events, ignoring duplicates of `(device, pixel, timestamp)`.
    pub fn insert_events(&mut self, events: &[ConnectionEvent]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut channel_stmt =
                tx.prepare("INSERT OR IGNORE INTO channels (board, channel) VALUES (?, ?)")?;
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO connection_events
                (device_id, pixel, board, channel, event_type, timestamp,
                 mppt_mode, mppt_polarity, temperature_sensor, irradiance_sensor)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for event in events {
                channel_stmt.execute(params![event.channel.board, event.channel.channel])?;
                inserted += stmt.execute(params![
                    event.pixel.device.as_str(),
                    event.pixel.pixel.as_str(),
                    event.channel.board,
                    event.channel.channel,
                    event.event_type.as_str(),
                    format_timestamp(event.timestamp),
                    event.mppt_mode,
                    event.mppt_polarity,
                    event.temperature_sensor,
                    event.irradiance_sensor,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(received = events.len(), inserted, "stored connection events");
        Ok(inserted)
    }

    /// Appends samples, ignoring duplicates of `(channel, timestamp)`.
    pub fn insert_samples(&mut self, samples: &[Sample]) -> Result<usize, DbError> {
        if samples.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut channel_stmt =
                tx.prepare("INSERT OR IGNORE INTO channels (board, channel) VALUES (?, ?)")?;
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO mpp_measurements
                (board, channel, timestamp, current, voltage, power)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for sample in samples {
                channel_stmt.execute(params![sample.channel.board, sample.channel.channel])?;
                inserted += stmt.execute(params![
                    sample.channel.board,
                    sample.channel.channel,
                    format_timestamp(sample.timestamp),
                    sample.reading.current,
                    sample.reading.voltage,
                    sample.reading.power,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(received = samples.len(), inserted, "stored samples");
        Ok(inserted)
    }

    /// Appends temperature and irradiance readings, ignoring duplicates of
    /// `(sensor, timestamp)` within a kind.
    pub fn insert_sensor_samples(&mut self, samples: &[SensorSample]) -> Result<usize, DbError> {
        if samples.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut temperature = tx.prepare(
                "
                INSERT OR IGNORE INTO temperature_measurements
                (sensor_id, timestamp, temperature)
                VALUES (?, ?, ?)
                ",
            )?;
            let mut irradiance = tx.prepare(
                "
                INSERT OR IGNORE INTO irradiance_measurements
                (sensor_id, timestamp, irradiance, raw_reading)
                VALUES (?, ?, ?, ?)
                ",
            )?;
            for sample in samples {
                let sensor = sample.sensor.as_str();
                let timestamp = format_timestamp(sample.timestamp);
                inserted += match sample.kind {
                    SensorKind::Temperature => {
                        temperature.execute(params![sensor, timestamp, sample.value])?
                    }
                    SensorKind::Irradiance => irradiance.execute(params![
                        sensor,
                        timestamp,
                        sample.value,
                        sample.raw_reading,
                    ])?,
                };
            }
        }
        tx.commit()?;
        tracing::debug!(received = samples.len(), inserted, "stored sensor readings");
        Ok(inserted)
    }

    /// Lists registered channels ordered by board then channel.
    pub fn list_channels(&self) -> Result<Vec<ChannelRecord>, DbError> {
        query_channels(&self.conn)
    }

    /// Opens a read transaction that serves one query from a single consistency point.
    pub fn snapshot(&self) -> Result<Snapshot<'_>, DbError> {
        Snapshot::begin(&self.conn)
    }
}

pub(crate) fn query_channels(conn: &Connection) -> Result<Vec<ChannelRecord>, DbError> {
    let mut stmt = conn.prepare_cached(
        "
        SELECT board, channel, address, com_port, current_limit
        FROM channels
        ORDER BY board ASC, channel ASC
        ",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(ChannelRecord {
            id: ChannelId::new(row.get(0)?, row.get(1)?),
            address: row.get(2)?,
            com_port: row.get(3)?,
            current_limit: row.get(4)?,
        })
    })?;
    let mut channels = Vec::new();
    for row in rows {
        channels.push(row?);
    }
    Ok(channels)
}

pub(crate) fn parse_timestamp(timestamp: &str, context: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            context: context.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

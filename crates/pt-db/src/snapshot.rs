//! Read side: the engine's event log, measurement store and sensor store over one
//! transaction.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use pt_core::{
    ChannelId, ConnectionEvent, DeviceId, EventLog, MeasurementStore, PixelId, PixelRef, Reading,
    Sample, SampleIter, SensorId, SensorKind, SensorSample, SensorSampleIter, SensorStore,
};
use rusqlite::{Connection, Row, Transaction, params};

use crate::{ChannelRecord, DbError, format_timestamp, parse_timestamp, query_channels};

/// Maximum number of samples or sensor readings fetched from SQLite per round trip.
pub const SAMPLE_BATCH_SIZE: usize = 512;

const EVENT_COLUMNS: &str = "device_id, pixel, board, channel, event_type, timestamp, \
     mppt_mode, mppt_polarity, temperature_sensor, irradiance_sensor";

/// A read transaction. Dropping it ends the transaction without writing anything.
pub struct Snapshot<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> Snapshot<'conn> {
    pub(crate) fn begin(conn: &'conn Connection) -> Result<Self, DbError> {
        let tx = conn.unchecked_transaction()?;
        Ok(Self { tx })
    }

    /// Registered channels, including those no event has ever referenced.
    pub fn channels(&self) -> Result<Vec<ChannelRecord>, DbError> {
        query_channels(&self.tx)
    }

    fn query_events(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<ConnectionEvent>, DbError> {
        let mut stmt = self.tx.prepare_cached(sql)?;
        let rows = stmt.query_map(params, EventRow::from_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }
}

impl EventLog for Snapshot<'_> {
    type Error = DbError;

    fn events_for(
        &self,
        pixel: &PixelRef,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ConnectionEvent>, Self::Error> {
        let sql = format!(
            "
            SELECT {EVENT_COLUMNS}
            FROM connection_events
            WHERE device_id = ?1 AND pixel = ?2 AND (?3 IS NULL OR timestamp <= ?3)
            ORDER BY timestamp ASC
            "
        );
        self.query_events(
            &sql,
            params![
                pixel.device.as_str(),
                pixel.pixel.as_str(),
                until.map(format_timestamp),
            ],
        )
    }

    fn latest_per_channel(&self, at: DateTime<Utc>) -> Result<Vec<ConnectionEvent>, Self::Error> {
        let sql = format!(
            "
            SELECT {EVENT_COLUMNS}
            FROM connection_events
            WHERE (board, channel, timestamp) IN (
                SELECT board, channel, MAX(timestamp)
                FROM connection_events
                WHERE timestamp <= ?1
                GROUP BY board, channel
            )
            ORDER BY board ASC, channel ASC,
                     CASE event_type WHEN 'connected' THEN 0 ELSE 1 END,
                     device_id ASC, pixel ASC
            "
        );
        self.query_events(&sql, params![format_timestamp(at)])
    }

    fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConnectionEvent>, Self::Error> {
        let sql = format!(
            "
            SELECT {EVENT_COLUMNS}
            FROM connection_events
            WHERE timestamp >= ?1 AND timestamp <= ?2
            ORDER BY board ASC, channel ASC, timestamp ASC,
                     CASE event_type WHEN 'disconnected' THEN 0 ELSE 1 END
            "
        );
        self.query_events(&sql, params![format_timestamp(start), format_timestamp(end)])
    }
}

impl MeasurementStore for Snapshot<'_> {
    type Error = DbError;

    fn samples_for(
        &self,
        channel: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SampleIter<'_, Self::Error>, Self::Error> {
        Ok(Box::new(SampleCursor::new(&self.tx, channel, start, end)))
    }
}

impl SensorStore for Snapshot<'_> {
    type Error = DbError;

    fn sensor_samples_for(
        &self,
        kind: SensorKind,
        sensor: &SensorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SensorSampleIter<'_, Self::Error>, Self::Error> {
        Ok(Box::new(SensorCursor::new(&self.tx, kind, sensor.clone(), start, end)))
    }
}

/// Keyset-paginated scan of one channel's samples in `[start, end)`.
///
/// Holds at most one batch in memory; the next batch is fetched only once the
/// current one is drained.
pub struct SampleCursor<'a> {
    conn: &'a Connection,
    channel: ChannelId,
    start: String,
    end: String,
    after: Option<String>,
    buffer: VecDeque<Sample>,
    exhausted: bool,
}

impl<'a> SampleCursor<'a> {
    pub fn new(
        conn: &'a Connection,
        channel: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            conn,
            channel,
            start: format_timestamp(start),
            end: format_timestamp(end),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch_batch(&mut self) -> Result<(), DbError> {
        let mut stmt = self.conn.prepare_cached(
            "
            SELECT timestamp, current, voltage, power
            FROM mpp_measurements
            WHERE board = ?1 AND channel = ?2
              AND timestamp >= ?3 AND timestamp < ?4
              AND (?5 IS NULL OR timestamp > ?5)
            ORDER BY timestamp ASC
            LIMIT ?6
            ",
        )?;
        let limit = i64::try_from(SAMPLE_BATCH_SIZE).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![
                self.channel.board,
                self.channel.channel,
                self.start,
                self.end,
                self.after,
                limit,
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            },
        )?;

        let mut fetched = 0;
        let mut last = None;
        for row in rows {
            let (timestamp, current, voltage, power) = row?;
            let parsed =
                parse_timestamp(&timestamp, &format!("sample on channel {}", self.channel))?;
            self.buffer.push_back(Sample {
                channel: self.channel,
                timestamp: parsed,
                reading: Reading {
                    current,
                    voltage,
                    power,
                },
            });
            last = Some(timestamp);
            fetched += 1;
        }
        if fetched < SAMPLE_BATCH_SIZE {
            self.exhausted = true;
        }
        if last.is_some() {
            self.after = last;
        }
        tracing::trace!(channel = %self.channel, fetched, "fetched sample batch");
        Ok(())
    }
}

impl Iterator for SampleCursor<'_> {
    type Item = Result<Sample, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_batch() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Keyset-paginated scan of one sensor's readings in `[start, end)`.
pub struct SensorCursor<'a> {
    conn: &'a Connection,
    kind: SensorKind,
    sensor: SensorId,
    start: String,
    end: String,
    after: Option<String>,
    buffer: VecDeque<SensorSample>,
    exhausted: bool,
}

impl<'a> SensorCursor<'a> {
    pub fn new(
        conn: &'a Connection,
        kind: SensorKind,
        sensor: SensorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Self {
        Self {
            conn,
            kind,
            sensor,
            start: format_timestamp(start),
            end: format_timestamp(end),
            after: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    const fn query(kind: SensorKind) -> &'static str {
        match kind {
            SensorKind::Temperature => {
                "
                SELECT timestamp, temperature, NULL
                FROM temperature_measurements
                WHERE sensor_id = ?1
                  AND timestamp >= ?2 AND timestamp < ?3
                  AND (?4 IS NULL OR timestamp > ?4)
                ORDER BY timestamp ASC
                LIMIT ?5
                "
            }
            SensorKind::Irradiance => {
                "
                SELECT timestamp, irradiance, raw_reading
                FROM irradiance_measurements
                WHERE sensor_id = ?1
                  AND timestamp >= ?2 AND timestamp < ?3
                  AND (?4 IS NULL OR timestamp > ?4)
                ORDER BY timestamp ASC
                LIMIT ?5
                "
            }
        }
    }

    fn fetch_batch(&mut self) -> Result<(), DbError> {
        let mut stmt = self.conn.prepare_cached(Self::query(self.kind))?;
        let limit = i64::try_from(SAMPLE_BATCH_SIZE).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![self.sensor.as_str(), self.start, self.end, self.after, limit],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            },
        )?;

        let mut fetched = 0;
        let mut last = None;
        for row in rows {
            let (timestamp, value, raw_reading) = row?;
            let context = format!("{} reading of {}", self.kind, self.sensor);
            self.buffer.push_back(SensorSample {
                kind: self.kind,
                sensor: self.sensor.clone(),
                timestamp: parse_timestamp(&timestamp, &context)?,
                value,
                raw_reading,
            });
            last = Some(timestamp);
            fetched += 1;
        }
        if fetched < SAMPLE_BATCH_SIZE {
            self.exhausted = true;
        }
        if last.is_some() {
            self.after = last;
        }
        tracing::trace!(kind = %self.kind, sensor = %self.sensor, fetched, "fetched sensor batch");
        Ok(())
    }
}

impl Iterator for SensorCursor<'_> {
    type Item = Result<SensorSample, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            if let Err(err) = self.fetch_batch() {
                self.exhausted = true;
                self.buffer.clear();
                return Some(Err(err));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}

/// Raw `connection_events` row before validation.
struct EventRow {
    device_id: String,
    pixel: String,
    board: u32,
    channel: u32,
    event_type: String,
    timestamp: String,
    mppt_mode: Option<String>,
    mppt_polarity: Option<String>,
    temperature_sensor: Option<String>,
    irradiance_sensor: Option<String>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            device_id: row.get(0)?,
            pixel: row.get(1)?,
            board: row.get(2)?,
            channel: row.get(3)?,
            event_type: row.get(4)?,
            timestamp: row.get(5)?,
            mppt_mode: row.get(6)?,
            mppt_polarity: row.get(7)?,
            temperature_sensor: row.get(8)?,
            irradiance_sensor: row.get(9)?,
        })
    }

    fn into_event(self) -> Result<ConnectionEvent, DbError> {
        let context = format!("{}/{} at {}", self.device_id, self.pixel, self.timestamp);
        let invalid = |message: String| DbError::InvalidData {
            context: context.clone(),
            message,
        };
        let device = DeviceId::new(self.device_id).map_err(|err| invalid(err.to_string()))?;
        let pixel = PixelId::new(self.pixel).map_err(|err| invalid(err.to_string()))?;
        let event_type = self
            .event_type
            .parse()
            .map_err(|err: pt_core::UnknownEventType| invalid(err.to_string()))?;
        let timestamp = parse_timestamp(&self.timestamp, &context)?;
        Ok(ConnectionEvent {
            pixel: PixelRef::new(device, pixel),
            channel: ChannelId::new(self.board, self.channel),
            event_type,
            timestamp,
            mppt_mode: self.mppt_mode,
            mppt_polarity: self.mppt_polarity,
            temperature_sensor: self.temperature_sensor,
            irradiance_sensor: self.irradiance_sensor,
        })
    }
}

//! Import command for loading channels, connection events, samples and sensor
//! readings.
//!
//! Input is JSONL on stdin, one tagged message per line:
//!
//! ```text
//! {"type":"channel","board":1,"channel":3,"address":"0x21","com_port":"COM4","current_limit":0.05}
//! {"type":"connection","device_id":"cell-1","pixel":"A","board":1,"channel":3,"event_type":"connected","timestamp":"2025-01-01T10:00:00Z"}
//! {"type":"mpp","board":1,"channel":3,"timestamp":"2025-01-01T10:00:05Z","current":0.021,"voltage":0.93}
//! {"type":"temperature","sensor_id":"temp-1","timestamp":"2025-01-01T10:00:05Z","temperature":25.4}
//! {"type":"irradiance","sensor_id":"irr-1","timestamp":"2025-01-01T10:00:05Z","irradiance":812.0,"raw_reading":8120}
//! ```

use std::io::BufRead;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use pt_core::{
    ChannelId, ConnectionEvent, ConnectionEventType, DeviceId, PixelId, PixelRef, Reading, Sample,
    SensorId, SensorKind, SensorSample,
};
use pt_db::{ChannelRecord, Database};

/// Counts of newly stored rows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportStats {
    pub channels: usize,
    pub events: usize,
    pub samples: usize,
    pub sensor_readings: usize,
}

/// Parsed input, grouped by destination table.
#[derive(Debug, Default)]
struct ImportBatch {
    channels: Vec<ChannelRecord>,
    events: Vec<ConnectionEvent>,
    samples: Vec<Sample>,
    sensor_readings: Vec<SensorSample>,
}

pub fn run<R: BufRead>(reader: R, db: &mut Database) -> Result<ImportStats> {
    let batch = parse_messages(reader)?;
    let stats = ImportStats {
        channels: db.insert_channels(&batch.channels)?,
        events: db.insert_events(&batch.events)?,
        samples: db.insert_samples(&batch.samples)?,
        sensor_readings: db.insert_sensor_samples(&batch.sensor_readings)?,
    };
    tracing::debug!(?stats, "import finished");
    Ok(stats)
}

fn parse_messages<R: BufRead>(reader: R) -> Result<ImportBatch> {
    let mut batch = ImportBatch::default();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let message: ImportMessage = serde_json::from_str(trimmed)
            .with_context(|| format!("invalid message on line {}", idx + 1))?;
        match message {
            ImportMessage::Channel {
                board,
                channel,
                address,
                com_port,
                current_limit,
            } => batch.channels.push(ChannelRecord {
                id: ChannelId::new(board, channel),
                address,
                com_port,
                current_limit,
            }),
            ImportMessage::Connection(message) => {
                let event = message
                    .into_event()
                    .with_context(|| format!("invalid connection event on line {}", idx + 1))?;
                batch.events.push(event);
            }
            ImportMessage::Mpp {
                board,
                channel,
                timestamp,
                current,
                voltage,
                power,
            } => batch.samples.push(Sample {
                channel: ChannelId::new(board, channel),
                timestamp,
                reading: Reading::new(current, voltage, power),
            }),
            ImportMessage::Temperature {
                sensor_id,
                timestamp,
                temperature,
            } => batch.sensor_readings.push(SensorSample {
                kind: SensorKind::Temperature,
                sensor: sensor_id_on(sensor_id, idx)?,
                timestamp,
                value: temperature,
                raw_reading: None,
            }),
            ImportMessage::Irradiance {
                sensor_id,
                timestamp,
                irradiance,
                raw_reading,
            } => batch.sensor_readings.push(SensorSample {
                kind: SensorKind::Irradiance,
                sensor: sensor_id_on(sensor_id, idx)?,
                timestamp,
                value: irradiance,
                raw_reading,
            }),
        }
    }
    Ok(batch)
}

fn sensor_id_on(sensor_id: String, idx: usize) -> Result<SensorId> {
    SensorId::new(sensor_id).with_context(|| format!("invalid sensor reading on line {}", idx + 1))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImportMessage {
    Channel {
        board: u32,
        channel: u32,
        #[serde(default)]
        address: Option<String>,
        #[serde(default)]
        com_port: Option<String>,
        #[serde(default)]
        current_limit: Option<f64>,
    },
    Connection(ConnectionMessage),
    Mpp {
        board: u32,
        channel: u32,
        timestamp: DateTime<Utc>,
        current: f64,
        voltage: f64,
        #[serde(default)]
        power: Option<f64>,
    },
    Temperature {
        sensor_id: String,
        timestamp: DateTime<Utc>,
        temperature: f64,
    },
    Irradiance {
        sensor_id: String,
        timestamp: DateTime<Utc>,
        irradiance: f64,
        #[serde(default)]
        raw_reading: Option<i64>,
    },
}

#[derive(Debug, Deserialize)]
struct ConnectionMessage {
    device_id: String,
    pixel: String,
    board: u32,
    channel: u32,
    event_type: ConnectionEventType,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    mppt_mode: Option<String>,
    #[serde(default)]
    mppt_polarity: Option<String>,
    #[serde(default)]
    temperature_sensor: Option<String>,
    #[serde(default)]
    irradiance_sensor: Option<String>,
}

impl ConnectionMessage {
    fn into_event(self) -> Result<ConnectionEvent> {
        let device = DeviceId::new(self.device_id)?;
        let pixel = PixelId::new(self.pixel)?;
        Ok(ConnectionEvent {
            pixel: PixelRef::new(device, pixel),
            channel: ChannelId::new(self.board, self.channel),
            event_type: self.event_type,
            timestamp: self.timestamp,
            mppt_mode: self.mppt_mode,
            mppt_polarity: self.mppt_polarity,
            temperature_sensor: self.temperature_sensor,
            irradiance_sensor: self.irradiance_sensor,
        })
    }
}

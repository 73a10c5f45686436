//! Raw channel and sensor samples, and their attributed forms.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ChannelId, SensorId};

/// The value-set recorded by a maximum-power-point tracking channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub current: f64,
    pub voltage: f64,
    pub power: f64,
}

impl Reading {
    /// Builds a reading, deriving power from current and voltage when absent.
    pub fn new(current: f64, voltage: f64, power: Option<f64>) -> Self {
        Self {
            current,
            voltage,
            power: power.unwrap_or(current * voltage),
        }
    }
}

/// One sample as stored per channel. Ownership by a pixel is never stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub channel: ChannelId,
    pub timestamp: DateTime<Utc>,
    pub reading: Reading,
}

/// A sample joined to the activation that owned its channel when it was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AttributedSample {
    pub timestamp: DateTime<Utc>,
    pub channel: ChannelId,
    pub reading: Reading,
    /// Timestamp of the CONNECTED event whose interval contains this sample.
    pub activation_time: DateTime<Utc>,
}

/// The environmental sensor streams recorded next to the MPP channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Irradiance,
}

impl SensorKind {
    pub const ALL: [Self; 2] = [Self::Temperature, Self::Irradiance];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Irradiance => "irradiance",
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading of a temperature (°C) or irradiance (W/m²) sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub kind: SensorKind,
    pub sensor: SensorId,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Undecoded ADC value, reported by irradiance sensors only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_reading: Option<i64>,
}

/// A sensor reading joined to the activation that referenced its sensor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributedSensorSample {
    pub timestamp: DateTime<Utc>,
    pub kind: SensorKind,
    pub sensor: SensorId,
    pub value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_reading: Option<i64>,
    pub activation_time: DateTime<Utc>,
}

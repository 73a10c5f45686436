//! Connection events: the append-only log of channel attach/detach actions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::measurement::SensorKind;
use crate::types::{ChannelId, PixelRef, SensorId};

/// Whether an event attached a pixel to a channel or detached it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEventType {
    Connected,
    Disconnected,
}

impl ConnectionEventType {
    /// String representation for database storage and output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        }
    }

    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ConnectionEventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "connected" | "connect" => Ok(Self::Connected),
            "disconnected" | "disconnect" => Ok(Self::Disconnected),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

impl Serialize for ConnectionEventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ConnectionEventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event type strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventType(String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown connection event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}

/// One attach/detach action of a pixel on a channel.
///
/// Within one pixel's history the timestamp is unique. The optional attributes
/// describe the tracking setup and are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub pixel: PixelRef,
    pub channel: ChannelId,
    pub event_type: ConnectionEventType,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mppt_mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mppt_polarity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_sensor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irradiance_sensor: Option<String>,
}

impl ConnectionEvent {
    /// Creates an event without contextual attributes.
    pub const fn new(
        pixel: PixelRef,
        channel: ChannelId,
        event_type: ConnectionEventType,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            pixel,
            channel,
            event_type,
            timestamp,
            mppt_mode: None,
            mppt_polarity: None,
            temperature_sensor: None,
            irradiance_sensor: None,
        }
    }

    pub const fn is_connected(&self) -> bool {
        self.event_type.is_connected()
    }

    /// The sensor of `kind` this activation was recorded against, if any.
    ///
    /// Blank references count as absent.
    pub fn sensor(&self, kind: SensorKind) -> Option<SensorId> {
        let reference = match kind {
            SensorKind::Temperature => self.temperature_sensor.as_deref(),
            SensorKind::Irradiance => self.irradiance_sensor.as_deref(),
        };
        reference.and_then(|id| SensorId::new(id).ok())
    }
}

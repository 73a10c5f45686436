//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types and query inputs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A query window whose start lies after its end.
    #[error("invalid time window: start {start} is after end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// An entity's event history violates the ordering the interval builder relies on.
    #[error("malformed event sequence for {pixel}: {detail} ({previous} then {current})")]
    MalformedSequence {
        pixel: String,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
        detail: &'static str,
    },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated device identifier.
    ///
    /// Identifies one physical sample (e.g. a solar cell) that carries several pixels.
    DeviceId, "device ID"
);

define_string_id!(
    /// A validated pixel label within a device (e.g. `"A"`).
    PixelId, "pixel ID"
);

define_string_id!(
    /// A validated temperature or irradiance sensor identifier.
    SensorId, "sensor ID"
);

/// The logical entity whose connection history is tracked: one pixel of one device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PixelRef {
    pub device: DeviceId,
    pub pixel: PixelId,
}

impl PixelRef {
    pub const fn new(device: DeviceId, pixel: PixelId) -> Self {
        Self { device, pixel }
    }
}

impl fmt::Display for PixelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.device, self.pixel)
    }
}

/// A physical measurement channel, addressed by board and channel number.
///
/// Orders by board, then channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChannelId {
    pub board: u32,
    pub channel: u32,
}

impl ChannelId {
    pub const fn new(board: u32, channel: u32) -> Self {
        Self { board, channel }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.board, self.channel)
    }
}

/// A query window `[start, end)`.
///
/// Construction rejects `start > end`. Joins read samples up to `end + ε`, so a
/// sample stamped exactly at `end` is still returned, and a window with
/// `start == end` selects the samples at that single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvalidWindow { start, end });
        }
        Ok(Self { start, end })
    }

    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }
}

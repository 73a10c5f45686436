//! Storage collaborator contracts.
//!
//! The engine only reads. Implementations are expected to serve every call made
//! during one logical query from the same consistency point, otherwise events and
//! samples observed at different moments can fabricate or drop boundary samples.

use chrono::{DateTime, Utc};

use crate::event::ConnectionEvent;
use crate::measurement::{Sample, SensorKind, SensorSample};
use crate::types::{ChannelId, PixelRef, SensorId};

/// Lazily produced, fallible sequence of samples.
pub type SampleIter<'a, E> = Box<dyn Iterator<Item = Result<Sample, E>> + 'a>;

/// Lazily produced, fallible sequence of sensor readings.
pub type SensorSampleIter<'a, E> = Box<dyn Iterator<Item = Result<SensorSample, E>> + 'a>;

/// Read access to the connection event log.
pub trait EventLog {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Events of one pixel in storage order (ascending timestamp).
    ///
    /// With `until`, only events at or before that instant are returned.
    fn events_for(
        &self,
        pixel: &PixelRef,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ConnectionEvent>, Self::Error>;

    /// For every channel, its chronologically last event at or before `at`.
    ///
    /// A channel handed from one pixel to another at that instant yields both
    /// events.
    fn latest_per_channel(&self, at: DateTime<Utc>) -> Result<Vec<ConnectionEvent>, Self::Error>;

    /// All events in `[start, end]`, inclusive on both ends, ordered by board,
    /// channel, then timestamp.
    fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConnectionEvent>, Self::Error>;
}

/// Read access to per-channel samples.
pub trait MeasurementStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Samples of `channel` with `start <= timestamp < end`, ascending.
    fn samples_for(
        &self,
        channel: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SampleIter<'_, Self::Error>, Self::Error>;
}

/// Read access to temperature and irradiance readings, keyed by sensor.
pub trait SensorStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Readings of one sensor with `start <= timestamp < end`, ascending.
    fn sensor_samples_for(
        &self,
        kind: SensorKind,
        sensor: &SensorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SensorSampleIter<'_, Self::Error>, Self::Error>;
}

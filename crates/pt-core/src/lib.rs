//! Core reconciliation engine for pixel measurements.
//!
//! This crate contains the fundamental types and logic for:
//! - Intervals: turning a pixel's connect/disconnect log into active intervals
//! - Ranges: resolving a pixel's default analysis window
//! - Joining: attributing per-channel samples to the pixel that held the channel
//! - Occupancy: what was attached to each channel, at an instant or over a range
//! - Sensors: attributing temperature and irradiance readings through each activation

pub mod clock;
mod error;
pub mod event;
pub mod interval;
mod join;
pub mod measurement;
pub mod occupancy;
mod range;
mod sensors;
pub mod store;
mod summary;
pub mod types;

#[cfg(test)]
mod testing;

pub use clock::{Clock, FixedClock, MonotonicClock, SystemClock, TIME_RESOLUTION};
pub use error::QueryError;
pub use event::{ConnectionEvent, ConnectionEventType, UnknownEventType};
pub use interval::{ActiveInterval, SequencePolicy, build_intervals, validate_sequence};
pub use join::{AttributedSamples, ClippedInterval, clip_intervals, join_measurements, open_horizon};
pub use measurement::{
    AttributedSample, AttributedSensorSample, Reading, Sample, SensorKind, SensorSample,
};
pub use occupancy::{ChannelEventRecord, ChannelStatus, status_at, status_history};
pub use range::{default_range, resolve_default_range};
pub use sensors::{AttributedSensorSamples, SensorInterval, join_sensor_readings};
pub use store::{EventLog, MeasurementStore, SampleIter, SensorSampleIter, SensorStore};
pub use summary::{SampleSummary, SensorSummary, summarize, summarize_sensor};
pub use types::{
    ChannelId, DeviceId, PixelId, PixelRef, SensorId, TimeWindow, ValidationError,
};

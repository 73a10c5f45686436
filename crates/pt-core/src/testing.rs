//! In-memory collaborators for unit tests.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::convert::Infallible;

use chrono::{DateTime, TimeZone, Utc};

use crate::event::{ConnectionEvent, ConnectionEventType};
use crate::measurement::{Reading, Sample, SensorKind, SensorSample};
use crate::store::{EventLog, MeasurementStore, SampleIter, SensorSampleIter, SensorStore};
use crate::types::{ChannelId, DeviceId, PixelId, PixelRef, SensorId};

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0).unwrap()
}

pub fn pixel(device: &str, pixel: &str) -> PixelRef {
    PixelRef::new(DeviceId::new(device).unwrap(), PixelId::new(pixel).unwrap())
}

#[derive(Default)]
pub struct MemoryStore {
    events: Vec<ConnectionEvent>,
    samples: Vec<Sample>,
    readings: Vec<SensorSample>,
    /// Number of sample or sensor streams opened.
    pub sample_queries: Cell<usize>,
}

impl MemoryStore {
    pub fn event(
        mut self,
        pixel: &PixelRef,
        channel: ChannelId,
        kind: ConnectionEventType,
        ts: DateTime<Utc>,
    ) -> Self {
        self.events
            .push(ConnectionEvent::new(pixel.clone(), channel, kind, ts));
        self
    }

    pub fn connected_with(
        mut self,
        pixel: &PixelRef,
        channel: ChannelId,
        ts: DateTime<Utc>,
        kind: SensorKind,
        sensor: &str,
    ) -> Self {
        let mut event =
            ConnectionEvent::new(pixel.clone(), channel, ConnectionEventType::Connected, ts);
        match kind {
            SensorKind::Temperature => event.temperature_sensor = Some(sensor.to_string()),
            SensorKind::Irradiance => event.irradiance_sensor = Some(sensor.to_string()),
        }
        self.events.push(event);
        self
    }

    pub fn reading(
        mut self,
        kind: SensorKind,
        sensor: &str,
        ts: DateTime<Utc>,
        value: f64,
    ) -> Self {
        self.readings.push(SensorSample {
            kind,
            sensor: SensorId::new(sensor).unwrap(),
            timestamp: ts,
            value,
            raw_reading: None,
        });
        self
    }

    pub fn sample(mut self, channel: ChannelId, ts: DateTime<Utc>, power: f64) -> Self {
        self.samples.push(Sample {
            channel,
            timestamp: ts,
            reading: Reading::new(1.0, power, Some(power)),
        });
        self
    }
}

impl EventLog for MemoryStore {
    type Error = Infallible;

    fn events_for(
        &self,
        pixel: &PixelRef,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<ConnectionEvent>, Self::Error> {
        let mut events: Vec<_> = self
            .events
            .iter()
            .filter(|event| &event.pixel == pixel)
            .filter(|event| until.is_none_or(|until| event.timestamp <= until))
            .cloned()
            .collect();
        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }

    fn latest_per_channel(&self, at: DateTime<Utc>) -> Result<Vec<ConnectionEvent>, Self::Error> {
        let mut last: BTreeMap<ChannelId, DateTime<Utc>> = BTreeMap::new();
        for event in self.events.iter().filter(|event| event.timestamp <= at) {
            let entry = last.entry(event.channel).or_insert(event.timestamp);
            *entry = (*entry).max(event.timestamp);
        }
        // Ties stay in insertion order.
        let mut latest: Vec<_> = self
            .events
            .iter()
            .filter(|event| last.get(&event.channel) == Some(&event.timestamp))
            .cloned()
            .collect();
        latest.sort_by_key(|event| event.channel);
        Ok(latest)
    }

    fn events_in_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ConnectionEvent>, Self::Error> {
        let mut events: Vec<_> = self
            .events
            .iter()
            .filter(|event| start <= event.timestamp && event.timestamp <= end)
            .cloned()
            .collect();
        events.sort_by_key(|event| (event.channel, event.timestamp));
        Ok(events)
    }
}

impl MeasurementStore for MemoryStore {
    type Error = Infallible;

    fn samples_for(
        &self,
        channel: ChannelId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SampleIter<'_, Self::Error>, Self::Error> {
        self.sample_queries.set(self.sample_queries.get() + 1);
        let mut samples: Vec<_> = self
            .samples
            .iter()
            .filter(|sample| sample.channel == channel)
            .filter(|sample| start <= sample.timestamp && sample.timestamp < end)
            .copied()
            .collect();
        samples.sort_by_key(|sample| sample.timestamp);
        Ok(Box::new(samples.into_iter().map(Ok)))
    }
}

impl SensorStore for MemoryStore {
    type Error = Infallible;

    fn sensor_samples_for(
        &self,
        kind: SensorKind,
        sensor: &SensorId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SensorSampleIter<'_, Self::Error>, Self::Error> {
        self.sample_queries.set(self.sample_queries.get() + 1);
        let mut readings: Vec<_> = self
            .readings
            .iter()
            .filter(|reading| reading.kind == kind && &reading.sensor == sensor)
            .filter(|reading| start <= reading.timestamp && reading.timestamp < end)
            .cloned()
            .collect();
        readings.sort_by_key(|reading| reading.timestamp);
        Ok(Box::new(readings.into_iter().map(Ok)))
    }
}

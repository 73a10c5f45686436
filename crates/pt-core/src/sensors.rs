//! Attribution of temperature and irradiance readings to a pixel.
//!
//! Sensors are not wired to channels. Each CONNECTED event names the sensors the
//! activation was recorded against, so a pixel's sensor readings are the readings
//! of those sensors inside the same clipped intervals the MPP join uses.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::QueryError;
use crate::interval::SequencePolicy;
use crate::join::{JoinPlan, plan_join};
use crate::measurement::{AttributedSensorSample, SensorKind};
use crate::store::{EventLog, SensorSampleIter, SensorStore};
use crate::types::{PixelRef, SensorId, TimeWindow};

/// A clipped interval resolved to the sensor its activation referenced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInterval {
    pub sensor: SensorId,
    pub activation: DateTime<Utc>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Joins `pixel`'s connection history with the readings of its `kind` sensors.
///
/// Windowing, validation and clipping are those of
/// [`join_measurements`](crate::join_measurements). Activations without a sensor
/// of `kind` contribute nothing.
pub fn join_sensor_readings<'a, S, C>(
    store: &'a S,
    pixel: &PixelRef,
    kind: SensorKind,
    window: Option<TimeWindow>,
    clock: &C,
    policy: SequencePolicy,
) -> Result<AttributedSensorSamples<'a, S>, QueryError>
where
    S: EventLog + SensorStore + ?Sized,
    C: Clock + ?Sized,
{
    let intervals = plan_join(store, pixel, window, clock.now(), policy)?
        .map(|plan| sensor_intervals(&plan, kind))
        .unwrap_or_default();
    tracing::debug!(%pixel, %kind, intervals = intervals.len(), "planned sensor join");
    Ok(AttributedSensorSamples {
        store,
        kind,
        pending: intervals.into_iter(),
        current: None,
        failed: false,
    })
}

fn sensor_intervals(plan: &JoinPlan, kind: SensorKind) -> Vec<SensorInterval> {
    plan.intervals
        .iter()
        .filter_map(|interval| {
            let activation = plan
                .events
                .iter()
                .find(|event| event.timestamp == interval.activation)?;
            Some(SensorInterval {
                sensor: activation.sensor(kind)?,
                activation: interval.activation,
                start: interval.start,
                end: interval.end,
            })
        })
        .collect()
}

/// Lazy stream of attributed readings produced by [`join_sensor_readings`].
pub struct AttributedSensorSamples<'a, S: SensorStore + ?Sized> {
    store: &'a S,
    kind: SensorKind,
    pending: std::vec::IntoIter<SensorInterval>,
    current: Option<(DateTime<Utc>, SensorSampleIter<'a, S::Error>)>,
    failed: bool,
}

impl<S: SensorStore + ?Sized> AttributedSensorSamples<'_, S> {
    /// Intervals not yet opened against the store.
    pub fn remaining_intervals(&self) -> &[SensorInterval] {
        self.pending.as_slice()
    }
}

impl<S: SensorStore + ?Sized> Iterator for AttributedSensorSamples<'_, S> {
    type Item = Result<AttributedSensorSample, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some((activation, readings)) = self.current.as_mut() {
                let activation = *activation;
                match readings.next() {
                    Some(Ok(reading)) => {
                        return Some(Ok(AttributedSensorSample {
                            timestamp: reading.timestamp,
                            kind: reading.kind,
                            sensor: reading.sensor,
                            value: reading.value,
                            raw_reading: reading.raw_reading,
                            activation_time: activation,
                        }));
                    }
                    Some(Err(err)) => {
                        self.failed = true;
                        self.current = None;
                        return Some(Err(QueryError::storage(err)));
                    }
                    None => self.current = None,
                }
            }

            let interval = self.pending.next()?;
            match self.store.sensor_samples_for(
                self.kind,
                &interval.sensor,
                interval.start,
                interval.end,
            ) {
                Ok(readings) => self.current = Some((interval.activation, readings)),
                Err(err) => {
                    self.failed = true;
                    return Some(Err(QueryError::storage(err)));
                }
            }
        }
    }
}

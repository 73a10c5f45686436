//! Aggregate statistics over attributed sample and sensor streams.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::QueryError;
use crate::measurement::{AttributedSample, AttributedSensorSample, SensorKind};

/// MPP statistics of the samples attributed to one pixel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleSummary {
    pub count: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub min_power: Option<f64>,
    pub max_power: Option<f64>,
    pub avg_power: Option<f64>,
    pub avg_current: Option<f64>,
    pub avg_voltage: Option<f64>,
    /// Sample count per activation timestamp.
    pub per_activation: BTreeMap<DateTime<Utc>, usize>,
}

/// Statistics of one sensor stream attributed to a pixel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSummary {
    pub kind: SensorKind,
    pub count: usize,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub avg: Option<f64>,
}

#[expect(
    clippy::cast_precision_loss,
    reason = "sample counts stay far below 2^52"
)]
fn mean(sum: f64, count: usize) -> Option<f64> {
    (count > 0).then(|| sum / count as f64)
}

fn widen(bound: Option<f64>, value: f64, pick: fn(f64, f64) -> f64) -> Option<f64> {
    Some(bound.map_or(value, |bound| pick(bound, value)))
}

/// Folds a sample stream into a [`SampleSummary`], stopping at the first error.
pub fn summarize<I>(samples: I) -> Result<SampleSummary, QueryError>
where
    I: IntoIterator<Item = Result<AttributedSample, QueryError>>,
{
    let mut count = 0usize;
    let mut first = None;
    let mut last = None;
    let mut min_power: Option<f64> = None;
    let mut max_power: Option<f64> = None;
    let (mut power_sum, mut current_sum, mut voltage_sum) = (0.0, 0.0, 0.0);
    let mut per_activation = BTreeMap::new();

    for sample in samples {
        let sample = sample?;
        count += 1;
        first.get_or_insert(sample.timestamp);
        last = Some(sample.timestamp);
        let reading = sample.reading;
        min_power = widen(min_power, reading.power, f64::min);
        max_power = widen(max_power, reading.power, f64::max);
        power_sum += reading.power;
        current_sum += reading.current;
        voltage_sum += reading.voltage;
        *per_activation.entry(sample.activation_time).or_insert(0) += 1;
    }

    Ok(SampleSummary {
        count,
        first,
        last,
        min_power,
        max_power,
        avg_power: mean(power_sum, count),
        avg_current: mean(current_sum, count),
        avg_voltage: mean(voltage_sum, count),
        per_activation,
    })
}

/// Folds a sensor stream into a [`SensorSummary`], stopping at the first error.
pub fn summarize_sensor<I>(kind: SensorKind, readings: I) -> Result<SensorSummary, QueryError>
where
    I: IntoIterator<Item = Result<AttributedSensorSample, QueryError>>,
{
    let mut summary = SensorSummary {
        kind,
        count: 0,
        first: None,
        last: None,
        min: None,
        max: None,
        avg: None,
    };
    let mut sum = 0.0;
    for reading in readings {
        let reading = reading?;
        summary.count += 1;
        summary.first.get_or_insert(reading.timestamp);
        summary.last = Some(reading.timestamp);
        summary.min = widen(summary.min, reading.value, f64::min);
        summary.max = widen(summary.max, reading.value, f64::max);
        sum += reading.value;
    }
    summary.avg = mean(sum, summary.count);
    Ok(summary)
}

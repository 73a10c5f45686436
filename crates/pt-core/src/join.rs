//! Attribution of channel samples to the pixel that held the channel.
//!
//! # Algorithm
//!
//! 1. Read "now" once and fix the query window (explicit, or the pixel's default range)
//! 2. Fetch the pixel's events up to the window end and build its active intervals,
//!    closing a still-open connection at `min(window.end + ε, now)`
//! 3. Clip every interval to `[window.start, window.end + ε)` and drop empty ones
//! 4. Stream each clipped interval's samples from the store in order, tagging them
//!    with the interval's activation time
//!
//! Intervals of one pixel are disjoint and sorted, so concatenating the per-interval
//! streams yields samples in ascending timestamp order. Interval ends are exclusive:
//! a sample recorded exactly at a disconnect belongs to no interval it terminates.

use chrono::{DateTime, Utc};

use crate::clock::{Clock, TIME_RESOLUTION};
use crate::error::QueryError;
use crate::event::ConnectionEvent;
use crate::interval::{ActiveInterval, SequencePolicy, build_intervals, validate_sequence};
use crate::measurement::AttributedSample;
use crate::range::default_range;
use crate::store::{EventLog, MeasurementStore, SampleIter};
use crate::types::{ChannelId, PixelRef, TimeWindow};

/// An active interval clipped to a query window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClippedInterval {
    pub channel: ChannelId,
    /// Start of the unclipped interval (the CONNECTED event's timestamp).
    pub activation: DateTime<Utc>,
    /// Inclusive lower bound of samples to read.
    pub start: DateTime<Utc>,
    /// Exclusive upper bound of samples to read.
    pub end: DateTime<Utc>,
}

/// Clips intervals to `window`, discarding the ones that do not overlap it.
pub fn clip_intervals(intervals: &[ActiveInterval], window: TimeWindow) -> Vec<ClippedInterval> {
    let upper = window.end() + TIME_RESOLUTION;
    intervals
        .iter()
        .filter(|interval| interval.end > window.start() && interval.start <= window.end())
        .filter_map(|interval| {
            let start = interval.start.max(window.start());
            let end = interval.end.min(upper);
            (start < end).then_some(ClippedInterval {
                channel: interval.channel,
                activation: interval.start,
                start,
                end,
            })
        })
        .collect()
}

/// Upper bound used for a connection that has no later event.
pub fn open_horizon(window: TimeWindow, now: DateTime<Utc>) -> DateTime<Utc> {
    (window.end() + TIME_RESOLUTION).min(now)
}

/// Joins `pixel`'s connection history with the channel samples in `window`.
///
/// Without a window, the pixel's default range is used; a pixel that was never
/// connected yields an empty stream and the measurement store is not touched.
/// The returned iterator reads samples lazily, one interval at a time, and stops
/// after the first storage error.
pub fn join_measurements<'a, S, C>(
    store: &'a S,
    pixel: &PixelRef,
    window: Option<TimeWindow>,
    clock: &C,
    policy: SequencePolicy,
) -> Result<AttributedSamples<'a, S>, QueryError>
where
    S: EventLog + MeasurementStore + ?Sized,
    C: Clock + ?Sized,
{
    let plan = plan_join(store, pixel, window, clock.now(), policy)?;
    Ok(AttributedSamples::new(
        store,
        plan.map(|plan| plan.intervals).unwrap_or_default(),
    ))
}

/// The clipped intervals of one join and the events they were built from.
pub(crate) struct JoinPlan {
    pub(crate) events: Vec<ConnectionEvent>,
    pub(crate) intervals: Vec<ClippedInterval>,
}

/// Fixes the window and derives the clipped intervals to read from.
///
/// Returns `None` when no window was given and the pixel was never connected.
pub(crate) fn plan_join<L>(
    log: &L,
    pixel: &PixelRef,
    window: Option<TimeWindow>,
    now: DateTime<Utc>,
    policy: SequencePolicy,
) -> Result<Option<JoinPlan>, QueryError>
where
    L: EventLog + ?Sized,
{
    let (window, mut events) = match window {
        Some(window) => {
            let events = log
                .events_for(pixel, Some(window.end()))
                .map_err(QueryError::storage)?;
            (window, events)
        }
        None => {
            let events = log.events_for(pixel, None).map_err(QueryError::storage)?;
            let Some(window) = default_range(&events, || now) else {
                tracing::debug!(%pixel, "pixel was never connected, nothing to join");
                return Ok(None);
            };
            (window, events)
        }
    };
    events.retain(|event| event.timestamp <= window.end());

    validate_sequence(&events, policy)?;

    let horizon = open_horizon(window, now);
    let intervals = build_intervals(&events, horizon);
    let clipped = clip_intervals(&intervals, window);
    tracing::debug!(
        %pixel,
        start = %window.start(),
        end = %window.end(),
        %horizon,
        intervals = intervals.len(),
        overlapping = clipped.len(),
        "planned join"
    );

    Ok(Some(JoinPlan {
        events,
        intervals: clipped,
    }))
}

/// Lazy stream of attributed samples produced by [`join_measurements`].
pub struct AttributedSamples<'a, S: MeasurementStore + ?Sized> {
    store: &'a S,
    pending: std::vec::IntoIter<ClippedInterval>,
    current: Option<Cursor<'a, S::Error>>,
    failed: bool,
}

struct Cursor<'a, E> {
    activation: DateTime<Utc>,
    samples: SampleIter<'a, E>,
}

impl<'a, S: MeasurementStore + ?Sized> AttributedSamples<'a, S> {
    fn new(store: &'a S, intervals: Vec<ClippedInterval>) -> Self {
        Self {
            store,
            pending: intervals.into_iter(),
            current: None,
            failed: false,
        }
    }

    /// Intervals not yet opened against the store.
    pub fn remaining_intervals(&self) -> &[ClippedInterval] {
        self.pending.as_slice()
    }
}

impl<S: MeasurementStore + ?Sized> Iterator for AttributedSamples<'_, S> {
    type Item = Result<AttributedSample, QueryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            if let Some(cursor) = self.current.as_mut() {
                let next = cursor.samples.next();
                let activation = cursor.activation;
                match next {
                    Some(Ok(sample)) => {
                        return Some(Ok(AttributedSample {
                            timestamp: sample.timestamp,
                            channel: sample.channel,
                            reading: sample.reading,
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
            match self
                .store
                .samples_for(interval.channel, interval.start, interval.end)
            {
                Ok(samples) => {
                    self.current = Some(Cursor {
                        activation: interval.activation,
                        samples,
                    });
                }
                Err(err) => {
                    self.failed = true;
                    return Some(Err(QueryError::storage(err)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::event::ConnectionEventType::{Connected, Disconnected};
    use crate::store::SampleIter;
    use crate::testing::{MemoryStore, at, pixel};
    use crate::types::ValidationError;

    const CH1: ChannelId = ChannelId::new(1, 1);
    const CH2: ChannelId = ChannelId::new(1, 2);

    fn collect<S: MeasurementStore + ?Sized>(
        samples: AttributedSamples<'_, S>,
    ) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
        samples
            .map(|sample| sample.unwrap())
            .map(|sample| (sample.timestamp, sample.activation_time))
            .collect()
    }

    fn scenario_a() -> MemoryStore {
        let a = pixel("cell-1", "A");
        MemoryStore::default()
            .event(&a, CH1, Connected, at(10, 0))
            .event(&a, CH1, Disconnected, at(10, 30))
            .event(&a, CH1, Connected, at(11, 0))
            .sample(CH1, at(10, 15), 1.0)
            .sample(CH1, at(10, 30), 2.0)
            .sample(CH1, at(11, 15), 3.0)
            .sample(CH1, at(11, 45), 4.0)
    }

    #[test]
    fn scenario_a_attributes_samples_to_their_activation() {
        let store = scenario_a();
        let window = TimeWindow::new(at(10, 0), at(12, 0)).unwrap();
        let samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(11, 30)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(
            samples.remaining_intervals(),
            &[
                ClippedInterval {
                    channel: CH1,
                    activation: at(10, 0),
                    start: at(10, 0),
                    end: at(10, 30),
                },
                ClippedInterval {
                    channel: CH1,
                    activation: at(11, 0),
                    start: at(11, 0),
                    end: at(11, 30),
                },
            ]
        );
        assert_eq!(
            collect(samples),
            vec![(at(10, 15), at(10, 0)), (at(11, 15), at(11, 0))]
        );
    }

    #[test]
    fn never_connected_pixel_yields_nothing_without_reading_samples() {
        let store = scenario_a();
        let samples = join_measurements(
            &store,
            &pixel("cell-9", "X"),
            None,
            &FixedClock(at(11, 30)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(samples.count(), 0);
        assert_eq!(store.sample_queries.get(), 0);
    }

    #[test]
    fn default_window_runs_to_now() {
        let store = scenario_a();
        let samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            None,
            &FixedClock(at(11, 50)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(
            collect(samples),
            vec![
                (at(10, 15), at(10, 0)),
                (at(11, 15), at(11, 0)),
                (at(11, 45), at(11, 0)),
            ]
        );
    }

    #[test]
    fn sample_at_disconnect_goes_to_the_next_activation_only() {
        let a = pixel("cell-1", "A");
        let store = MemoryStore::default()
            .event(&a, CH1, Connected, at(10, 0))
            .event(&a, CH2, Connected, at(10, 30))
            .event(&a, CH2, Disconnected, at(11, 0))
            .sample(CH1, at(10, 30), 1.0)
            .sample(CH2, at(10, 30), 2.0)
            .sample(CH2, at(11, 0), 3.0);

        let window = TimeWindow::new(at(9, 0), at(12, 0)).unwrap();
        let samples: Vec<_> = join_measurements(
            &store,
            &a,
            Some(window),
            &FixedClock(at(13, 0)),
            SequencePolicy::Permissive,
        )
        .unwrap()
        .map(Result::unwrap)
        .collect();

        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].channel, CH2);
        assert_eq!(samples[0].timestamp, at(10, 30));
        assert_eq!(samples[0].activation_time, at(10, 30));
    }

    #[test]
    fn window_start_clips_an_earlier_activation() {
        let store = scenario_a();
        let window = TimeWindow::new(at(10, 20), at(10, 40)).unwrap();
        let samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(13, 0)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(
            samples.remaining_intervals(),
            &[ClippedInterval {
                channel: CH1,
                activation: at(10, 0),
                start: at(10, 20),
                end: at(10, 30),
            }]
        );
        assert!(collect(samples).is_empty());
    }

    #[test]
    fn open_connection_includes_sample_at_window_end() {
        let store = scenario_a();
        let window = TimeWindow::new(at(11, 0), at(11, 45)).unwrap();
        let samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(13, 0)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(
            collect(samples),
            vec![(at(11, 15), at(11, 0)), (at(11, 45), at(11, 0))]
        );
    }

    #[test]
    fn zero_length_window_selects_its_instant() {
        let store = scenario_a();
        let window = TimeWindow::new(at(10, 15), at(10, 15)).unwrap();
        let samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(13, 0)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(collect(samples), vec![(at(10, 15), at(10, 0))]);
    }

    #[test]
    fn events_after_window_end_are_ignored() {
        let store = scenario_a();
        let window = TimeWindow::new(at(10, 0), at(10, 20)).unwrap();
        let samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(13, 0)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(
            samples.remaining_intervals(),
            &[ClippedInterval {
                channel: CH1,
                activation: at(10, 0),
                start: at(10, 0),
                end: at(10, 20) + TIME_RESOLUTION,
            }]
        );
        assert_eq!(collect(samples), vec![(at(10, 15), at(10, 0))]);
    }

    #[test]
    fn identical_queries_return_identical_output() {
        let store = scenario_a();
        let window = TimeWindow::new(at(10, 0), at(12, 0)).unwrap();
        let run = || {
            join_measurements(
                &store,
                &pixel("cell-1", "A"),
                Some(window),
                &FixedClock(at(11, 30)),
                SequencePolicy::Permissive,
            )
            .unwrap()
            .map(Result::unwrap)
            .collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn every_sample_falls_in_exactly_one_interval() {
        let a = pixel("cell-1", "A");
        let mut store = MemoryStore::default()
            .event(&a, CH1, Connected, at(8, 0))
            .event(&a, CH2, Connected, at(8, 40))
            .event(&a, CH2, Disconnected, at(9, 20))
            .event(&a, CH1, Connected, at(10, 0))
            .event(&a, CH1, Disconnected, at(10, 10));
        for minute in (0..180).step_by(5) {
            let ts = at(8, 0) + chrono::Duration::minutes(minute);
            store = store.sample(CH1, ts, 1.0).sample(CH2, ts, 2.0);
        }

        let window = TimeWindow::new(at(7, 0), at(12, 0)).unwrap();
        let events = store.events_for(&a, None).unwrap();
        let intervals = build_intervals(&events, at(12, 0));
        let samples: Vec<_> = join_measurements(
            &store,
            &a,
            Some(window),
            &FixedClock(at(12, 0)),
            SequencePolicy::Permissive,
        )
        .unwrap()
        .map(Result::unwrap)
        .collect();

        for pair in samples.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
        for sample in &samples {
            let owners: Vec<_> = intervals
                .iter()
                .filter(|interval| {
                    interval.channel == sample.channel && interval.contains(sample.timestamp)
                })
                .collect();
            assert_eq!(owners.len(), 1, "sample at {} owned once", sample.timestamp);
            assert_eq!(owners[0].start, sample.activation_time);
        }
        // 8:00-8:40 on ch1, 8:40-9:20 on ch2, 10:00-10:10 on ch1, every 5 minutes
        assert_eq!(samples.len(), 8 + 8 + 2);
    }

    #[test]
    fn strict_policy_rejects_back_to_back_connections() {
        let a = pixel("cell-1", "A");
        let store = MemoryStore::default()
            .event(&a, CH1, Connected, at(10, 0))
            .event(&a, CH2, Connected, at(10, 30));
        let window = TimeWindow::new(at(9, 0), at(12, 0)).unwrap();
        let err = join_measurements(
            &store,
            &a,
            Some(window),
            &FixedClock(at(12, 0)),
            SequencePolicy::Strict,
        )
        .err()
        .unwrap();

        assert!(matches!(
            err,
            QueryError::Validation(ValidationError::MalformedSequence { .. })
        ));
    }

    #[test]
    fn samples_are_read_one_interval_at_a_time() {
        let store = scenario_a();
        let window = TimeWindow::new(at(10, 0), at(12, 0)).unwrap();
        let mut samples = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(11, 30)),
            SequencePolicy::Permissive,
        )
        .unwrap();

        assert_eq!(store.sample_queries.get(), 0);
        samples.next().unwrap().unwrap();
        assert_eq!(store.sample_queries.get(), 1);
    }

    #[test]
    fn storage_failure_surfaces_once() {
        struct BrokenSamples(MemoryStore);

        impl EventLog for BrokenSamples {
            type Error = std::convert::Infallible;

            fn events_for(
                &self,
                pixel: &PixelRef,
                until: Option<DateTime<Utc>>,
            ) -> Result<Vec<ConnectionEvent>, Self::Error> {
                self.0.events_for(pixel, until)
            }

            fn latest_per_channel(
                &self,
                at: DateTime<Utc>,
            ) -> Result<Vec<ConnectionEvent>, Self::Error> {
                self.0.latest_per_channel(at)
            }

            fn events_in_range(
                &self,
                start: DateTime<Utc>,
                end: DateTime<Utc>,
            ) -> Result<Vec<ConnectionEvent>, Self::Error> {
                self.0.events_in_range(start, end)
            }
        }

        impl MeasurementStore for BrokenSamples {
            type Error = std::io::Error;

            fn samples_for(
                &self,
                _channel: ChannelId,
                _start: DateTime<Utc>,
                _end: DateTime<Utc>,
            ) -> Result<SampleIter<'_, Self::Error>, Self::Error> {
                Err(std::io::Error::other("disk gone"))
            }
        }

        let store = BrokenSamples(scenario_a());
        let window = TimeWindow::new(at(10, 0), at(12, 0)).unwrap();
        let results: Vec<_> = join_measurements(
            &store,
            &pixel("cell-1", "A"),
            Some(window),
            &FixedClock(at(11, 30)),
            SequencePolicy::Permissive,
        )
        .unwrap()
        .collect();

        assert_eq!(results.len(), 1);
        let err = results.into_iter().next().unwrap().unwrap_err();
        assert!(matches!(err, QueryError::StorageUnavailable(_)));
        assert_eq!(err.to_string(), "storage unavailable: disk gone");
    }
}

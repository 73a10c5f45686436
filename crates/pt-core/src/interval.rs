//! Active-connection intervals derived from a pixel's event history.
//!
//! Each CONNECTED event opens an interval that runs until the pixel's next event
//! (of any type) or, lacking one, until a caller-supplied horizon. Intervals are
//! half-open: a sample at an interval's end belongs to whatever comes next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::ConnectionEvent;
use crate::types::{ChannelId, PixelRef, ValidationError};

/// How to treat event sequences that do not alternate CONNECTED/DISCONNECTED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SequencePolicy {
    /// Consecutive CONNECTED events each open an interval closed by the next one.
    #[default]
    Permissive,
    /// Consecutive CONNECTED events are rejected.
    Strict,
}

/// A half-open range `[start, end)` during which a pixel held a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveInterval {
    pub pixel: PixelRef,
    pub channel: ChannelId,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ActiveInterval {
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.start <= timestamp && timestamp < self.end
    }
}

/// Checks that one pixel's events can be turned into intervals.
///
/// Timestamps must be strictly increasing under every policy. Back-to-back
/// CONNECTED events are only rejected under [`SequencePolicy::Strict`].
pub fn validate_sequence(
    events: &[ConnectionEvent],
    policy: SequencePolicy,
) -> Result<(), ValidationError> {
    for pair in events.windows(2) {
        let (previous, current) = (&pair[0], &pair[1]);
        if current.timestamp <= previous.timestamp {
            return Err(ValidationError::MalformedSequence {
                pixel: current.pixel.to_string(),
                previous: previous.timestamp,
                current: current.timestamp,
                detail: if current.timestamp == previous.timestamp {
                    "duplicate timestamp"
                } else {
                    "timestamps out of order"
                },
            });
        }
        if previous.is_connected() && current.is_connected() {
            match policy {
                SequencePolicy::Strict => {
                    return Err(ValidationError::MalformedSequence {
                        pixel: current.pixel.to_string(),
                        previous: previous.timestamp,
                        current: current.timestamp,
                        detail: "connected twice without a disconnect",
                    });
                }
                SequencePolicy::Permissive => {
                    tracing::warn!(
                        pixel = %current.pixel,
                        previous = %previous.timestamp,
                        current = %current.timestamp,
                        "consecutive connected events, closing the first at the second"
                    );
                }
            }
        }
    }
    Ok(())
}

/// Builds the active intervals of one pixel.
///
/// `events` must be sorted ascending by timestamp. The last CONNECTED event, if it
/// has no successor, is closed at `horizon`; one at or after the horizon yields nothing.
pub fn build_intervals(events: &[ConnectionEvent], horizon: DateTime<Utc>) -> Vec<ActiveInterval> {
    let mut intervals = Vec::new();
    for (idx, event) in events.iter().enumerate() {
        if !event.is_connected() {
            continue;
        }
        let next_ts = events.get(idx + 1).map_or(horizon, |next| next.timestamp);
        if event.timestamp < next_ts {
            intervals.push(ActiveInterval {
                pixel: event.pixel.clone(),
                channel: event.channel,
                start: event.timestamp,
                end: next_ts,
            });
        }
    }
    intervals
}

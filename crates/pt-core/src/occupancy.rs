//! Channel occupancy: which pixel was attached to each channel.
//!
//! Both views are direct projections of the event log. No intervals are built.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::QueryError;
use crate::event::{ConnectionEvent, ConnectionEventType};
use crate::store::EventLog;
use crate::types::{ChannelId, PixelRef, TimeWindow};

/// State of one channel as of its most recent event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelStatus {
    pub channel: ChannelId,
    pub pixel: PixelRef,
    pub is_active: bool,
    pub last_event_time: DateTime<Utc>,
    pub last_event_type: ConnectionEventType,
}

impl From<ConnectionEvent> for ChannelStatus {
    fn from(event: ConnectionEvent) -> Self {
        Self {
            channel: event.channel,
            is_active: event.is_connected(),
            pixel: event.pixel,
            last_event_time: event.timestamp,
            last_event_type: event.event_type,
        }
    }
}

/// One raw event of a channel's change log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelEventRecord {
    pub channel: ChannelId,
    pub pixel: PixelRef,
    pub is_active: bool,
    pub event_time: DateTime<Utc>,
    pub event_type: ConnectionEventType,
}

impl From<ConnectionEvent> for ChannelEventRecord {
    fn from(event: ConnectionEvent) -> Self {
        Self {
            channel: event.channel,
            is_active: event.is_connected(),
            pixel: event.pixel,
            event_time: event.timestamp,
            event_type: event.event_type,
        }
    }
}

/// Status of every channel that saw an event at or before `at`.
///
/// Channels never used up to `at` are absent from the map; callers that know the
/// channel registry report those as unused. When a channel changes hands, the
/// outgoing DISCONNECTED and incoming CONNECTED events share one instant and the
/// CONNECTED one wins.
pub fn status_at<L>(
    log: &L,
    at: DateTime<Utc>,
) -> Result<BTreeMap<ChannelId, ChannelStatus>, QueryError>
where
    L: EventLog + ?Sized,
{
    let latest = log.latest_per_channel(at).map_err(QueryError::storage)?;
    let mut statuses = BTreeMap::new();
    for event in latest {
        if event.timestamp > at {
            continue;
        }
        let replace = statuses
            .get(&event.channel)
            .is_none_or(|known: &ChannelStatus| supersedes(&event, known));
        if replace {
            statuses.insert(event.channel, ChannelStatus::from(event));
        }
    }
    tracing::debug!(%at, channels = statuses.len(), "resolved channel status");
    Ok(statuses)
}

fn supersedes(event: &ConnectionEvent, known: &ChannelStatus) -> bool {
    known.last_event_time < event.timestamp
        || (known.last_event_time == event.timestamp && event.is_connected() && !known.is_active)
}

/// Every event in `[start, end]`, both ends inclusive, ordered by channel then time.
///
/// Unlike the half-open windows used for measurements, the upper bound here is
/// inclusive so an event landing exactly on `end` is reported.
pub fn status_history<L>(
    log: &L,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<ChannelEventRecord>, QueryError>
where
    L: EventLog + ?Sized,
{
    let window = TimeWindow::new(start, end)?;
    let mut events = log
        .events_in_range(window.start(), window.end())
        .map_err(QueryError::storage)?;
    events.sort_by_key(|event| (event.channel, event.timestamp));
    Ok(events.into_iter().map(ChannelEventRecord::from).collect())
}

//! Default analysis window for a pixel, derived from its event log alone.

use chrono::{DateTime, Utc};

use crate::clock::Clock;
use crate::error::QueryError;
use crate::event::ConnectionEvent;
use crate::store::EventLog;
use crate::types::{PixelRef, TimeWindow};

/// Resolves the default `[start, end)` for `pixel`.
///
/// Returns `None` when the pixel was never connected. The clock is only read when
/// the pixel is still connected, in which case the window ends "now" and grows on
/// every call; callers that need a stable window resolve once and reuse it.
pub fn resolve_default_range<L, C>(
    log: &L,
    pixel: &PixelRef,
    clock: &C,
) -> Result<Option<TimeWindow>, QueryError>
where
    L: EventLog + ?Sized,
    C: Clock + ?Sized,
{
    let events = log.events_for(pixel, None).map_err(QueryError::storage)?;
    let window = default_range(&events, || clock.now());
    match &window {
        Some(window) => {
            tracing::debug!(%pixel, start = %window.start(), end = %window.end(), "resolved default range");
        }
        None => tracing::debug!(%pixel, "no activation recorded, no default range"),
    }
    Ok(window)
}

/// Computes the default window from already-fetched events.
pub fn default_range(
    events: &[ConnectionEvent],
    now: impl FnOnce() -> DateTime<Utc>,
) -> Option<TimeWindow> {
    let start = events
        .iter()
        .filter(|event| event.is_connected())
        .map(|event| event.timestamp)
        .min()?;
    let last = events.iter().max_by_key(|event| event.timestamp)?;
    let end = if last.is_connected() {
        let now = now();
        if now < start {
            tracing::warn!(%now, %start, "clock is behind the first activation, clamping");
            start
        } else {
            now
        }
    } else {
        last.timestamp
    };
    TimeWindow::new(start, end).ok()
}

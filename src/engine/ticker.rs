//! Wall-clock-aligned interval ticker.
//!
//! The upstream collector writes observations at real clock boundaries, so
//! this process must tick in phase with it rather than on a free-running
//! timer. A free-running timer would drift against the collector and lose
//! observations at window edges. The alignment is approximate (the clock is
//! sampled at ~10 Hz) which is fine because the engine queries a time range,
//! not a point.
//!
//! Known limitation: if the system clock jumps backward, an aligned boundary
//! may fire one extra tick. The engine's threshold cap keeps that safe, but
//! observations in overlapping windows can be double-counted.

use std::time::Duration;

use chrono::Timelike;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Poll cadence while waiting for an aligned boundary.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Sleep after firing so one aligned second produces exactly one tick.
const REARM_DELAY: Duration = Duration::from_millis(1050);

/// True at wall-clock instants sitting on a boundary of the interval.
fn aligned(seconds_into_hour: u32, interval_secs: u32) -> bool {
    interval_secs > 0 && seconds_into_hour % interval_secs == 0
}

/// Spawn a ticker for one interval bucket.
///
/// The channel holds at most one tick. When the consumer is still inside a
/// pass, a fired tick either waits in the slot (where the consumer discards
/// it after the pass) or is dropped here; ticks are never queued up.
pub fn spawn_aligned_ticker(interval_secs: u32, shutdown: CancellationToken) -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);

    tokio::spawn(async move {
        loop {
            let now = chrono::Local::now();
            let seconds_into_hour = now.minute() * 60 + now.second();

            if aligned(seconds_into_hour, interval_secs) {
                match tx.try_send(()) {
                    Ok(()) => tracing::trace!(interval = interval_secs, "tick"),
                    Err(mpsc::error::TrySendError::Full(())) => {
                        tracing::debug!(
                            interval = interval_secs,
                            "tick dropped, previous pass still running"
                        );
                    }
                    Err(mpsc::error::TrySendError::Closed(())) => return,
                }

                tokio::select! {
                    _ = tokio::time::sleep(REARM_DELAY) => {}
                    _ = shutdown.cancelled() => return,
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = shutdown.cancelled() => return,
            }
        }
    });

    rx
}

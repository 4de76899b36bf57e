//! Per-interval failure state engine.
//!
//! One engine instance owns the failure registry of one interval bucket. Each
//! tick it queries the store for failing observations in the window since the
//! last successful fetch, advances the registry, and hands the resulting
//! state edges to the notification dispatcher. A second loop per interval
//! drains the notification-sent channel back into the registry so resend
//! suppression sees fresh timestamps on the next tick.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::registry::FailureRegistry;
use crate::errors::{Error, Result};
use crate::notify::NotificationDispatcher;
use crate::store::StoreGateway;

/// Report from the dispatcher that a CRITICAL was sent to one recipient.
///
/// This channel is the only coupling back from the dispatcher to the engine;
/// neither side holds a reference to the other.
#[derive(Debug, Clone, Copy)]
pub struct NotificationChange {
    pub service_id: i64,
    pub recipient_id: i64,
    pub sent_at: DateTime<Utc>,
}

pub struct EngineConfig {
    pub interval_secs: u32,
    pub store: Arc<dyn StoreGateway>,
    pub registry: Arc<FailureRegistry>,
    pub dispatcher: NotificationDispatcher,
    pub time_profiling: bool,
}

pub struct FailureStateEngine {
    interval_secs: u32,
    store: Arc<dyn StoreGateway>,
    registry: Arc<FailureRegistry>,
    dispatcher: NotificationDispatcher,
    last_fetch_time: DateTime<Utc>,
    time_profiling: bool,
}

impl FailureStateEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        if config.interval_secs == 0 {
            return Err(Error::invalid_config("engine interval must be positive"));
        }

        Ok(Self {
            interval_secs: config.interval_secs,
            store: config.store,
            registry: config.registry,
            dispatcher: config.dispatcher,
            // seed one full window back so the first tick sees the samples
            // written while the process was coming up
            last_fetch_time: Utc::now() - chrono::Duration::seconds(i64::from(config.interval_secs)),
            time_profiling: config.time_profiling,
        })
    }

    /// Consume ticks until shutdown.
    ///
    /// Tick `N+1` starts only after tick `N`'s pass returns; boundary ticks
    /// that fired while a pass was running are discarded, never queued.
    pub async fn run(mut self, mut ticks: mpsc::Receiver<()>, shutdown: CancellationToken) {
        tracing::info!(interval = self.interval_secs, "failure state engine started");

        loop {
            tokio::select! {
                maybe_tick = ticks.recv() => {
                    if maybe_tick.is_none() {
                        tracing::info!(interval = self.interval_secs, "ticker gone, stopping engine");
                        return;
                    }
                    tracing::debug!(interval = self.interval_secs, "received tick");
                    self.run_pass().await;
                    while ticks.try_recv().is_ok() {
                        tracing::debug!(
                            interval = self.interval_secs,
                            "discarding tick that fired during the pass"
                        );
                    }
                }
                _ = shutdown.cancelled() => {
                    tracing::info!(interval = self.interval_secs, "engine shutting down");
                    return;
                }
            }
        }
    }

    /// One pass: fetch the window, advance the registry, dispatch edges.
    async fn run_pass(&mut self) {
        let from = self.last_fetch_time;
        let to = Utc::now();
        let started = Instant::now();

        let observations = match self.store.failing_observations(from, to, self.interval_secs).await {
            Ok(observations) => observations,
            Err(error) => {
                // last_fetch_time stays put so the next tick retries the
                // whole widened window
                tracing::error!(
                    interval = self.interval_secs,
                    error = %error,
                    "failed to fetch failing observations, skipping tick"
                );
                return;
            }
        };
        self.last_fetch_time = to;

        let edges = self.registry.apply_batch(&observations);

        if self.time_profiling {
            tracing::debug!(
                interval = self.interval_secs,
                elapsed_ms = started.elapsed().as_millis() as u64,
                observations = observations.len(),
                edges = edges.len(),
                "tick pass finished"
            );
        }

        for edge in edges {
            self.dispatcher.spawn_dispatch(edge);
        }
    }
}

/// Drain `NotificationChange` messages into the registry. One of these runs
/// next to each engine.
pub async fn run_change_recorder(
    registry: Arc<FailureRegistry>,
    mut changes: mpsc::UnboundedReceiver<NotificationChange>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            maybe_change = changes.recv() => {
                let Some(change) = maybe_change else {
                    return;
                };
                let recorded = registry.record_notification_sent(
                    change.service_id,
                    change.recipient_id,
                    change.sent_at,
                );
                if !recorded {
                    let error = Error::Invariant {
                        message: format!(
                            "notification-sent update references absent service {}",
                            change.service_id
                        ),
                    };
                    tracing::error!(
                        recipient_id = change.recipient_id,
                        error = %error,
                        "dropping notification-sent update, service already recovered"
                    );
                }
            }
            _ = shutdown.cancelled() => return,
        }
    }
}

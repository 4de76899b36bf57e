//! # alertea: notification backend for the exmonitor system
//!
//! `alertea` is the alerting half of an external service monitor. A separate
//! collector continuously probes the monitored services and writes one status
//! document per check into the store; this process reads those documents back,
//! tracks fail streaks per service, and tells people when a service breaches
//! its failure threshold and when it recovers.
//!
//! ## Architecture
//!
//! Work is organised per *interval bucket*: all services checked every 30
//! seconds form one bucket, every 60 seconds the next, and so on. For each
//! bucket the process runs an independent pipeline:
//!
//! ```text
//! aligned ticker ──► failure state engine ──► notification dispatcher
//!  (engine::ticker)    (engine::service)    │    (notify)
//!                           ▲               │  ├─► email worker ─► SMTP
//!                           │ notification- │  ├─► SMS gateway
//!                           └───sent channel┘  └─► voice gateway
//! ```
//!
//! The **ticker** fires at wall-clock boundaries (`(minute*60 + second) mod
//! interval == 0`) so the windows this process reads line up with the windows
//! the collector writes. The **engine** owns an in-memory registry of fail
//! streaks: counters saturate at the service's fail threshold on the way up
//! (emitting a CRITICAL edge at the crossing) and at zero on the way down
//! (emitting a RESOLVED edge when a previously-alerted service drains out).
//! The **dispatcher** fans each edge out to the service's recipients with
//! per-recipient resend suppression, and reports delivered CRITICALs back to
//! the engine so the suppression window is visible to later ticks.
//!
//! Email delivery goes through a single long-lived worker that keeps one SMTP
//! session open, retries with exponential backoff, and closes the session
//! after 30 idle seconds. SMS and voice calls are single-shot gateway calls.
//!
//! The registry is purely in-memory: restarts forget all fail streaks and the
//! next breach alerts again. That trade keeps this process stateless and the
//! store the single source of truth.
//!
//! ## Quick start
//!
//! ```no_run
//! use clap::Parser;
//! use alertea::{telemetry, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = alertea::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     let _guards = telemetry::init_telemetry(&config.logging)?;
//!     alertea::run(config).await
//! }
//! ```
//!
//! See the [`config`] module for the CLI surface and configuration layering.

pub mod config;
pub mod engine;
pub mod errors;
pub mod notify;
pub mod store;
pub mod telemetry;

pub use crate::config::Config;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::engine::{run_change_recorder, EngineConfig, FailureRegistry, FailureStateEngine};
use crate::notify::{EmailSink, EmailWorker, NotificationDispatcher};

/// Construct the component graph and run until a termination signal arrives.
///
/// Returns an error on construction failure or on signal, so the process
/// exits nonzero in both cases; it never returns `Ok` in steady state.
pub async fn run(config: Config) -> anyhow::Result<()> {
    for warning in config.startup_warnings() {
        tracing::warn!("{warning}");
    }

    let store = store::connect(&config.store, config.time_profiling).await?;

    let shutdown = CancellationToken::new();

    // one email worker per process; with --smtp false delivery is mocked
    let (email_sink, email_worker) = if config.smtp.enabled {
        let (email_tx, email_rx) = mpsc::unbounded_channel();
        let worker = EmailWorker::new(config.smtp.clone(), email_rx)?;
        (EmailSink::Worker(email_tx), Some(tokio::spawn(worker.run())))
    } else {
        tracing::info!("SMTP disabled, emails will be printed to stdout");
        (EmailSink::Stdout, None)
    };

    let sms = notify::gateway::sms_from_config(&config.gateways)?;
    let voice = notify::gateway::voice_from_config(&config.gateways)?;

    let intervals = store
        .intervals()
        .await
        .context("failed to fetch configured intervals from the store")?;
    anyhow::ensure!(!intervals.is_empty(), "store returned no configured intervals");
    tracing::info!(?intervals, "starting one engine per interval bucket");

    let mut tasks = BackgroundTaskBuilder::new();
    for interval in intervals {
        let registry = Arc::new(FailureRegistry::new());
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            email_sink.clone(),
            sms.clone(),
            voice.clone(),
            change_tx,
        );

        let engine = FailureStateEngine::new(EngineConfig {
            interval_secs: interval,
            store: store.clone(),
            registry: registry.clone(),
            dispatcher,
            time_profiling: config.time_profiling,
        })?;

        let ticks = engine::spawn_aligned_ticker(interval, shutdown.clone());

        let engine_shutdown = shutdown.clone();
        tasks.spawn(format!("engine-{interval}s"), async move {
            engine.run(ticks, engine_shutdown).await;
            Ok(())
        });

        let recorder_shutdown = shutdown.clone();
        tasks.spawn(format!("notification-recorder-{interval}s"), async move {
            run_change_recorder(registry, change_rx, recorder_shutdown).await;
            Ok(())
        });
    }

    // the engines hold their own sink clones; this scope's copy must go or
    // the email queue never closes on shutdown
    drop(email_sink);

    let signal = wait_for_signal().await?;
    tracing::info!(signal, "caught signal, exiting ...");

    shutdown.cancel();
    tasks.join_all().await;

    // engines are gone and their dispatcher queues dropped with them; give
    // the email worker a chance to drain what is already queued
    if let Some(worker) = email_worker {
        if tokio::time::timeout(Duration::from_secs(30), worker).await.is_err() {
            tracing::warn!("email worker did not drain in time, abandoning queued messages");
        }
    }

    store.close().await;

    anyhow::bail!("terminated by signal {signal}")
}

async fn wait_for_signal() -> anyhow::Result<&'static str> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .context("failed to install SIGTERM handler")?;

    let signal = tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    };

    Ok(signal)
}

/// Named background tasks, joined and logged on shutdown.
struct BackgroundTaskBuilder {
    tasks: tokio::task::JoinSet<anyhow::Result<()>>,
    names: HashMap<tokio::task::Id, String>,
}

impl BackgroundTaskBuilder {
    fn new() -> Self {
        Self {
            tasks: tokio::task::JoinSet::new(),
            names: HashMap::new(),
        }
    }

    fn spawn<F>(&mut self, name: String, future: F)
    where
        F: std::future::Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handle = self.tasks.spawn(future);
        self.names.insert(handle.id(), name);
    }

    async fn join_all(mut self) {
        while let Some(result) = self.tasks.join_next_with_id().await {
            match result {
                Ok((task_id, Ok(()))) => {
                    let name = self.names.get(&task_id).map(String::as_str).unwrap_or("unknown");
                    tracing::debug!(task = name, "background task completed");
                }
                Ok((task_id, Err(error))) => {
                    let name = self.names.get(&task_id).map(String::as_str).unwrap_or("unknown");
                    tracing::error!(task = name, error = %error, "background task failed");
                }
                Err(join_error) => {
                    let task_id = join_error.id();
                    let name = self.names.get(&task_id).map(String::as_str).unwrap_or("unknown");
                    tracing::error!(task = name, error = %join_error, "background task panicked");
                }
            }
        }
    }
}

//! CollectionScheduler - Drives sampling, collection, alerting and fan-out
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → Sample host → Collect components → Check alerts → Broadcast
//!     ↑
//!     └─── Commands (TickNow, UpdateInterval, Shutdown)
//! ```
//!
//! Ticks run one after another inside the actor. The timer skips missed
//! ticks, so a slow tick is followed by the next regular one rather than a
//! burst; the per-component timeout bounds how slow a tick can be.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, instrument, trace, warn};

use crate::api::{DashboardState, SystemMetricsPayload};
use crate::monitors::SystemMonitor;
use crate::monitors::system::SYSTEM_CATEGORY;

use super::messages::{SchedulerCommand, TickReport};

/// Gateway message type for host metric broadcasts
pub const SYSTEM_METRICS_MESSAGE: &str = "system-metrics";

/// First tick fires one period from now
fn skipping_interval(period: Duration) -> Interval {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

/// Actor that runs one collection pass per tick
pub struct CollectionScheduler {
    state: DashboardState,

    monitor: SystemMonitor,

    command_rx: mpsc::Receiver<SchedulerCommand>,

    /// Current tick interval
    interval_duration: Duration,

    component_timeout: Duration,
}

impl CollectionScheduler {
    pub fn new(
        state: DashboardState,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        interval_duration: Duration,
        component_timeout: Duration,
    ) -> Self {
        Self {
            state,
            monitor: SystemMonitor::new(),
            command_rx,
            interval_duration,
            component_timeout,
        }
    }

    /// Run the actor's main loop
    ///
    /// Runs until a Shutdown command is received or every handle is dropped.
    #[instrument(skip(self), fields(interval = ?self.interval_duration))]
    pub async fn run(mut self) {
        debug!("starting collection scheduler");

        let mut ticker = skipping_interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            let report = self.tick().await;
                            let _ = respond_to.send(report);
                        }

                        SchedulerCommand::UpdateInterval { interval } => {
                            if interval.is_zero() {
                                warn!("ignoring zero tick interval");
                                continue;
                            }
                            debug!("updating interval to {interval:?}");
                            self.interval_duration = interval;
                            ticker = skipping_interval(interval);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("collection scheduler stopped");
    }

    /// One pass: system, components, alerts, then broadcasts
    #[instrument(skip(self))]
    async fn tick(&mut self) -> TickReport {
        let state = &self.state;

        let system = self.monitor.sample();
        system.record(&state.metrics).await;

        let collection = state
            .registry
            .collect(&state.metrics, self.component_timeout)
            .await;

        let alert_events = state.alerts.check_alerts(&state.metrics).await;

        let payload = SystemMetricsPayload {
            sample: system,
            timestamp: Utc::now().timestamp_millis(),
        };
        let mut delivered = state
            .gateway
            .broadcast(SYSTEM_METRICS_MESSAGE, &payload, SYSTEM_CATEGORY)
            .await;

        for component in &collection.collected {
            let channel = component.info.kind.as_str();
            delivered += state.gateway.broadcast(channel, component, channel).await;
        }

        trace!(
            "tick done: {} collected, {} failed, {} alert transitions, {delivered} deliveries",
            collection.collected.len(),
            collection.failures.len(),
            alert_events.len()
        );

        TickReport {
            system,
            collection,
            alert_events,
            delivered,
        }
    }
}

/// Handle for controlling a CollectionScheduler
///
/// The handle can be cloned and shared across tasks.
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Spawn the scheduler actor
    ///
    /// Returns the handle and the actor's task, which completes after
    /// shutdown.
    pub fn spawn(
        state: DashboardState,
        interval: Duration,
        component_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let interval = interval.max(Duration::from_millis(1));
        let actor = CollectionScheduler::new(state, cmd_rx, interval, component_timeout);
        let task = tokio::spawn(actor.run());

        (Self { sender: cmd_tx }, task)
    }

    /// Run a tick now and wait for its report
    pub async fn tick_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive tick report")
    }

    pub async fn update_interval(&self, interval: Duration) -> Result<()> {
        self.sender
            .send(SchedulerCommand::UpdateInterval { interval })
            .await
            .context("failed to send UpdateInterval command")?;
        Ok(())
    }

    /// Ask the scheduler to stop after any tick in progress
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}

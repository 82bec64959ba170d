//! Lifecycle owner for the stores, scheduler, relay and HTTP server
//!
//! ```text
//! Dashboard::new ──▶ start() ──▶ running ──▶ stop() ──▶ stopped
//!                     │                        │
//!                     ├ bind listener          ├ shut scheduler down, await it
//!                     ├ spawn HTTP server      ├ close every client
//!                     ├ spawn scheduler        ├ stop alert relay
//!                     └ spawn alert relay      └ shut server down, await it
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::actors::{SchedulerHandle, TickReport};
use crate::alerts::{AlertEngine, AlertEvent};
use crate::api::{self, ALERTS_CHANNEL, ApiConfig, DashboardState, Gateway};
use crate::config::DashboardConfig;
use crate::registry::{Component, ComponentRegistry, MetricsSource};
use crate::storage::MetricStore;

/// Time the HTTP server gets to drain after the shutdown signal
const SERVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    scheduler: SchedulerHandle,
    scheduler_task: JoinHandle<()>,
    relay_task: JoinHandle<()>,
    server_task: JoinHandle<()>,
    shutdown_tx: oneshot::Sender<()>,
}

impl Running {
    fn abort(self) {
        self.scheduler_task.abort();
        self.relay_task.abort();
        self.server_task.abort();
    }
}

pub struct Dashboard {
    config: DashboardConfig,
    state: DashboardState,
    running: Mutex<Option<Running>>,
}

impl Dashboard {
    /// Build the stores from a validated configuration
    pub fn new(config: DashboardConfig) -> Result<Self> {
        config.validate()?;

        let metrics = MetricStore::new(config.history_size)?;
        let alerts = AlertEngine::new(config.alerts.clone(), config.alert_history_limit);

        let state = DashboardState::new(
            Arc::new(metrics),
            Arc::new(alerts),
            Arc::new(ComponentRegistry::new()),
            Arc::new(Gateway::new(config.client_buffer)),
        );

        Ok(Self {
            config,
            state,
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    /// Start serving and collecting
    ///
    /// Resolves once the listener is bound. Calling `start` on a running
    /// dashboard returns the address it is already bound to.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if let Some(running) = running.as_ref() {
            debug!("dashboard already running on {}", running.addr);
            return Ok(running.addr);
        }

        self.state.mark_started();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let (addr, server_task) = api::spawn_api_server(
            ApiConfig::from(&self.config),
            self.state.clone(),
            async move {
                let _ = shutdown_rx.await;
            },
        )
        .await
        .context("failed to start API server")?;

        let relay_task = tokio::spawn(relay_alerts(
            self.state.alerts.subscribe(),
            self.state.gateway.clone(),
        ));

        let (scheduler, scheduler_task) = SchedulerHandle::spawn(
            self.state.clone(),
            self.config.update_interval(),
            self.config.component_timeout(),
        );

        info!("dashboard running on http://{addr}");

        *running = Some(Running {
            addr,
            scheduler,
            scheduler_task,
            relay_task,
            server_task,
            shutdown_tx,
        });

        Ok(addr)
    }

    /// Stop collecting, disconnect every client and release the listener
    ///
    /// Stopping a dashboard that is not running does nothing.
    #[instrument(skip(self))]
    pub async fn stop(&self) -> Result<()> {
        let Some(running) = self.running.lock().await.take() else {
            debug!("dashboard not running");
            return Ok(());
        };

        let Running {
            addr,
            scheduler,
            scheduler_task,
            relay_task,
            mut server_task,
            shutdown_tx,
        } = running;

        info!("stopping dashboard on {addr}");

        if let Err(e) = scheduler.shutdown().await {
            warn!("scheduler already gone: {e:#}");
        }
        if let Err(e) = scheduler_task.await {
            warn!("scheduler task failed: {e}");
        }

        self.state.gateway.close_all().await;
        relay_task.abort();

        let _ = shutdown_tx.send(());
        match tokio::time::timeout(SERVER_SHUTDOWN_TIMEOUT, &mut server_task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("API server task failed: {e}"),
            Err(_) => {
                warn!("API server did not stop within {SERVER_SHUTDOWN_TIMEOUT:?}, aborting");
                server_task.abort();
            }
        }

        // clients that connected while the server was draining
        self.state.gateway.close_all().await;

        info!("dashboard stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Address the server is bound to, while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|running| running.addr)
    }

    /// Add a component polled on every tick under category `kind`
    ///
    /// `kind` may not be `"system"` or `"alerts"`.
    pub async fn register_component(
        &self,
        id: impl Into<String>,
        name: impl Into<String>,
        kind: impl Into<String>,
        source: impl MetricsSource + 'static,
    ) -> Result<()> {
        self.state
            .registry
            .register(id, Component::new(name, kind, source))
            .await?;
        Ok(())
    }

    pub async fn unregister_component(&self, id: &str) -> bool {
        self.state.registry.unregister(id).await
    }

    /// Run a collection tick now instead of waiting for the timer
    pub async fn tick_now(&self) -> Result<TickReport> {
        let scheduler = match self.running.lock().await.as_ref() {
            Some(running) => running.scheduler.clone(),
            None => bail!("dashboard is not running"),
        };

        scheduler.tick_now().await
    }

    pub async fn update_interval(&self, interval: Duration) -> Result<()> {
        let scheduler = match self.running.lock().await.as_ref() {
            Some(running) => running.scheduler.clone(),
            None => bail!("dashboard is not running"),
        };

        scheduler.update_interval(interval).await
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.abort();
        }
    }
}

/// Forward alert transitions to clients subscribed to `"alerts"`
async fn relay_alerts(mut events: broadcast::Receiver<AlertEvent>, gateway: Arc<Gateway>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                gateway
                    .broadcast(event.message_type(), &event.alert, ALERTS_CHANNEL)
                    .await;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("alert relay lagged, {skipped} alert events not relayed");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!("alert event channel closed");
                break;
            }
        }
    }
}

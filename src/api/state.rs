//! State shared by HTTP handlers, WebSocket connections and the scheduler

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::alerts::{AlertBook, AlertEngine};
use crate::monitors::system::SYSTEM_CATEGORY;
use crate::registry::{ComponentRegistry, ComponentTable};
use crate::storage::{MetricStore, SeriesTable};

use super::gateway::Gateway;
use super::types::{DashboardSnapshot, DashboardStatus};

/// Handles to every store, cloned into each handler
#[derive(Clone)]
pub struct DashboardState {
    pub metrics: Arc<MetricStore>,
    pub alerts: Arc<AlertEngine>,
    pub registry: Arc<ComponentRegistry>,
    pub gateway: Arc<Gateway>,
    /// Milliseconds since the epoch at the last `mark_started`
    started_at: Arc<AtomicI64>,
}

impl DashboardState {
    pub fn new(
        metrics: Arc<MetricStore>,
        alerts: Arc<AlertEngine>,
        registry: Arc<ComponentRegistry>,
        gateway: Arc<Gateway>,
    ) -> Self {
        Self {
            metrics,
            alerts,
            registry,
            gateway,
            started_at: Arc::new(AtomicI64::new(Utc::now().timestamp_millis())),
        }
    }

    /// Restart the uptime clock; called when the dashboard starts serving
    pub fn mark_started(&self) {
        self.started_at.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Whole seconds since the dashboard started
    ///
    /// Counts from construction until the dashboard is first started.
    pub fn uptime(&self) -> u64 {
        let started_at = self.started_at.load(Ordering::Relaxed);
        let elapsed = Utc::now().timestamp_millis().saturating_sub(started_at);
        u64::try_from(elapsed / 1000).unwrap_or(0)
    }

    /// Consistent view of all three stores
    ///
    /// Read guards are taken in the order metrics, alerts, registry and held
    /// together, so no write can land between the parts.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        let metrics = self.metrics.read().await;
        let alerts = self.alerts.read().await;
        let registry = self.registry.read().await;

        let status = self.build_status(&metrics, &alerts, &registry);

        DashboardSnapshot {
            metrics: metrics.snapshot(None),
            components: status.components.clone(),
            alerts: alerts.view(),
            status,
        }
    }

    pub async fn status(&self) -> DashboardStatus {
        let metrics = self.metrics.read().await;
        let alerts = self.alerts.read().await;
        let registry = self.registry.read().await;

        self.build_status(&metrics, &alerts, &registry)
    }

    fn build_status(
        &self,
        metrics: &SeriesTable,
        alerts: &AlertBook,
        registry: &ComponentTable,
    ) -> DashboardStatus {
        DashboardStatus {
            healthy: !alerts.has_critical(),
            uptime: self.uptime(),
            system: metrics.latest_values(SYSTEM_CATEGORY),
            components: registry.list(),
            alerts: alerts.active(),
        }
    }
}

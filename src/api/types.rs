//! Wire types shared by the Query API and the WebSocket gateway
//!
//! HTTP responses and WebSocket payloads are built from the same structs so
//! the two views of the dashboard cannot drift apart.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alerts::{Alert, AlertsView};
use crate::monitors::SystemSample;
use crate::registry::ComponentInfo;
use crate::storage::{CategorySnapshot, SeriesMap};

/// Command name understood by `{type: "command"}` messages
pub const SNAPSHOT_COMMAND: &str = "snapshot";

/// Overall dashboard state
///
/// `healthy` is false while any critical alert is active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardStatus {
    pub healthy: bool,
    /// Seconds since the dashboard started
    pub uptime: u64,
    /// Latest value of every `system` series
    pub system: BTreeMap<String, f64>,
    pub components: Vec<ComponentInfo>,
    /// Currently active alerts
    pub alerts: Vec<Alert>,
}

/// Point-in-time view across all stores, sent as the `init` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSnapshot {
    pub status: DashboardStatus,
    pub metrics: CategorySnapshot,
    pub components: Vec<ComponentInfo>,
    pub alerts: AlertsView,
}

/// Result of the `snapshot` command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotResult {
    pub metrics: CategorySnapshot,
    pub alerts: AlertsView,
    pub components: Vec<ComponentInfo>,
}

impl From<DashboardSnapshot> for SnapshotResult {
    fn from(snapshot: DashboardSnapshot) -> Self {
        Self {
            metrics: snapshot.metrics,
            alerts: snapshot.alerts,
            components: snapshot.components,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

/// Response for `GET /api/metrics/:category`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse {
    pub category: String,
    pub metrics: SeriesMap,
}

/// Payload of `system-metrics` broadcasts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemMetricsPayload {
    #[serde(flatten)]
    pub sample: SystemSample,
    pub timestamp: i64,
}

/// Messages accepted from WebSocket clients
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Add channels to the connection's subscriptions
    Subscribe { channels: Vec<String> },
    Unsubscribe { channels: Vec<String> },
    Command { command: String },
    Ping,
}

/// Messages addressed to a single WebSocket client
///
/// Channel broadcasts use the `{type, data}` envelope built by the gateway.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerMessage {
    Init { data: DashboardSnapshot },
    CommandResult { command: String, result: SnapshotResult },
    Error { message: String },
    Pong,
}

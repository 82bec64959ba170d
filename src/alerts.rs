//! Threshold alerting over the metric store
//!
//! ## Alert lifecycle
//!
//! ```text
//! absent ──(rule holds / create_alert)──▶ active ──(rule stops holding / clear_alert)──▶ absent
//! ```
//!
//! Each transition appends an entry to the history log and is published as an
//! [`AlertEvent`] on a broadcast channel, which the dashboard relays to the
//! `"alerts"` gateway channel.
//!
//! Rules compare the *windowed average* of a series against their threshold,
//! not the latest sample, so a single outlier cannot make an alert flap.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::{RwLock, RwLockReadGuard, broadcast};
use tracing::{debug, info, instrument, trace};

use crate::storage::MetricStore;

/// Capacity of the alert event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// An alert currently (or previously) raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub message: String,
    pub context: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Created,
    Cleared,
}

/// One transition in the alert history log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertHistoryEntry {
    #[serde(flatten)]
    pub alert: Alert,
    pub status: AlertStatus,
    pub timestamp: DateTime<Utc>,
}

/// Published on every create/clear
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub status: AlertStatus,
    pub alert: Alert,
}

impl AlertEvent {
    /// Gateway message type for this event
    pub fn message_type(&self) -> &'static str {
        match self.status {
            AlertStatus::Created => "alert-created",
            AlertStatus::Cleared => "alert-cleared",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    Above,
    Below,
}

/// Threshold rule evaluated once per scheduler tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRule {
    /// Alert id raised by this rule
    pub id: String,
    pub category: String,
    pub metric: String,
    /// Number of most recent samples averaged
    pub window: usize,
    pub threshold: f64,
    #[serde(default = "default_comparison")]
    pub comparison: Comparison,
    pub severity: Severity,
    pub message: String,
}

fn default_comparison() -> Comparison {
    Comparison::Above
}

impl AlertRule {
    pub fn holds(&self, average: f64) -> bool {
        match self.comparison {
            Comparison::Above => average > self.threshold,
            Comparison::Below => average < self.threshold,
        }
    }

    /// Rules used when the configuration does not name any
    pub fn defaults() -> Vec<AlertRule> {
        vec![
            AlertRule {
                id: "high-cpu".to_string(),
                category: "system".to_string(),
                metric: "cpu".to_string(),
                window: 5,
                threshold: 0.8,
                comparison: Comparison::Above,
                severity: Severity::Warning,
                message: "CPU usage is above 80%".to_string(),
            },
            AlertRule {
                id: "high-memory".to_string(),
                category: "system".to_string(),
                metric: "memory".to_string(),
                window: 5,
                threshold: 0.9,
                comparison: Comparison::Above,
                severity: Severity::Critical,
                message: "Memory usage is above 90%".to_string(),
            },
        ]
    }
}

/// Active alerts and history, as served by the query API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertsView {
    pub active: Vec<Alert>,
    pub history: Vec<AlertHistoryEntry>,
}

/// State guarded by the engine's lock
#[derive(Debug)]
pub struct AlertBook {
    active: HashMap<String, Alert>,
    history: VecDeque<AlertHistoryEntry>,
    history_limit: usize,
}

impl AlertBook {
    fn new(history_limit: usize) -> Self {
        Self {
            active: HashMap::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    fn log(&mut self, alert: &Alert, status: AlertStatus) {
        if self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(AlertHistoryEntry {
            alert: alert.clone(),
            status,
            timestamp: Utc::now(),
        });
    }

    fn create(
        &mut self,
        id: &str,
        severity: Severity,
        message: &str,
        context: Map<String, Value>,
    ) -> Option<AlertEvent> {
        if self.active.contains_key(id) {
            trace!("alert {id} already active, ignoring create");
            return None;
        }

        let alert = Alert {
            id: id.to_string(),
            severity,
            message: message.to_string(),
            context,
            created_at: Utc::now(),
        };

        self.log(&alert, AlertStatus::Created);
        self.active.insert(id.to_string(), alert.clone());

        Some(AlertEvent {
            status: AlertStatus::Created,
            alert,
        })
    }

    fn clear(&mut self, id: &str) -> Option<AlertEvent> {
        let alert = self.active.remove(id)?;
        self.log(&alert, AlertStatus::Cleared);

        Some(AlertEvent {
            status: AlertStatus::Cleared,
            alert,
        })
    }

    /// Active alerts, oldest first
    pub fn active(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self.active.values().cloned().collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        active
    }

    pub fn history(&self) -> Vec<AlertHistoryEntry> {
        self.history.iter().cloned().collect()
    }

    pub fn view(&self) -> AlertsView {
        AlertsView {
            active: self.active(),
            history: self.history(),
        }
    }

    pub fn has_critical(&self) -> bool {
        self.active
            .values()
            .any(|alert| alert.severity == Severity::Critical)
    }
}

/// Evaluates rules and owns the active alert set and history log
#[derive(Debug)]
pub struct AlertEngine {
    rules: Vec<AlertRule>,
    book: RwLock<AlertBook>,
    events: broadcast::Sender<AlertEvent>,
}

impl AlertEngine {
    pub fn new(rules: Vec<AlertRule>, history_limit: usize) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        Self {
            rules,
            book: RwLock::new(AlertBook::new(history_limit.max(1))),
            events,
        }
    }

    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Receive every future create/clear
    pub fn subscribe(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    /// Raise an alert
    ///
    /// Creating an id that is already active is ignored: the existing alert
    /// keeps its context and no history entry is added. Returns `true` if a
    /// new alert was raised.
    pub async fn create_alert(
        &self,
        id: &str,
        severity: Severity,
        message: &str,
        context: Map<String, Value>,
    ) -> bool {
        let event = self.book.write().await.create(id, severity, message, context);
        self.publish(event)
    }

    /// Clear an active alert; a no-op for ids that are not active
    pub async fn clear_alert(&self, id: &str) -> bool {
        let event = self.book.write().await.clear(id);
        self.publish(event)
    }

    /// Evaluate every rule against the windowed averages in `store`
    ///
    /// Rules whose series has no data are skipped. Returns the transitions
    /// this evaluation caused.
    #[instrument(skip_all)]
    pub async fn check_alerts(&self, store: &MetricStore) -> Vec<AlertEvent> {
        let averages: Vec<(&AlertRule, f64)> = {
            let table = store.read().await;
            self.rules
                .iter()
                .filter_map(|rule| {
                    let average = table.recent_average(&rule.category, &rule.metric, rule.window)?;
                    Some((rule, average))
                })
                .collect()
        };

        let mut events = vec![];
        {
            let mut book = self.book.write().await;
            for (rule, average) in averages {
                trace!(
                    "rule {}: {}/{} average {average} vs {:?} {}",
                    rule.id, rule.category, rule.metric, rule.comparison, rule.threshold
                );

                let event = if rule.holds(average) {
                    book.create(&rule.id, rule.severity, &rule.message, rule_context(rule, average))
                } else {
                    book.clear(&rule.id)
                };
                events.extend(event);
            }
        }

        for event in &events {
            self.publish(Some(event.clone()));
        }

        events
    }

    pub async fn active_alerts(&self) -> Vec<Alert> {
        self.book.read().await.active()
    }

    pub async fn history(&self) -> Vec<AlertHistoryEntry> {
        self.book.read().await.history()
    }

    pub async fn view(&self) -> AlertsView {
        self.book.read().await.view()
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.book.read().await.active.contains_key(id)
    }

    /// Hold the read lock, e.g. to build a snapshot consistent with other stores
    pub async fn read(&self) -> RwLockReadGuard<'_, AlertBook> {
        self.book.read().await
    }

    fn publish(&self, event: Option<AlertEvent>) -> bool {
        let Some(event) = event else {
            return false;
        };

        match event.status {
            AlertStatus::Created => info!(
                "alert {} raised ({}): {}",
                event.alert.id, event.alert.severity, event.alert.message
            ),
            AlertStatus::Cleared => info!("alert {} cleared", event.alert.id),
        }

        // no receivers is fine, nobody is watching
        if self.events.send(event).is_err() {
            debug!("no receivers for alert event");
        }
        true
    }
}

fn rule_context(rule: &AlertRule, average: f64) -> Map<String, Value> {
    let context = json!({
        "value": average,
        "threshold": rule.threshold,
        "window": rule.window,
        "category": rule.category,
        "metric": rule.metric,
    });

    match context {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

//! Externally owned metric sources
//!
//! Components are registered by id and polled once per scheduler tick. A
//! component's metrics land in the metric store under
//! `category = component type`, `name = metric key`; nested objects are
//! flattened to dotted keys (`tokens.input`).
//!
//! Collection never holds the registry lock while waiting on a component:
//! the list is cloned under the read lock, every source is awaited
//! concurrently (each with its own timeout), and the results are applied to
//! the metric store afterwards under its write lock.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, instrument, trace, warn};

use crate::api::ALERTS_CHANNEL;
use crate::monitors::system::SYSTEM_CATEGORY;
use crate::storage::{MetricPoint, MetricStore};

/// Types owned by the dashboard itself; components may not write to them
pub const RESERVED_TYPES: [&str; 2] = [SYSTEM_CATEGORY, ALERTS_CHANNEL];

/// A numeric metric or a nested group of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Object(BTreeMap<String, MetricValue>),
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Number(value)
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl From<u64> for MetricValue {
    fn from(value: u64) -> Self {
        MetricValue::Number(value as f64)
    }
}

impl TryFrom<serde_json::Value> for MetricValue {
    type Error = CollectionError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        json_to_metric("", value)
    }
}

fn json_to_metric(path: &str, value: serde_json::Value) -> Result<MetricValue, CollectionError> {
    match value {
        serde_json::Value::Number(number) => number
            .as_f64()
            .map(MetricValue::Number)
            .ok_or_else(|| CollectionError::invalid(path, "number is not representable as f64")),
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| -> Result<_, CollectionError> {
                let nested = json_to_metric(&join_key(path, &key), value)?;
                Ok((key, nested))
            })
            .collect::<Result<_, _>>()
            .map(MetricValue::Object),
        other => Err(CollectionError::invalid(
            path,
            format!("expected a number or an object, got {other}"),
        )),
    }
}

/// Metrics returned by a single `get_metrics` call
pub type ComponentMetrics = HashMap<String, MetricValue>;

/// Parse a JSON object into component metrics, rejecting non-numeric leaves
pub fn metrics_from_json(value: serde_json::Value) -> Result<ComponentMetrics, CollectionError> {
    match value {
        serde_json::Value::Object(map) => map
            .into_iter()
            .map(|(key, value)| -> Result<_, CollectionError> {
                let metric = json_to_metric(&key, value)?;
                Ok((key, metric))
            })
            .collect(),
        other => Err(CollectionError::invalid("", format!("expected an object, got {other}"))),
    }
}

/// Flatten nested metrics into dotted keys
///
/// Rejects non-finite values and keys that flatten to the same name
/// (`"a.b"` next to `{"a": {"b": ..}}`).
pub fn flatten_metrics(metrics: &ComponentMetrics) -> Result<BTreeMap<String, f64>, CollectionError> {
    fn walk(
        prefix: &str,
        value: &MetricValue,
        out: &mut BTreeMap<String, f64>,
    ) -> Result<(), CollectionError> {
        match value {
            MetricValue::Number(number) if number.is_finite() => {
                match out.insert(prefix.to_string(), *number) {
                    Some(_) => Err(CollectionError::invalid(prefix, "duplicate key after flattening")),
                    None => Ok(()),
                }
            }
            MetricValue::Number(number) => {
                Err(CollectionError::invalid(prefix, format!("non-finite value {number}")))
            }
            MetricValue::Object(children) => children
                .iter()
                .try_for_each(|(key, child)| walk(&join_key(prefix, key), child, out)),
        }
    }

    let mut out = BTreeMap::new();
    for (key, value) in metrics {
        walk(key, value, &mut out)?;
    }
    Ok(out)
}

fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

/// Capability a component exposes to the dashboard
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics>;
}

/// Adapts an async closure into a [`MetricsSource`]
pub struct FnSource<F>(F);

impl<F> FnSource<F> {
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> MetricsSource for FnSource<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<ComponentMetrics>> + Send,
{
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics> {
        (self.0)().await
    }
}

/// A registered component
#[derive(Clone)]
pub struct Component {
    pub name: String,
    pub kind: String,
    pub source: Arc<dyn MetricsSource>,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        kind: impl Into<String>,
        source: impl MetricsSource + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            source: Arc::new(source),
        }
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Public description of a registered component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInfo {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Why a component produced no metrics this tick
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionError {
    /// `get_metrics` returned an error (or its task panicked)
    Source(String),

    /// `get_metrics` did not finish within the per-component timeout
    Timeout(Duration),

    /// A value could not be stored as a metric
    InvalidValue { key: String, reason: String },
}

impl CollectionError {
    fn invalid(key: &str, reason: impl Into<String>) -> Self {
        CollectionError::InvalidValue {
            key: key.to_string(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for CollectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionError::Source(msg) => write!(f, "metrics source failed: {msg}"),
            CollectionError::Timeout(timeout) => {
                write!(f, "metrics source timed out after {}ms", timeout.as_millis())
            }
            CollectionError::InvalidValue { key, reason } => {
                write!(f, "invalid metric value at '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for CollectionError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The component type names a category or channel the dashboard owns
    ReservedType(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::ReservedType(kind) => {
                write!(f, "component type '{kind}' is reserved")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Metrics successfully collected from one component
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectedComponent {
    #[serde(flatten)]
    pub info: ComponentInfo,
    pub metrics: BTreeMap<String, f64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionFailure {
    pub id: String,
    pub error: CollectionError,
}

/// Outcome of one `collect` pass
#[derive(Debug, Clone, Default)]
pub struct CollectionReport {
    pub collected: Vec<CollectedComponent>,
    pub failures: Vec<CollectionFailure>,
}

/// Registered components keyed by id
#[derive(Debug, Default)]
pub struct ComponentTable {
    components: HashMap<String, Component>,
}

impl ComponentTable {
    /// Components sorted by id
    pub fn list(&self) -> Vec<ComponentInfo> {
        let mut infos: Vec<ComponentInfo> = self
            .components
            .iter()
            .map(|(id, component)| info(id, component))
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        infos
    }
}

fn info(id: &str, component: &Component) -> ComponentInfo {
    ComponentInfo {
        id: id.to_string(),
        name: component.name.clone(),
        kind: component.kind.clone(),
    }
}

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    table: RwLock<ComponentTable>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component, replacing any previous registration for `id`
    ///
    /// Fails if the component's type is one of [`RESERVED_TYPES`].
    pub async fn register(
        &self,
        id: impl Into<String>,
        component: Component,
    ) -> Result<(), RegistryError> {
        let id = id.into();
        if RESERVED_TYPES.contains(&component.kind.as_str()) {
            warn!("refusing component {id}: type {} is reserved", component.kind);
            return Err(RegistryError::ReservedType(component.kind));
        }

        debug!("registering component {id} ({}, type {})", component.name, component.kind);

        if let Some(previous) = self.table.write().await.components.insert(id.clone(), component) {
            debug!("component {id} replaced previous registration {}", previous.name);
        }
        Ok(())
    }

    /// Remove a component; returns whether it was registered
    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.table.write().await.components.remove(id).is_some();
        debug!("unregistering component {id} (registered: {removed})");
        removed
    }

    pub async fn get(&self, id: &str) -> Option<ComponentInfo> {
        let table = self.table.read().await;
        table.components.get(id).map(|component| info(id, component))
    }

    pub async fn list(&self) -> Vec<ComponentInfo> {
        self.table.read().await.list()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.components.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.components.is_empty()
    }

    /// Hold the read lock, e.g. to build a snapshot consistent with other stores
    pub async fn read(&self) -> RwLockReadGuard<'_, ComponentTable> {
        self.table.read().await
    }

    /// Poll every registered component and store what they return
    ///
    /// Failures are isolated per component: they are logged and reported,
    /// and never stop the other components from being collected.
    #[instrument(skip_all)]
    pub async fn collect(&self, store: &MetricStore, timeout: Duration) -> CollectionReport {
        let components: Vec<(ComponentInfo, Arc<dyn MetricsSource>)> = {
            let table = self.table.read().await;
            table
                .components
                .iter()
                .map(|(id, component)| (info(id, component), component.source.clone()))
                .collect()
        };

        trace!("collecting metrics from {} components", components.len());

        let results = futures::future::join_all(
            components
                .into_iter()
                .map(|(info, source)| async move { (info, poll_source(source, timeout).await) }),
        )
        .await;

        let timestamp = Utc::now().timestamp_millis();
        let mut report = CollectionReport::default();
        let mut points = vec![];

        for (info, result) in results {
            match result.and_then(|metrics| flatten_metrics(&metrics)) {
                Ok(metrics) => {
                    points.extend(metrics.iter().map(|(name, value)| {
                        (
                            info.kind.clone(),
                            name.clone(),
                            MetricPoint::new(*value, timestamp),
                        )
                    }));
                    report.collected.push(CollectedComponent {
                        info,
                        metrics,
                        timestamp,
                    });
                }
                Err(error) => {
                    warn!("failed to collect metrics from component {}: {error}", info.id);
                    report.failures.push(CollectionFailure { id: info.id, error });
                }
            }
        }

        store.append_batch(points).await;

        report.collected.sort_by(|a, b| a.info.id.cmp(&b.info.id));
        report
    }
}

/// Await one source on its own task so a panic or hang stays contained
async fn poll_source(
    source: Arc<dyn MetricsSource>,
    timeout: Duration,
) -> Result<ComponentMetrics, CollectionError> {
    let mut task = tokio::spawn(async move { source.get_metrics().await });

    match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(metrics))) => Ok(metrics),
        Ok(Ok(Err(e))) => Err(CollectionError::Source(format!("{e:#}"))),
        Ok(Err(join_error)) => Err(CollectionError::Source(format!(
            "metrics task failed: {join_error}"
        ))),
        Err(_) => {
            task.abort();
            Err(CollectionError::Timeout(timeout))
        }
    }
}

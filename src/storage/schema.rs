//! Data types held by and read from the metric store

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single observation in a metric series
///
/// `timestamp` is milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: i64,
}

impl MetricPoint {
    pub fn new(value: f64, timestamp: i64) -> Self {
        Self { value, timestamp }
    }

    /// Create a point stamped with the current wall clock time
    pub fn now(value: f64) -> Self {
        Self::new(value, chrono::Utc::now().timestamp_millis())
    }
}

/// Read-only summary of one series
///
/// This is the shape exposed by the query API and by gateway snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    pub latest: f64,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub points: Vec<MetricPoint>,
}

impl SeriesSummary {
    /// Summarize a chronological slice of points
    ///
    /// Returns `None` for an empty slice.
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a MetricPoint>) -> Option<Self> {
        let points: Vec<MetricPoint> = points.into_iter().copied().collect();
        let latest = points.last()?.value;

        let (sum, min, max) = points.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), point| (sum + point.value, min.min(point.value), max.max(point.value)),
        );

        Some(Self {
            latest,
            average: sum / points.len() as f64,
            min,
            max,
            count: points.len(),
            points,
        })
    }
}

/// Summaries grouped by metric name
pub type SeriesMap = BTreeMap<String, SeriesSummary>;

/// Summaries grouped by category, then metric name
pub type CategorySnapshot = BTreeMap<String, SeriesMap>;

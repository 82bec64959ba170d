//! In-memory metric store
//!
//! Every `(category, name)` pair owns a ring buffer of at most `history_size`
//! points. When a buffer is full the oldest point is evicted before the new
//! one is pushed, so series stay chronological and bounded.
//!
//! ## Locking
//!
//! The whole table sits behind one coarse `RwLock`. Readers never observe a
//! half-evicted buffer because eviction and push happen under the same write
//! guard. Callers that need a consistent view across several stores can hold
//! the guard returned by [`MetricStore::read`].

use std::collections::{BTreeMap, HashMap, VecDeque};

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::trace;

use super::error::{StorageError, StorageResult};
use super::schema::{CategorySnapshot, MetricPoint, SeriesMap, SeriesSummary};

/// Series grouped by category, then by metric name
#[derive(Debug)]
pub struct SeriesTable {
    history_size: usize,
    series: HashMap<String, HashMap<String, VecDeque<MetricPoint>>>,
}

impl SeriesTable {
    fn new(history_size: usize) -> Self {
        Self {
            history_size,
            series: HashMap::new(),
        }
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Append a point, evicting the oldest one if the series is full
    pub fn append(&mut self, category: &str, name: &str, point: MetricPoint) {
        let history_size = self.history_size;
        let buffer = self
            .series
            .entry(category.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert_with(|| VecDeque::with_capacity(history_size));

        // keep timestamps non-decreasing within a series
        let mut point = point;
        if let Some(last) = buffer.back()
            && point.timestamp < last.timestamp
        {
            trace!(
                "{category}/{name}: clamping timestamp {} to {}",
                point.timestamp, last.timestamp
            );
            point.timestamp = last.timestamp;
        }

        while buffer.len() >= history_size {
            buffer.pop_front();
        }
        buffer.push_back(point);

        debug_assert!(buffer.len() <= history_size, "series exceeded history size");
    }

    /// Mean of the last `min(window, len)` points
    ///
    /// Returns `None` if the series is unknown, empty, or `window` is zero.
    pub fn recent_average(&self, category: &str, name: &str, window: usize) -> Option<f64> {
        let buffer = self.series.get(category)?.get(name)?;
        let take = window.min(buffer.len());
        if take == 0 {
            return None;
        }

        let sum: f64 = buffer.iter().rev().take(take).map(|p| p.value).sum();
        Some(sum / take as f64)
    }

    /// Copy of a single series, oldest first
    pub fn series(&self, category: &str, name: &str) -> Vec<MetricPoint> {
        self.series
            .get(category)
            .and_then(|names| names.get(name))
            .map(|buffer| buffer.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Summaries of every series, optionally restricted to one category
    pub fn snapshot(&self, category: Option<&str>) -> CategorySnapshot {
        self.series
            .iter()
            .filter(|(key, _)| category.is_none_or(|wanted| wanted == key.as_str()))
            .map(|(category, names)| (category.clone(), Self::summarize(names)))
            .filter(|(_, summaries)| !summaries.is_empty())
            .collect()
    }

    /// Summaries of one category, `None` if it holds no data
    pub fn category(&self, category: &str) -> Option<SeriesMap> {
        let summaries = Self::summarize(self.series.get(category)?);
        (!summaries.is_empty()).then_some(summaries)
    }

    /// Newest value of every series in a category
    pub fn latest_values(&self, category: &str) -> BTreeMap<String, f64> {
        self.series
            .get(category)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|(name, buffer)| Some((name.clone(), buffer.back()?.value)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn categories(&self) -> Vec<String> {
        let mut categories: Vec<String> = self.series.keys().cloned().collect();
        categories.sort();
        categories
    }

    /// Number of series across all categories
    pub fn len(&self) -> usize {
        self.series.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn summarize(names: &HashMap<String, VecDeque<MetricPoint>>) -> SeriesMap {
        names
            .iter()
            .filter_map(|(name, buffer)| Some((name.clone(), SeriesSummary::from_points(buffer)?)))
            .collect()
    }
}

/// Thread-safe bounded metric store shared by the scheduler and all readers
#[derive(Debug)]
pub struct MetricStore {
    table: RwLock<SeriesTable>,
}

impl MetricStore {
    /// Create a store keeping at most `history_size` points per series
    pub fn new(history_size: usize) -> StorageResult<Self> {
        if history_size == 0 {
            return Err(StorageError::InvalidHistorySize(history_size));
        }

        Ok(Self {
            table: RwLock::new(SeriesTable::new(history_size)),
        })
    }

    pub async fn append(&self, category: &str, name: &str, point: MetricPoint) {
        self.table.write().await.append(category, name, point);
    }

    /// Append a value stamped with the current time
    pub async fn record(&self, category: &str, name: &str, value: f64) {
        self.append(category, name, MetricPoint::now(value)).await;
    }

    /// Append many points under a single write lock
    pub async fn append_batch<I>(&self, points: I)
    where
        I: IntoIterator<Item = (String, String, MetricPoint)>,
    {
        let mut table = self.table.write().await;
        for (category, name, point) in points {
            table.append(&category, &name, point);
        }
    }

    pub async fn recent_average(&self, category: &str, name: &str, window: usize) -> Option<f64> {
        self.table.read().await.recent_average(category, name, window)
    }

    pub async fn series(&self, category: &str, name: &str) -> Vec<MetricPoint> {
        self.table.read().await.series(category, name)
    }

    pub async fn snapshot(&self, category: Option<&str>) -> CategorySnapshot {
        self.table.read().await.snapshot(category)
    }

    pub async fn category(&self, category: &str) -> Option<SeriesMap> {
        self.table.read().await.category(category)
    }

    pub async fn latest_values(&self, category: &str) -> BTreeMap<String, f64> {
        self.table.read().await.latest_values(category)
    }

    pub async fn categories(&self) -> Vec<String> {
        self.table.read().await.categories()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.table.read().await.is_empty()
    }

    /// Hold the read lock, e.g. to build a snapshot consistent with other stores
    pub async fn read(&self) -> RwLockReadGuard<'_, SeriesTable> {
        self.table.read().await
    }
}

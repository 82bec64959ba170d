//! Bounded in-memory metric history
//!
//! Metrics are kept per `(category, name)` series in fixed-size ring buffers.
//! Nothing is persisted: history starts empty on every process start.

pub mod error;
pub mod memory;
pub mod schema;

pub use error::{StorageError, StorageResult};
pub use memory::{MetricStore, SeriesTable};
pub use schema::{CategorySnapshot, MetricPoint, SeriesMap, SeriesSummary};

pub mod actors;
pub mod alerts;
pub mod api;
pub mod config;
pub mod dashboard;
pub mod monitors;
pub mod registry;
pub mod storage;
pub mod util;

pub use alerts::{Alert, AlertEngine, AlertRule, Severity};
pub use config::DashboardConfig;
pub use dashboard::Dashboard;
pub use registry::{ComponentMetrics, FnSource, MetricValue, MetricsSource};
pub use storage::{MetricPoint, MetricStore};

//! Host-level metric sampling

pub mod system;

pub use system::{SystemMonitor, SystemSample};

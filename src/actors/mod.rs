//! Actor-based collection loop
//!
//! ```text
//!   interval tick / TickNow
//!            │
//!            ▼
//!   ┌──────────────────────┐   sample    ┌──────────────┐
//!   │ CollectionScheduler  │────────────▶│ MetricStore  │
//!   │                      │   collect   │              │
//!   │                      │────────────▶│              │
//!   │                      │ check_alerts└──────────────┘
//!   │                      │────────────▶ AlertEngine ──▶ alert relay
//!   │                      │  broadcast
//!   │                      │────────────▶ Gateway ──▶ clients
//!   └──────────────────────┘
//! ```
//!
//! The scheduler owns its mpsc command channel; its [`SchedulerHandle`]
//! is cheap to clone and sends typed commands.
//!
//! [`SchedulerHandle`]: scheduler::SchedulerHandle

pub mod messages;
pub mod scheduler;

pub use messages::{SchedulerCommand, TickReport};
pub use scheduler::{CollectionScheduler, SchedulerHandle};

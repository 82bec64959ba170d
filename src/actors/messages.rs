//! Message types for actor communication
//!
//! Commands are sent to a specific actor over mpsc; request/response pairs
//! carry a oneshot sender for the reply.

use std::time::Duration;

use tokio::sync::oneshot;

use crate::alerts::AlertEvent;
use crate::monitors::SystemSample;
use crate::registry::CollectionReport;

/// Commands that can be sent to the collection scheduler
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a tick immediately (bypassing the interval timer)
    ///
    /// Used for testing and manual refresh operations.
    TickNow {
        /// Channel to send the tick's report back
        respond_to: oneshot::Sender<TickReport>,
    },

    /// Change the tick interval
    ///
    /// The timer restarts with the new period.
    UpdateInterval { interval: Duration },

    /// Gracefully shut down the scheduler
    ///
    /// A tick already in progress completes first.
    Shutdown,
}

/// What one scheduler tick did
#[derive(Debug, Clone)]
pub struct TickReport {
    /// Host metrics sampled at the start of the tick
    pub system: SystemSample,

    /// Per-component collection results
    pub collection: CollectionReport,

    /// Alert transitions caused by this tick's evaluation
    pub alert_events: Vec<AlertEvent>,

    /// Number of client deliveries made by the tick's broadcasts
    pub delivered: usize,
}

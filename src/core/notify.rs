// ─── Notification bus ───
// Fan-out of scheduler events to any number of observers.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 256;

/// One failed job inside an aggregate failure report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailureSummary {
    pub mod_name: String,
    pub error: String,
}

/// Payload emitted to observers on scheduler state changes.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    /// Emitted on every scheduler state transition.
    Progress { active: usize, total: usize },
    JobStarted {
        instance_name: String,
        mod_id: String,
        mod_name: String,
        attempt: u32,
    },
    ModInstalled {
        instance_name: String,
        mod_id: String,
        mod_name: String,
    },
    /// Emitted once per drain cycle that ended with failures.
    DownloadsFailed { failures: Vec<FailureSummary> },
}

#[derive(Clone)]
pub struct NotificationBus {
    tx: broadcast::Sender<SchedulerEvent>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.tx.subscribe()
    }

    /// Never blocks; events sent while nobody listens are dropped.
    pub fn publish(&self, event: SchedulerEvent) {
        if self.tx.send(event).is_err() {
            trace!("No observers for scheduler event");
        }
    }
}

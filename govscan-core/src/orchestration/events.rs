use std::fmt;

use govscan_model::{AccountId, JobId, JobStatus, Region, TaskStatus};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Lifecycle notification emitted by the engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    JobQueued {
        job_id: JobId,
        position: usize,
    },
    JobStarted {
        job_id: JobId,
        task_count: usize,
    },
    TaskFinished {
        job_id: JobId,
        account_id: AccountId,
        region: Region,
        status: TaskStatus,
    },
    JobFinished {
        job_id: JobId,
        status: JobStatus,
    },
    PersistFailed {
        job_id: JobId,
        error: String,
    },
}

impl ScanEvent {
    pub fn job_id(&self) -> JobId {
        match self {
            ScanEvent::JobQueued { job_id, .. }
            | ScanEvent::JobStarted { job_id, .. }
            | ScanEvent::TaskFinished { job_id, .. }
            | ScanEvent::JobFinished { job_id, .. }
            | ScanEvent::PersistFailed { job_id, .. } => *job_id,
        }
    }
}

/// In-process fan-out of [`ScanEvent`]s. Slow subscribers lag and lose the
/// oldest events rather than applying backpressure to the engine.
pub struct ScanEventBus {
    sender: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl fmt::Debug for ScanEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl ScanEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn publish(&self, event: ScanEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}

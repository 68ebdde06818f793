use serde::{Deserialize, Serialize};

/// Lifecycle of the state updater thread as seen from the facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// No thread yet (or the last one was shut down).
    NotStarted,
    Running,
    /// Shutdown requested, thread has not finished yet.
    ShuttingDown,
    /// Shutdown requested and the thread finished, but the facade has not
    /// reaped it (a previous `shutdown` timed out).
    Stopped,
    /// The thread terminated on a fatal error.
    Failed,
}

/// Point-in-time counts of the hand-off queues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateUpdaterStatus {
    pub worker: WorkerStatus,
    pub pending: usize,
    pub updating: usize,
    pub restored: usize,
    pub failed: usize,
}

//! StateUpdater - 状態復元の facade
//!
//! # 学習ポイント
//! - worker スレッドの遅延起動（最初の add で起動、shutdown で破棄）
//! - 呼び出し側がブロックするのは get_restored_active_tasks と shutdown だけ
//! - 協調的な中断（Interrupt フラグ + Condvar 通知）
//!
//! # 使用例
//! ```ignore
//! let updater = StateUpdater::new(reader, offset_resetter);
//! updater.add(Arc::new(StreamTask::restoring(task_id, changelogs)))?;
//! for task in updater.get_restored_active_tasks(Duration::from_millis(100)) {
//!     // task is RUNNING now
//! }
//! updater.shutdown(Duration::from_secs(30))?;
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::config::StateUpdaterConfig;
use super::handoff::{HandoffQueues, PendingAction, lock};
use super::status::{StateUpdaterStatus, WorkerStatus};
use super::worker::{StateUpdaterThread, WorkerControl};
use crate::domain::{
    BUG_ERROR_MESSAGE, ErrorAndTasks, OffsetResetter, StateUpdaterError, TaskHandle, TaskId,
    TaskKind, TaskState,
};
use crate::ports::ChangelogReader;

/// A started worker thread.
struct WorkerHandle {
    control: Arc<WorkerControl>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    fn status(&self) -> WorkerStatus {
        if self.control.is_running() {
            WorkerStatus::Running
        } else if !self.control.stop_requested() {
            WorkerStatus::Failed
        } else if self.control.shutdown_gate().is_open() {
            WorkerStatus::Stopped
        } else {
            WorkerStatus::ShuttingDown
        }
    }

    fn join(self) {
        let name = self.thread.thread().name().unwrap_or("state-updater").to_string();
        if self.thread.join().is_err() {
            error!(thread = %name, "State updater thread panicked while shutting down");
        }
    }
}

/// StateUpdater restores task state on a dedicated background thread.
///
/// Callers hand over active tasks in `RESTORING` and standby tasks in
/// `RUNNING`. Active tasks come back through
/// [`get_restored_active_tasks`](Self::get_restored_active_tasks) once their
/// changelogs caught up; failed tasks come back through
/// [`get_failed_tasks_and_errors`](Self::get_failed_tasks_and_errors).
pub struct StateUpdater {
    config: StateUpdaterConfig,
    reader: Arc<Mutex<Box<dyn ChangelogReader>>>,
    offset_resetter: OffsetResetter,
    queues: Arc<HandoffQueues>,
    worker: Mutex<Option<WorkerHandle>>,
}

impl StateUpdater {
    pub fn new(reader: impl ChangelogReader + 'static, offset_resetter: OffsetResetter) -> Self {
        Self::with_config(StateUpdaterConfig::default(), reader, offset_resetter)
    }

    pub fn with_config(
        config: StateUpdaterConfig,
        reader: impl ChangelogReader + 'static,
        offset_resetter: OffsetResetter,
    ) -> Self {
        let reader: Box<dyn ChangelogReader> = Box::new(reader);
        Self {
            config,
            reader: Arc::new(Mutex::new(reader)),
            offset_resetter,
            queues: Arc::new(HandoffQueues::new()),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &StateUpdaterConfig {
        &self.config
    }

    /// Hand a task over for restoration. Starts the worker on first use.
    ///
    /// # Panics
    /// If an active task is not `RESTORING` or a standby task is not
    /// `RUNNING`.
    pub fn add(&self, task: TaskHandle) -> Result<(), StateUpdaterError> {
        verify_state_for(&task);

        let mut worker = lock(&self.worker);
        self.ensure_worker(&mut worker)?;
        debug!(task_id = %task.id(), kind = ?task.kind(), "Enqueued task for the state updater");
        self.queues.enqueue(PendingAction::add(task));
        Ok(())
    }

    /// Removing tasks from the state updater is not supported.
    pub fn remove(&self, task_id: TaskId) -> Result<(), StateUpdaterError> {
        warn!(task_id = %task_id, "Removing tasks from the state updater is not supported");
        Err(StateUpdaterError::Unsupported("remove"))
    }

    /// Drain restored active tasks, waiting up to `timeout` for at least one.
    pub fn get_restored_active_tasks(&self, timeout: Duration) -> Vec<TaskHandle> {
        self.queues.drain_restored(timeout)
    }

    /// Drain all failure bundles without blocking.
    pub fn get_failed_tasks_and_errors(&self) -> Vec<ErrorAndTasks> {
        self.queues.drain_failed()
    }

    /// Every task the updater currently owns, ordered by id.
    pub fn get_all_tasks(&self) -> Vec<TaskHandle> {
        let pending = lock(&self.queues.pending);
        let updating = lock(&self.queues.updating);
        let restored = lock(&self.queues.restored);

        let all: BTreeMap<TaskId, TaskHandle> = pending
            .iter()
            .map(|action| &action.task)
            .chain(updating.values())
            .chain(restored.iter())
            .map(|task| (task.id(), Arc::clone(task)))
            .collect();
        all.into_values().collect()
    }

    /// Standby tasks waiting to be added or being updated, ordered by id.
    pub fn get_standby_tasks(&self) -> Vec<TaskHandle> {
        let pending = lock(&self.queues.pending);
        let updating = lock(&self.queues.updating);

        let standby: BTreeMap<TaskId, TaskHandle> = pending
            .iter()
            .map(|action| &action.task)
            .chain(updating.values())
            .filter(|task| !task.is_active())
            .map(|task| (task.id(), Arc::clone(task)))
            .collect();
        standby.into_values().collect()
    }

    /// Standby tasks the worker is currently updating, ordered by id.
    pub fn get_updating_standby_tasks(&self) -> Vec<TaskHandle> {
        let mut standby: Vec<TaskHandle> = lock(&self.queues.updating)
            .values()
            .filter(|task| !task.is_active())
            .cloned()
            .collect();
        standby.sort_by_key(|task| task.id());
        standby
    }

    /// Stop the worker and wait up to `timeout` for it to finish.
    ///
    /// No-op without a worker. On timeout the worker keeps shutting down in
    /// the background and a later call waits for it again.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), StateUpdaterError> {
        let control = match lock(&self.worker).as_ref() {
            Some(handle) => Arc::clone(&handle.control),
            None => return Ok(()),
        };

        info!(thread = %self.config.thread_name, "Shutting down state updater");
        control.request_stop();
        self.queues.wake_worker();

        // waits without holding the worker lock
        if !control.shutdown_gate().wait(timeout) {
            warn!(
                thread = %self.config.thread_name,
                timeout_ms = timeout.as_millis() as u64,
                "State updater did not shut down in time"
            );
            return Err(StateUpdaterError::ShutdownTimeout(timeout));
        }

        let mut worker = lock(&self.worker);
        let same_worker = worker
            .as_ref()
            .is_some_and(|handle| Arc::ptr_eq(&handle.control, &control));
        if same_worker {
            if let Some(handle) = worker.take() {
                handle.join();
            }
        }
        info!(thread = %self.config.thread_name, "State updater shut down");
        Ok(())
    }

    pub fn status(&self) -> StateUpdaterStatus {
        let worker = lock(&self.worker)
            .as_ref()
            .map_or(WorkerStatus::NotStarted, WorkerHandle::status);

        let pending = lock(&self.queues.pending).len();
        let updating = lock(&self.queues.updating).len();
        let restored = lock(&self.queues.restored).len();
        StateUpdaterStatus {
            worker,
            pending,
            updating,
            restored,
            failed: self.queues.failed_len(),
        }
    }

    fn ensure_worker(&self, worker: &mut Option<WorkerHandle>) -> Result<(), StateUpdaterError> {
        if let Some(handle) = worker.as_ref() {
            match handle.status() {
                WorkerStatus::Running => return Ok(()),
                WorkerStatus::Failed => return Err(StateUpdaterError::WorkerStopped),
                WorkerStatus::ShuttingDown => return Err(StateUpdaterError::ShuttingDown),
                WorkerStatus::Stopped | WorkerStatus::NotStarted => {
                    if let Some(handle) = worker.take() {
                        handle.join();
                    }
                }
            }
        }

        let control = Arc::new(WorkerControl::new());
        let updater_thread = StateUpdaterThread::new(
            self.config.thread_name.clone(),
            Arc::clone(&self.reader),
            Arc::clone(&self.offset_resetter),
            Arc::clone(&self.queues),
            Arc::clone(&control),
        );
        let thread = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || updater_thread.run())?;
        info!(thread = %self.config.thread_name, "Started state updater thread");
        *worker = Some(WorkerHandle { control, thread });
        Ok(())
    }
}

impl Drop for StateUpdater {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown(self.config.shutdown_timeout()) {
            warn!(error = %err, "State updater dropped without a clean shutdown");
        }
    }
}

fn verify_state_for(task: &TaskHandle) {
    let state = task.state();
    match task.kind() {
        TaskKind::Active if state != TaskState::Restoring => {
            error!(task_id = %task.id(), state = %state, "Active task added in the wrong state");
            panic!(
                "Active task {} is not in state RESTORING. {BUG_ERROR_MESSAGE}",
                task.id()
            );
        }
        TaskKind::Standby if state != TaskState::Running => {
            error!(task_id = %task.id(), state = %state, "Standby task added in the wrong state");
            panic!(
                "Standby task {} is not in state RUNNING. {BUG_ERROR_MESSAGE}",
                task.id()
            );
        }
        _ => {}
    }
}

//! StateUpdaterThread - 復元ワーカー
//!
//! # フロー（run_once）
//! 1. pending action をまとめて取り出して適用
//! 2. ChangelogReader::restore() で復元を 1 ラウンド進める
//! 3. changelog が追いついた active task を restored queue へ昇格
//! 4. 全 changelog を読み切っていて pending も空なら、次の action まで待機
//!
//! # 失敗の分類
//! - TaskCorrupted: 名前の挙がったタスクだけを failed queue へ
//! - Streams + task_id: そのタスクだけ
//! - Streams (task_id なし): 復元中の全タスク
//! - それ以外（panic を含む）: 全タスク + worker 停止

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, error, info, info_span, warn};

use super::gate::ShutdownGate;
use super::handoff::{Action, HandoffQueues, PendingAction, lock};
use crate::domain::{
    BUG_ERROR_MESSAGE, ErrorAndTasks, OffsetResetter, RestoreError, TaskHandle, TaskId,
    TopicPartition,
};
use crate::ports::{ChangelogReader, Interrupt};

/// Flags shared between the facade and one worker thread.
pub(crate) struct WorkerControl {
    running: AtomicBool,
    interrupt: Interrupt,
    shutdown_gate: ShutdownGate,
}

impl WorkerControl {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            interrupt: Interrupt::new(),
            shutdown_gate: ShutdownGate::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the worker to stop and interrupt any wait or restore call.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.interrupt.trigger();
    }

    pub fn stop_requested(&self) -> bool {
        self.interrupt.is_triggered()
    }

    pub fn shutdown_gate(&self) -> &ShutdownGate {
        &self.shutdown_gate
    }
}

/// Why the run loop stops.
enum Exit {
    Interrupted,
    Fatal(RestoreError),
}

/// The worker side of the state updater.
///
/// Holds the changelog reader for its whole lifetime and is the only writer
/// of the in-progress map.
pub(crate) struct StateUpdaterThread {
    name: String,
    reader: Arc<Mutex<Box<dyn ChangelogReader>>>,
    offset_resetter: OffsetResetter,
    queues: Arc<HandoffQueues>,
    control: Arc<WorkerControl>,
}

impl StateUpdaterThread {
    pub fn new(
        name: String,
        reader: Arc<Mutex<Box<dyn ChangelogReader>>>,
        offset_resetter: OffsetResetter,
        queues: Arc<HandoffQueues>,
        control: Arc<WorkerControl>,
    ) -> Self {
        Self {
            name,
            reader,
            offset_resetter,
            queues,
            control,
        }
    }

    /// Thread body. Returns once stopped or after a fatal error.
    pub fn run(self) {
        let span = info_span!("state_updater", thread = %self.name);
        let _entered = span.enter();
        info!("State updater thread started");

        let mut reader_guard = lock(&self.reader);
        let reader: &mut dyn ChangelogReader = &mut **reader_guard;

        while self.control.is_running() {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.run_once(&mut *reader)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(Exit::Interrupted)) => {
                    debug!("State updater thread interrupted");
                    break;
                }
                Ok(Err(Exit::Fatal(fatal))) => {
                    self.handle_fatal_error(fatal);
                    break;
                }
                Err(payload) => {
                    self.handle_fatal_error(RestoreError::Unexpected(panic_message(&*payload)));
                    break;
                }
            }
        }

        self.clear(reader);
        self.control.shutdown_gate().open();
        info!("State updater thread shutdown");
    }

    fn run_once(&self, reader: &mut dyn ChangelogReader) -> Result<(), Exit> {
        self.perform_actions_on_tasks(reader);
        self.restore_tasks(reader)?;
        self.wait_if_all_changelogs_completely_read(reader)
    }

    fn perform_actions_on_tasks(&self, reader: &mut dyn ChangelogReader) {
        let mut pending = lock(&self.queues.pending);
        if pending.is_empty() {
            return;
        }
        let actions = std::mem::take(&mut *pending);
        // updating を取ってから pending を離すので、呼び出し側からは
        // タスクが pending と updating のどちらにも見えない瞬間がない
        let mut updating = lock(&self.queues.updating);
        drop(pending);

        for PendingAction { task, action } in actions {
            match action {
                Action::Add => self.add_task(task, &mut updating, reader),
            }
        }
    }

    fn add_task(
        &self,
        task: TaskHandle,
        updating: &mut HashMap<TaskId, TaskHandle>,
        reader: &mut dyn ChangelogReader,
    ) {
        let task_id = task.id();
        if task.is_active() && task.changelog_partitions().is_empty() {
            debug!(task_id = %task_id, "Stateless active task was added to the state updater");
            task.complete_restoration(&self.offset_resetter);
            let mut restored = lock(&self.queues.restored);
            self.queues.push_restored(&mut restored, task);
            return;
        }

        let is_active = task.is_active();
        updating.insert(task_id, task);
        if is_active {
            debug!(task_id = %task_id, "Stateful active task was added to the state updater");
            reader.enforce_restore_active();
        } else {
            debug!(task_id = %task_id, "Standby task was added to the state updater");
            if updating.len() == 1 {
                reader.transit_to_update_standby();
            }
        }
    }

    fn restore_tasks(&self, reader: &mut dyn ChangelogReader) -> Result<(), Exit> {
        let tasks = lock(&self.queues.updating).clone();
        if let Err(restore_error) = reader.restore(&tasks, &self.control.interrupt) {
            self.handle_restore_error(restore_error)?;
        }

        let completed_changelogs = reader.completed_changelogs();
        let mut active_tasks: Vec<TaskHandle> = lock(&self.queues.updating)
            .values()
            .filter(|task| task.is_active())
            .cloned()
            .collect();
        active_tasks.sort_by_key(|task| task.id());

        for task in active_tasks {
            self.maybe_complete_restoration(task, &completed_changelogs, reader);
        }
        Ok(())
    }

    fn handle_restore_error(&self, restore_error: RestoreError) -> Result<(), Exit> {
        if matches!(restore_error, RestoreError::Interrupted) {
            if self.control.stop_requested() {
                return Err(Exit::Interrupted);
            }
            return Err(Exit::Fatal(RestoreError::Unexpected(
                "changelog reader was interrupted without a shutdown request".to_string(),
            )));
        }
        if restore_error.is_fatal() {
            return Err(Exit::Fatal(restore_error));
        }

        let failed_tasks = match &restore_error {
            RestoreError::TaskCorrupted { task_ids, .. } => {
                info!(error = %restore_error, "Encountered task corrupted error");
                self.remove_updating_tasks(task_ids, "is corrupted")?
            }
            RestoreError::Streams {
                task_id: Some(task_id),
                ..
            } => {
                info!(error = %restore_error, "Encountered streams error");
                self.remove_updating_tasks(&BTreeSet::from([*task_id]), "failed")?
            }
            _ => {
                info!(error = %restore_error, "Encountered streams error without a task");
                self.remove_all_updating_tasks()
            }
        };

        self.queues
            .push_failed(ErrorAndTasks::new(failed_tasks, restore_error));
        Ok(())
    }

    /// Remove exactly `task_ids` from the in-progress map.
    ///
    /// Every id must be in progress; otherwise nothing is removed and the
    /// worker fails fatally.
    fn remove_updating_tasks(
        &self,
        task_ids: &BTreeSet<TaskId>,
        what: &str,
    ) -> Result<Vec<TaskHandle>, Exit> {
        let mut updating = lock(&self.queues.updating);
        if let Some(missing) = task_ids.iter().find(|id| !updating.contains_key(id)) {
            return Err(Exit::Fatal(RestoreError::IllegalState(format!(
                "Task {missing} {what} but is not updating. {BUG_ERROR_MESSAGE}"
            ))));
        }
        Ok(task_ids
            .iter()
            .filter_map(|task_id| updating.remove(task_id))
            .collect())
    }

    fn remove_all_updating_tasks(&self) -> Vec<TaskHandle> {
        lock(&self.queues.updating)
            .drain()
            .map(|(_, task)| task)
            .collect()
    }

    fn handle_fatal_error(&self, fatal: RestoreError) {
        error!(error = %fatal, "An unexpected error occurred within the state updater thread");
        let failed_tasks = self.remove_all_updating_tasks();
        if !failed_tasks.is_empty() {
            warn!(
                tasks = failed_tasks.len(),
                "Handing all updating tasks back as failed"
            );
        }
        self.queues
            .push_failed(ErrorAndTasks::new(failed_tasks, fatal));
        self.control.running.store(false, Ordering::SeqCst);
    }

    fn maybe_complete_restoration(
        &self,
        task: TaskHandle,
        completed_changelogs: &HashSet<TopicPartition>,
        reader: &mut dyn ChangelogReader,
    ) {
        if !task.changelog_partitions().is_subset(completed_changelogs) {
            return;
        }

        task.complete_restoration(&self.offset_resetter);
        debug!(task_id = %task.id(), "Stateful active task completed restoration");

        let only_standby_tasks_left = {
            let mut updating = lock(&self.queues.updating);
            let mut restored = lock(&self.queues.restored);
            updating.remove(&task.id());
            self.queues.push_restored(&mut restored, task);
            !updating.is_empty() && updating.values().all(|task| !task.is_active())
        };
        if only_standby_tasks_left {
            reader.transit_to_update_standby();
        }
    }

    /// Idle until a new action arrives once every changelog has been read.
    fn wait_if_all_changelogs_completely_read(
        &self,
        reader: &mut dyn ChangelogReader,
    ) -> Result<(), Exit> {
        if !self.control.is_running() || !reader.all_changelogs_completed() {
            return Ok(());
        }

        let pending = lock(&self.queues.pending);
        let _pending = self
            .queues
            .pending_cond
            .wait_while(pending, |pending| {
                pending.is_empty() && !self.control.interrupt.is_triggered()
            })
            .unwrap_or_else(PoisonError::into_inner);

        if self.control.interrupt.is_triggered() {
            return Err(Exit::Interrupted);
        }
        Ok(())
    }

    fn clear(&self, reader: &mut dyn ChangelogReader) {
        {
            let mut pending = lock(&self.queues.pending);
            let mut updating = lock(&self.queues.updating);
            let mut restored = lock(&self.queues.restored);
            pending.clear();
            updating.clear();
            restored.clear();
        }
        reader.clear();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panic: {message}")
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panic: {message}")
    } else {
        "panic with a non-string payload".to_string()
    }
}

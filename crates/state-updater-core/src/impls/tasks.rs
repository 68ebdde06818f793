//! StreamTask / StandbyTask - Task の参照実装（開発用・テスト用）
//!
//! state store の実体は持たず、ライフサイクル状態と
//! changelog パーティションだけを管理します。

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::app::lock;
use crate::domain::{
    BUG_ERROR_MESSAGE, OffsetResetter, Task, TaskId, TaskKind, TaskState, TaskStateError,
    TopicPartition,
};

/// Shared lifecycle bookkeeping for both task variants.
#[derive(Debug)]
struct Lifecycle {
    id: TaskId,
    state: Mutex<TaskState>,
}

impl Lifecycle {
    fn new(id: TaskId, state: TaskState) -> Self {
        Self {
            id,
            state: Mutex::new(state),
        }
    }

    fn get(&self) -> TaskState {
        *lock(&self.state)
    }

    fn transition_to(&self, next: TaskState) -> Result<(), TaskStateError> {
        let mut state = lock(&self.state);
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(TaskStateError {
                task_id: self.id,
                from,
                to: next,
            });
        }
        debug!(task_id = %self.id, from = %from, to = %next, "Task state transition");
        *state = next;
        Ok(())
    }
}

/// An active task.
///
/// On completion of restoration, input partitions without a committed
/// position are handed to the offset resetter, then the task becomes
/// `Running`.
#[derive(Debug)]
pub struct StreamTask {
    lifecycle: Lifecycle,
    changelog_partitions: HashSet<TopicPartition>,
    input_partitions: HashSet<TopicPartition>,
    committed_offsets: HashMap<TopicPartition, u64>,
}

impl StreamTask {
    /// A new task in `Created`.
    pub fn new(id: TaskId, changelog_partitions: impl IntoIterator<Item = TopicPartition>) -> Self {
        Self {
            lifecycle: Lifecycle::new(id, TaskState::Created),
            changelog_partitions: changelog_partitions.into_iter().collect(),
            input_partitions: HashSet::new(),
            committed_offsets: HashMap::new(),
        }
    }

    /// A task already in `Restoring`, ready to be handed to the state updater.
    pub fn restoring(
        id: TaskId,
        changelog_partitions: impl IntoIterator<Item = TopicPartition>,
    ) -> Self {
        let task = Self::new(id, changelog_partitions);
        *lock(&task.lifecycle.state) = TaskState::Restoring;
        task
    }

    pub fn with_input_partitions(
        mut self,
        input_partitions: impl IntoIterator<Item = TopicPartition>,
    ) -> Self {
        self.input_partitions.extend(input_partitions);
        self
    }

    pub fn with_committed_offset(mut self, partition: TopicPartition, offset: u64) -> Self {
        self.committed_offsets.insert(partition, offset);
        self
    }

    pub fn transition_to(&self, next: TaskState) -> Result<(), TaskStateError> {
        self.lifecycle.transition_to(next)
    }

    /// Input partitions that have no committed position yet.
    pub fn partitions_without_committed_offset(&self) -> HashSet<TopicPartition> {
        self.input_partitions
            .iter()
            .filter(|partition| !self.committed_offsets.contains_key(*partition))
            .cloned()
            .collect()
    }
}

impl Task for StreamTask {
    fn id(&self) -> TaskId {
        self.lifecycle.id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Active
    }

    fn state(&self) -> TaskState {
        self.lifecycle.get()
    }

    fn changelog_partitions(&self) -> HashSet<TopicPartition> {
        self.changelog_partitions.clone()
    }

    fn complete_restoration(&self, offset_resetter: &OffsetResetter) {
        let to_reset = self.partitions_without_committed_offset();
        if !to_reset.is_empty() {
            offset_resetter(&to_reset);
        }
        if let Err(err) = self.transition_to(TaskState::Running) {
            panic!("{err} while completing restoration. {BUG_ERROR_MESSAGE}");
        }
    }
}

/// A standby task. Tracked by the state updater until removed or failed.
#[derive(Debug)]
pub struct StandbyTask {
    lifecycle: Lifecycle,
    changelog_partitions: HashSet<TopicPartition>,
}

impl StandbyTask {
    /// A new task in `Created`.
    pub fn new(id: TaskId, changelog_partitions: impl IntoIterator<Item = TopicPartition>) -> Self {
        Self {
            lifecycle: Lifecycle::new(id, TaskState::Created),
            changelog_partitions: changelog_partitions.into_iter().collect(),
        }
    }

    /// A task already in `Running`, ready to be handed to the state updater.
    pub fn running(
        id: TaskId,
        changelog_partitions: impl IntoIterator<Item = TopicPartition>,
    ) -> Self {
        let task = Self::new(id, changelog_partitions);
        *lock(&task.lifecycle.state) = TaskState::Running;
        task
    }

    pub fn transition_to(&self, next: TaskState) -> Result<(), TaskStateError> {
        self.lifecycle.transition_to(next)
    }
}

impl Task for StandbyTask {
    fn id(&self) -> TaskId {
        self.lifecycle.id
    }

    fn kind(&self) -> TaskKind {
        TaskKind::Standby
    }

    fn state(&self) -> TaskState {
        self.lifecycle.get()
    }

    fn changelog_partitions(&self) -> HashSet<TopicPartition> {
        self.changelog_partitions.clone()
    }

    fn complete_restoration(&self, _offset_resetter: &OffsetResetter) {
        warn!(task_id = %self.id(), "Standby tasks never complete restoration; ignoring");
    }
}

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{TaskId, TaskState, TopicPartition};

/// Active か standby かの判別子。
///
/// state updater は downcast せず、この値で振る舞いを切り替える。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    /// Finite restoration; becomes running once its changelogs caught up.
    Active,
    /// Perpetual restoration; never "completes" while tracked.
    Standby,
}

/// Callback that resets the positions of the given partitions.
///
/// Active tasks call it from `complete_restoration` with the partitions that
/// have no committed position to start from.
pub type OffsetResetter = Arc<dyn Fn(&HashSet<TopicPartition>) + Send + Sync>;

/// Task is the surface of a stream task the state updater needs.
///
/// Both variants expose the same capability set. Lifecycle state is owned by
/// the task itself (interior mutability), the updater only reads it and asks
/// active tasks to complete restoration.
pub trait Task: fmt::Debug + Send + Sync {
    fn id(&self) -> TaskId;

    fn kind(&self) -> TaskKind;

    fn is_active(&self) -> bool {
        self.kind() == TaskKind::Active
    }

    fn state(&self) -> TaskState;

    /// Changelog partitions backing this task's state stores.
    /// Empty for stateless active tasks.
    fn changelog_partitions(&self) -> HashSet<TopicPartition>;

    /// Finish restoration and transition to running.
    ///
    /// Only ever invoked on active tasks, once all changelog partitions have
    /// caught up. Stateless active tasks are completed as soon as the worker
    /// picks them up, so they also reach the restored queue `RUNNING` and with
    /// their offsets reset, never still `RESTORING`.
    fn complete_restoration(&self, offset_resetter: &OffsetResetter);
}

/// Shared handle to a task. Ownership moves across the hand-off queues by
/// moving the handle.
pub type TaskHandle = Arc<dyn Task>;

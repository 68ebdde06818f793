use std::fmt;

use super::{RestoreError, TaskHandle, TaskId};

/// One failure event: the tasks it took out of restoration and the error
/// that caused it.
///
/// Bundles are never merged. A single worker iteration may hand off several
/// of them (for example a corruption followed by an unrelated failure).
pub struct ErrorAndTasks {
    tasks: Vec<TaskHandle>,
    error: RestoreError,
}

impl ErrorAndTasks {
    pub fn new(mut tasks: Vec<TaskHandle>, error: RestoreError) -> Self {
        tasks.sort_by_key(|task| task.id());
        Self { tasks, error }
    }

    /// Failed tasks, ordered by id.
    pub fn tasks(&self) -> &[TaskHandle] {
        &self.tasks
    }

    pub fn task_ids(&self) -> Vec<TaskId> {
        self.tasks.iter().map(|task| task.id()).collect()
    }

    pub fn error(&self) -> &RestoreError {
        &self.error
    }

    pub fn into_parts(self) -> (Vec<TaskHandle>, RestoreError) {
        (self.tasks, self.error)
    }
}

impl fmt::Debug for ErrorAndTasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorAndTasks")
            .field("tasks", &self.task_ids())
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::impls::{StandbyTask, StreamTask};
    use std::sync::Arc;

    #[test]
    fn tasks_are_ordered_by_id() {
        let tasks: Vec<TaskHandle> = vec![
            Arc::new(StandbyTask::running(TaskId::new(1, 0), [])),
            Arc::new(StreamTask::restoring(TaskId::new(0, 3), [])),
            Arc::new(StreamTask::restoring(TaskId::new(0, 1), [])),
        ];
        let failure = ErrorAndTasks::new(tasks, RestoreError::streams("consumer fenced"));
        assert_eq!(
            failure.task_ids(),
            vec![TaskId::new(0, 1), TaskId::new(0, 3), TaskId::new(1, 0)]
        );
        assert_eq!(
            format!("{failure:?}"),
            r#"ErrorAndTasks { tasks: [TaskId { subtopology: 0, partition: 1 }, TaskId { subtopology: 0, partition: 3 }, TaskId { subtopology: 1, partition: 0 }], error: Streams { task_id: None, message: "consumer fenced" } }"#
        );
    }

    #[test]
    fn into_parts_hands_back_tasks_and_error() {
        let failure = ErrorAndTasks::new(
            vec![Arc::new(StreamTask::restoring(TaskId::new(0, 0), []))],
            RestoreError::task_corrupted([TaskId::new(0, 0)], "bad checkpoint"),
        );
        let (tasks, error) = failure.into_parts();
        assert_eq!(tasks.len(), 1);
        assert!(matches!(error, RestoreError::TaskCorrupted { .. }));
    }
}

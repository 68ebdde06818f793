//! Errors - エラー型と分類
//!
//! # 分類
//! - **RestoreError**: changelog reader / worker で発生するエラー。
//!   worker が ErrorAndTasks に変換して呼び出し側へ渡す
//! - **StateUpdaterError**: facade の操作エラー
//! - **TaskStateError**: 不正なライフサイクル遷移

use std::collections::BTreeSet;
use std::time::Duration;

use thiserror::Error;

use super::{TaskId, TaskState};

/// Message appended to every internal-invariant violation.
pub const BUG_ERROR_MESSAGE: &str = "This indicates a bug in the caller or the state updater. \
    Please report it together with the logs of the state updater thread.";

/// RestoreError は復元中に発生したエラー
///
/// worker はこの variant で失敗の影響範囲を決める:
/// - `TaskCorrupted`: 名前の挙がったタスクのみ
/// - `Streams` + task_id: そのタスクのみ
/// - `Streams` (task_id なし): 復元中の全タスク
/// - それ以外: 全タスク + worker 停止（fatal）
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("tasks {task_ids:?} are corrupted: {message}")]
    TaskCorrupted {
        task_ids: BTreeSet<TaskId>,
        message: String,
    },

    #[error("{}", streams_message(.task_id, .message))]
    Streams {
        task_id: Option<TaskId>,
        message: String,
    },

    #[error("restoration was interrupted")]
    Interrupted,

    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl RestoreError {
    pub fn task_corrupted(
        task_ids: impl IntoIterator<Item = TaskId>,
        message: impl Into<String>,
    ) -> Self {
        Self::TaskCorrupted {
            task_ids: task_ids.into_iter().collect(),
            message: message.into(),
        }
    }

    pub fn streams(message: impl Into<String>) -> Self {
        Self::Streams {
            task_id: None,
            message: message.into(),
        }
    }

    pub fn streams_for_task(task_id: TaskId, message: impl Into<String>) -> Self {
        Self::Streams {
            task_id: Some(task_id),
            message: message.into(),
        }
    }

    /// Is this error fatal for the worker thread?
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::IllegalState(_) | Self::Unexpected(_))
    }
}

fn streams_message(task_id: &Option<TaskId>, message: &str) -> String {
    match task_id {
        Some(id) => format!("task {id}: {message}"),
        None => message.to_string(),
    }
}

/// StateUpdaterError は facade の操作エラー
#[derive(Debug, Error)]
pub enum StateUpdaterError {
    #[error("state updater thread did not shut down within {0:?}")]
    ShutdownTimeout(Duration),

    #[error("operation '{0}' is not supported by the state updater")]
    Unsupported(&'static str),

    #[error("state updater thread stopped after a fatal error; shut the updater down before adding tasks")]
    WorkerStopped,

    #[error("state updater thread is still shutting down")]
    ShuttingDown,

    #[error("failed to spawn state updater thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task_id} cannot transition from {from} to {to}")]
pub struct TaskStateError {
    pub task_id: TaskId,
    pub from: TaskState,
    pub to: TaskState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streams_error_message_names_the_task() {
        let err = RestoreError::streams_for_task(TaskId::new(0, 1), "fetch failed");
        assert_eq!(err.to_string(), "task 0_1: fetch failed");

        let err = RestoreError::streams("fetch failed");
        assert_eq!(err.to_string(), "fetch failed");
    }

    #[test]
    fn only_unclassified_errors_are_fatal() {
        assert!(!RestoreError::task_corrupted([TaskId::new(0, 0)], "bad").is_fatal());
        assert!(!RestoreError::streams("boom").is_fatal());
        assert!(!RestoreError::Interrupted.is_fatal());
        assert!(RestoreError::IllegalState("x".into()).is_fatal());
        assert!(RestoreError::Unexpected("x".into()).is_fatal());
    }
}

//! State - タスクのライフサイクル状態
//!
//! 状態はタスク自身が保持し、state updater は読むだけです。

use serde::{Deserialize, Serialize};
use std::fmt;

/// TaskState はタスクのライフサイクル状態を表現
///
/// # 状態遷移
/// - Created -> Restoring / Suspended / Closed
/// - Restoring -> Running / Suspended
/// - Running -> Suspended
/// - Suspended -> Running / Restoring / Closed
/// - Closed -> Created（再利用時）
///
/// active task は Restoring で state updater に渡され、復元完了で Running になる。
/// standby task は Running のまま渡され、追従し続ける。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    Created,
    Restoring,
    Running,
    Suspended,
    Closed,
}

impl TaskState {
    /// `self` から `next` への遷移が許可されているか
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Created, Restoring | Suspended | Closed)
                | (Restoring, Running | Suspended)
                | (Running, Suspended)
                | (Suspended, Running | Restoring | Closed)
                | (Closed, Created)
        )
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Created => "CREATED",
            TaskState::Restoring => "RESTORING",
            TaskState::Running => "RUNNING",
            TaskState::Suspended => "SUSPENDED",
            TaskState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

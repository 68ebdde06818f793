//! Domain model (IDs, lifecycle state, task surface, errors, failures).

pub mod errors;
pub mod failure;
pub mod ids;
pub mod state;
pub mod task;

pub use self::errors::{
    BUG_ERROR_MESSAGE, RestoreError, StateUpdaterError, TaskStateError,
};
pub use self::failure::ErrorAndTasks;
pub use self::ids::{ParseTaskIdError, TaskId, TopicPartition};
pub use self::state::TaskState;
pub use self::task::{OffsetResetter, Task, TaskHandle, TaskKind};

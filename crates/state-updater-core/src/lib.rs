//! state-updater-core
//!
//! Background restoration of task state from changelog topics.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, state, task, errors, failure）
//! - **ports**: 抽象化レイヤー（ChangelogReader, Interrupt）
//! - **app**: アプリケーションロジック（StateUpdater facade, worker, hand-off queues, config, status）
//! - **impls**: 実装（InMemoryChangelogReader, StreamTask / StandbyTask など開発用）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use self::app::{StateUpdater, StateUpdaterConfig, StateUpdaterStatus, WorkerStatus};
pub use self::domain::{
    ErrorAndTasks, OffsetResetter, RestoreError, StateUpdaterError, Task, TaskHandle, TaskId,
    TaskKind, TaskState, TopicPartition,
};
pub use self::ports::{ChangelogReader, Interrupt, ReaderMode};

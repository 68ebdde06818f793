//! Ports - 外部コラボレーターとの境界
//!
//! state updater が消費するインターフェースを定義します。
//! タスク自体の surface は `domain::task` にあります。

pub mod changelog_reader;

pub use self::changelog_reader::{ChangelogReader, Interrupt, ReaderMode};

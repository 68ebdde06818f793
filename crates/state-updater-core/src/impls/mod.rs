//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports / domain の参照実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryChangelogReader**: 開発用の changelog reader（失敗注入つき）
//! - **StreamTask / StandbyTask**: ライフサイクルだけを持つタスク
//!
//! # 本番用実装
//! 本番の changelog reader（ブローカーからの fetch）は別クレートに配置します。

pub mod in_memory_reader;
pub mod tasks;

pub use self::in_memory_reader::InMemoryChangelogReader;
pub use self::tasks::{StandbyTask, StreamTask};

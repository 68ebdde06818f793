//! ChangelogReader port - changelog の読み出しエンジン
//!
//! 実際の fetch・レコードの state store への書き込みは reader 側の責務。
//! state updater は reader を「有限の I/O を 1 回行う」ものとして扱い、
//! 完了したパーティションの集合だけを見て昇格を判断します。
//!
//! # 実装
//! - `impls::InMemoryChangelogReader`（開発用・テスト用）

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};

use crate::domain::{RestoreError, TaskHandle, TaskId, TopicPartition};

/// Interrupt はシャットダウン時に worker の待機・復元を打ち切るためのフラグ
///
/// 一度セットされたら戻らない。reader は `restore` の中で定期的に確認し、
/// セットされていたら `RestoreError::Interrupted` を返す。
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Which changelogs the reader currently prioritizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReaderMode {
    /// Restore active changelogs; standby changelogs are paused.
    RestoreActive,
    /// Keep every standby changelog up to date.
    UpdateStandby,
}

/// ChangelogReader restores task state from changelog partitions.
///
/// Owned by the state updater thread while it runs; never called
/// concurrently.
pub trait ChangelogReader: Send {
    /// Perform one bounded round of restoration for `tasks`.
    fn restore(
        &mut self,
        tasks: &HashMap<TaskId, TaskHandle>,
        interrupt: &Interrupt,
    ) -> Result<(), RestoreError>;

    /// Partitions that have fully caught up.
    fn completed_changelogs(&self) -> HashSet<TopicPartition>;

    /// True when every registered changelog is fully read.
    fn all_changelogs_completed(&self) -> bool;

    fn enforce_restore_active(&mut self);

    fn transit_to_update_standby(&mut self);

    /// Drop all internal state (called when the updater thread exits).
    fn clear(&mut self);
}

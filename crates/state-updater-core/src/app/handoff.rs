//! Hand-off queues - 呼び出し側スレッドと worker の境界
//!
//! # 学習ポイント
//! - Mutex + Condvar による blocking drain（deadline は起床のたびに再計算）
//! - ロック順序: pending → updating → restored（failed は末端）
//! - ロックの受け渡し: pending を保持したまま updating を取ってから pending を離す
//!
//! # 所有関係
//! - pending: 呼び出し側が書き、worker が取り出す
//! - updating: worker だけが書く。呼び出し側はスナップショットを読むだけ
//! - restored / failed: worker が書き、呼び出し側が取り出す

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::domain::{ErrorAndTasks, TaskHandle, TaskId};

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Every structure guarded here stays valid across a panic (plain
/// collections, no multi-step invariants held under the lock).
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Action requested by a caller for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Add,
}

/// A task paired with the action the worker must apply to it.
#[derive(Debug)]
pub(crate) struct PendingAction {
    pub task: TaskHandle,
    pub action: Action,
}

impl PendingAction {
    pub fn add(task: TaskHandle) -> Self {
        Self {
            task,
            action: Action::Add,
        }
    }
}

/// The three hand-off domains plus the published in-progress map.
pub(crate) struct HandoffQueues {
    pub pending: Mutex<VecDeque<PendingAction>>,
    pub pending_cond: Condvar,
    pub updating: Mutex<HashMap<TaskId, TaskHandle>>,
    pub restored: Mutex<Vec<TaskHandle>>,
    pub restored_cond: Condvar,
    failed: Mutex<VecDeque<ErrorAndTasks>>,
}

impl HandoffQueues {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            pending_cond: Condvar::new(),
            updating: Mutex::new(HashMap::new()),
            restored: Mutex::new(Vec::new()),
            restored_cond: Condvar::new(),
            failed: Mutex::new(VecDeque::new()),
        }
    }

    /// Enqueue an action and wake the worker.
    pub fn enqueue(&self, action: PendingAction) {
        let mut pending = lock(&self.pending);
        pending.push_back(action);
        self.pending_cond.notify_all();
    }

    /// Wake the worker if it idles on the pending condition.
    pub fn wake_worker(&self) {
        let _pending = lock(&self.pending);
        self.pending_cond.notify_all();
    }

    /// Append a restored task while the caller already holds the lock.
    pub fn push_restored(&self, restored: &mut MutexGuard<'_, Vec<TaskHandle>>, task: TaskHandle) {
        restored.push(task);
        self.restored_cond.notify_all();
    }

    /// Block until at least one restored task is available or `timeout`
    /// elapses, then drain everything.
    ///
    /// # 実装
    /// 1. deadline を最初に一度だけ計算
    /// 2. 起床のたびに残り時間を再計算（spurious wakeup 対策）
    /// 3. 空でなければ restored をまるごと取り出す
    pub fn drain_restored(&self, timeout: Duration) -> Vec<TaskHandle> {
        let deadline = Instant::now().checked_add(timeout);
        let mut restored = lock(&self.restored);
        loop {
            if !restored.is_empty() {
                return std::mem::take(&mut *restored);
            }
            restored = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Vec::new();
                    }
                    let (guard, _timed_out) = self
                        .restored_cond
                        .wait_timeout(restored, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    guard
                }
                None => self
                    .restored_cond
                    .wait(restored)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }
    }

    pub fn push_failed(&self, failure: ErrorAndTasks) {
        lock(&self.failed).push_back(failure);
    }

    pub fn drain_failed(&self) -> Vec<ErrorAndTasks> {
        lock(&self.failed).drain(..).collect()
    }

    pub fn failed_len(&self) -> usize {
        lock(&self.failed).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RestoreError;
    use crate::impls::StreamTask;
    use std::sync::Arc;
    use std::thread;

    fn restoring_task(partition: u32) -> TaskHandle {
        Arc::new(StreamTask::restoring(TaskId::new(0, partition), []))
    }

    #[test]
    fn test_drain_restored_timeout() {
        let queues = HandoffQueues::new();
        let start = Instant::now();
        let drained = queues.drain_restored(Duration::from_millis(200));
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(drained.is_empty());
    }

    #[test]
    fn test_drain_restored_zero_timeout_still_checks_once() {
        let queues = HandoffQueues::new();
        {
            let mut restored = lock(&queues.restored);
            queues.push_restored(&mut restored, restoring_task(0));
        }
        let drained = queues.drain_restored(Duration::ZERO);
        assert_eq!(drained.len(), 1);
    }

    #[test]
    fn test_push_wakes_drain_and_drains_everything() {
        let queues = Arc::new(HandoffQueues::new());

        let waiter = thread::spawn({
            let queues = Arc::clone(&queues);
            move || queues.drain_restored(Duration::from_secs(5))
        });

        thread::sleep(Duration::from_millis(200));
        {
            let mut restored = lock(&queues.restored);
            queues.push_restored(&mut restored, restoring_task(0));
            queues.push_restored(&mut restored, restoring_task(1));
        }

        let drained = waiter.join().unwrap();
        assert_eq!(drained.len(), 2);
        assert!(lock(&queues.restored).is_empty());
    }

    #[test]
    fn test_failed_queue_keeps_bundles_separate() {
        let queues = HandoffQueues::new();
        queues.push_failed(ErrorAndTasks::new(
            vec![restoring_task(0)],
            RestoreError::streams("first"),
        ));
        queues.push_failed(ErrorAndTasks::new(
            vec![restoring_task(1)],
            RestoreError::streams("second"),
        ));
        assert_eq!(queues.failed_len(), 2);

        let failed = queues.drain_failed();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].task_ids(), vec![TaskId::new(0, 0)]);
        assert_eq!(failed[1].error().to_string(), "second");
        assert!(queues.drain_failed().is_empty());
    }

    #[test]
    fn test_enqueue_preserves_fifo_order() {
        let queues = HandoffQueues::new();
        queues.enqueue(PendingAction::add(restoring_task(2)));
        queues.enqueue(PendingAction::add(restoring_task(1)));

        let pending = lock(&queues.pending);
        let ids: Vec<TaskId> = pending.iter().map(|a| a.task.id()).collect();
        assert_eq!(ids, vec![TaskId::new(0, 2), TaskId::new(0, 1)]);
        assert!(pending.iter().all(|a| a.action == Action::Add));
    }
}

//! InMemoryChangelogReader - 開発用の changelog reader
//!
//! # 実装詳細
//! - changelog ごとに「読み出し位置」と「log end offset」を保持
//! - restore() 1 回につき各 changelog を最大 batch_size レコード進める
//! - RestoreActive モードでは standby の changelog を一時停止
//! - 失敗の注入（エラー / panic）と、遅い I/O の模擬（restore_delay）が可能
//!
//! clone は同じ状態を共有するので、state updater に渡した後も
//! テスト側から log end offset の追加や状態の確認ができます。
//!
//! # 使用例
//! ```ignore
//! let reader = InMemoryChangelogReader::new().with_batch_size(10);
//! reader.set_end_offset(TopicPartition::new("store-changelog", 0), 100);
//! let updater = StateUpdater::new(reader.clone(), resetter);
//! ```

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::app::lock;
use crate::domain::{RestoreError, TaskHandle, TaskId, TopicPartition};
use crate::ports::{ChangelogReader, Interrupt, ReaderMode};

const DEFAULT_BATCH_SIZE: u64 = 100;
const INTERRUPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
enum Failure {
    Error(RestoreError),
    Panic(String),
}

/// A failure that fires on the first restore call tracking all `required`
/// tasks.
#[derive(Debug)]
struct InjectedFailure {
    required: BTreeSet<TaskId>,
    failure: Failure,
}

#[derive(Debug, Clone, Copy)]
struct Changelog {
    owner: TaskId,
    active: bool,
    position: u64,
}

#[derive(Debug)]
struct ReaderState {
    end_offsets: HashMap<TopicPartition, u64>,
    changelogs: HashMap<TopicPartition, Changelog>,
    mode: ReaderMode,
    mode_changes: Vec<ReaderMode>,
    batch_size: u64,
    restore_delay: Duration,
    injected: VecDeque<InjectedFailure>,
    restore_calls: u64,
}

impl Default for ReaderState {
    fn default() -> Self {
        Self {
            end_offsets: HashMap::new(),
            changelogs: HashMap::new(),
            mode: ReaderMode::RestoreActive,
            mode_changes: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            restore_delay: Duration::ZERO,
            injected: VecDeque::new(),
            restore_calls: 0,
        }
    }
}

impl ReaderState {
    fn switch_mode(&mut self, mode: ReaderMode) {
        if self.mode != mode {
            trace!(?mode, "Changelog reader switched mode");
            self.mode = mode;
            self.mode_changes.push(mode);
        }
    }

    fn is_complete(&self, partition: &TopicPartition, changelog: &Changelog) -> bool {
        changelog.position >= self.end_offset(partition)
    }

    fn end_offset(&self, partition: &TopicPartition) -> u64 {
        self.end_offsets.get(partition).copied().unwrap_or(0)
    }

    fn take_failure(&mut self, tasks: &HashMap<TaskId, TaskHandle>) -> Option<Failure> {
        let next = self.injected.front()?;
        if next.required.iter().all(|id| tasks.contains_key(id)) {
            self.injected.pop_front().map(|injected| injected.failure)
        } else {
            None
        }
    }

    /// Track exactly the changelogs of `tasks`.
    fn register(&mut self, tasks: &HashMap<TaskId, TaskHandle>) {
        self.changelogs
            .retain(|_, changelog| tasks.contains_key(&changelog.owner));
        for task in tasks.values() {
            for partition in task.changelog_partitions() {
                self.changelogs.entry(partition).or_insert(Changelog {
                    owner: task.id(),
                    active: task.is_active(),
                    position: 0,
                });
            }
        }
    }

    fn advance(&mut self) {
        let ReaderState {
            end_offsets,
            changelogs,
            mode,
            batch_size,
            ..
        } = self;
        for (partition, changelog) in changelogs.iter_mut() {
            if *mode == ReaderMode::RestoreActive && !changelog.active {
                continue;
            }
            let end = end_offsets.get(partition).copied().unwrap_or(0);
            changelog.position = end.min(changelog.position.saturating_add(*batch_size));
        }
    }
}

/// In-memory changelog reader with shared, inspectable state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChangelogReader {
    state: Arc<Mutex<ReaderState>>,
}

impl InMemoryChangelogReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records restored per changelog per `restore` call.
    pub fn with_batch_size(self, batch_size: u64) -> Self {
        lock(&self.state).batch_size = batch_size.max(1);
        self
    }

    /// Simulated I/O time per `restore` call.
    pub fn with_restore_delay(self, delay: Duration) -> Self {
        lock(&self.state).restore_delay = delay;
        self
    }

    /// Set the log end offset of a changelog (appending records moves it).
    pub fn set_end_offset(&self, partition: TopicPartition, end_offset: u64) {
        lock(&self.state).end_offsets.insert(partition, end_offset);
    }

    /// Fail the next `restore` call with `error`.
    pub fn fail_next(&self, error: RestoreError) {
        self.fail_when_tracking([], error);
    }

    /// Fail the first `restore` call whose task map contains all `required`
    /// tasks.
    pub fn fail_when_tracking(
        &self,
        required: impl IntoIterator<Item = TaskId>,
        error: RestoreError,
    ) {
        self.inject(required, Failure::Error(error));
    }

    /// Panic inside the first `restore` call whose task map contains all
    /// `required` tasks.
    pub fn panic_when_tracking(
        &self,
        required: impl IntoIterator<Item = TaskId>,
        message: impl Into<String>,
    ) {
        self.inject(required, Failure::Panic(message.into()));
    }

    fn inject(&self, required: impl IntoIterator<Item = TaskId>, failure: Failure) {
        lock(&self.state).injected.push_back(InjectedFailure {
            required: required.into_iter().collect(),
            failure,
        });
    }

    pub fn mode(&self) -> ReaderMode {
        lock(&self.state).mode
    }

    /// Every effective mode switch, in order.
    pub fn mode_changes(&self) -> Vec<ReaderMode> {
        lock(&self.state).mode_changes.clone()
    }

    pub fn restore_calls(&self) -> u64 {
        lock(&self.state).restore_calls
    }

    /// Current read position of a registered changelog.
    pub fn position(&self, partition: &TopicPartition) -> Option<u64> {
        lock(&self.state)
            .changelogs
            .get(partition)
            .map(|changelog| changelog.position)
    }

    pub fn registered_changelogs(&self) -> usize {
        lock(&self.state).changelogs.len()
    }

    fn simulate_io(&self, interrupt: &Interrupt) -> Result<(), RestoreError> {
        let delay = lock(&self.state).restore_delay;
        let deadline = Instant::now() + delay;
        loop {
            if interrupt.is_triggered() {
                return Err(RestoreError::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(INTERRUPT_POLL_INTERVAL.min(deadline - now));
        }
    }
}

impl ChangelogReader for InMemoryChangelogReader {
    fn restore(
        &mut self,
        tasks: &HashMap<TaskId, TaskHandle>,
        interrupt: &Interrupt,
    ) -> Result<(), RestoreError> {
        let failure = {
            let mut state = lock(&self.state);
            state.restore_calls += 1;
            state.take_failure(tasks)
        };
        match failure {
            Some(Failure::Error(error)) => return Err(error),
            Some(Failure::Panic(message)) => panic!("{message}"),
            None => {}
        }

        self.simulate_io(interrupt)?;

        let mut state = lock(&self.state);
        state.register(tasks);
        state.advance();
        Ok(())
    }

    fn completed_changelogs(&self) -> HashSet<TopicPartition> {
        let state = lock(&self.state);
        state
            .changelogs
            .iter()
            .filter(|(partition, changelog)| state.is_complete(partition, changelog))
            .map(|(partition, _)| partition.clone())
            .collect()
    }

    fn all_changelogs_completed(&self) -> bool {
        let state = lock(&self.state);
        state
            .changelogs
            .iter()
            .all(|(partition, changelog)| state.is_complete(partition, changelog))
    }

    fn enforce_restore_active(&mut self) {
        lock(&self.state).switch_mode(ReaderMode::RestoreActive);
    }

    fn transit_to_update_standby(&mut self) {
        lock(&self.state).switch_mode(ReaderMode::UpdateStandby);
    }

    fn clear(&mut self) {
        let mut state = lock(&self.state);
        state.changelogs.clear();
        state.mode = ReaderMode::RestoreActive;
    }
}

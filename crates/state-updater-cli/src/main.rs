use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::Serialize;
use state_updater_core::impls::{InMemoryChangelogReader, StandbyTask, StreamTask};
use state_updater_core::{
    OffsetResetter, RestoreError, StateUpdater, StateUpdaterConfig, StateUpdaterStatus, Task,
    TaskId, TopicPartition,
};
use tokio::task::JoinError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CHANGELOG_TOPIC: &str = "orders-store-changelog";
const INPUT_TOPIC: &str = "orders";
const STATEFUL_ACTIVE_TASKS: u32 = 4;
const STANDBY_TASKS: u32 = 2;
const POLL_TIMEOUT: Duration = Duration::from_millis(200);
const RESTORE_DEADLINE: Duration = Duration::from_secs(30);

/// 最終レポート（JSON で出力）
#[derive(Debug, Default, Serialize)]
struct Report {
    restored: Vec<String>,
    failed: Vec<String>,
    status: Option<StateUpdaterStatus>,
}

fn changelog(partition: u32) -> TopicPartition {
    TopicPartition::new(CHANGELOG_TOPIC, partition as i32)
}

fn input(partition: u32) -> TopicPartition {
    TopicPartition::new(INPUT_TOPIC, partition as i32)
}

/// changelog の長さはランダム。task 1_0 は壊れた checkpoint を模擬する
fn build_reader() -> InMemoryChangelogReader {
    let reader = InMemoryChangelogReader::new().with_batch_size(50);
    let mut rng = rand::thread_rng();
    for partition in 0..STATEFUL_ACTIVE_TASKS + STANDBY_TASKS + 1 {
        reader.set_end_offset(changelog(partition), rng.gen_range(200..2_000));
    }
    let corrupted = TaskId::new(1, 0);
    reader.fail_when_tracking(
        [corrupted],
        RestoreError::task_corrupted([corrupted], "checkpoint is ahead of the changelog end"),
    );
    reader
}

fn logging_resetter() -> OffsetResetter {
    Arc::new(|partitions: &HashSet<TopicPartition>| {
        let mut partitions: Vec<String> = partitions.iter().map(ToString::to_string).collect();
        partitions.sort();
        info!(?partitions, "Resetting offsets of uncommitted input partitions");
    })
}

/// 期待した数の active task が restored / failed のどちらかに揃うまで poll
async fn wait_for_active_tasks(
    updater: Arc<StateUpdater>,
    expected: usize,
    report: &mut Report,
) -> Result<(), JoinError> {
    let mut accounted = 0;
    while accounted < expected {
        let poller = Arc::clone(&updater);
        let restored =
            tokio::task::spawn_blocking(move || poller.get_restored_active_tasks(POLL_TIMEOUT))
                .await?;
        for task in restored {
            info!(task_id = %task.id(), state = %task.state(), "Task restored");
            report.restored.push(task.id().to_string());
            accounted += 1;
        }

        for failure in updater.get_failed_tasks_and_errors() {
            warn!(
                tasks = ?failure.task_ids(),
                error = %failure.error(),
                "Tasks failed during restoration"
            );
            for task in failure.tasks() {
                if task.is_active() {
                    accounted += 1;
                }
                report.failed.push(task.id().to_string());
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // (A) 設定（引数があれば JSON ファイルから）
    let config = match std::env::args().nth(1) {
        Some(path) => StateUpdaterConfig::from_json_str(&std::fs::read_to_string(path)?)?,
        None => StateUpdaterConfig::default(),
    };
    let shutdown_timeout = config.shutdown_timeout();
    info!(thread = %config.thread_name, "state-updater demo starting");

    let updater = Arc::new(StateUpdater::with_config(
        config,
        build_reader(),
        logging_resetter(),
    ));

    // (B) タスク投入: stateful active / 壊れた active / stateless active / standby
    for partition in 0..STATEFUL_ACTIVE_TASKS {
        let mut task = StreamTask::restoring(TaskId::new(0, partition), [changelog(partition)])
            .with_input_partitions([input(partition)]);
        if partition % 2 == 0 {
            task = task.with_committed_offset(input(partition), 0);
        }
        updater.add(Arc::new(task))?;
    }
    let corrupted_partition = STATEFUL_ACTIVE_TASKS + STANDBY_TASKS;
    updater.add(Arc::new(StreamTask::restoring(
        TaskId::new(1, 0),
        [changelog(corrupted_partition)],
    )))?;
    updater.add(Arc::new(StreamTask::restoring(TaskId::new(2, 0), [])))?;
    for offset in 0..STANDBY_TASKS {
        let partition = STATEFUL_ACTIVE_TASKS + offset;
        updater.add(Arc::new(StandbyTask::running(
            TaskId::new(3, offset),
            [changelog(partition)],
        )))?;
    }
    let expected = STATEFUL_ACTIVE_TASKS as usize + 2;

    // (C) restored / failed を回収
    let mut report = Report::default();
    match tokio::time::timeout(
        RESTORE_DEADLINE,
        wait_for_active_tasks(Arc::clone(&updater), expected, &mut report),
    )
    .await
    {
        Ok(result) => result?,
        Err(_) => warn!(deadline = ?RESTORE_DEADLINE, "Gave up waiting for active tasks"),
    }

    // (D) 状態を出力して停止
    report.status = Some(updater.status());
    println!("{}", serde_json::to_string_pretty(&report)?);

    let stopper = Arc::clone(&updater);
    tokio::task::spawn_blocking(move || stopper.shutdown(shutdown_timeout)).await??;
    info!(status = ?updater.status().worker, "state-updater demo finished");
    Ok(())
}

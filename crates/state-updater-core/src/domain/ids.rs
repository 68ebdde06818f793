//! Domain identifiers (strongly-typed IDs).
//!
//! # TaskId
//! タスクは `subtopology` と入力 `partition` の組で一意に決まります。
//! 表示形式は `"<subtopology>_<partition>"`（例: `0_3`）で、
//! `FromStr` で同じ形式から復元できます。
//!
//! # TopicPartition
//! changelog topic のパーティション。表示形式は `"<topic>-<partition>"`。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a stream task.
///
/// Ordering is by subtopology first, then partition, so sorted task lists
/// group tasks of the same subtopology together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId {
    subtopology: u32,
    partition: u32,
}

impl TaskId {
    pub fn new(subtopology: u32, partition: u32) -> Self {
        Self {
            subtopology,
            partition,
        }
    }

    pub fn subtopology(&self) -> u32 {
        self.subtopology
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.subtopology, self.partition)
    }
}

/// ParseTaskIdError は `"<subtopology>_<partition>"` 以外の文字列を受け取ったときのエラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid task id '{0}', expected '<subtopology>_<partition>'")]
pub struct ParseTaskIdError(String);

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTaskIdError(s.to_string());
        let (subtopology, partition) = s.split_once('_').ok_or_else(invalid)?;
        let subtopology = subtopology.parse().map_err(|_| invalid())?;
        let partition = partition.parse().map_err(|_| invalid())?;
        Ok(Self::new(subtopology, partition))
    }
}

/// A partition of a changelog (or input) topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicPartition {
    topic: String,
    partition: i32,
}

impl TopicPartition {
    pub fn new(topic: impl Into<String>, partition: i32) -> Self {
        Self {
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition(&self) -> i32 {
        self.partition
    }
}

impl fmt::Display for TopicPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition)
    }
}

//! Status views for the aggregates and the serial queue.

use serde::{Deserialize, Serialize};

/// Counters of a `TaskExecutor`.
///
/// `actual` は呼び出し時点で追跡中の実行数、それ以外は累計です。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorStat {
    pub actual: usize,
    pub done: usize,
    pub canceled: usize,
    pub rejected: usize,
}

/// Counters of a `SerialQueue`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub processed: usize,
    pub failed: usize,
}

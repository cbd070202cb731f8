//! Task - キャンセル可能なタスクとその集約
//!
//! - **TaskHandle**: 1 つの中断可能な作業単位
//! - **Settlement**: TaskHandle の最終結果
//! - **SingleTaskTracker**: 同時に 1 つだけ動かす
//! - **JobsTracker**: まとめて abort する集合
//! - **TaskExecutor**: 新しい実行が古い実行を置き換える

mod executor;
mod handle;
mod jobs;
mod settlement;
mod slot;
mod tracker;

pub use self::executor::TaskExecutor;
pub use self::handle::TaskHandle;
pub use self::jobs::JobsTracker;
pub use self::settlement::Settlement;
pub use self::slot::Delegation;
pub use self::tracker::SingleTaskTracker;
